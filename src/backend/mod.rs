//! Native device binding contract.
//!
//! A session talks to the kernel only through [`InputDevice`]. The default
//! implementation (feature `evdev`, Linux only) wraps the `evdev` crate's raw
//! stream; anything else that can answer the same questions can be plugged
//! in with [`DeviceSession::from_device`](crate::DeviceSession::from_device).
//!
//! ## Permissions
//!
//! Reading `/dev/input/event*` requires root or membership in the `input`
//! group:
//! ```bash
//! sudo usermod -aG input $USER
//! ```

#[cfg(all(target_os = "linux", feature = "evdev"))]
mod evdev;
#[cfg(test)]
pub(crate) mod fake;

#[cfg(all(target_os = "linux", feature = "evdev"))]
pub use self::evdev::{EvdevDevice, FdReadiness};

use crate::event::RawInputEvent;
use std::io;
use std::time::Duration;

/// Exclusive-delivery request sent to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabMode {
    Grab,
    Ungrab,
}

/// Bus identity as reported by the kernel (`struct input_id`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputId {
    pub bus_type: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
}

/// An open native device handle.
///
/// Dropping the handle closes it, which also releases any grab.
pub trait InputDevice: Send {
    /// Device name, if the driver reports one.
    fn name(&self) -> Option<String>;

    /// Physical location, if reported.
    fn phys(&self) -> Option<String>;

    /// Unique identifier (serial), if reported.
    fn uniq(&self) -> Option<String>;

    fn input_id(&self) -> InputId;

    /// Evdev protocol version packed as `major << 16 | minor << 8 | patch`.
    fn driver_version(&self) -> i32;

    fn has_event_type(&self, type_: u16) -> bool;

    fn has_event_code(&self, type_: u16, code: u16) -> bool;

    /// Issue a grab or ungrab request. Never short-circuits on current state.
    fn grab(&mut self, mode: GrabMode) -> io::Result<()>;

    /// Read one record without blocking.
    ///
    /// An empty queue is reported as [`io::ErrorKind::WouldBlock`].
    fn read_event(&mut self) -> io::Result<RawInputEvent>;

    /// A readiness waiter for this handle, usable without holding the handle.
    fn readiness(&self) -> io::Result<Box<dyn Readiness>>;
}

/// Blocks until the device has data or the timeout elapses.
pub trait Readiness: Send {
    /// Returns `Ok(true)` when data is available, `Ok(false)` on timeout or
    /// signal interruption.
    fn wait(&mut self, timeout: Duration) -> io::Result<bool>;
}

/// Open the platform device at `path` read-only and non-blocking.
#[cfg(all(target_os = "linux", feature = "evdev"))]
pub(crate) fn open(path: &std::path::Path) -> io::Result<Box<dyn InputDevice>> {
    Ok(Box::new(EvdevDevice::open(path)?))
}

#[cfg(not(all(target_os = "linux", feature = "evdev")))]
pub(crate) fn open(_path: &std::path::Path) -> io::Result<Box<dyn InputDevice>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "no device backend enabled. Enable the 'evdev' feature on Linux.",
    ))
}
