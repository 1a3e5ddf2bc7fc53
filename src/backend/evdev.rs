//! Device handle built on the `evdev` crate's raw stream.
//!
//! The raw stream surfaces every kernel record as-is: no `SYN_REPORT`
//! grouping and no `SYN_DROPPED` resynchronization.

use super::{GrabMode, InputDevice, InputId, Readiness};
use crate::event::{EventType, RawInputEvent};
use evdev::raw_stream::RawDevice;
use evdev::{
    AbsoluteAxisCode, EventType as EvdevEventType, FFEffectCode, KeyCode, LedCode, MiscCode,
    RelativeAxisCode, SoundCode, SwitchCode,
};
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use std::time::Duration;

/// `EVIOCGRAB` = `_IOW('E', 0x90, int)`.
///
/// Issued directly: `RawDevice::grab`/`ungrab` skip the ioctl when their own
/// flag says the device is already in the requested state.
const EVIOCGRAB: u64 = 0x4004_4590;

/// Highest auto-repeat parameter code (`REP_PERIOD`).
const REP_MAX: u16 = 0x01;

/// An open `/dev/input/event*` node.
pub struct EvdevDevice {
    device: RawDevice,
    pending: VecDeque<RawInputEvent>,
}

impl EvdevDevice {
    /// Open `path` read-only, non-blocking and close-on-exec.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_CLOEXEC | libc::O_NONBLOCK)
            .open(path)?;
        let device = RawDevice::from_fd(OwnedFd::from(file))?;
        log::debug!(
            "Opened {} ({})",
            path.display(),
            device.name().unwrap_or("unnamed")
        );
        Ok(Self {
            device,
            pending: VecDeque::new(),
        })
    }

    fn refill(&mut self) -> io::Result<()> {
        let events = self.device.fetch_events()?;
        self.pending.extend(events.map(|ev| {
            RawInputEvent::at(ev.timestamp(), ev.event_type().0, ev.code(), ev.value())
        }));
        Ok(())
    }
}

impl InputDevice for EvdevDevice {
    fn name(&self) -> Option<String> {
        self.device.name().map(str::to_owned)
    }

    fn phys(&self) -> Option<String> {
        self.device.physical_path().map(str::to_owned)
    }

    fn uniq(&self) -> Option<String> {
        self.device.unique_name().map(str::to_owned)
    }

    fn input_id(&self) -> InputId {
        let id = self.device.input_id();
        InputId {
            bus_type: id.bus_type().0,
            vendor: id.vendor(),
            product: id.product(),
            version: id.version(),
        }
    }

    fn driver_version(&self) -> i32 {
        let (major, minor, patch) = self.device.driver_version();
        (i32::from(major) << 16) | (i32::from(minor) << 8) | i32::from(patch)
    }

    fn has_event_type(&self, type_: u16) -> bool {
        self.device
            .supported_events()
            .contains(EvdevEventType(type_))
    }

    fn has_event_code(&self, type_: u16, code: u16) -> bool {
        let d = &self.device;
        match EventType::from_raw(type_) {
            Some(EventType::Syn) => self.has_event_type(type_),
            Some(EventType::Key) => d
                .supported_keys()
                .is_some_and(|keys| keys.contains(KeyCode::new(code))),
            Some(EventType::Rel) => d
                .supported_relative_axes()
                .is_some_and(|axes| axes.contains(RelativeAxisCode(code))),
            Some(EventType::Abs) => d
                .supported_absolute_axes()
                .is_some_and(|axes| axes.contains(AbsoluteAxisCode(code))),
            Some(EventType::Sw) => d
                .supported_switches()
                .is_some_and(|sw| sw.contains(SwitchCode(code))),
            Some(EventType::Led) => d
                .supported_leds()
                .is_some_and(|leds| leds.contains(LedCode(code))),
            Some(EventType::Msc) => d
                .misc_properties()
                .is_some_and(|misc| misc.contains(MiscCode(code))),
            Some(EventType::Snd) => d
                .supported_sounds()
                .is_some_and(|snd| snd.contains(SoundCode(code))),
            Some(EventType::Ff) => d
                .supported_ff()
                .is_some_and(|ff| ff.contains(FFEffectCode(code))),
            Some(EventType::Rep) => repeat_code_supported(self.has_event_type(type_), code),
            _ => false,
        }
    }

    fn grab(&mut self, mode: GrabMode) -> io::Result<()> {
        let arg: libc::c_int = match mode {
            GrabMode::Grab => 1,
            GrabMode::Ungrab => 0,
        };
        let ret = unsafe { libc::ioctl(self.device.as_raw_fd(), EVIOCGRAB as _, arg) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn read_event(&mut self) -> io::Result<RawInputEvent> {
        if self.pending.is_empty() {
            self.refill()?;
        }
        self.pending
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::WouldBlock))
    }

    fn readiness(&self) -> io::Result<Box<dyn Readiness>> {
        Ok(Box::new(FdReadiness {
            fd: self.device.as_raw_fd(),
        }))
    }
}

/// The kernel keeps no bitmap for `EV_REP`: both parameters exist whenever
/// the type does.
fn repeat_code_supported(has_rep: bool, code: u16) -> bool {
    has_rep && code <= REP_MAX
}

/// Waits on a descriptor with `poll(2)`.
pub struct FdReadiness {
    fd: RawFd,
}

impl Readiness for FdReadiness {
    fn wait(&mut self, timeout: Duration) -> io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        let ret = unsafe { libc::poll(&mut pfd, 1, millis) };

        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }

        // Error and hangup conditions count as ready so the next read reports them.
        let wake = libc::POLLIN | libc::POLLERR | libc::POLLHUP | libc::POLLNVAL;
        Ok(ret > 0 && pfd.revents & wake != 0)
    }
}
