//! Device sessions: one open evdev node, its identity and capabilities.

use crate::backend::{self, InputDevice, Readiness};
use crate::capability::{self, CapabilityKey};
use crate::error::{Error, Result};
use crate::event::{BusType, EventType};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};

/// Bus identity of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusIdentity {
    /// Known bus kind, `None` when the raw id is not recognized.
    pub bus_type: Option<BusType>,
    /// Raw bus id, for display when `bus_type` is `None`.
    pub bus_id: u16,
    pub vendor_id: u16,
    pub product_id: u16,
    pub version_id: u16,
    pub driver_version: i32,
}

/// An open input device.
///
/// The session owns the native handle exclusively. Capability queries and
/// grab requests may come from any thread; reads are meant for the single
/// pump thread. After [`close`](Self::close) every operation fails with
/// [`Error::UseAfterClose`].
pub struct DeviceSession {
    path: PathBuf,
    device: Mutex<Option<Box<dyn InputDevice>>>,
    keys: OnceLock<Vec<CapabilityKey>>,
    pub(crate) grabbed: AtomicBool,
}

impl DeviceSession {
    /// Open the device node at `path` (read-only, close-on-exec).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let device = backend::open(path).map_err(|e| {
            if e.kind() == io::ErrorKind::Unsupported {
                Error::NotSupported(e.to_string())
            } else {
                Error::open(path, &e)
            }
        })?;
        Ok(Self::from_device(path, device))
    }

    /// Wrap an already opened handle.
    pub fn from_device(path: impl Into<PathBuf>, device: Box<dyn InputDevice>) -> Self {
        let path = path.into();
        log::debug!("Session opened for {}", path.display());
        Self {
            path,
            device: Mutex::new(Some(device)),
            keys: OnceLock::new(),
            grabbed: AtomicBool::new(false),
        }
    }

    /// Device node this session was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Box<dyn InputDevice>>>> {
        self.device.lock().map_err(|_| Error::poisoned())
    }

    /// Run `f` against the open handle.
    pub(crate) fn with_device<T>(&self, f: impl FnOnce(&mut dyn InputDevice) -> T) -> Result<T> {
        let mut guard = self.lock()?;
        let device = guard.as_deref_mut().ok_or(Error::UseAfterClose)?;
        Ok(f(device))
    }

    /// Device name; empty when the driver reports none.
    pub fn name(&self) -> Result<String> {
        self.with_device(|d| d.name().unwrap_or_default())
    }

    /// Physical location; may be empty.
    pub fn phys(&self) -> Result<String> {
        self.with_device(|d| d.phys().unwrap_or_default())
    }

    /// Unique identifier; may be empty.
    pub fn uniq(&self) -> Result<String> {
        self.with_device(|d| d.uniq().unwrap_or_default())
    }

    /// Bus kind, vendor, product and version ids plus the driver version.
    pub fn bus_identity(&self) -> Result<BusIdentity> {
        self.with_device(|d| {
            let id = d.input_id();
            BusIdentity {
                bus_type: BusType::from_raw(id.bus_type),
                bus_id: id.bus_type,
                vendor_id: id.vendor,
                product_id: id.product,
                version_id: id.version,
                driver_version: d.driver_version(),
            }
        })
    }

    /// Whether the device reports events of `kind`.
    pub fn has_event_type(&self, kind: EventType) -> Result<bool> {
        self.with_device(|d| d.has_event_type(kind.raw()))
    }

    /// Whether the device reports `code` within `kind`. The answer is fixed
    /// for the life of the session.
    pub fn has_event_code(&self, kind: EventType, code: u16) -> Result<bool> {
        self.with_device(|d| d.has_event_code(kind.raw(), code))
    }

    /// Supported keys, enumerated on first use and fixed afterwards.
    pub fn keys(&self) -> Result<&[CapabilityKey]> {
        if let Some(keys) = self.keys.get() {
            return Ok(keys);
        }
        let keys = capability::enumerate_keys(self)?;
        Ok(self.keys.get_or_init(|| keys))
    }

    /// Descriptive properties of the device.
    ///
    /// Numeric ids are rendered as four lower-case hex digits; `busType`
    /// falls back to the raw id when the bus is not a known kind.
    pub fn properties(&self) -> Result<BTreeMap<String, String>> {
        let id = self.bus_identity()?;
        let bus = match id.bus_type {
            Some(bus) => bus.to_string(),
            None => hex(i64::from(id.bus_id)),
        };

        let mut props = BTreeMap::new();
        props.insert("physicalLocation".to_string(), self.phys()?);
        props.insert("serialNumber".to_string(), self.uniq()?);
        props.insert("modelId".to_string(), hex(i64::from(id.product_id)));
        props.insert("vendor".to_string(), hex(i64::from(id.vendor_id)));
        props.insert("busType".to_string(), bus);
        props.insert("firmwareVersion".to_string(), hex(i64::from(id.version_id)));
        props.insert("driverVersion".to_string(), hex(i64::from(id.driver_version)));
        Ok(props)
    }

    /// Whether the device is currently grabbed through this session.
    pub fn is_grabbed(&self) -> bool {
        self.grabbed.load(Ordering::SeqCst)
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().map(|guard| guard.is_none()).unwrap_or(true)
    }

    /// A readiness waiter for the pump.
    pub(crate) fn readiness(&self) -> Result<Box<dyn Readiness>> {
        self.with_device(|d| d.readiness())?
            .map_err(|e| Error::read(&e))
    }

    /// Release the native handle. Any grab is released with it.
    ///
    /// A second call reports [`Error::UseAfterClose`] and has no other effect.
    pub fn close(&self) -> Result<()> {
        let device = self.lock()?.take().ok_or(Error::UseAfterClose)?;
        drop(device);
        self.grabbed.store(false, Ordering::SeqCst);
        log::debug!("Session closed for {}", self.path.display());
        Ok(())
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .field("grabbed", &self.is_grabbed())
            .finish()
    }
}

fn hex(value: i64) -> String {
    format!("{:04x}", value)
}
