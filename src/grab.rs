//! Exclusive input delivery.

use crate::backend::GrabMode;
use crate::error::{Error, Result};
use crate::session::DeviceSession;
use std::sync::atomic::Ordering;

impl DeviceSession {
    /// Take exclusive delivery of the device's events.
    pub fn grab(&self) -> Result<()> {
        self.set_grab(GrabMode::Grab)
    }

    /// Give up exclusive delivery.
    pub fn ungrab(&self) -> Result<()> {
        self.set_grab(GrabMode::Ungrab)
    }

    /// Issue a grab request. The request always reaches the kernel, even
    /// when the session is already in the requested state.
    pub fn set_grab(&self, mode: GrabMode) -> Result<()> {
        self.with_device(|d| d.grab(mode))?.map_err(|e| {
            log::warn!("{:?} failed on {}: {}", mode, self.path().display(), e);
            Error::grab(&e)
        })?;
        self.grabbed.store(mode == GrabMode::Grab, Ordering::SeqCst);
        log::debug!("{:?} on {}", mode, self.path().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeDevice;

    #[test]
    fn test_grab_and_ungrab() {
        let device = FakeDevice::keyboard(&[30]);
        let grabs = device.script.grabs.clone();
        let s = DeviceSession::from_device("/dev/input/event1", Box::new(device));

        s.grab().unwrap();
        assert!(s.is_grabbed());
        s.ungrab().unwrap();
        assert!(!s.is_grabbed());
        assert_eq!(*grabs.lock().unwrap(), vec![GrabMode::Grab, GrabMode::Ungrab]);
    }

    #[test]
    fn test_repeated_grab_is_not_short_circuited() {
        let device = FakeDevice::keyboard(&[30]);
        let grabs = device.script.grabs.clone();
        let s = DeviceSession::from_device("/dev/input/event1", Box::new(device));

        s.grab().unwrap();
        s.grab().unwrap();
        s.ungrab().unwrap();
        s.ungrab().unwrap();
        assert_eq!(grabs.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_grab_failure_carries_errno() {
        let mut device = FakeDevice::keyboard(&[30]);
        device.grab_error = Some(16); // EBUSY
        let s = DeviceSession::from_device("/dev/input/event1", Box::new(device));

        let err = s.grab().unwrap_err();
        assert!(matches!(err, Error::Grab { code: 16 }));
        assert!(!s.is_grabbed());
    }

    #[test]
    fn test_close_releases_grab_without_ungrab() {
        let device = FakeDevice::keyboard(&[30]);
        let grabs = device.script.grabs.clone();
        let s = DeviceSession::from_device("/dev/input/event1", Box::new(device));

        s.grab().unwrap();
        s.close().unwrap();
        assert!(!s.is_grabbed());
        assert_eq!(grabs.lock().unwrap().len(), 1);
        assert!(matches!(s.grab(), Err(Error::UseAfterClose)));
        assert!(matches!(s.ungrab(), Err(Error::UseAfterClose)));
    }
}
