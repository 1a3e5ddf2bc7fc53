//! Scripted in-memory device for tests.

use super::{GrabMode, InputDevice, InputId, Readiness};
use crate::event::{EventType, RawInputEvent};
use crate::pump::CancelToken;
use std::collections::{BTreeSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted outcome of `read_event`.
pub(crate) enum Read {
    Event(RawInputEvent),
    Fail(i32),
}

/// One scripted outcome of a readiness wait.
pub(crate) enum Wake {
    Ready,
    Timeout,
    /// Cancel the token, then report a timeout.
    Cancel(CancelToken),
    Fail(i32),
}

/// Shared view of what the device was asked to do.
#[derive(Clone, Default)]
pub(crate) struct Script {
    reads: Arc<Mutex<VecDeque<Read>>>,
    wakes: Arc<Mutex<VecDeque<Wake>>>,
    pub grabs: Arc<Mutex<Vec<GrabMode>>>,
    pub waits: Arc<AtomicUsize>,
    pub read_calls: Arc<AtomicUsize>,
    pub dropped: Arc<AtomicBool>,
}

impl Script {
    pub fn push_read(&self, read: Read) {
        self.reads.lock().unwrap().push_back(read);
    }

    pub fn push_event(&self, type_: u16, code: u16, value: i32) {
        let n = self.reads.lock().unwrap().len() as u64;
        self.push_read(Read::Event(RawInputEvent::new(100, n, type_, code, value)));
    }

    pub fn push_wake(&self, wake: Wake) {
        self.wakes.lock().unwrap().push_back(wake);
    }
}

pub(crate) struct FakeDevice {
    pub name: Option<String>,
    pub phys: Option<String>,
    pub uniq: Option<String>,
    pub id: InputId,
    pub driver_version: i32,
    pub types: BTreeSet<u16>,
    pub codes: BTreeSet<(u16, u16)>,
    pub grab_error: Option<i32>,
    pub script: Script,
}

impl FakeDevice {
    /// A keyboard reporting the given key codes.
    pub fn keyboard(keys: &[u16]) -> Self {
        let key = EventType::Key.raw();
        Self {
            name: Some("Fake Keyboard".into()),
            phys: Some("usb-0000:00:14.0-1/input0".into()),
            uniq: None,
            id: InputId {
                bus_type: 0x03,
                vendor: 0x046d,
                product: 0xc31c,
                version: 0x0110,
            },
            driver_version: 0x01_00_01,
            types: [EventType::Syn.raw(), key].into_iter().collect(),
            codes: keys.iter().map(|&code| (key, code)).collect(),
            grab_error: None,
            script: Script::default(),
        }
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.script.dropped.store(true, Ordering::SeqCst);
    }
}

impl InputDevice for FakeDevice {
    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn phys(&self) -> Option<String> {
        self.phys.clone()
    }

    fn uniq(&self) -> Option<String> {
        self.uniq.clone()
    }

    fn input_id(&self) -> InputId {
        self.id
    }

    fn driver_version(&self) -> i32 {
        self.driver_version
    }

    fn has_event_type(&self, type_: u16) -> bool {
        self.types.contains(&type_)
    }

    fn has_event_code(&self, type_: u16, code: u16) -> bool {
        self.codes.contains(&(type_, code))
    }

    fn grab(&mut self, mode: GrabMode) -> io::Result<()> {
        self.script.grabs.lock().unwrap().push(mode);
        match self.grab_error {
            Some(code) => Err(io::Error::from_raw_os_error(code)),
            None => Ok(()),
        }
    }

    fn read_event(&mut self) -> io::Result<RawInputEvent> {
        self.script.read_calls.fetch_add(1, Ordering::SeqCst);
        match self.script.reads.lock().unwrap().pop_front() {
            Some(Read::Event(ev)) => Ok(ev),
            Some(Read::Fail(code)) => Err(io::Error::from_raw_os_error(code)),
            None => Err(io::Error::from(io::ErrorKind::WouldBlock)),
        }
    }

    fn readiness(&self) -> io::Result<Box<dyn Readiness>> {
        Ok(Box::new(FakeReadiness {
            script: self.script.clone(),
        }))
    }
}

struct FakeReadiness {
    script: Script,
}

impl Readiness for FakeReadiness {
    fn wait(&mut self, timeout: Duration) -> io::Result<bool> {
        self.script.waits.fetch_add(1, Ordering::SeqCst);
        let next = self.script.wakes.lock().unwrap().pop_front();
        match next {
            Some(Wake::Ready) => Ok(true),
            Some(Wake::Timeout) => Ok(false),
            Some(Wake::Cancel(token)) => {
                token.cancel();
                Ok(false)
            }
            Some(Wake::Fail(code)) => Err(io::Error::from_raw_os_error(code)),
            None => {
                std::thread::sleep(timeout);
                Ok(false)
            }
        }
    }
}
