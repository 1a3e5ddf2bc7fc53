//! Key capability enumeration.

use crate::error::Result;
use crate::event::EventType;
use crate::names;
use crate::session::DeviceSession;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Upper bound (exclusive) of the scanned key-code space.
///
/// Only the classic keyboard range is scanned; buttons and higher codes are
/// not turned into channels.
pub const KEY_SCAN_LIMIT: u16 = 255;

/// A key the device can report.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CapabilityKey {
    pub code: u16,
    /// Symbolic name such as `KEY_A`, when known.
    pub name: Option<String>,
}

impl CapabilityKey {
    pub fn new(code: u16) -> Self {
        Self {
            code,
            name: names::key_name(code).map(str::to_owned),
        }
    }
}

/// Walk key codes `0..KEY_SCAN_LIMIT` and keep the ones the device supports.
///
/// The result is ascending by code. A code without a known name is kept
/// with `name: None`.
pub fn enumerate_keys(session: &DeviceSession) -> Result<Vec<CapabilityKey>> {
    session.with_device(|device| {
        let key = EventType::Key.raw();
        let keys: Vec<CapabilityKey> = (0..KEY_SCAN_LIMIT)
            .filter(|&code| device.has_event_code(key, code))
            .map(CapabilityKey::new)
            .collect();
        log::debug!("Enumerated {} keys", keys.len());
        keys
    })
}
