//! Wire records and their decoded, symbolic form.

use crate::names;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Kernel event types (`EV_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u16)]
pub enum EventType {
    /// Synchronization markers.
    Syn = 0x00,
    /// Keys and buttons.
    Key = 0x01,
    /// Relative axes.
    Rel = 0x02,
    /// Absolute axes.
    Abs = 0x03,
    /// Miscellaneous.
    Msc = 0x04,
    /// Binary switches.
    Sw = 0x05,
    /// LEDs.
    Led = 0x11,
    /// Sound output.
    Snd = 0x12,
    /// Autorepeat settings.
    Rep = 0x14,
    /// Force feedback.
    Ff = 0x15,
    /// Power management.
    Pwr = 0x16,
    /// Force feedback status.
    FfStatus = 0x17,
}

impl EventType {
    const ALL: [EventType; 12] = [
        EventType::Syn,
        EventType::Key,
        EventType::Rel,
        EventType::Abs,
        EventType::Msc,
        EventType::Sw,
        EventType::Led,
        EventType::Snd,
        EventType::Rep,
        EventType::Ff,
        EventType::Pwr,
        EventType::FfStatus,
    ];

    /// Look up a raw type code. Unknown or future codes yield `None`.
    pub fn from_raw(raw: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.raw() == raw)
    }

    /// The raw kernel value.
    pub fn raw(self) -> u16 {
        self as u16
    }
}

/// Bus kinds reported in a device's input id (`BUS_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u16)]
pub enum BusType {
    Pci = 0x01,
    IsaPnp = 0x02,
    Usb = 0x03,
    Hil = 0x04,
    Bluetooth = 0x05,
    Virtual = 0x06,
    Isa = 0x10,
    I8042 = 0x11,
    XtKbd = 0x12,
    Rs232 = 0x13,
    Gameport = 0x14,
    Parport = 0x15,
    Amiga = 0x16,
    Adb = 0x17,
    I2c = 0x18,
    Host = 0x19,
    Gsc = 0x1a,
    Atari = 0x1b,
    Spi = 0x1c,
    Rmi = 0x1d,
    Cec = 0x1e,
    IntelIshtp = 0x1f,
}

impl BusType {
    const ALL: [BusType; 22] = [
        BusType::Pci,
        BusType::IsaPnp,
        BusType::Usb,
        BusType::Hil,
        BusType::Bluetooth,
        BusType::Virtual,
        BusType::Isa,
        BusType::I8042,
        BusType::XtKbd,
        BusType::Rs232,
        BusType::Gameport,
        BusType::Parport,
        BusType::Amiga,
        BusType::Adb,
        BusType::I2c,
        BusType::Host,
        BusType::Gsc,
        BusType::Atari,
        BusType::Spi,
        BusType::Rmi,
        BusType::Cec,
        BusType::IntelIshtp,
    ];

    /// Look up a raw bus id. Unknown ids yield `None`.
    pub fn from_raw(raw: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| *b as u16 == raw)
    }

    /// The raw kernel value.
    pub fn raw(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for BusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BusType::Pci => "PCI",
            BusType::IsaPnp => "ISAPNP",
            BusType::Usb => "USB",
            BusType::Hil => "HIL",
            BusType::Bluetooth => "BLUETOOTH",
            BusType::Virtual => "VIRTUAL",
            BusType::Isa => "ISA",
            BusType::I8042 => "I8042",
            BusType::XtKbd => "XTKBD",
            BusType::Rs232 => "RS232",
            BusType::Gameport => "GAMEPORT",
            BusType::Parport => "PARPORT",
            BusType::Amiga => "AMIGA",
            BusType::Adb => "ADB",
            BusType::I2c => "I2C",
            BusType::Host => "HOST",
            BusType::Gsc => "GSC",
            BusType::Atari => "ATARI",
            BusType::Spi => "SPI",
            BusType::Rmi => "RMI",
            BusType::Cec => "CEC",
            BusType::IntelIshtp => "INTEL_ISHTP",
        };
        f.write_str(name)
    }
}

/// Value carried by an `EV_KEY` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyValue {
    /// Key released (0).
    Up,
    /// Key pressed (1).
    Down,
    /// Autorepeat while held (2).
    Repeat,
}

impl KeyValue {
    /// Look up a raw key value. Anything outside 0..=2 yields `None`.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(KeyValue::Up),
            1 => Some(KeyValue::Down),
            2 => Some(KeyValue::Repeat),
            _ => None,
        }
    }
}

/// Fixed-width input record as delivered by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInputEvent {
    /// Seconds part of the timestamp.
    pub sec: u64,
    /// Microseconds part of the timestamp.
    pub usec: u64,
    /// Event type code.
    pub type_: u16,
    /// Event code within the type.
    pub code: u16,
    /// Signed event value.
    pub value: i32,
}

/// Largest seconds value a kernel `time_t` can carry.
const MAX_TIME_T: u64 = i64::MAX as u64;

impl RawInputEvent {
    /// Build a record from its fields.
    pub fn new(sec: u64, usec: u64, type_: u16, code: u16, value: i32) -> Self {
        Self {
            sec,
            usec,
            type_,
            code,
            value,
        }
    }

    /// Build a record from a wall-clock timestamp, truncated to microseconds.
    pub fn at(time: SystemTime, type_: u16, code: u16, value: i32) -> Self {
        let since = time.duration_since(UNIX_EPOCH).unwrap_or_default();
        Self::new(
            since.as_secs(),
            u64::from(since.subsec_micros()),
            type_,
            code,
            value,
        )
    }

    /// Timestamp at microsecond precision.
    ///
    /// Seconds beyond the kernel's signed `time_t` range are clamped to it.
    pub fn time(&self) -> SystemTime {
        let secs = Duration::from_secs(self.sec.min(MAX_TIME_T));
        UNIX_EPOCH
            .checked_add(secs.saturating_add(Duration::from_micros(self.usec)))
            .or_else(|| UNIX_EPOCH.checked_add(secs))
            .unwrap_or(UNIX_EPOCH)
    }

    /// Classify the record.
    pub fn decode(self) -> DecodedEvent {
        DecodedEvent {
            time: self.time(),
            kind: EventType::from_raw(self.type_),
            raw: self,
        }
    }
}

/// A raw record classified by its symbolic type.
///
/// Names for the type, code and value are looked up on demand and each may
/// be absent independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    /// Timestamp of the record.
    pub time: SystemTime,
    /// Symbolic type, if the raw type is known.
    pub kind: Option<EventType>,
    raw: RawInputEvent,
}

impl DecodedEvent {
    /// The underlying wire record.
    pub fn raw(&self) -> &RawInputEvent {
        &self.raw
    }

    pub fn type_code(&self) -> u16 {
        self.raw.type_
    }

    pub fn code(&self) -> u16 {
        self.raw.code
    }

    pub fn value(&self) -> i32 {
        self.raw.value
    }

    /// Check whether this is a key/button event.
    pub fn is_key(&self) -> bool {
        self.kind == Some(EventType::Key)
    }

    /// Key value, for key events with a recognized value.
    pub fn key_value(&self) -> Option<KeyValue> {
        if self.is_key() {
            KeyValue::from_raw(self.raw.value)
        } else {
            None
        }
    }

    pub fn type_name(&self) -> Option<&'static str> {
        names::type_name(self.raw.type_)
    }

    pub fn code_name(&self) -> Option<&'static str> {
        names::code_name(self.raw.type_, self.raw.code)
    }

    pub fn value_name(&self) -> Option<&'static str> {
        names::value_name(self.raw.type_, self.raw.code, self.raw.value)
    }
}

impl fmt::Display for DecodedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}: ", self.raw.sec, self.raw.usec)?;
        match self.type_name() {
            Some(name) => f.write_str(name)?,
            None => write!(f, "{}", self.raw.type_)?,
        }
        match self.code_name() {
            Some(name) => write!(f, "/{name}")?,
            None => write!(f, "/{}", self.raw.code)?,
        }
        match self.value_name() {
            Some(name) => write!(f, "/{name}"),
            None => write!(f, "/{}", self.raw.value),
        }
    }
}
