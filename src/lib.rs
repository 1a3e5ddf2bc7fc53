//! # evsession
//!
//! Typed sessions over Linux evdev input devices.
//!
//! ## Features
//!
//! - Open a `/dev/input/event*` node and query its identity and capabilities
//! - Enumerate the keys a device supports, with kernel symbolic names
//! - Decode raw kernel records into typed, timestamped events
//! - A readiness-driven pump with cooperative, bounded-latency cancellation
//! - Per-key contact tracking published as channel updates
//! - Exclusive delivery (grab) of a device's events
//!
//! ## Quick Start
//!
//! ### Handling key channels
//!
//! ```no_run
//! use evsession::{ChannelUpdate, HandlerConfig, InputHandler};
//!
//! let handler = InputHandler::start(
//!     HandlerConfig::new("/dev/input/event3"),
//!     |update: ChannelUpdate| println!("{:?}", update),
//! )
//! .expect("Failed to start session");
//!
//! std::thread::sleep(std::time::Duration::from_secs(30));
//! handler.shutdown();
//! ```
//!
//! ### Driving the pieces yourself
//!
//! ```no_run
//! use evsession::{CancelToken, DeviceSession, Pump};
//!
//! let session = DeviceSession::open("/dev/input/event3").expect("Failed to open device");
//! for key in session.keys().expect("Failed to enumerate keys") {
//!     println!("{} {:?}", key.code, key.name);
//! }
//!
//! let cancel = CancelToken::new();
//! Pump::new(&session)
//!     .run(&cancel, |event| println!("{}", event))
//!     .expect("Pump failed");
//! ```
//!
//! ## Architecture
//!
//! A [`DeviceSession`] owns the native handle behind the
//! [`backend::InputDevice`] contract. One [`Pump`] per session waits for
//! readiness, drains every available record through the [`decoder`] and
//! hands it to a [`KeyStateDispatcher`], which publishes [`ChannelUpdate`]s
//! to a [`ChannelSink`]. [`InputHandler`] wires these together on a
//! dedicated thread.

pub mod backend;
pub mod capability;
pub mod channel;
pub mod config;
pub mod decoder;
pub mod dispatch;
pub mod error;
pub mod event;
mod grab;
pub mod handler;
pub mod names;
pub mod pump;
pub mod session;

// Re-exports
pub use backend::GrabMode;
pub use capability::{CapabilityKey, KEY_SCAN_LIMIT, enumerate_keys};
pub use channel::{ChannelId, ChannelSink, ChannelUpdate, ContactState, TriggerEvent};
pub use config::HandlerConfig;
pub use decoder::{Decoded, next_event};
pub use dispatch::{Anomaly, AnomalyReporter, KeyState, KeyStateDispatcher, LogReporter};
pub use error::{Error, Result};
pub use event::{BusType, DecodedEvent, EventType, KeyValue, RawInputEvent};
pub use handler::{InputHandler, Shutdown};
pub use pump::{CancelToken, Pump, PumpState, PumpStats};
pub use session::{BusIdentity, DeviceSession};
