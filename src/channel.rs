//! Channel-level updates delivered to the owning application.
//!
//! The dispatcher turns key events into an ordered stream of
//! [`ChannelUpdate`]s and hands each one to a [`ChannelSink`]. Closures are
//! sinks, and [`channel`], [`sync_channel`] and (with the `tokio` feature)
//! `async_channel` build sinks that forward into a receiver.
//!
//! # Example
//!
//! ```no_run
//! use evsession::channel::channel;
//! use evsession::{HandlerConfig, InputHandler};
//!
//! let (sink, rx) = channel();
//! let handler = InputHandler::start(HandlerConfig::new("/dev/input/event3"), sink)
//!     .expect("Failed to start session");
//!
//! for update in rx.iter() {
//!     println!("{:?}", update);
//! }
//! # drop(handler);
//! ```

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Group prefix of per-key channels.
pub const KEYPRESSES_GROUP: &str = "keypresses";

/// Opaque identity of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelId(String);

impl ChannelId {
    /// Channel of a single key: `keypresses#KEY_A`, or the raw code when
    /// the key has no name.
    pub fn key(code: u16, name: Option<&str>) -> Self {
        match name {
            Some(name) => Self(format!("{KEYPRESSES_GROUP}#{name}")),
            None => Self(format!("{KEYPRESSES_GROUP}#{code}")),
        }
    }

    /// Channel carrying the momentary last-key signal.
    pub fn last_key() -> Self {
        Self("key".to_string())
    }

    /// Switch channel mirroring the grab state.
    pub fn grab() -> Self {
        Self("grab".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Contact state of a key channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ContactState {
    /// Released.
    Open,
    /// Pressed.
    Closed,
}

/// Trigger fired on a key channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TriggerEvent {
    Pressed,
    Released,
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerEvent::Pressed => f.write_str("PRESSED"),
            TriggerEvent::Released => f.write_str("RELEASED"),
        }
    }
}

/// One update for the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ChannelUpdate {
    /// The last-key channel now carries this key.
    LastKey {
        channel: ChannelId,
        code: u16,
        name: Option<String>,
    },
    /// The last-key channel was cleared again.
    LastKeyCleared { channel: ChannelId },
    /// A key channel changed contact state.
    State {
        channel: ChannelId,
        state: ContactState,
    },
    /// A key channel fired a trigger.
    Trigger {
        channel: ChannelId,
        event: TriggerEvent,
    },
    /// The grab switch changed.
    Grab { channel: ChannelId, grabbed: bool },
}

impl ChannelUpdate {
    /// Channel the update is addressed to.
    pub fn channel(&self) -> &ChannelId {
        match self {
            ChannelUpdate::LastKey { channel, .. }
            | ChannelUpdate::LastKeyCleared { channel }
            | ChannelUpdate::State { channel, .. }
            | ChannelUpdate::Trigger { channel, .. }
            | ChannelUpdate::Grab { channel, .. } => channel,
        }
    }
}

/// Receives channel updates, in order, on the pump thread.
pub trait ChannelSink: Send {
    fn publish(&mut self, update: ChannelUpdate);
}

/// Implement ChannelSink for closures.
impl<F> ChannelSink for F
where
    F: FnMut(ChannelUpdate) + Send,
{
    fn publish(&mut self, update: ChannelUpdate) {
        self(update);
    }
}

/// Sink that forwards into an unbounded channel.
pub struct SenderSink {
    sender: Sender<ChannelUpdate>,
}

impl ChannelSink for SenderSink {
    fn publish(&mut self, update: ChannelUpdate) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.sender.send(update);
    }
}

/// Sink that forwards into a bounded channel, dropping updates when full.
pub struct SyncSenderSink {
    sender: SyncSender<ChannelUpdate>,
}

impl ChannelSink for SyncSenderSink {
    fn publish(&mut self, update: ChannelUpdate) {
        // Never block the pump on a slow consumer.
        if let Err(mpsc::TrySendError::Full(update)) = self.sender.try_send(update) {
            log::warn!("Channel full, dropping update for {}", update.channel());
        }
    }
}

/// Sink shared between the pump thread and its owner.
pub struct SharedSink<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> SharedSink<S> {
    pub fn new(sink: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sink)),
        }
    }
}

impl<S> Clone for SharedSink<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ChannelSink> ChannelSink for SharedSink<S> {
    fn publish(&mut self, update: ChannelUpdate) {
        match self.inner.lock() {
            Ok(mut sink) => sink.publish(update),
            Err(_) => log::error!("Sink mutex poisoned, dropping update"),
        }
    }
}

/// Create an unbounded sink/receiver pair.
pub fn channel() -> (SenderSink, Receiver<ChannelUpdate>) {
    let (sender, receiver) = mpsc::channel();
    (SenderSink { sender }, receiver)
}

/// Create a bounded sink/receiver pair.
///
/// When `capacity` updates are queued, further updates are dropped rather
/// than stalling the pump.
pub fn sync_channel(capacity: usize) -> (SyncSenderSink, Receiver<ChannelUpdate>) {
    let (sender, receiver) = mpsc::sync_channel(capacity);
    (SyncSenderSink { sender }, receiver)
}

#[cfg(feature = "tokio")]
pub use tokio_channel::*;

#[cfg(feature = "tokio")]
mod tokio_channel {
    use super::*;
    use tokio::sync::mpsc as tokio_mpsc;

    /// Sink that forwards into a tokio channel.
    pub struct TokioSink {
        sender: tokio_mpsc::Sender<ChannelUpdate>,
    }

    impl ChannelSink for TokioSink {
        fn publish(&mut self, update: ChannelUpdate) {
            // Use try_send to avoid blocking the pump thread
            if let Err(tokio_mpsc::error::TrySendError::Full(update)) =
                self.sender.try_send(update)
            {
                log::warn!("Channel full, dropping update for {}", update.channel());
            }
        }
    }

    /// Create a bounded sink feeding a tokio receiver.
    ///
    /// ```ignore
    /// use evsession::channel::async_channel;
    /// use evsession::{HandlerConfig, InputHandler};
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let (sink, mut rx) = async_channel(100);
    ///     let _handler = InputHandler::start(HandlerConfig::new("/dev/input/event3"), sink)
    ///         .expect("Failed to start session");
    ///
    ///     while let Some(update) = rx.recv().await {
    ///         println!("{:?}", update);
    ///     }
    /// }
    /// ```
    pub fn async_channel(capacity: usize) -> (TokioSink, tokio_mpsc::Receiver<ChannelUpdate>) {
        let (sender, receiver) = tokio_mpsc::channel(capacity);
        (TokioSink { sender }, receiver)
    }
}
