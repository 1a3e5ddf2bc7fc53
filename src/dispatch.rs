//! Per-key contact tracking.
//!
//! [`KeyStateDispatcher`] owns one [`KeyState`] per registered key code and
//! translates decoded key events into [`ChannelUpdate`]s:
//!
//! | value      | key state | updates                                                   |
//! |------------|-----------|-----------------------------------------------------------|
//! | DOWN (1)   | closed    | last-key set, last-key cleared, `Closed`, `Pressed`        |
//! | UP (0)     | open      | `Open`, `Released`                                        |
//! | REPEAT (2) | unchanged | none                                                      |
//! | other      | unchanged | none, reported as [`Anomaly::AnomalousValue`]             |
//!
//! A dispatcher belongs to a single pump thread and is not shared.

use crate::capability::CapabilityKey;
use crate::channel::{ChannelId, ChannelSink, ChannelUpdate, ContactState, TriggerEvent};
use crate::event::{DecodedEvent, KeyValue};
use std::collections::BTreeMap;
use std::time::SystemTime;
use thiserror::Error;

/// Soft problems seen while dispatching. They never stop processing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Anomaly {
    /// A key event arrived for a code that has no registered channel.
    #[error("no channel registered for key code {code}")]
    UnknownCapability { code: u16 },

    /// A key event carried a value other than up, down or repeat.
    #[error("unexpected value {value} for key code {code}")]
    AnomalousValue { code: u16, value: i32 },
}

/// Receives soft anomalies.
pub trait AnomalyReporter: Send {
    fn report(&mut self, anomaly: Anomaly);
}

/// Implement AnomalyReporter for closures.
impl<F> AnomalyReporter for F
where
    F: FnMut(Anomaly) + Send,
{
    fn report(&mut self, anomaly: Anomaly) {
        self(anomaly);
    }
}

/// Reporter that writes anomalies to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl AnomalyReporter for LogReporter {
    fn report(&mut self, anomaly: Anomaly) {
        log::warn!("{}", anomaly);
    }
}

/// Tracked state of one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyState {
    pub channel: ChannelId,
    pub name: Option<String>,
    pub contact: ContactState,
    /// Time of the last DOWN or UP, `None` until the first one.
    pub updated: Option<SystemTime>,
}

/// Translates key events into channel updates.
pub struct KeyStateDispatcher<S, R = LogReporter> {
    keys: BTreeMap<u16, KeyState>,
    last_key: ChannelId,
    sink: S,
    reporter: R,
}

impl<S: ChannelSink> KeyStateDispatcher<S, LogReporter> {
    /// Create a dispatcher that logs anomalies.
    pub fn new(sink: S) -> Self {
        Self::with_reporter(sink, LogReporter)
    }
}

impl<S: ChannelSink, R: AnomalyReporter> KeyStateDispatcher<S, R> {
    pub fn with_reporter(sink: S, reporter: R) -> Self {
        Self {
            keys: BTreeMap::new(),
            last_key: ChannelId::last_key(),
            sink,
            reporter,
        }
    }

    /// Register a key before the pump starts. The key starts open.
    pub fn register(&mut self, code: u16, name: Option<&str>) -> &ChannelId {
        let state = self.keys.entry(code).or_insert_with(|| KeyState {
            channel: ChannelId::key(code, name),
            name: name.map(str::to_owned),
            contact: ContactState::Open,
            updated: None,
        });
        &state.channel
    }

    /// Register every enumerated key, keeping enumeration order.
    pub fn register_all(&mut self, keys: &[CapabilityKey]) {
        for key in keys {
            self.register(key.code, key.name.as_deref());
        }
    }

    /// Publish the current state of every key channel.
    pub fn publish_states(&mut self) {
        for state in self.keys.values() {
            self.sink.publish(ChannelUpdate::State {
                channel: state.channel.clone(),
                state: state.contact,
            });
        }
    }

    pub fn key_state(&self, code: u16) -> Option<&KeyState> {
        self.keys.get(&code)
    }

    pub fn contact(&self, code: u16) -> Option<ContactState> {
        self.keys.get(&code).map(|k| k.contact)
    }

    /// Registered channels in ascending code order.
    pub fn channels(&self) -> impl Iterator<Item = (u16, &ChannelId)> {
        self.keys.iter().map(|(code, k)| (*code, &k.channel))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Handle one decoded event. Non-key events are ignored.
    pub fn dispatch(&mut self, event: &DecodedEvent) {
        if !event.is_key() {
            return;
        }
        let code = event.code();
        let Some(key) = self.keys.get_mut(&code) else {
            self.reporter.report(Anomaly::UnknownCapability { code });
            return;
        };
        log::debug!("Got {}", event);

        match KeyValue::from_raw(event.value()) {
            Some(KeyValue::Down) => {
                key.contact = ContactState::Closed;
                key.updated = Some(event.time);
                let channel = key.channel.clone();

                self.sink.publish(ChannelUpdate::LastKey {
                    channel: self.last_key.clone(),
                    code,
                    name: key.name.clone(),
                });
                self.sink.publish(ChannelUpdate::LastKeyCleared {
                    channel: self.last_key.clone(),
                });
                self.sink.publish(ChannelUpdate::State {
                    channel: channel.clone(),
                    state: ContactState::Closed,
                });
                self.sink.publish(ChannelUpdate::Trigger {
                    channel,
                    event: TriggerEvent::Pressed,
                });
            }
            Some(KeyValue::Up) => {
                key.contact = ContactState::Open;
                key.updated = Some(event.time);
                let channel = key.channel.clone();

                self.sink.publish(ChannelUpdate::State {
                    channel: channel.clone(),
                    state: ContactState::Open,
                });
                self.sink.publish(ChannelUpdate::Trigger {
                    channel,
                    event: TriggerEvent::Released,
                });
            }
            Some(KeyValue::Repeat) => {}
            None => self.reporter.report(Anomaly::AnomalousValue {
                code,
                value: event.value(),
            }),
        }
    }

    /// Give back the sink and reporter.
    pub fn into_parts(self) -> (S, R) {
        (self.sink, self.reporter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RawInputEvent;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<ChannelUpdate>>>;
    type Anomalies = Arc<Mutex<Vec<Anomaly>>>;

    fn dispatcher(
        codes: &[u16],
    ) -> (
        KeyStateDispatcher<impl ChannelSink, impl AnomalyReporter>,
        Log,
        Anomalies,
    ) {
        let log: Log = Arc::default();
        let anomalies: Anomalies = Arc::default();
        let sink_log = log.clone();
        let report_log = anomalies.clone();
        let mut d = KeyStateDispatcher::with_reporter(
            move |u| sink_log.lock().unwrap().push(u),
            move |a| report_log.lock().unwrap().push(a),
        );
        for &code in codes {
            d.register(code, crate::names::key_name(code));
        }
        (d, log, anomalies)
    }

    fn key(code: u16, value: i32, usec: u64) -> DecodedEvent {
        RawInputEvent::new(50, usec, 1, code, value).decode()
    }

    #[test]
    fn test_press_then_release_order() {
        let (mut d, log, _) = dispatcher(&[30]);
        d.dispatch(&key(30, 1, 1));
        d.dispatch(&key(30, 0, 2));

        let a = ChannelId::key(30, Some("KEY_A"));
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                ChannelUpdate::LastKey {
                    channel: ChannelId::last_key(),
                    code: 30,
                    name: Some("KEY_A".into()),
                },
                ChannelUpdate::LastKeyCleared {
                    channel: ChannelId::last_key(),
                },
                ChannelUpdate::State {
                    channel: a.clone(),
                    state: ContactState::Closed,
                },
                ChannelUpdate::Trigger {
                    channel: a.clone(),
                    event: TriggerEvent::Pressed,
                },
                ChannelUpdate::State {
                    channel: a.clone(),
                    state: ContactState::Open,
                },
                ChannelUpdate::Trigger {
                    channel: a,
                    event: TriggerEvent::Released,
                },
            ]
        );
    }

    #[test]
    fn test_state_tracks_last_non_repeat_value() {
        let (mut d, _, _) = dispatcher(&[30]);
        // Deterministic pseudo-random walk over up/down/repeat.
        let mut seed: u32 = 0x2545_f491;
        let mut expected = ContactState::Open;
        for i in 0..2_000 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let value = (seed % 3) as i32;
            match value {
                0 => expected = ContactState::Open,
                1 => expected = ContactState::Closed,
                _ => {}
            }
            d.dispatch(&key(30, value, i));
            assert_eq!(d.contact(30), Some(expected));
        }
    }

    #[test]
    fn test_repeat_changes_nothing() {
        let (mut d, log, anomalies) = dispatcher(&[30]);
        d.dispatch(&key(30, 1, 1));
        let before = log.lock().unwrap().len();
        let updated = d.key_state(30).unwrap().updated;

        d.dispatch(&key(30, 2, 2));
        d.dispatch(&key(30, 2, 3));

        assert_eq!(log.lock().unwrap().len(), before);
        assert_eq!(d.contact(30), Some(ContactState::Closed));
        assert_eq!(d.key_state(30).unwrap().updated, updated);
        assert!(anomalies.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unregistered_code_is_reported() {
        let (mut d, log, anomalies) = dispatcher(&[30]);
        d.dispatch(&key(31, 1, 1));

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(
            *anomalies.lock().unwrap(),
            vec![Anomaly::UnknownCapability { code: 31 }]
        );
        // Still works afterwards.
        d.dispatch(&key(30, 1, 2));
        assert_eq!(d.contact(30), Some(ContactState::Closed));
    }

    #[test]
    fn test_unexpected_value_is_reported() {
        let (mut d, log, anomalies) = dispatcher(&[30]);
        d.dispatch(&key(30, 1, 1));
        let before = log.lock().unwrap().len();

        d.dispatch(&key(30, 7, 2));
        assert_eq!(log.lock().unwrap().len(), before);
        assert_eq!(d.contact(30), Some(ContactState::Closed));
        assert_eq!(
            *anomalies.lock().unwrap(),
            vec![Anomaly::AnomalousValue { code: 30, value: 7 }]
        );
    }

    #[test]
    fn test_non_key_events_are_ignored() {
        let (mut d, log, anomalies) = dispatcher(&[30]);
        d.dispatch(&RawInputEvent::new(1, 0, 0, 0, 0).decode());
        d.dispatch(&RawInputEvent::new(1, 0, 4, 4, 30).decode());
        assert!(log.lock().unwrap().is_empty());
        assert!(anomalies.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unnamed_key_uses_code_channel() {
        let (mut d, log, _) = dispatcher(&[]);
        assert_eq!(d.register(84, None).as_str(), "keypresses#84");
        d.dispatch(&key(84, 1, 1));
        assert_eq!(
            log.lock().unwrap()[0],
            ChannelUpdate::LastKey {
                channel: ChannelId::last_key(),
                code: 84,
                name: None,
            }
        );
    }

    #[test]
    fn test_update_time_recorded() {
        let (mut d, _, _) = dispatcher(&[30]);
        assert_eq!(d.key_state(30).unwrap().updated, None);
        let ev = key(30, 1, 77);
        d.dispatch(&ev);
        assert_eq!(d.key_state(30).unwrap().updated, Some(ev.time));
    }

    #[test]
    fn test_publish_states_and_channel_order() {
        let (mut d, log, _) = dispatcher(&[30, 2]);
        d.publish_states();
        let channels: Vec<_> = d.channels().map(|(code, _)| code).collect();
        assert_eq!(channels, vec![2, 30]);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                ChannelUpdate::State {
                    channel: ChannelId::key(2, Some("KEY_1")),
                    state: ContactState::Open,
                },
                ChannelUpdate::State {
                    channel: ChannelId::key(30, Some("KEY_A")),
                    state: ContactState::Open,
                },
            ]
        );
    }

    #[test]
    fn test_register_is_idempotent() {
        let (mut d, _, _) = dispatcher(&[30]);
        d.dispatch(&key(30, 1, 1));
        d.register(30, Some("KEY_A"));
        assert_eq!(d.len(), 1);
        assert_eq!(d.contact(30), Some(ContactState::Closed));
    }
}
