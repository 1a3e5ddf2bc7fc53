//! Owner of one device session and its pump thread.

use crate::capability::CapabilityKey;
use crate::channel::{ChannelId, ChannelSink, ChannelUpdate, SharedSink};
use crate::config::HandlerConfig;
use crate::dispatch::{AnomalyReporter, KeyStateDispatcher, LogReporter};
use crate::error::{Error, Result};
use crate::pump::{CancelToken, Pump, PumpStats};
use crate::session::DeviceSession;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};

/// How a handler's pump ended.
#[derive(Debug)]
pub enum Shutdown {
    /// The pump stopped after cancellation.
    Stopped(PumpStats),
    /// The pump had already terminated with an error.
    Failed(Error),
    /// The pump did not stop within the shutdown timeout and was left
    /// running detached.
    Abandoned,
}

/// Runs a [`DeviceSession`] on a background pump and publishes key channels.
///
/// On start every enumerated key gets a channel in the open state, and the
/// grab channel reports whether the device is grabbed. Dropping the handler
/// shuts it down.
///
/// # Example
///
/// ```no_run
/// use evsession::{HandlerConfig, InputHandler};
///
/// let config = HandlerConfig::new("/dev/input/event3").with_grab(true);
/// let handler = InputHandler::start(config, |update| println!("{:?}", update))
///     .expect("Failed to start session");
///
/// std::thread::sleep(std::time::Duration::from_secs(10));
/// println!("{:?}", handler.shutdown());
/// ```
pub struct InputHandler<S: ChannelSink + 'static> {
    config: HandlerConfig,
    session: Arc<DeviceSession>,
    keys: Vec<CapabilityKey>,
    sink: SharedSink<S>,
    cancel: CancelToken,
    worker: Option<JoinHandle<()>>,
    done: Receiver<Result<PumpStats>>,
    exit: Option<Result<PumpStats>>,
}

impl<S: ChannelSink + 'static> InputHandler<S> {
    /// Open `config.path` and start pumping. Anomalies are logged.
    pub fn start(config: HandlerConfig, sink: S) -> Result<Self> {
        Self::start_with_reporter(config, sink, LogReporter)
    }

    /// Open `config.path` and start pumping, sending anomalies to `reporter`.
    pub fn start_with_reporter<R>(config: HandlerConfig, sink: S, reporter: R) -> Result<Self>
    where
        R: AnomalyReporter + 'static,
    {
        let session = DeviceSession::open(&config.path)?;
        Self::with_session(session, config, sink, reporter)
    }

    pub(crate) fn with_session<R>(
        session: DeviceSession,
        config: HandlerConfig,
        sink: S,
        reporter: R,
    ) -> Result<Self>
    where
        R: AnomalyReporter + 'static,
    {
        let session = Arc::new(session);
        let keys = session.keys()?.to_vec();
        log::info!(
            "Starting session on {} ({:?}) with {} keys",
            session.path().display(),
            session.name()?,
            keys.len()
        );

        let mut sink = SharedSink::new(sink);
        let mut dispatcher = KeyStateDispatcher::with_reporter(sink.clone(), reporter);
        dispatcher.register_all(&keys);
        dispatcher.publish_states();
        sink.publish(ChannelUpdate::Grab {
            channel: ChannelId::grab(),
            grabbed: false,
        });

        if config.grab {
            session.grab()?;
            sink.publish(ChannelUpdate::Grab {
                channel: ChannelId::grab(),
                grabbed: true,
            });
        }

        let cancel = CancelToken::new();
        let (done_tx, done) = mpsc::channel();
        let worker = {
            let session = Arc::clone(&session);
            let cancel = cancel.clone();
            let timeout = config.readiness_timeout;
            thread::Builder::new()
                .name(format!("evsession-pump {}", session.path().display()))
                .spawn(move || {
                    let result = Pump::new(&session)
                        .with_timeout(timeout)
                        .run(&cancel, |event| dispatcher.dispatch(event));
                    // The owner may have given up waiting.
                    let _ = done_tx.send(result);
                })
                .map_err(|e| Error::ThreadError(e.to_string()))?
        };

        Ok(Self {
            config,
            session,
            keys,
            sink,
            cancel,
            worker: Some(worker),
            done,
            exit: None,
        })
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    /// Keys enumerated at start, ascending by code.
    pub fn keys(&self) -> &[CapabilityKey] {
        &self.keys
    }

    pub fn properties(&self) -> Result<BTreeMap<String, String>> {
        self.session.properties()
    }

    pub fn is_grabbed(&self) -> bool {
        self.session.is_grabbed()
    }

    /// Grab or release the device and publish the new grab state.
    pub fn set_grab(&mut self, grab: bool) -> Result<()> {
        if grab {
            self.session.grab()?;
        } else {
            self.session.ungrab()?;
        }
        self.sink.publish(ChannelUpdate::Grab {
            channel: ChannelId::grab(),
            grabbed: grab,
        });
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Result of the pump, once it has ended on its own.
    pub fn exit_status(&mut self) -> Option<&Result<PumpStats>> {
        if self.exit.is_none() && self.worker.is_some() {
            match self.done.try_recv() {
                Ok(result) => self.exit = Some(result),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    self.exit = Some(Err(Error::ThreadError("pump thread panicked".into())));
                }
            }
        }
        self.exit.as_ref()
    }

    /// Stop the pump, wait for it up to the shutdown timeout and close the
    /// session. The session is closed even when the wait is abandoned.
    pub fn shutdown(mut self) -> Shutdown {
        self.stop().unwrap_or(Shutdown::Abandoned)
    }

    fn stop(&mut self) -> Option<Shutdown> {
        let worker = self.worker.take()?;
        self.cancel.cancel();

        let result = match self.exit.take() {
            Some(result) => Some(result),
            None => match self.done.recv_timeout(self.config.shutdown_timeout) {
                Ok(result) => Some(result),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => {
                    Some(Err(Error::ThreadError("pump thread panicked".into())))
                }
            },
        };

        let outcome = match result {
            Some(result) => {
                if worker.join().is_err() {
                    log::error!("Pump thread for {} panicked", self.session.path().display());
                }
                match result {
                    Ok(stats) => Shutdown::Stopped(stats),
                    Err(e) => Shutdown::Failed(e),
                }
            }
            None => {
                log::error!(
                    "Pump for {} did not stop within {:?}, abandoning it",
                    self.session.path().display(),
                    self.config.shutdown_timeout
                );
                Shutdown::Abandoned
            }
        };

        match self.session.close() {
            Ok(()) | Err(Error::UseAfterClose) => {}
            Err(e) => log::warn!("Closing {} failed: {}", self.session.path().display(), e),
        }
        log::info!("Session on {} shut down", self.session.path().display());
        Some(outcome)
    }
}

impl<S: ChannelSink + 'static> Drop for InputHandler<S> {
    fn drop(&mut self) {
        if let Some(outcome) = self.stop() {
            log::debug!("Handler dropped: {:?}", outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{FakeDevice, Read, Script, Wake};
    use crate::channel::{ContactState, TriggerEvent, channel};
    use crate::dispatch::Anomaly;
    use std::sync::Mutex;
    use std::sync::atomic::Ordering;
    use std::time::{Duration, Instant};

    fn config() -> HandlerConfig {
        HandlerConfig::new("/dev/input/event7")
            .with_readiness_timeout(Duration::from_millis(10))
            .with_shutdown_timeout(Duration::from_secs(2))
    }

    fn keyboard(keys: &[u16]) -> (DeviceSession, Script) {
        let device = FakeDevice::keyboard(keys);
        let script = device.script.clone();
        (
            DeviceSession::from_device("/dev/input/event7", Box::new(device)),
            script,
        )
    }

    fn grab_update(grabbed: bool) -> ChannelUpdate {
        ChannelUpdate::Grab {
            channel: ChannelId::grab(),
            grabbed,
        }
    }

    fn wait_for_exit<S: ChannelSink + 'static>(handler: &mut InputHandler<S>) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while handler.exit_status().is_none() {
            assert!(Instant::now() < deadline, "pump did not exit");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_start_publishes_initial_states() {
        let (session, _script) = keyboard(&[30, 2]);
        let (sink, rx) = channel();
        let handler = InputHandler::with_session(session, config(), sink, LogReporter).unwrap();

        let first: Vec<_> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(1)).unwrap())
            .collect();
        assert_eq!(
            first,
            vec![
                ChannelUpdate::State {
                    channel: ChannelId::key(2, Some("KEY_1")),
                    state: ContactState::Open,
                },
                ChannelUpdate::State {
                    channel: ChannelId::key(30, Some("KEY_A")),
                    state: ContactState::Open,
                },
                grab_update(false),
            ]
        );
        assert_eq!(handler.keys().len(), 2);
        assert!(handler.is_running());
        assert!(matches!(handler.shutdown(), Shutdown::Stopped(_)));
    }

    #[test]
    fn test_key_events_reach_sink() {
        let (session, script) = keyboard(&[30]);
        script.push_event(1, 30, 1);
        script.push_event(0, 0, 0);
        script.push_event(1, 30, 0);
        script.push_wake(Wake::Ready);

        let (sink, rx) = channel();
        let handler = InputHandler::with_session(session, config(), sink, LogReporter).unwrap();

        let mut triggers = Vec::new();
        while triggers.len() < 2 {
            if let ChannelUpdate::Trigger { event, .. } =
                rx.recv_timeout(Duration::from_secs(1)).unwrap()
            {
                triggers.push(event);
            }
        }
        assert_eq!(triggers, vec![TriggerEvent::Pressed, TriggerEvent::Released]);

        match handler.shutdown() {
            Shutdown::Stopped(stats) => assert_eq!(stats.events, 3),
            other => panic!("unexpected shutdown: {:?}", other),
        }
        assert!(script.dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_anomalies_go_to_reporter() {
        let (session, script) = keyboard(&[30]);
        script.push_event(1, 48, 1);
        script.push_wake(Wake::Ready);

        let anomalies = Arc::new(Mutex::new(Vec::new()));
        let reporter = {
            let anomalies = Arc::clone(&anomalies);
            move |a: Anomaly| anomalies.lock().unwrap().push(a)
        };
        let handler =
            InputHandler::with_session(session, config(), |_: ChannelUpdate| {}, reporter)
                .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while anomalies.lock().unwrap().is_empty() {
            assert!(Instant::now() < deadline, "no anomaly reported");
            thread::sleep(Duration::from_millis(5));
        }
        assert!(handler.is_running());
        drop(handler);
        assert_eq!(
            *anomalies.lock().unwrap(),
            vec![Anomaly::UnknownCapability { code: 48 }]
        );
    }

    #[test]
    fn test_grab_on_start_and_toggle() {
        let (session, script) = keyboard(&[30]);
        let (sink, rx) = channel();
        let mut handler =
            InputHandler::with_session(session, config().with_grab(true), sink, LogReporter)
                .unwrap();
        assert!(handler.is_grabbed());

        handler.set_grab(false).unwrap();
        assert!(!handler.is_grabbed());
        handler.shutdown();

        let grabs: Vec<_> = rx
            .iter()
            .filter(|u| matches!(u, ChannelUpdate::Grab { .. }))
            .collect();
        assert_eq!(
            grabs,
            vec![grab_update(false), grab_update(true), grab_update(false)]
        );
        assert_eq!(script.grabs.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_failed_grab_on_start_closes_session() {
        let mut device = FakeDevice::keyboard(&[30]);
        device.grab_error = Some(16);
        let script = device.script.clone();
        let session = DeviceSession::from_device("/dev/input/event7", Box::new(device));

        let err = InputHandler::with_session(
            session,
            config().with_grab(true),
            |_: ChannelUpdate| {},
            LogReporter,
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::Grab { code: 16 }));
        assert!(script.dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_read_error_surfaces_in_exit_status() {
        let (session, script) = keyboard(&[30]);
        script.push_read(Read::Fail(19));
        script.push_wake(Wake::Ready);

        let mut handler =
            InputHandler::with_session(session, config(), |_: ChannelUpdate| {}, LogReporter)
                .unwrap();
        wait_for_exit(&mut handler);
        assert!(matches!(
            handler.exit_status(),
            Some(Err(Error::Read { code: 19 }))
        ));

        assert!(matches!(
            handler.shutdown(),
            Shutdown::Failed(Error::Read { code: 19 })
        ));
        assert!(script.dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_shutdown_abandons_stuck_pump_but_closes() {
        let (session, script) = keyboard(&[30]);
        let config = config()
            .with_readiness_timeout(Duration::from_secs(2))
            .with_shutdown_timeout(Duration::from_millis(50));
        let handler =
            InputHandler::with_session(session, config, |_: ChannelUpdate| {}, LogReporter)
                .unwrap();
        thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        assert!(matches!(handler.shutdown(), Shutdown::Abandoned));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(script.dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_stops_and_closes() {
        let (session, script) = keyboard(&[30]);
        let handler =
            InputHandler::with_session(session, config(), |_: ChannelUpdate| {}, LogReporter)
                .unwrap();
        drop(handler);
        assert!(script.dropped.load(Ordering::SeqCst));
    }

    #[cfg(all(target_os = "linux", feature = "evdev"))]
    #[test]
    fn test_start_missing_device() {
        let err = InputHandler::start(
            HandlerConfig::new("/dev/input/does-not-exist"),
            |_: ChannelUpdate| {},
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::Open { code: 2, .. }));
    }
}
