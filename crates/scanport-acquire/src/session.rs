// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Driver session actor.
//
// The protocol binding is created on, and only ever entered from, one
// dedicated thread. That thread alternates between pumping the binding's
// event loop and running tasks posted through `call`/`call_async`, so the
// binding is never entered concurrently and notifications keep flowing while
// the thread is idle.

use std::sync::{Arc, Mutex, OnceLock};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

use scanport_core::config::SessionSettings;
use scanport_core::error::{Result, ScanportError};
use scanport_core::types::SessionState;
use scanport_driver::DeviceProtocol;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

/// Builds the binding on the session thread.
pub type DriverFactory = Box<dyn FnOnce() -> Box<dyn DeviceProtocol> + Send>;

type Task = Box<dyn FnOnce(&mut dyn DeviceProtocol) + Send>;

enum Command {
    Run(Task),
    Shutdown,
}

struct Inner {
    state: SessionState,
    factory: Option<DriverFactory>,
    tasks: Option<mpsc::Sender<Command>>,
    thread: Option<JoinHandle<()>>,
    closed: bool,
}

/// One protocol session and the thread that owns it.
///
/// Constructed once at startup and shared by reference (usually in an `Arc`).
pub struct DriverSession {
    settings: SessionSettings,
    inner: Mutex<Inner>,
    /// Why initialisation failed. Shared with the session thread, which
    /// records it before dropping queued tasks.
    failure: Arc<OnceLock<String>>,
}

impl DriverSession {
    pub fn new<F>(factory: F, settings: SessionSettings) -> Self
    where
        F: FnOnce() -> Box<dyn DeviceProtocol> + Send + 'static,
    {
        Self {
            settings,
            inner: Mutex::new(Inner {
                state: SessionState::Uninitialized,
                factory: Some(Box::new(factory)),
                tasks: None,
                thread: None,
                closed: false,
            }),
            failure: Arc::new(OnceLock::new()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| ScanportError::Initialization("session state lock poisoned".into()))
    }

    pub fn state(&self) -> SessionState {
        self.lock()
            .map(|inner| inner.state)
            .unwrap_or(SessionState::Failed)
    }

    /// Start the session thread and open the protocol session.
    ///
    /// Idempotent: once Ready, or while another caller is initialising, this
    /// returns `Ok` without side effects. Tasks posted during initialisation
    /// queue until the session opens. Failure is terminal.
    #[instrument(skip(self))]
    pub fn initialize(&self) -> Result<()> {
        let ready_rx = {
            let mut inner = self.lock()?;
            if inner.closed {
                return Err(ScanportError::SessionClosed);
            }
            match inner.state {
                SessionState::Ready | SessionState::Initializing => return Ok(()),
                SessionState::Failed => return Err(self.failure_error()),
                SessionState::Uninitialized => {}
            }
            let Some(factory) = inner.factory.take() else {
                return Err(ScanportError::Initialization("driver factory already used".into()));
            };

            let (tasks_tx, tasks_rx) = mpsc::channel();
            let (ready_tx, ready_rx) = mpsc::sync_channel(1);
            let pump_interval = self.settings.pump_interval();
            let failure = Arc::clone(&self.failure);

            let spawned = std::thread::Builder::new()
                .name("scanport-session".into())
                .spawn(move || run_session(factory, ready_tx, tasks_rx, failure, pump_interval));

            match spawned {
                Ok(handle) => {
                    inner.thread = Some(handle);
                    inner.tasks = Some(tasks_tx);
                    inner.state = SessionState::Initializing;
                    ready_rx
                }
                Err(err) => {
                    let reason = format!("failed to spawn session thread: {err}");
                    inner.state = SessionState::Failed;
                    let _ = self.failure.set(reason);
                    return Err(self.failure_error());
                }
            }
        };

        let outcome = match ready_rx.recv_timeout(self.settings.init_timeout()) {
            Ok(Ok(binding)) => Ok(binding),
            Ok(Err(reason)) => Err(reason),
            Err(RecvTimeoutError::Timeout) => Err(format!(
                "session did not become ready within {}ms",
                self.settings.init_timeout_ms
            )),
            Err(RecvTimeoutError::Disconnected) => {
                Err("session thread exited before signalling readiness".into())
            }
        };

        let mut inner = self.lock()?;
        match outcome {
            Ok(binding) => {
                inner.state = SessionState::Ready;
                info!(binding = %binding, "Driver session ready");
                Ok(())
            }
            Err(reason) => {
                error!(reason = %reason, "Driver session failed to initialise");
                inner.state = SessionState::Failed;
                // The thread may already have recorded the same reason.
                let _ = self.failure.set(reason);
                // A late-starting thread exits on its own once the queue closes.
                if let Some(tasks) = inner.tasks.take() {
                    let _ = tasks.send(Command::Shutdown);
                }
                inner.thread = None;
                Err(self.failure_error())
            }
        }
    }

    fn failure_error(&self) -> ScanportError {
        ScanportError::Initialization(
            self.failure
                .get()
                .cloned()
                .unwrap_or_else(|| "session failed".into()),
        )
    }

    /// Error for a task whose queue or reply channel went away: the recorded
    /// initialisation failure if there is one, otherwise a closed session.
    fn disconnected(&self) -> ScanportError {
        if self.failure.get().is_some() {
            self.failure_error()
        } else {
            ScanportError::SessionClosed
        }
    }

    fn sender(&self) -> Result<mpsc::Sender<Command>> {
        let inner = self.lock()?;
        if inner.closed {
            return Err(ScanportError::SessionClosed);
        }
        match inner.state {
            SessionState::Uninitialized => Err(ScanportError::Initialization(
                "session has not been initialised".into(),
            )),
            SessionState::Failed => Err(self.failure_error()),
            SessionState::Initializing | SessionState::Ready => {
                inner.tasks.clone().ok_or(ScanportError::SessionClosed)
            }
        }
    }

    /// Run `task` on the session thread and block until it returns.
    pub fn call<R, F>(&self, task: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn DeviceProtocol) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.sender()?
            .send(Command::Run(Box::new(move |driver| {
                let _ = reply_tx.send(task(driver));
            })))
            .map_err(|_| self.disconnected())?;
        reply_rx.recv().map_err(|_| self.disconnected())
    }

    /// Run `task` on the session thread without blocking the async caller.
    pub async fn call_async<R, F>(&self, task: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn DeviceProtocol) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender()?
            .send(Command::Run(Box::new(move |driver| {
                let _ = reply_tx.send(task(driver));
            })))
            .map_err(|_| self.disconnected())?;
        reply_rx.await.map_err(|_| self.disconnected())
    }

    /// Stop the thread, close the protocol session, and join.
    pub fn shutdown(&self) {
        let (tasks, thread) = match self.lock() {
            Ok(mut inner) => {
                if inner.closed {
                    return;
                }
                inner.closed = true;
                (inner.tasks.take(), inner.thread.take())
            }
            Err(_) => return,
        };
        if let Some(tasks) = tasks {
            let _ = tasks.send(Command::Shutdown);
        }
        if let Some(thread) = thread {
            if thread.join().is_err() {
                warn!("Session thread panicked during shutdown");
            }
        }
        info!("Driver session shut down");
    }
}

impl Drop for DriverSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Body of the session thread.
fn run_session(
    factory: DriverFactory,
    ready: mpsc::SyncSender<std::result::Result<String, String>>,
    tasks: mpsc::Receiver<Command>,
    failure: Arc<OnceLock<String>>,
    pump_interval: Duration,
) {
    let mut driver = factory();
    let binding = driver.binding_name().to_string();
    if let Err(err) = driver.open_session() {
        let reason = format!("{binding}: {err}");
        // Recorded before `tasks` is dropped, so callers whose queued tasks
        // are discarded see this reason instead of a closed session.
        let _ = failure.set(reason.clone());
        let _ = ready.send(Err(reason));
        return;
    }
    if ready.send(Ok(binding.clone())).is_err() {
        // The initialiser gave up waiting.
        let _ = driver.close_session();
        return;
    }
    drop(ready);

    loop {
        driver.pump();
        match tasks.recv_timeout(pump_interval) {
            Ok(Command::Run(task)) => task(driver.as_mut()),
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    if let Err(err) = driver.close_session() {
        warn!(binding = %binding, error = %err, "Closing driver session failed");
    }
    debug!(binding = %binding, "Session thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use scanport_driver::{SimulatedDriver, SourceScript, StubDriver};

    fn fast_settings() -> SessionSettings {
        SessionSettings {
            init_timeout_ms: 1_000,
            pump_interval_ms: 5,
        }
    }

    fn counted_session(factories: Arc<AtomicUsize>, driver: SimulatedDriver) -> DriverSession {
        DriverSession::new(
            move || {
                factories.fetch_add(1, Ordering::SeqCst);
                Box::new(driver) as Box<dyn DeviceProtocol>
            },
            fast_settings(),
        )
    }

    #[test]
    fn initialize_is_idempotent() {
        let factories = Arc::new(AtomicUsize::new(0));
        let driver = SimulatedDriver::new();
        let log = driver.log();
        let session = counted_session(Arc::clone(&factories), driver);

        session.initialize().unwrap();
        session.initialize().unwrap();

        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(factories.load(Ordering::SeqCst), 1);
        assert_eq!(log.lock().unwrap().sessions_opened, 1);
    }

    #[test]
    fn concurrent_initialize_starts_one_thread() {
        let factories = Arc::new(AtomicUsize::new(0));
        let driver = SimulatedDriver::new();
        let log = driver.log();
        let session = Arc::new(counted_session(Arc::clone(&factories), driver));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let session = Arc::clone(&session);
                std::thread::spawn(move || session.initialize())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        // Let any caller that returned early during initialisation settle.
        session.call(|_| ()).unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(factories.load(Ordering::SeqCst), 1);
        assert_eq!(log.lock().unwrap().sessions_opened, 1);
    }

    #[test]
    fn open_failure_is_terminal() {
        let session = DriverSession::new(
            || Box::new(StubDriver::default()) as Box<dyn DeviceProtocol>,
            fast_settings(),
        );
        let err = session.initialize().unwrap_err();
        assert!(matches!(err, ScanportError::Initialization(_)));
        assert_eq!(session.state(), SessionState::Failed);

        assert!(matches!(
            session.initialize(),
            Err(ScanportError::Initialization(_))
        ));
        assert!(matches!(
            session.call(|driver| driver.binding_name().to_string()),
            Err(ScanportError::Initialization(_))
        ));
    }

    #[test]
    fn caller_queued_during_failed_start_sees_the_failure() {
        let session = Arc::new(DriverSession::new(
            || {
                std::thread::sleep(Duration::from_millis(100));
                Box::new(SimulatedDriver::new().failing_session()) as Box<dyn DeviceProtocol>
            },
            fast_settings(),
        ));

        let first = {
            let session = Arc::clone(&session);
            std::thread::spawn(move || session.initialize())
        };
        while session.state() == SessionState::Uninitialized {
            std::thread::sleep(Duration::from_millis(1));
        }

        // Returns while the first caller is still initialising.
        session.initialize().unwrap();
        let err = session
            .call(|driver| driver.binding_name().to_string())
            .unwrap_err();
        assert!(matches!(err, ScanportError::Initialization(_)), "{err}");

        let first_err = first.join().unwrap().unwrap_err();
        assert_eq!(first_err.to_string(), err.to_string());
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn slow_start_times_out() {
        let session = DriverSession::new(
            || {
                std::thread::sleep(Duration::from_millis(300));
                Box::new(SimulatedDriver::new()) as Box<dyn DeviceProtocol>
            },
            SessionSettings {
                init_timeout_ms: 50,
                pump_interval_ms: 5,
            },
        );
        let err = session.initialize().unwrap_err();
        assert!(err.to_string().contains("within 50ms"), "{err}");
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn call_before_initialize_is_rejected() {
        let session = DriverSession::new(
            || Box::new(SimulatedDriver::new()) as Box<dyn DeviceProtocol>,
            fast_settings(),
        );
        assert!(matches!(
            session.call(|_| ()),
            Err(ScanportError::Initialization(_))
        ));
    }

    #[test]
    fn calls_run_on_the_session_thread() {
        let session = DriverSession::new(
            || {
                Box::new(SimulatedDriver::new().with_source(SourceScript::new("flatbed")))
                    as Box<dyn DeviceProtocol>
            },
            fast_settings(),
        );
        session.initialize().unwrap();

        let thread_name = session
            .call(|_| std::thread::current().name().map(str::to_string))
            .unwrap();
        assert_eq!(thread_name.as_deref(), Some("scanport-session"));

        let sources = session.call(|driver| driver.sources()).unwrap().unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].id, "flatbed");
    }

    #[tokio::test]
    async fn call_async_returns_the_task_result() {
        let session = DriverSession::new(
            || Box::new(SimulatedDriver::new()) as Box<dyn DeviceProtocol>,
            fast_settings(),
        );
        session.initialize().unwrap();
        let name = session
            .call_async(|driver| driver.binding_name().to_string())
            .await
            .unwrap();
        assert_eq!(name, "Simulated");
    }

    #[test]
    fn idle_session_keeps_pumping() {
        let driver = SimulatedDriver::new();
        let log = driver.log();
        let session = DriverSession::new(move || Box::new(driver) as Box<dyn DeviceProtocol>, fast_settings());
        session.initialize().unwrap();
        std::thread::sleep(Duration::from_millis(60));
        assert!(log.lock().unwrap().pumps >= 3);
    }

    #[test]
    fn shutdown_closes_the_protocol_session() {
        let driver = SimulatedDriver::new();
        let log = driver.log();
        let session = DriverSession::new(move || Box::new(driver) as Box<dyn DeviceProtocol>, fast_settings());
        session.initialize().unwrap();
        session.shutdown();

        assert_eq!(log.lock().unwrap().sessions_closed, 1);
        assert!(matches!(session.call(|_| ()), Err(ScanportError::SessionClosed)));
    }
}
