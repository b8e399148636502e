//! # Function-backed daemon (`DaemonFn`)
//!
//! [`DaemonFn`] wraps a closure `F: Fn(DaemonContext) -> Fut` and runs a fresh future on the
//! current tokio runtime every time it is started. The body talks to the supervisor through
//! its [`DaemonContext`]:
//!
//! - [`DaemonContext::heartbeat`] proves forward progress;
//! - [`DaemonContext::cancelled`] resolves once a stop was requested;
//! - [`DaemonContext::report_fault`] reports a fault without terminating.
//!
//! Returning `Ok(())` reports normal termination, returning `Err` (or panicking) reports
//! exceptional termination.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use daemonvisor::{DaemonContext, DaemonError, DaemonFn, DaemonRef};
//!
//! let ticker: DaemonRef = DaemonFn::arc("ticker", |ctx: DaemonContext| async move {
//!     loop {
//!         tokio::select! {
//!             _ = ctx.cancelled() => return Ok::<_, DaemonError>(()),
//!             _ = tokio::time::sleep(Duration::from_millis(250)) => ctx.heartbeat(),
//!         }
//!     }
//! });
//!
//! assert_eq!(ticker.identification(), "ticker");
//! assert!(!ticker.is_alive());
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::daemons::daemon::{Daemon, ObserverRef};
use crate::daemons::observers::Observers;
use crate::error::{BoxError, DaemonError, DaemonFault};

/// Handle given to a [`DaemonFn`] body for one run.
#[derive(Clone)]
pub struct DaemonContext {
    token: CancellationToken,
    observers: Observers,
    daemon: Weak<dyn Daemon>,
}

impl DaemonContext {
    /// Sends a heartbeat to every observer.
    pub fn heartbeat(&self) {
        if let Some(daemon) = self.daemon.upgrade() {
            self.observers.heartbeat(daemon.as_ref());
        }
    }

    /// Reports a fault while keeping the daemon running.
    ///
    /// The supervisor reacts by requesting a stop.
    pub fn report_fault(&self, cause: impl Into<BoxError>) {
        if let Some(daemon) = self.daemon.upgrade() {
            let fault = DaemonFault::new(daemon.identification(), cause);
            self.observers.exception_occurred(daemon.as_ref(), fault);
        }
    }

    /// Returns true once a stop was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once a stop was requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// The cancellation token of this run.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// One started run: its stop token and a liveness channel (`true` while running).
struct Run {
    token: CancellationToken,
    alive: watch::Receiver<bool>,
}

impl Run {
    fn is_alive(&self) -> bool {
        *self.alive.borrow()
    }
}

/// Flips the liveness channel to `false` when the body finishes or unwinds.
struct AliveGuard(watch::Sender<bool>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

/// Function-backed daemon implementation.
pub struct DaemonFn<F> {
    name: Cow<'static, str>,
    f: F,
    observers: Observers,
    run: Mutex<Option<Run>>,
    me: Weak<DaemonFn<F>>,
}

impl<F, Fut> DaemonFn<F>
where
    F: Fn(DaemonContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DaemonError>> + Send + 'static,
{
    /// Creates the daemon as a shared handle.
    ///
    /// The handle is always an `Arc`: the running body reports with a weak reference to it.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|me| Self {
            name,
            f,
            observers: Observers::new(),
            run: Mutex::new(None),
            me: me.clone(),
        })
    }

    fn slot(&self) -> MutexGuard<'_, Option<Run>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<F, Fut> Daemon for DaemonFn<F>
where
    F: Fn(DaemonContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DaemonError>> + Send + 'static,
{
    fn identification(&self) -> &str {
        &self.name
    }

    fn is_alive(&self) -> bool {
        self.slot().as_ref().is_some_and(Run::is_alive)
    }

    fn start(&self) -> Result<(), DaemonError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| DaemonError::fail(format!("no tokio runtime: {e}")))?;
        let weak: Weak<dyn Daemon> = self.me.clone();

        let mut slot = self.slot();
        if slot.as_ref().is_some_and(Run::is_alive) {
            return Err(DaemonError::fail(format!("{} already started", self.name)));
        }

        let token = CancellationToken::new();
        let (tx, rx) = watch::channel(true);
        let ctx = DaemonContext {
            token: token.clone(),
            observers: self.observers.clone(),
            daemon: weak.clone(),
        };
        let body = (self.f)(ctx);
        let observers = self.observers.clone();

        runtime.spawn(async move {
            let _alive = AliveGuard(tx);
            let outcome = AssertUnwindSafe(body).catch_unwind().await;

            let Some(daemon) = weak.upgrade() else {
                return;
            };
            match outcome {
                Ok(Ok(())) => observers.terminated_normally(daemon.as_ref()),
                Ok(Err(e)) => observers.terminated_exceptionally(daemon.as_ref(), Box::new(e)),
                Err(panic) => {
                    let info = if let Some(msg) = panic.downcast_ref::<&'static str>() {
                        (*msg).to_string()
                    } else if let Some(msg) = panic.downcast_ref::<String>() {
                        msg.clone()
                    } else {
                        "unknown panic".to_string()
                    };
                    observers.terminated_exceptionally(
                        daemon.as_ref(),
                        Box::new(DaemonError::Panicked { info }),
                    );
                }
            }
        });

        *slot = Some(Run { token, alive: rx });
        Ok(())
    }

    fn request_stop(&self) {
        if let Some(run) = self.slot().as_ref() {
            run.token.cancel();
        }
    }

    async fn join(&self, timeout: Duration) -> Result<bool, DaemonError> {
        let alive = self.slot().as_ref().map(|run| run.alive.clone());
        let Some(mut alive) = alive else {
            return Ok(true);
        };
        match tokio::time::timeout(timeout, alive.wait_for(|running| !*running)).await {
            // A closed channel means the body is gone as well.
            Ok(_) => Ok(true),
            Err(_elapsed) => Ok(false),
        }
    }

    fn describe(&self) -> String {
        let state = match self.slot().as_ref() {
            None => "never started",
            Some(run) if run.is_alive() && run.token.is_cancelled() => "stopping",
            Some(run) if run.is_alive() => "running",
            Some(_) => "stopped",
        };
        format!("{state}, {} observer(s)", self.observers.len())
    }

    fn register_observer(&self, observer: ObserverRef) {
        self.observers.register(observer);
    }

    fn unregister_observer(&self, observer: &ObserverRef) {
        self.observers.unregister(observer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemons::daemon::DaemonObserver;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        beats: AtomicUsize,
        normal: AtomicUsize,
        faults: Mutex<Vec<DaemonFault>>,
    }

    impl DaemonObserver for Recorder {
        fn receive_heartbeat(&self, _daemon: &dyn Daemon) {
            self.beats.fetch_add(1, Ordering::SeqCst);
        }
        fn terminated_normally(&self, _daemon: &dyn Daemon) {
            self.normal.fetch_add(1, Ordering::SeqCst);
        }
        fn terminated_exceptionally(&self, daemon: &dyn Daemon, cause: BoxError) {
            let fault = DaemonFault::wrap(daemon.identification(), cause);
            self.faults.lock().unwrap().push(fault);
        }
        fn exception_occurred(&self, _daemon: &dyn Daemon, fault: DaemonFault) {
            self.faults.lock().unwrap().push(fault);
        }
    }

    #[test]
    fn start_outside_runtime_fails() {
        let d = DaemonFn::arc("orphan", |_ctx: DaemonContext| async {
            Ok::<(), DaemonError>(())
        });
        assert!(matches!(d.start(), Err(DaemonError::Fail { .. })));
        assert!(!d.is_alive());
    }

    #[tokio::test]
    async fn heartbeats_then_stops_on_request() {
        let recorder = Arc::new(Recorder::default());
        let d = DaemonFn::arc("beater", |ctx: DaemonContext| async move {
            loop {
                tokio::select! {
                    _ = ctx.cancelled() => return Ok::<(), DaemonError>(()),
                    _ = tokio::time::sleep(Duration::from_millis(5)) => ctx.heartbeat(),
                }
            }
        });
        d.register_observer(recorder.clone());

        d.start().unwrap();
        assert!(d.is_alive());
        assert!(d.start().is_err());
        tokio::time::sleep(Duration::from_millis(40)).await;

        d.request_stop();
        assert!(d.join(Duration::from_secs(1)).await.unwrap());
        assert!(!d.is_alive());
        assert!(recorder.beats.load(Ordering::SeqCst) > 0);
        assert_eq!(recorder.normal.load(Ordering::SeqCst), 1);
        assert_eq!(d.describe(), "stopped, 1 observer(s)");
    }

    #[tokio::test]
    async fn panic_is_reported_as_exceptional_termination() {
        let recorder = Arc::new(Recorder::default());
        let d = DaemonFn::arc("crasher", |_ctx: DaemonContext| async move {
            let crash = true;
            if crash {
                panic!("boom");
            }
            Ok::<(), DaemonError>(())
        });
        d.register_observer(recorder.clone());

        d.start().unwrap();
        assert!(d.join(Duration::from_secs(1)).await.unwrap());

        let faults = recorder.faults.lock().unwrap();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].daemon(), "crasher");
        assert!(faults[0].to_string().contains("boom"));
    }

    #[tokio::test]
    async fn join_times_out_for_stubborn_body() {
        let d = DaemonFn::arc("stubborn", |_ctx: DaemonContext| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<(), DaemonError>(())
        });
        d.start().unwrap();
        d.request_stop();
        assert!(!d.join(Duration::from_millis(20)).await.unwrap());
        assert!(d.is_alive());
    }

    #[tokio::test]
    async fn never_started_joins_immediately() {
        let d = DaemonFn::arc("idle", |_ctx: DaemonContext| async {
            Ok::<(), DaemonError>(())
        });
        assert!(d.join(Duration::from_millis(1)).await.unwrap());
        assert_eq!(d.describe(), "never started, 0 observer(s)");
    }
}
