#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use daemonvisor::{
    Daemon, DaemonError, DaemonFault, DaemonRef, ObserverRef, Observers, StartupDelay,
    Supervisor, SupervisorConfig,
};

/// How a [`Scripted`] reacts to the supervisor.
#[derive(Clone, Copy, Debug, Default)]
pub struct Behavior {
    /// Heartbeat interval while alive; `None` never beats.
    pub beat_every: Option<Duration>,
    /// `start()` always fails.
    pub fail_start: bool,
    /// `join` waits this long (capped by its timeout) before answering.
    pub join_delay: Option<Duration>,
    /// `request_stop()` is counted but ignored.
    pub stubborn: bool,
}

/// Scriptable daemon that records what the supervisor does to it.
pub struct Scripted {
    name: String,
    me: Weak<Scripted>,
    alive: AtomicBool,
    behavior: Behavior,
    starts: Mutex<Vec<Instant>>,
    join_timeouts: Mutex<Vec<Duration>>,
    stop_requests: AtomicUsize,
    reconfigured: AtomicUsize,
    observers: Observers,
}

impl Scripted {
    pub fn with(name: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            name: name.to_string(),
            me: me.clone(),
            alive: AtomicBool::new(false),
            behavior,
            starts: Mutex::new(Vec::new()),
            join_timeouts: Mutex::new(Vec::new()),
            stop_requests: AtomicUsize::new(0),
            reconfigured: AtomicUsize::new(0),
            observers: Observers::new(),
        })
    }

    /// Never sends heartbeats.
    pub fn silent(name: &str) -> Arc<Self> {
        Self::with(name, Behavior::default())
    }

    /// Sends a heartbeat every `every` while alive.
    pub fn beating(name: &str, every: Duration) -> Arc<Self> {
        Self::with(
            name,
            Behavior {
                beat_every: Some(every),
                ..Behavior::default()
            },
        )
    }

    /// `start()` always fails.
    pub fn failing_start(name: &str) -> Arc<Self> {
        Self::with(
            name,
            Behavior {
                fail_start: true,
                ..Behavior::default()
            },
        )
    }

    pub fn handle(self: &Arc<Self>) -> DaemonRef {
        self.clone()
    }

    pub fn starts(&self) -> Vec<Instant> {
        self.starts.lock().unwrap().clone()
    }

    pub fn start_count(&self) -> usize {
        self.starts.lock().unwrap().len()
    }

    /// Timeouts passed to `join`, in call order.
    pub fn join_timeouts(&self) -> Vec<Duration> {
        self.join_timeouts.lock().unwrap().clone()
    }

    pub fn stop_requests(&self) -> usize {
        self.stop_requests.load(Ordering::SeqCst)
    }

    pub fn reconfigured(&self) -> usize {
        self.reconfigured.load(Ordering::SeqCst)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Reports a fault without terminating.
    pub fn report(&self, fault: DaemonFault) {
        self.observers.exception_occurred(self, fault);
    }

    /// Reports a fresh fault without terminating.
    pub fn fail(&self, msg: &str) {
        self.report(DaemonFault::new(self.name.as_str(), DaemonError::fail(msg)));
    }

    /// Terminates normally on its own.
    pub fn finish(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.observers.terminated_normally(self);
    }

    /// Terminates with an error on its own.
    pub fn crash(&self, msg: &str) {
        self.alive.store(false, Ordering::SeqCst);
        self.observers
            .terminated_exceptionally(self, Box::new(DaemonError::fail(msg)));
    }
}

#[async_trait]
impl Daemon for Scripted {
    fn identification(&self) -> &str {
        &self.name
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn start(&self) -> Result<(), DaemonError> {
        if self.behavior.fail_start {
            return Err(DaemonError::fail("refusing to start"));
        }
        if self.alive.swap(true, Ordering::SeqCst) {
            return Err(DaemonError::fail("already started"));
        }
        self.starts.lock().unwrap().push(Instant::now());

        if let Some(every) = self.behavior.beat_every {
            let me = self.me.clone();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(every);
                loop {
                    tick.tick().await;
                    let Some(script) = me.upgrade() else { break };
                    if !script.is_alive() {
                        break;
                    }
                    script.observers.heartbeat(script.as_ref());
                }
            });
        }
        Ok(())
    }

    fn request_stop(&self) {
        self.stop_requests.fetch_add(1, Ordering::SeqCst);
        if !self.behavior.stubborn {
            self.alive.store(false, Ordering::SeqCst);
        }
    }

    async fn join(&self, timeout: Duration) -> Result<bool, DaemonError> {
        self.join_timeouts.lock().unwrap().push(timeout);
        if let Some(delay) = self.behavior.join_delay {
            tokio::time::sleep(delay.min(timeout)).await;
        }
        Ok(!self.is_alive())
    }

    fn reconfigure(&self) -> Result<(), DaemonError> {
        self.reconfigured.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("script started {} time(s)", self.start_count())
    }

    fn register_observer(&self, observer: ObserverRef) {
        self.observers.register(observer);
    }

    fn unregister_observer(&self, observer: &ObserverRef) {
        self.observers.unregister(observer);
    }
}

/// Short periods, no stagger, uncached report.
pub fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        check_period: Duration::from_millis(20),
        join_timeout: Duration::from_millis(200),
        max_missed_heartbeats: 2,
        startup_delay: StartupDelay::none(),
        info_ttl: Duration::ZERO,
        ..SupervisorConfig::default()
    }
}

/// Requests a stop after `after`.
pub fn stop_after(sup: &Supervisor, after: Duration) {
    let sup = sup.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        sup.request_stop();
    });
}

/// Polls `cond` until it holds, failing the test after two seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// Runs `process` on its own task.
pub fn spawn_process(
    sup: &Supervisor,
) -> tokio::task::JoinHandle<Result<(), daemonvisor::SupervisorError>> {
    let sup = sup.clone();
    tokio::spawn(async move { sup.process().await })
}

/// Installs a test log subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
