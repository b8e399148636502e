//! # Example: heartbeat_watchdog
//!
//! A daemon that stops heartbeating aborts supervision with `MissingHeartbeats`.
//!
//! `steady` heartbeats every 100ms. `stalling` heartbeats for one second and then goes
//! silent without terminating. After `max_missed_heartbeats` overdue checks `process()`
//! stops both daemons and returns the fault naming `stalling` only. Supervisor events are
//! printed as they arrive.
//!
//! ## Run
//! ```bash
//! RUST_LOG=daemonvisor=debug cargo run --example heartbeat_watchdog
//! ```

use std::time::Duration;

use daemonvisor::{
    DaemonContext, DaemonError, DaemonFn, DaemonRef, EventKind, Supervisor, SupervisorConfig,
    SupervisorError,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = SupervisorConfig {
        check_period: Duration::from_millis(250),
        max_missed_heartbeats: 3,
        ..SupervisorConfig::default()
    };

    let steady: DaemonRef = DaemonFn::arc("steady", |ctx: DaemonContext| async move {
        while !ctx.is_cancelled() {
            ctx.heartbeat();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Ok::<(), DaemonError>(())
    });

    let stalling: DaemonRef = DaemonFn::arc("stalling", |ctx: DaemonContext| async move {
        for _ in 0..10 {
            ctx.heartbeat();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        // Stuck: alive, silent, waiting only for the stop request.
        ctx.cancelled().await;
        Ok::<(), DaemonError>(())
    });

    let sup = Supervisor::builder(cfg)
        .with_daemons(vec![steady, stalling])
        .build()?;

    let mut events = sup.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ev) if ev.kind == EventKind::HeartbeatMissed => println!(
                    "[event] {:?} {} missed={}",
                    ev.kind,
                    ev.daemon.as_deref().unwrap_or("-"),
                    ev.missed.unwrap_or_default()
                ),
                Ok(ev) => println!("[event] {:?} {}", ev.kind, ev.daemon.as_deref().unwrap_or("")),
                Err(RecvError::Lagged(n)) => println!("[event] lagged by {n}"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    match sup.process().await {
        Err(SupervisorError::MissingHeartbeats { daemons, max_missed }) => {
            println!("[main] watchdog fired after {max_missed} missed checks: {daemons:?}");
        }
        Err(e) => return Err(e.into()),
        Ok(()) => println!("[main] supervision ended without a fault"),
    }

    // Let the printer drain, then stop it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    printer.abort();
    Ok(())
}
