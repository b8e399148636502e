//! # Example: dynamic_add_remove
//!
//! Add and remove daemons while the `Supervisor` is running.
//!
//! Demonstrates how to:
//! - Run `Supervisor::process()` on a background task with one initial daemon.
//! - From a controller task, add and remove daemons over time.
//! - Stop supervision with `request_stop()` and inspect the recycled pending set.
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► spawn Supervisor::process()
//!   │     ├─► start ticker-A
//!   │     └─► check heartbeats every 500ms
//!   │
//!   └─► controller task
//!         ├─► add_daemon(ticker-B)       (started immediately)
//!         ├─► remove_daemon(ticker-A)    (stopped and forgotten immediately)
//!         └─► request_stop()
//!
//! process() unwinds: ticker-B is stopped and moved back to pending.
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example dynamic_add_remove
//! ```

use std::time::Duration;

use daemonvisor::{
    DaemonContext, DaemonError, DaemonFn, DaemonRef, StartupDelay, Supervisor, SupervisorConfig,
};
use tracing_subscriber::EnvFilter;

/// A daemon that ticks and heartbeats every `period` until asked to stop.
fn ticker(name: &'static str, period: Duration) -> DaemonRef {
    DaemonFn::arc(name, move |ctx: DaemonContext| async move {
        loop {
            tokio::select! {
                _ = ctx.cancelled() => return Ok::<(), DaemonError>(()),
                _ = tokio::time::sleep(period) => {
                    println!("[{name}] tick");
                    ctx.heartbeat();
                }
            }
        }
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 1) Configure the supervisor
    let cfg = SupervisorConfig {
        check_period: Duration::from_millis(500),
        join_timeout: Duration::from_secs(2),
        startup_delay: StartupDelay::none(),
        ..SupervisorConfig::default()
    };

    // 2) Initial daemon set: only A
    let ticker_a = ticker("ticker-A", Duration::from_millis(200));
    let sup = Supervisor::builder(cfg)
        .with_daemon(ticker_a.clone())
        .build()?;

    // 3) Run supervision in the background
    let sup_run = {
        let sup = sup.clone();
        tokio::spawn(async move { sup.process().await })
    };

    // 4) Controller: change membership over time
    let controller = {
        let sup = sup.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            println!("[controller] add ticker-B");
            match sup.add_daemon(ticker("ticker-B", Duration::from_millis(300))).await {
                Ok(added) => println!("[controller] ticker-B added: {added}"),
                Err(e) => eprintln!("[controller] add failed: {e}"),
            }

            tokio::time::sleep(Duration::from_secs(1)).await;
            println!("[controller] remove ticker-A");
            let removed = sup.remove_daemon(&ticker_a).await;
            println!("[controller] ticker-A removed: {removed}");

            tokio::time::sleep(Duration::from_secs(1)).await;
            println!("[controller] request stop");
            sup.request_stop();
        })
    };

    controller.await?;
    sup_run.await??;

    println!("{}", sup.info());
    println!("[main] finished: {} daemon(s) pending", sup.daemons()?.len());
    Ok(())
}
