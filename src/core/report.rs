//! # Cached status report.
//!
//! [`Supervisor::info`] renders a plain-text report of the supervisor and every daemon it
//! knows about. Rendering calls `describe()` on each daemon, so the text is cached for
//! `info_ttl` and regenerated lazily. Membership and configuration changes drop the cache.
//!
//! ## Layout
//! ```text
//! == General ==
//! created:   2026-01-01 12:00:00.000
//! last run:  never
//! phase:     idle
//! events:    0 receiver(s), capacity 1024
//! == Configuration ==
//! ...
//! == Pending (n) ==
//! - <identification> [terminated] missed=<n> heartbeat_age=<d>: <describe>
//! == Running (n) ==
//! == Pending removal (n) ==
//! ```

use std::fmt::Write as _;

use chrono::{DateTime, Local};
use tokio::time::Instant;

use crate::core::config::SupervisorConfig;
use crate::core::heartbeat::HeartbeatRecord;
use crate::core::state::{CachedInfo, DaemonKey};
use crate::core::supervisor::Supervisor;
use crate::daemons::DaemonRef;
use crate::error::Phase;

const TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// One daemon line, captured under the lock.
struct Entry {
    daemon: DaemonRef,
    terminated: bool,
    record: Option<HeartbeatRecord>,
}

/// Everything the report needs, captured under the lock.
struct Snapshot {
    created_at: DateTime<Local>,
    last_run: Option<DateTime<Local>>,
    phase: Phase,
    config: SupervisorConfig,
    receivers: usize,
    bus_capacity: usize,
    pending: Vec<Entry>,
    running: Vec<Entry>,
    pending_removal: Vec<Entry>,
}

impl Supervisor {
    /// Human-readable status report, served from cache while younger than `info_ttl`.
    pub fn info(&self) -> String {
        let snapshot = {
            let st = self.shared.state();
            if let Some(cached) = &st.info {
                if cached.generated.elapsed() < st.config.info_ttl {
                    return cached.text.clone();
                }
            }
            let entries = |list: &[DaemonRef]| -> Vec<Entry> {
                list.iter()
                    .map(|d| {
                        let key = DaemonKey::of(d.as_ref());
                        Entry {
                            daemon: d.clone(),
                            terminated: st.terminated.contains(&key),
                            record: st.heartbeats.get(&key).copied(),
                        }
                    })
                    .collect()
            };
            Snapshot {
                created_at: st.created_at,
                last_run: st.last_run,
                phase: st.phase(),
                config: st.config.clone(),
                receivers: self.shared.bus.receiver_count(),
                bus_capacity: self.shared.bus.capacity(),
                pending: entries(&st.pending),
                running: entries(&st.running),
                pending_removal: entries(&st.pending_removal),
            }
        };

        let text = render(&snapshot, Instant::now());
        self.shared.state().info = Some(CachedInfo {
            text: text.clone(),
            generated: Instant::now(),
        });
        text
    }

    /// Drops the cached report so the next [`info`](Self::info) call regenerates it.
    pub fn invalidate_info(&self) {
        self.shared.state().info = None;
    }
}

fn render(s: &Snapshot, now: Instant) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "== General ==");
    let _ = writeln!(out, "created:   {}", s.created_at.format(TIMESTAMP));
    match s.last_run {
        Some(at) => {
            let _ = writeln!(out, "last run:  {}", at.format(TIMESTAMP));
        }
        None => {
            let _ = writeln!(out, "last run:  never");
        }
    }
    let _ = writeln!(out, "phase:     {}", s.phase);
    let _ = writeln!(
        out,
        "events:    {} receiver(s), capacity {}",
        s.receivers, s.bus_capacity
    );

    let c = &s.config;
    let _ = writeln!(out, "== Configuration ==");
    let _ = writeln!(out, "check period:          {:?}", c.check_period);
    let _ = writeln!(out, "join timeout:          {:?}", c.join_timeout);
    let _ = writeln!(out, "max missed heartbeats: {}", c.max_missed_heartbeats);
    let _ = writeln!(out, "heartbeat grace:       {:?}", c.heartbeat_grace());
    let _ = writeln!(
        out,
        "startup delay:         {:?}..={:?}",
        c.startup_delay.min, c.startup_delay.max
    );
    let _ = writeln!(out, "info ttl:              {:?}", c.info_ttl);

    section(&mut out, "Pending", &s.pending, now);
    section(&mut out, "Running", &s.running, now);
    section(&mut out, "Pending removal", &s.pending_removal, now);
    out
}

fn section(out: &mut String, title: &str, entries: &[Entry], now: Instant) {
    let _ = writeln!(out, "== {title} ({}) ==", entries.len());
    for e in entries {
        let _ = write!(out, "- {}", e.daemon.identification());
        if e.terminated {
            let _ = write!(out, " [terminated]");
        }
        if let Some(rec) = &e.record {
            let _ = write!(
                out,
                " missed={} heartbeat_age={:?}",
                rec.missed(),
                rec.age(now)
            );
        }
        let detail = e.daemon.describe();
        if detail.is_empty() {
            let _ = writeln!(out);
        } else {
            let _ = writeln!(out, ": {detail}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::daemons::{DaemonContext, DaemonFn};
    use crate::error::DaemonError;

    fn idle_daemon(name: &'static str) -> DaemonRef {
        DaemonFn::arc(name, |_ctx: DaemonContext| async {
            Ok::<(), DaemonError>(())
        })
    }

    #[test]
    fn report_lists_sections_and_pending_daemons() {
        let sup = Supervisor::default();
        sup.set_daemons(vec![idle_daemon("alpha"), idle_daemon("beta")])
            .unwrap();

        let text = sup.info();
        assert!(text.contains("== General =="));
        assert!(text.contains("last run:  never"));
        assert!(text.contains("phase:     idle"));
        assert!(text.contains("== Configuration =="));
        assert!(text.contains("join timeout:          10s"));
        assert!(text.contains("heartbeat grace:       12s"));
        assert!(text.contains("events:    0 receiver(s), capacity 1024"));
        assert!(text.contains("== Pending (2) =="));
        assert!(text.contains("- alpha: never started"));
        assert!(text.contains("== Running (0) =="));
        assert!(text.contains("== Pending removal (0) =="));
    }

    #[test]
    fn report_is_cached_until_invalidated() {
        let sup = Supervisor::new(SupervisorConfig {
            info_ttl: Duration::from_secs(3600),
            ..SupervisorConfig::default()
        })
        .unwrap();

        let first = sup.info();
        assert!(first.contains("== Pending (0) =="));

        // Membership changes drop the cache.
        sup.set_daemons(vec![idle_daemon("gamma")]).unwrap();
        assert!(sup.info().contains("== Pending (1) =="));

        // Direct state edits do not; only an explicit invalidation does.
        sup.shared.state().pending.clear();
        assert!(sup.info().contains("== Pending (1) =="));
        sup.invalidate_info();
        assert!(sup.info().contains("== Pending (0) =="));
    }

    #[test]
    fn report_counts_event_receivers() {
        let sup = Supervisor::new(SupervisorConfig {
            info_ttl: Duration::ZERO,
            bus_capacity: 0,
            ..SupervisorConfig::default()
        })
        .unwrap();
        let _rx = sup.subscribe();
        assert!(sup.info().contains("events:    1 receiver(s), capacity 1"));
    }

    #[test]
    fn zero_ttl_regenerates_every_call() {
        let sup = Supervisor::new(SupervisorConfig {
            info_ttl: Duration::ZERO,
            ..SupervisorConfig::default()
        })
        .unwrap();
        let _ = sup.info();
        sup.shared.state().pending.push(idle_daemon("delta"));
        assert!(sup.info().contains("- delta"));
    }
}
