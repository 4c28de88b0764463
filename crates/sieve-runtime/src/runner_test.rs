//! Tests for the filter runner
//!
//! Socket-free coverage: generator-mode filters exercise the lifecycle,
//! stop paths, exit_after and the failure escalation. Full pipelines over
//! TCP are covered by the launcher's tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use sieve_config::FilterConfig;
use sieve_protocol::{Data, DataMap, Frame};
use sieve_routing::Tick;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::filter::{Filter, FilterContext};
use crate::runner::{run_filter, RunnerEnv, StopReason};
use crate::state::ExitStatus;

const WAIT: Duration = Duration::from_secs(10);

fn config(kind: &str, entries: &[(&str, Data)]) -> FilterConfig {
    let map: DataMap = entries.iter().cloned().collect();
    FilterConfig::normalize(kind, &map).unwrap()
}

/// Generator that counts its process calls
struct Counting {
    calls: Arc<AtomicU32>,
}

impl Filter for Counting {
    fn process(&mut self, _ctx: &mut FilterContext, _tick: &Tick) -> anyhow::Result<Vec<Frame>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(1));
        Ok(Vec::new())
    }
}

/// Filter whose process always fails
struct AlwaysFailing;

impl Filter for AlwaysFailing {
    fn process(&mut self, _ctx: &mut FilterContext, _tick: &Tick) -> anyhow::Result<Vec<Frame>> {
        Err(anyhow!("intentional failure"))
    }
}

/// Filter whose setup fails
struct BadSetup;

impl Filter for BadSetup {
    fn setup(&mut self, _ctx: &mut FilterContext) -> anyhow::Result<()> {
        Err(anyhow!("bad setup"))
    }

    fn process(&mut self, _ctx: &mut FilterContext, _tick: &Tick) -> anyhow::Result<Vec<Frame>> {
        Ok(Vec::new())
    }
}

/// Records the shutdown flag it received
struct ShutdownProbe {
    killed: Arc<AtomicU32>,
}

impl Filter for ShutdownProbe {
    fn process(&mut self, _ctx: &mut FilterContext, _tick: &Tick) -> anyhow::Result<Vec<Frame>> {
        std::thread::sleep(Duration::from_millis(1));
        Ok(Vec::new())
    }

    fn shutdown(&mut self, _ctx: &mut FilterContext, was_killed: bool) -> anyhow::Result<()> {
        self.killed
            .store(if was_killed { 2 } else { 1 }, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Lifecycle basics
// =============================================================================

#[tokio::test]
async fn test_exit_after_stops_cleanly() {
    let calls = Arc::new(AtomicU32::new(0));
    let filter = Box::new(Counting {
        calls: Arc::clone(&calls),
    });
    let config = config("Gen", &[("exit_after", Data::Str("0.3".into()))]);

    let outcome = timeout(
        WAIT,
        run_filter(filter, config, RunnerEnv::standalone("run-test")),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(outcome.reason, StopReason::ExitAfter);
    assert_eq!(outcome.status, ExitStatus::Clean);
    assert!(calls.load(Ordering::Relaxed) > 0, "generator never ran");
}

#[tokio::test]
async fn test_external_stop() {
    let calls = Arc::new(AtomicU32::new(0));
    let filter = Box::new(Counting {
        calls: Arc::clone(&calls),
    });
    let config = config("Gen", &[]);

    let stop = CancellationToken::new();
    let env = RunnerEnv {
        run_id: "run-test".into(),
        stop: stop.clone(),
        on_ready: None,
    };

    let runner = tokio::spawn(run_filter(filter, config, env));
    tokio::time::sleep(Duration::from_millis(100)).await;
    stop.cancel();

    let outcome = timeout(WAIT, runner).await.unwrap().unwrap().unwrap();
    assert_eq!(outcome.reason, StopReason::Stopped);
    assert_eq!(outcome.status, ExitStatus::Clean);
}

#[tokio::test]
async fn test_ready_fires_after_setup() {
    let ready = Arc::new(AtomicU32::new(0));
    let ready_clone = Arc::clone(&ready);
    let filter = Box::new(Counting {
        calls: Arc::new(AtomicU32::new(0)),
    });
    let config = config("Gen", &[("exit_after", Data::Str("0.1".into()))]);

    let env = RunnerEnv {
        run_id: "run-test".into(),
        stop: CancellationToken::new(),
        on_ready: Some(Box::new(move || {
            ready_clone.store(1, Ordering::SeqCst);
        })),
    };

    timeout(WAIT, run_filter(filter, config, env))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ready.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Failure paths
// =============================================================================

#[tokio::test]
async fn test_setup_failure_is_fatal() {
    let config = config("Bad", &[]);
    let result = timeout(
        WAIT,
        run_filter(Box::new(BadSetup), config, RunnerEnv::standalone("run-test")),
    )
    .await
    .unwrap();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_repeated_process_failures_escalate() {
    let config = config("Gen", &[]);
    let outcome = timeout(
        WAIT,
        run_filter(
            Box::new(AlwaysFailing),
            config,
            RunnerEnv::standalone("run-test"),
        ),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(outcome.status, ExitStatus::Failed);
    assert!(matches!(outcome.reason, StopReason::Fatal(_)));
}

// =============================================================================
// Shutdown flag
// =============================================================================

#[tokio::test]
async fn test_drain_deadline_abandons_stuck_process() {
    // A process call that outlives the drain deadline: the supervisor
    // must stop waiting, flag the shutdown as killed, and return well
    // before the stuck call would have finished.
    struct Stuck {
        killed: Arc<AtomicU32>,
    }
    impl Filter for Stuck {
        fn process(&mut self, _ctx: &mut FilterContext, _tick: &Tick) -> anyhow::Result<Vec<Frame>> {
            std::thread::sleep(Duration::from_secs(30));
            Ok(Vec::new())
        }
        fn shutdown(&mut self, _ctx: &mut FilterContext, was_killed: bool) -> anyhow::Result<()> {
            self.killed
                .store(if was_killed { 2 } else { 1 }, Ordering::SeqCst);
            Ok(())
        }
    }

    let killed = Arc::new(AtomicU32::new(0));
    let filter = Box::new(Stuck {
        killed: Arc::clone(&killed),
    });
    let config = config("Gen", &[("drain_deadline_s", Data::Int(1))]);

    let stop = CancellationToken::new();
    let env = RunnerEnv {
        run_id: "run-test".into(),
        stop: stop.clone(),
        on_ready: None,
    };

    let started = std::time::Instant::now();
    let runner = tokio::spawn(run_filter(filter, config, env));
    tokio::time::sleep(Duration::from_millis(100)).await;
    stop.cancel();

    let outcome = timeout(WAIT, runner).await.unwrap().unwrap().unwrap();
    assert_eq!(outcome.reason, StopReason::Stopped);
    // Drain deadline (1 s) plus the bounded shutdown call, nowhere near
    // the 30 s the process call would take.
    assert!(started.elapsed() < Duration::from_secs(6));
    // The shutdown command queued behind the stuck call; it has not run.
    assert_eq!(killed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_clean_stop_passes_was_killed_false() {
    let killed = Arc::new(AtomicU32::new(0));
    let filter = Box::new(ShutdownProbe {
        killed: Arc::clone(&killed),
    });
    let config = config("Gen", &[("exit_after", Data::Str("0.1".into()))]);

    timeout(
        WAIT,
        run_filter(filter, config, RunnerEnv::standalone("run-test")),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(killed.load(Ordering::SeqCst), 1, "expected was_killed=false");
}
