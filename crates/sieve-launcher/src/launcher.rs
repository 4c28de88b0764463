//! The launcher event loop
//!
//! Spawns one worker thread per node, watches their lifecycle events on a
//! single channel, and applies the coordinated-exit protocol until every
//! child is accounted for.

use std::collections::HashSet;
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::{Duration, Instant};

use sieve_config::FilterConfig;
use sieve_runtime::{run_filter, ExitStatus, FilterOutcome, RunnerEnv};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::node::FilterNode;
use crate::status::{ChildReport, ChildStatus, LaunchStatus};

/// Default per-filter startup deadline
const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default shutdown grace before stragglers are abandoned
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

/// Launcher tuning knobs
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Fixed run id; `None` reads `RUN_ID` or generates a UUID
    pub run_id: Option<String>,
    /// Start children one at a time, waiting for each `ready`
    pub sequential_startup: bool,
    /// Per-filter deadline to report ready (`STARTUP_TIMEOUT_S`)
    pub startup_timeout: Duration,
    /// Grace between the stop broadcast and hard abandonment
    /// (`SHUTDOWN_GRACE_S`)
    pub shutdown_grace: Duration,
    /// Install a SIGINT/SIGTERM watcher
    pub handle_signals: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            run_id: None,
            sequential_startup: false,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            handle_signals: true,
        }
    }
}

impl LaunchOptions {
    /// Read the launcher environment variables
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(value) = std::env::var("STARTUP_TIMEOUT_S") {
            if let Ok(secs) = value.parse::<u64>() {
                options.startup_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(value) = std::env::var("SHUTDOWN_GRACE_S") {
            if let Ok(secs) = value.parse::<u64>() {
                options.shutdown_grace = Duration::from_secs(secs);
            }
        }
        options
    }
}

enum Event {
    Ready(usize),
    Exited(usize, Result<FilterOutcome, String>),
    Interrupted,
    /// Internal: stop everything without counting as an interrupt
    Abort,
}

struct Child {
    id: String,
    kind: String,
    config: FilterConfig,
    stop: CancellationToken,
    ready: bool,
    exited: bool,
    status: Option<ChildStatus>,
}

/// Run a pipeline with options from the environment; blocks until done
pub fn run_multi(nodes: Vec<FilterNode>) -> LaunchStatus {
    run_multi_with(nodes, LaunchOptions::from_env())
}

/// Run a pipeline with explicit options; blocks until done
pub fn run_multi_with(nodes: Vec<FilterNode>, options: LaunchOptions) -> LaunchStatus {
    let run_id = options
        .run_id
        .clone()
        .or_else(|| std::env::var("RUN_ID").ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    info!(run_id = %run_id, filters = nodes.len(), "launcher starting");

    // Normalize every config up front; a broken pipeline graph is a
    // config error for the whole launch.
    let mut children = Vec::new();
    let mut builders = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    for (index, node) in nodes.into_iter().enumerate() {
        let (kind, user_config, build) = node.into_parts();
        match FilterConfig::normalize(&kind, &user_config) {
            Ok(mut config) => {
                // Instance ids must be unique within the run.
                if !seen_ids.insert(config.id.clone()) {
                    config.id = format!("{}-{}", config.id, index);
                    seen_ids.insert(config.id.clone());
                }
                children.push(Child {
                    id: config.id.clone(),
                    kind,
                    config,
                    stop: CancellationToken::new(),
                    ready: false,
                    exited: false,
                    status: None,
                });
                builders.push(Some(build));
            }
            Err(e) => {
                error!(kind = %kind, error = %e, "config failed to normalize, aborting launch");
                let mut reports: Vec<ChildReport> = children
                    .iter()
                    .map(|child| ChildReport {
                        id: child.id.clone(),
                        kind: child.kind.clone(),
                        status: ChildStatus::ConfigError("launch aborted".to_string()),
                    })
                    .collect();
                reports.push(ChildReport {
                    id: kind.to_ascii_lowercase(),
                    kind,
                    status: ChildStatus::ConfigError(e.to_string()),
                });
                return LaunchStatus {
                    children: reports,
                    interrupted: false,
                };
            }
        }
    }

    let (event_tx, event_rx) = std_mpsc::channel::<Event>();

    if options.handle_signals {
        spawn_signal_watcher(event_tx.clone());
    }

    let quorum_total = children
        .iter()
        .filter(|child| child.config.stop_exit)
        .count();
    let mut quorum_left = quorum_total;

    // Start children; sequential mode gates each spawn on the previous
    // child's ready (or exit).
    let mut pending: Vec<Event> = Vec::new();
    for index in 0..children.len() {
        spawn_worker(
            index,
            &run_id,
            &children[index],
            builders[index].take().expect("builder consumed once"),
            event_tx.clone(),
        );

        if options.sequential_startup {
            let deadline = Instant::now() + options.startup_timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match event_rx.recv_timeout(remaining) {
                    Ok(Event::Ready(i)) if i == index => {
                        children[i].ready = true;
                        break;
                    }
                    Ok(event @ Event::Exited(i, _)) if i == index => {
                        // Died before ready; the main loop settles it.
                        pending.push(event);
                        break;
                    }
                    Ok(event) => pending.push(event),
                    Err(_) => {
                        warn!(id = %children[index].id, "startup timeout, stopping launch");
                        children[index].status = Some(ChildStatus::StartupTimeout);
                        pending.push(Event::Abort);
                        break;
                    }
                }
            }
            if matches!(pending.last(), Some(Event::Abort)) {
                break;
            }
        }
    }

    let startup_deadline = Instant::now() + options.startup_timeout;
    let mut stopping = false;
    let mut grace_deadline: Option<Instant> = None;
    let mut interrupted = false;

    let stop_all = |children: &Vec<Child>| {
        for child in children.iter() {
            if !child.exited {
                child.stop.cancel();
            }
        }
    };

    loop {
        if children.iter().all(|child| child.exited) {
            break;
        }

        // Replay events captured during sequential startup first.
        let event = if let Some(event) = pending.pop() {
            Some(event)
        } else {
            let wait = if let Some(grace) = grace_deadline {
                grace.saturating_duration_since(Instant::now())
            } else if children.iter().any(|c| !c.ready && !c.exited) {
                startup_deadline.saturating_duration_since(Instant::now())
            } else {
                Duration::from_secs(3600)
            };
            match event_rx.recv_timeout(wait) {
                Ok(event) => Some(event),
                Err(std_mpsc::RecvTimeoutError::Timeout) => None,
                Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
            }
        };

        match event {
            Some(Event::Ready(index)) => {
                children[index].ready = true;
                info!(id = %children[index].id, "filter ready");
            }
            Some(Event::Exited(index, result)) => {
                let (propagates, counts_quorum, exited_id) = {
                    let child = &mut children[index];
                    child.exited = true;
                    child.ready = true;
                    let status = match result {
                        Ok(FilterOutcome {
                            status: ExitStatus::Clean,
                            reason,
                        }) => {
                            info!(id = %child.id, reason = ?reason, "filter exited cleanly");
                            child.status.clone().unwrap_or(ChildStatus::Ok)
                        }
                        Ok(FilterOutcome { reason, .. }) => {
                            warn!(id = %child.id, reason = ?reason, "filter failed");
                            ChildStatus::Failed(format!("{reason:?}"))
                        }
                        Err(message) => {
                            warn!(id = %child.id, error = %message, "filter errored");
                            ChildStatus::Failed(message)
                        }
                    };
                    child.status = Some(status);
                    (
                        child.config.propagate_exit,
                        child.config.stop_exit,
                        child.id.clone(),
                    )
                };

                // Coordinated exit: propagate, then evaluate the quorum.
                if propagates {
                    for sibling in children.iter() {
                        if !sibling.exited && sibling.config.obey_exit {
                            info!(from = %exited_id, to = %sibling.id, "propagating stop");
                            sibling.stop.cancel();
                        }
                    }
                }
                if counts_quorum {
                    quorum_left = quorum_left.saturating_sub(1);
                    if quorum_left == 0 && quorum_total > 0 && !stopping {
                        info!("stop quorum reached, stopping remaining filters");
                        stopping = true;
                        grace_deadline = Some(Instant::now() + options.shutdown_grace);
                        stop_all(&children);
                    }
                }
            }
            Some(Event::Interrupted) => {
                if !interrupted {
                    warn!("interrupted, stopping all filters");
                    interrupted = true;
                    stopping = true;
                    grace_deadline = Some(Instant::now() + options.shutdown_grace);
                    stop_all(&children);
                }
            }
            Some(Event::Abort) => {
                if !stopping {
                    stopping = true;
                    grace_deadline = Some(Instant::now() + options.shutdown_grace);
                    stop_all(&children);
                }
            }
            None => {
                // A deadline lapsed.
                if let Some(grace) = grace_deadline {
                    if Instant::now() >= grace {
                        for child in children.iter_mut().filter(|c| !c.exited) {
                            warn!(id = %child.id, "did not stop within grace, abandoning");
                            if child.status.is_none() {
                                child.status = Some(ChildStatus::Killed);
                            }
                            child.exited = true;
                        }
                    }
                } else {
                    // Startup deadline: stragglers never became ready.
                    let mut any_timeout = false;
                    for child in children.iter_mut().filter(|c| !c.ready && !c.exited) {
                        warn!(id = %child.id, "never became ready, stopping launch");
                        child.status = Some(ChildStatus::StartupTimeout);
                        any_timeout = true;
                    }
                    if any_timeout && !stopping {
                        stopping = true;
                        grace_deadline = Some(Instant::now() + options.shutdown_grace);
                        stop_all(&children);
                    }
                }
            }
        }
    }

    let reports: Vec<ChildReport> = children
        .iter()
        .map(|child| ChildReport {
            id: child.id.clone(),
            kind: child.kind.clone(),
            status: child.status.clone().unwrap_or(ChildStatus::Killed),
        })
        .collect();
    let status = LaunchStatus {
        children: reports,
        interrupted,
    };
    info!(
        run_id = %run_id,
        ok = status.ok(),
        exit_code = status.exit_code(),
        "launcher finished"
    );
    status
}

fn spawn_worker(
    index: usize,
    run_id: &str,
    child: &Child,
    build: Box<dyn FnOnce() -> Box<dyn sieve_runtime::Filter> + Send>,
    events: std_mpsc::Sender<Event>,
) {
    let run_id = run_id.to_string();
    let config = child.config.clone();
    let stop = child.stop.clone();
    let thread_name = format!("worker-{}", child.id);
    let ready_events = events.clone();

    let builder = thread::Builder::new().name(thread_name);
    let _ = builder.spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                let _ = events.send(Event::Exited(index, Err(format!("runtime: {e}"))));
                return;
            }
        };

        let env = RunnerEnv {
            run_id,
            stop,
            on_ready: Some(Box::new(move || {
                let _ = ready_events.send(Event::Ready(index));
            })),
        };

        let result = runtime
            .block_on(run_filter(build(), config, env))
            .map_err(|e| e.to_string());
        let _ = events.send(Event::Exited(index, result));
    });
}

/// Watch for SIGINT on a side thread with its own small runtime
fn spawn_signal_watcher(events: std_mpsc::Sender<Event>) {
    let _ = thread::Builder::new()
        .name("signal-watcher".to_string())
        .spawn(move || {
            let Ok(runtime) = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            else {
                return;
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = events.send(Event::Interrupted);
                }
            });
        });
}
