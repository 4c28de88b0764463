//! FilterRunner - wiring and the supervised tick loop
//!
//! `run_filter` owns one filter's whole life: bind outputs, connect
//! sources, pump frames into the synchronizer, call `process` per tick
//! through the executor, stamp and route the results, and walk the state
//! machine down cleanly whatever the stop reason.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sieve_config::{EphemeralMode, FilterConfig, FrameLogMode, SyncMode};
use sieve_metrics::{
    spawn_exporter, spawn_heartbeat, Allowlist, LineageClient, LineageConfig, MetricRegistry,
    SystemSampler, TelemetryConfig,
};
use sieve_protocol::Frame;
use sieve_routing::{
    OutputRouter, SyncEvent, Synchronizer, SynchronizerConfig, Tick, TopicSpec,
};
use sieve_transport::{
    Publisher, PublisherConfig, SubscribeKind, Subscriber, SubscriberConfig, SubscriberEvent,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::error::LifecycleError;
use crate::exec::FilterExecutor;
use crate::filter::{Filter, FilterContext};
use crate::stamp::{input_latency_ms, now_nanos, stamp_outgoing, Pacer};
use crate::state::{ExitStatus, FilterState, StateMachine};

/// Budget for the `user_shutdown` call itself
const SHUTDOWN_CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Process-failure escalation: this many failures inside the window is
/// fatal
const ESCALATION_COUNT: usize = 100;
const ESCALATION_WINDOW: Duration = Duration::from_secs(10);

/// Why the filter stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// External stop: signal, RPC, or coordinated-exit propagation
    Stopped,
    /// Every source reached end-of-stream
    Eos,
    /// The configured `exit_after` elapsed
    ExitAfter,
    /// A fatal error (setup, escalation, executor loss)
    Fatal(String),
}

/// Terminal report of one filter run
#[derive(Debug)]
pub struct FilterOutcome {
    pub status: ExitStatus,
    pub reason: StopReason,
}

/// Hooks the launcher wires into a worker
pub struct RunnerEnv {
    /// Run id shared across the launch
    pub run_id: String,
    /// External stop signal
    pub stop: CancellationToken,
    /// Called once the filter reaches `Running`
    pub on_ready: Option<Box<dyn FnOnce() + Send>>,
}

impl RunnerEnv {
    /// A standalone environment (no launcher)
    pub fn standalone(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            stop: CancellationToken::new(),
            on_ready: None,
        }
    }
}

/// Sliding-window failure counter for `user_process`
struct FailureWindow {
    threshold: usize,
    window: Duration,
    times: VecDeque<Instant>,
}

impl FailureWindow {
    fn new(threshold: usize, window: Duration) -> Self {
        Self {
            threshold,
            window,
            times: VecDeque::new(),
        }
    }

    /// Record one failure; true when the threshold is crossed
    fn record(&mut self) -> bool {
        let now = Instant::now();
        self.times.push_back(now);
        while let Some(front) = self.times.front() {
            if now.duration_since(*front) > self.window {
                self.times.pop_front();
            } else {
                break;
            }
        }
        self.times.len() >= self.threshold
    }
}

/// Strongest synchronization demanded by any source
fn effective_sync(config: &FilterConfig) -> (SyncMode, Duration) {
    fn rank(mode: SyncMode) -> u8 {
        match mode {
            SyncMode::Loose => 0,
            SyncMode::Strict => 1,
            SyncMode::ById => 2,
        }
    }
    let mut mode = config.sync;
    let mut window = config.sync_window;
    for source in &config.sources {
        let source_mode = config.source_sync(source);
        if rank(source_mode) > rank(mode) {
            mode = source_mode;
        }
        let source_window = config.source_window(source);
        if source_window < window {
            window = source_window;
        }
    }
    (mode, window)
}

fn log_frame(direction: &str, mode: FrameLogMode, frame: &Frame) {
    match mode {
        FrameLogMode::None => {}
        FrameLogMode::Basic => {
            let shape = frame
                .image()
                .map(|img| format!("{}x{}x{}", img.height(), img.width(), img.channels()))
                .unwrap_or_else(|| "-".to_string());
            info!(
                direction,
                topic = frame.topic(),
                id = frame.id(),
                shape,
                "frame"
            );
        }
        FrameLogMode::Pretty => {
            let shape = frame
                .image()
                .map(|img| format!("{}x{}x{}", img.height(), img.width(), img.channels()))
                .unwrap_or_else(|| "-".to_string());
            let keys: Vec<&str> = frame.data().keys().collect();
            info!(
                direction,
                topic = frame.topic(),
                id = frame.id(),
                shape,
                keys = ?keys,
                "frame"
            );
        }
    }
}

/// Run one filter to termination
///
/// This is the whole lifecycle: `Init → SettingUp → Running → Draining →
/// ShuttingDown → Terminated`. Errors before `Running` surface as `Err`;
/// failures after that are reported in the outcome so the shutdown path
/// always runs.
///
/// The whole run executes inside a `filter` span carrying `filter_id` and
/// `run_id`, so every log line under it — transport, synchronizer,
/// telemetry, user hooks — is attributable without per-call-site fields.
pub async fn run_filter(
    filter: Box<dyn Filter>,
    config: FilterConfig,
    env: RunnerEnv,
) -> Result<FilterOutcome, LifecycleError> {
    let span = info_span!("filter", filter_id = %config.id, run_id = %env.run_id);
    run_supervised(filter, config, env).instrument(span).await
}

async fn run_supervised(
    filter: Box<dyn Filter>,
    config: FilterConfig,
    mut env: RunnerEnv,
) -> Result<FilterOutcome, LifecycleError> {
    let filter_id = config.id.clone();
    let mut machine = StateMachine::new(&filter_id);
    machine.advance(FilterState::SettingUp);
    info!(kind = %config.kind, "filter starting");

    let io_cancel = CancellationToken::new();
    let _io_guard = io_cancel.clone().drop_guard();
    let input_cancel = io_cancel.child_token();

    // Observability substrate
    let specs = filter.metric_specs();
    let registry = Arc::new(MetricRegistry::new(specs));
    let allowlist = Arc::new(Allowlist::from_env());
    let lineage = Arc::new(LineageClient::new(
        LineageConfig::from_env(),
        env.run_id.clone(),
        filter_id.clone(),
    ));

    // Output side: bind publishers, one lane task each
    let mut publishers = Vec::new();
    for output in &config.outputs {
        if !output.endpoint.is_wire() {
            warn!(
                endpoint = %output.endpoint,
                "output scheme is handled by an external collaborator, skipping"
            );
            continue;
        }
        let advertised: Vec<String> = output.topics.iter().map(|m| m.dst.clone()).collect();
        let mut publisher_config =
            PublisherConfig::new(output.endpoint.authority(), &filter_id, &env.run_id)
                .with_topics(advertised);
        if let Ok(Some(outbox)) = output.options.get_i64("outbox") {
            publisher_config = publisher_config.with_outbox_capacity(outbox.max(1) as usize);
        }
        let publisher = Publisher::bind(publisher_config)
            .await
            .map_err(LifecycleError::BindFailed)?;
        publishers.push((output.clone(), Arc::new(publisher)));
    }

    let mut router = OutputRouter::new();
    let mut lane_handles = Vec::new();
    for (index, (output, publisher)) in publishers.iter().enumerate() {
        let (lane_tx, mut lane_rx) = mpsc::channel::<Frame>(8);
        router.add_lane(format!("out{index}"), output.topics.clone(), lane_tx);

        let publisher = Arc::clone(publisher);
        let log_mode = config.endpoint_log(&output.options);
        let declared: HashSet<String> = output
            .topics
            .iter()
            .filter(|map| !map.is_wildcard())
            .map(|map| map.dst.clone())
            .collect();
        let lane = async move {
            let mut seen = declared;
            while let Some(frame) = lane_rx.recv().await {
                seen.insert(frame.topic().to_string());
                log_frame("publish", log_mode, &frame);
                if let Err(e) = publisher.publish(&frame).await {
                    warn!(error = %e, "publish failed");
                    if !e.recoverable() {
                        break;
                    }
                }
            }
            // Lane closed: tell every downstream topic the stream ended.
            for topic in seen {
                let _ = publisher.send_eos(&topic).await;
            }
        };
        lane_handles.push(tokio::spawn(lane.instrument(Span::current())));
    }

    // Input side: subscribers pumping into the synchronizer
    let (sync_mode, sync_window) = effective_sync(&config);
    let mut topic_specs = Vec::new();
    for source in &config.sources {
        if !source.endpoint.is_wire() {
            warn!(
                endpoint = %source.endpoint,
                "source scheme is handled by an external collaborator, skipping"
            );
            continue;
        }
        let ephemeral = source.ephemeral.is_ephemeral();
        for map in &source.topics {
            topic_specs.push(TopicSpec {
                name: map.dst.clone(),
                ephemeral,
            });
        }
    }
    let has_sources = !topic_specs.is_empty();
    let (sync_tx, mut synchronizer) = Synchronizer::channel(SynchronizerConfig {
        mode: sync_mode,
        window: sync_window,
        topics: topic_specs,
    });

    for source in config.sources.iter().filter(|s| s.endpoint.is_wire()) {
        let kind = match source.ephemeral {
            EphemeralMode::None => SubscribeKind::Durable,
            EphemeralMode::Ephemeral => SubscribeKind::Ephemeral,
            EphemeralMode::DoublyEphemeral => SubscribeKind::Silent,
        };
        let wire_topics: Vec<String> = source.topics.iter().map(|m| m.src.clone()).collect();
        let subscriber_config = SubscriberConfig::new(source.endpoint.authority())
            .with_topics(wire_topics)
            .with_kind(kind);

        let mut subscriber = Subscriber::connect(subscriber_config);
        let sync_tx = sync_tx.clone();
        let source = source.clone();
        let log_mode = config.endpoint_log(&source.options);
        let cancel = input_cancel.clone();
        let pump = async move {
            loop {
                let event = tokio::select! {
                    event = subscriber.next() => event,
                    _ = cancel.cancelled() => break,
                };
                match event {
                    Some(SubscriberEvent::Frame(mut frame)) => {
                        let Some(local) = source.map_topic(frame.topic()).map(str::to_string)
                        else {
                            continue;
                        };
                        if local != frame.topic() {
                            frame.set_topic(&local);
                        }
                        log_frame("receive", log_mode, &frame);
                        if sync_tx
                            .send(SyncEvent::Frame {
                                topic: local,
                                frame,
                            })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(SubscriberEvent::Eos { topic }) => {
                        let Some(local) = source.map_topic(&topic).map(str::to_string) else {
                            continue;
                        };
                        if sync_tx.send(SyncEvent::Eos { topic: local }).await.is_err() {
                            break;
                        }
                    }
                    Some(SubscriberEvent::Connected(hello)) => {
                        debug!(producer = %hello.producer_id, "source connected");
                    }
                    Some(SubscriberEvent::Disconnected) => {
                        debug!("source disconnected, reconnecting");
                    }
                    None => break,
                }
            }
            subscriber.stop();
        };
        tokio::spawn(pump.instrument(Span::current()));
    }
    drop(sync_tx);

    // User setup through the executor
    let ctx = FilterContext::new(config.clone(), env.run_id.clone());
    let executor = FilterExecutor::spawn(filter, ctx);
    if let Err(e) = executor.setup().await? {
        warn!(error = %e, "setup failed");
        machine.advance(FilterState::ShuttingDown);
        machine.advance(FilterState::Terminated);
        return Err(LifecycleError::SetupFailed(e));
    }

    machine.advance(FilterState::Running);
    lineage.emit_start();
    if let Some(ready) = env.on_ready.take() {
        ready();
    }

    // Background observability
    let _exporter = spawn_exporter(
        filter_id.clone(),
        env.run_id.clone(),
        Arc::clone(&registry),
        Arc::clone(&allowlist),
        TelemetryConfig::from_env(),
        io_cancel.clone(),
    );
    let _heartbeat = spawn_heartbeat(
        Arc::clone(&lineage),
        Arc::clone(&registry),
        Arc::clone(&allowlist),
        io_cancel.clone(),
    );
    {
        let registry = Arc::clone(&registry);
        let cancel = io_cancel.clone();
        let interval = config.metrics_interval;
        let sample_loop = async move {
            let mut sampler = SystemSampler::new();
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let sample = sampler.sample();
                        registry.record_system("cpu_percent", sample.cpu_percent);
                        registry.record_system("memory_bytes", sample.memory_bytes as f64);
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        };
        tokio::spawn(sample_loop.instrument(Span::current()));
    }

    // The tick loop
    let mut pacer = Pacer::new();
    let mut failures = FailureWindow::new(ESCALATION_COUNT, ESCALATION_WINDOW);
    let mut status = ExitStatus::Clean;
    let mut was_killed = false;
    let exit_deadline = config.exit_after.as_ref().map(|exit_after| {
        tokio::time::Instant::now() + exit_after.remaining_from(chrono::Utc::now())
    });

    let reason = 'ticks: loop {
        let next_tick: Option<Tick> = tokio::select! {
            _ = env.stop.cancelled() => break 'ticks StopReason::Stopped,
            _ = tokio::time::sleep_until(exit_deadline.unwrap_or_else(tokio::time::Instant::now)),
                if exit_deadline.is_some() =>
            {
                info!("exit_after elapsed");
                break 'ticks StopReason::ExitAfter;
            }
            tick = synchronizer.next(), if has_sources => tick,
            // Source-less filters are generators: process paces itself.
            _ = tokio::task::yield_now(), if !has_sources => Some(Tick::default()),
        };

        let Some(tick) = next_tick else {
            if config.propagate_eos {
                info!("all sources at end-of-stream");
                break 'ticks StopReason::Eos;
            }
            env.stop.cancelled().await;
            break 'ticks StopReason::Stopped;
        };

        let newest_input_ts = tick.present().filter_map(|(_, frame)| frame.ts()).max();
        for (_, frame) in tick.present() {
            registry.observe(frame.data());
        }

        let process_started = Instant::now();
        let entered_at = now_nanos();
        let process_future = executor.process(tick);
        tokio::pin!(process_future);

        let mut stopped_mid_process = false;
        let produced = loop {
            tokio::select! {
                result = &mut process_future => break Some(result?),
                _ = env.stop.cancelled(), if !stopped_mid_process => {
                    stopped_mid_process = true;
                    // Stop arrived mid-process: the drain deadline bounds
                    // how long the in-flight call may keep us here.
                    match tokio::time::timeout(config.drain_deadline, &mut process_future).await {
                        Ok(result) => break Some(result?),
                        Err(_elapsed) => {
                            let err = LifecycleError::DrainDeadline {
                                deadline: config.drain_deadline,
                            };
                            warn!(error = %err, "abandoning in-flight process call");
                            was_killed = true;
                            break None;
                        }
                    }
                }
            }
        };

        let Some(produced) = produced else {
            break 'ticks StopReason::Stopped;
        };

        match produced {
            Ok(frames) => {
                let fps = pacer.tick();
                let lat_in = input_latency_ms(newest_input_ts, entered_at);
                let lat_out = process_started.elapsed().as_secs_f64() * 1000.0;
                registry.record_system("fps", fps);
                if let Some(lat_in) = lat_in {
                    registry.record_system("lat_in", lat_in);
                }
                registry.record_system("lat_out", lat_out);

                let stamped_at = now_nanos();
                for mut frame in frames {
                    stamp_outgoing(
                        &mut frame,
                        &mut pacer,
                        &filter_id,
                        stamped_at,
                        fps,
                        lat_in,
                        lat_out,
                    );
                    router.route(frame).await;
                }
            }
            Err(e) => {
                // Recoverable: the tick is dropped. Repeated failures
                // escalate to fatal.
                warn!(error = %e, "user process failed, dropping tick");
                if failures.record() {
                    let err = LifecycleError::ProcessEscalation {
                        count: ESCALATION_COUNT as u32,
                        window: ESCALATION_WINDOW,
                    };
                    warn!(error = %err, "escalating to fatal");
                    status = ExitStatus::Failed;
                    break 'ticks StopReason::Fatal(e.to_string());
                }
            }
        }

        if stopped_mid_process {
            break 'ticks StopReason::Stopped;
        }
    };

    // Draining: stop intake, give in-flight frames a bounded window
    machine.advance(FilterState::Draining);
    input_cancel.cancel();

    if has_sources && !was_killed && reason == StopReason::Stopped {
        let drain = tokio::time::timeout(config.drain_deadline, async {
            while let Some(tick) = synchronizer.next().await {
                for (_, frame) in tick.present() {
                    registry.observe(frame.data());
                }
                match executor.process(tick).await {
                    Ok(Ok(frames)) => {
                        let fps = pacer.fps();
                        let stamped_at = now_nanos();
                        for mut frame in frames {
                            stamp_outgoing(
                                &mut frame,
                                &mut pacer,
                                &filter_id,
                                stamped_at,
                                fps,
                                None,
                                0.0,
                            );
                            router.route(frame).await;
                        }
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "process failed during drain");
                    }
                    Err(_) => break,
                }
            }
        })
        .await;
        if drain.is_err() {
            let err = LifecycleError::DrainDeadline {
                deadline: config.drain_deadline,
            };
            warn!(error = %err, "drain did not finish");
            was_killed = true;
        }
    }

    // ShuttingDown: user cleanup, lineage, lane flush, sockets
    machine.advance(FilterState::ShuttingDown);
    match tokio::time::timeout(SHUTDOWN_CALL_TIMEOUT, executor.shutdown(was_killed)).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => {
            warn!(error = %e, "user shutdown failed");
            status = ExitStatus::Failed;
        }
        Ok(Err(_)) | Err(_) => {
            warn!("shutdown call abandoned (stuck executor)");
        }
    }

    match (&status, &reason) {
        (ExitStatus::Failed, _) => lineage.emit_fail(&format!("{reason:?}")),
        (_, StopReason::Fatal(message)) => lineage.emit_fail(message),
        _ => lineage.emit_complete(),
    }

    // Close lanes so their tasks flush end-of-stream downstream.
    drop(router);
    for handle in lane_handles {
        let _ = tokio::time::timeout(SHUTDOWN_CALL_TIMEOUT, handle).await;
    }
    for (_, publisher) in &publishers {
        publisher.shutdown();
    }
    io_cancel.cancel();

    machine.advance(FilterState::Terminated);
    info!(status = ?status, reason = ?reason, "filter terminated");
    Ok(FilterOutcome { status, reason })
}
