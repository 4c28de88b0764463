//! Launcher tests
//!
//! Coordinated-exit protocol with in-process generator filters, exit
//! codes, and one real two-filter pipeline over TCP.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use sieve_protocol::{Data, DataMap, Frame, Image, PixelFormat};
use sieve_runtime::{Filter, FilterContext, Tick};

use crate::launcher::{run_multi_with, LaunchOptions};
use crate::node::FilterNode;
use crate::status::ChildStatus;

fn options() -> LaunchOptions {
    LaunchOptions {
        run_id: Some("launch-test".to_string()),
        sequential_startup: false,
        startup_timeout: Duration::from_secs(10),
        shutdown_grace: Duration::from_secs(10),
        handle_signals: false,
    }
}

fn config(entries: &[(&str, Data)]) -> DataMap {
    entries.iter().cloned().collect()
}

/// Generator that idles until stopped
#[derive(Default)]
struct Idle;

impl Filter for Idle {
    fn process(&mut self, _ctx: &mut FilterContext, _tick: &Tick) -> anyhow::Result<Vec<Frame>> {
        std::thread::sleep(Duration::from_millis(5));
        Ok(Vec::new())
    }
}

/// Generator whose setup fails
#[derive(Default)]
struct Broken;

impl Filter for Broken {
    fn setup(&mut self, _ctx: &mut FilterContext) -> anyhow::Result<()> {
        Err(anyhow!("broken on purpose"))
    }

    fn process(&mut self, _ctx: &mut FilterContext, _tick: &Tick) -> anyhow::Result<Vec<Frame>> {
        Ok(Vec::new())
    }
}

// =============================================================================
// Coordinated exit (S4 shape)
// =============================================================================

#[test]
fn test_coordinated_exit_protocol() {
    // X exits on its own and propagates; Y obeys; Z has neither knob but
    // is stopped once the quorum (X alone) is satisfied.
    let nodes = vec![
        FilterNode::new::<Idle>(
            "X",
            config(&[
                ("exit_after", Data::Str("0.3".into())),
                ("propagate_exit", Data::Bool(true)),
                ("obey_exit", Data::Bool(false)),
                ("stop_exit", Data::Bool(true)),
            ]),
        ),
        FilterNode::new::<Idle>(
            "Y",
            config(&[
                ("propagate_exit", Data::Bool(false)),
                ("obey_exit", Data::Bool(true)),
            ]),
        ),
        FilterNode::new::<Idle>(
            "Z",
            config(&[
                ("propagate_exit", Data::Bool(false)),
                ("obey_exit", Data::Bool(false)),
            ]),
        ),
    ];

    let status = run_multi_with(nodes, options());

    assert!(status.ok(), "{status:?}");
    assert_eq!(status.exit_code(), 0);
    for id in ["x", "y", "z"] {
        assert_eq!(status.child(id).unwrap().status, ChildStatus::Ok, "{id}");
    }
}

#[test]
fn test_all_children_share_run_id() {
    struct RunIdProbe {
        seen: Arc<Mutex<Vec<String>>>,
    }
    impl Filter for RunIdProbe {
        fn setup(&mut self, ctx: &mut FilterContext) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(ctx.run_id.clone());
            Ok(())
        }
        fn process(&mut self, _ctx: &mut FilterContext, _tick: &Tick) -> anyhow::Result<Vec<Frame>> {
            Ok(Vec::new())
        }
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    let nodes = (0..3)
        .map(|i| {
            let seen = Arc::clone(&seen);
            FilterNode::with_factory(
                format!("Probe{i}"),
                config(&[
                    ("exit_after", Data::Str("0.1".into())),
                    ("stop_exit", Data::Bool(true)),
                ]),
                move || Box::new(RunIdProbe { seen }),
            )
        })
        .collect();

    let status = run_multi_with(nodes, options());
    assert!(status.ok());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|run_id| run_id == "launch-test"));
}

// =============================================================================
// Exit codes
// =============================================================================

#[test]
fn test_failed_child_exit_code() {
    let nodes = vec![FilterNode::new::<Broken>("Broken", config(&[]))];
    let status = run_multi_with(nodes, options());

    assert!(!status.ok());
    assert_eq!(status.exit_code(), 1);
    assert!(matches!(
        status.children[0].status,
        ChildStatus::Failed(_)
    ));
}

#[test]
fn test_config_error_exit_code() {
    let nodes = vec![FilterNode::new::<Idle>(
        "Idle",
        config(&[("sources", Data::Str("not a uri".into()))]),
    )];
    let status = run_multi_with(nodes, options());

    assert_eq!(status.exit_code(), 2);
    assert!(matches!(
        status.children[0].status,
        ChildStatus::ConfigError(_)
    ));
}

#[test]
fn test_duplicate_ids_are_disambiguated() {
    let nodes = vec![
        FilterNode::new::<Idle>(
            "Twin",
            config(&[
                ("exit_after", Data::Str("0.1".into())),
                ("stop_exit", Data::Bool(true)),
            ]),
        ),
        FilterNode::new::<Idle>(
            "Twin",
            config(&[
                ("exit_after", Data::Str("0.1".into())),
                ("stop_exit", Data::Bool(true)),
            ]),
        ),
    ];
    let status = run_multi_with(nodes, options());
    assert!(status.ok());

    let ids: Vec<&str> = status.children.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
}

// =============================================================================
// One-hop pipeline over TCP (S1 shape)
// =============================================================================

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn test_pixels() -> Vec<u8> {
    vec![
        0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00, //
        0xFF, 0x00, 0x00, 0xFF, 0xFF, 0xFF,
    ]
}

/// Produces three 2x2 BGR frames, then idles until exit_after fires
struct Producer {
    produced: u32,
}

impl Filter for Producer {
    fn setup(&mut self, _ctx: &mut FilterContext) -> anyhow::Result<()> {
        // Give the downstream subscriber time to handshake so frame 1 is
        // not published into the void.
        std::thread::sleep(Duration::from_millis(400));
        Ok(())
    }

    fn process(&mut self, _ctx: &mut FilterContext, _tick: &Tick) -> anyhow::Result<Vec<Frame>> {
        std::thread::sleep(Duration::from_millis(20));
        if self.produced >= 3 {
            return Ok(Vec::new());
        }
        self.produced += 1;
        let image = Image::from_pixels(2, 2, PixelFormat::Bgr, test_pixels())?;
        let mut frame = Frame::from_image(image);
        frame.set_topic("main");
        Ok(vec![frame])
    }
}

/// Collects ids and pixels of everything it sees on `main`
struct Collector {
    seen: Arc<Mutex<Vec<(i64, Vec<u8>)>>>,
}

impl Filter for Collector {
    fn process(&mut self, _ctx: &mut FilterContext, tick: &Tick) -> anyhow::Result<Vec<Frame>> {
        if let Some(frame) = tick.get("main") {
            let pixels = frame
                .image()
                .map(|img| img.pixels().to_vec())
                .unwrap_or_default();
            self.seen
                .lock()
                .unwrap()
                .push((frame.id().unwrap_or(-1), pixels));
        }
        Ok(Vec::new())
    }
}

#[test]
fn test_one_hop_pipeline() {
    let port = free_port();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);

    let nodes = vec![
        FilterNode::with_factory(
            "Producer",
            config(&[
                ("outputs", Data::Str(format!("tcp://*:{port}"))),
                ("exit_after", Data::Str("2".into())),
                ("stop_exit", Data::Bool(true)),
            ]),
            || Box::new(Producer { produced: 0 }),
        ),
        FilterNode::with_factory(
            "Collector",
            config(&[
                ("sources", Data::Str(format!("tcp://127.0.0.1:{port}"))),
                ("stop_exit", Data::Bool(true)),
            ]),
            move || Box::new(Collector { seen: seen_clone }),
        ),
    ];

    let status = run_multi_with(nodes, options());
    assert!(status.ok(), "{status:?}");

    let seen = seen.lock().unwrap();
    let ids: Vec<i64> = seen.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![1, 2, 3], "expected exactly the three frames in order");
    for (_, pixels) in seen.iter() {
        assert_eq!(pixels, &test_pixels());
    }
}

// =============================================================================
// Startup timeout
// =============================================================================

#[test]
fn test_startup_timeout_reported() {
    struct NeverReady;
    impl Filter for NeverReady {
        fn setup(&mut self, _ctx: &mut FilterContext) -> anyhow::Result<()> {
            std::thread::sleep(Duration::from_secs(60));
            Ok(())
        }
        fn process(&mut self, _ctx: &mut FilterContext, _tick: &Tick) -> anyhow::Result<Vec<Frame>> {
            Ok(Vec::new())
        }
    }

    let mut opts = options();
    opts.startup_timeout = Duration::from_millis(300);
    opts.shutdown_grace = Duration::from_millis(300);

    let nodes = vec![FilterNode::with_factory("Slow", config(&[]), || {
        Box::new(NeverReady)
    })];
    let status = run_multi_with(nodes, opts);

    assert!(!status.ok());
    assert_eq!(status.exit_code(), 1);
    assert_eq!(status.children[0].status, ChildStatus::StartupTimeout);
}
