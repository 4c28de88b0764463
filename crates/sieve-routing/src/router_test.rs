//! Tests for the output router

use sieve_config::TopicMap;
use sieve_protocol::{DataMap, Frame};
use tokio::sync::mpsc;

use crate::router::OutputRouter;

fn frame(topic: &str, id: i64) -> Frame {
    let mut frame = Frame::from_data(DataMap::new());
    frame.set_meta_field("id", id);
    frame.set_topic(topic);
    frame
}

#[tokio::test]
async fn test_identity_routing() {
    let mut router = OutputRouter::new();
    let (tx, mut rx) = mpsc::channel(8);
    router.add_lane("out0", vec![TopicMap::identity("main")], tx);

    let reached = router.route(frame("main", 1)).await;
    assert_eq!(reached, 1);

    let routed = rx.recv().await.unwrap();
    assert_eq!(routed.topic(), "main");
    assert_eq!(routed.id(), Some(1));
}

#[tokio::test]
async fn test_topic_rewrite() {
    let mut router = OutputRouter::new();
    let (tx, mut rx) = mpsc::channel(8);
    router.add_lane(
        "out0",
        vec![TopicMap {
            src: "detections".into(),
            dst: "main".into(),
        }],
        tx,
    );

    router.route(frame("detections", 2)).await;
    let routed = rx.recv().await.unwrap();
    assert_eq!(routed.topic(), "main");
}

#[tokio::test]
async fn test_fan_out_to_multiple_lanes() {
    let mut router = OutputRouter::new();
    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, mut rx_b) = mpsc::channel(8);
    router.add_lane("a", vec![TopicMap::identity("main")], tx_a);
    router.add_lane("b", vec![TopicMap::wildcard()], tx_b);

    let reached = router.route(frame("main", 3)).await;
    assert_eq!(reached, 2);
    assert_eq!(rx_a.recv().await.unwrap().id(), Some(3));
    assert_eq!(rx_b.recv().await.unwrap().id(), Some(3));
}

#[tokio::test]
async fn test_wildcard_lane_passes_topic_through() {
    let mut router = OutputRouter::new();
    let (tx, mut rx) = mpsc::channel(8);
    router.add_lane("all", vec![TopicMap::wildcard()], tx);

    router.route(frame("plates", 4)).await;
    assert_eq!(rx.recv().await.unwrap().topic(), "plates");
}

#[tokio::test]
async fn test_unroutable_topic_dropped_and_counted() {
    let mut router = OutputRouter::new();
    let (tx, mut rx) = mpsc::channel(8);
    router.add_lane("out0", vec![TopicMap::identity("main")], tx);

    assert_eq!(router.route(frame("stray", 5)).await, 0);
    assert_eq!(router.route(frame("stray", 6)).await, 0);
    assert_eq!(router.stats().frames_unroutable, 2);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_closed_lane_counts_failure() {
    let mut router = OutputRouter::new();
    let (tx, rx) = mpsc::channel(8);
    drop(rx);
    router.add_lane("gone", vec![TopicMap::identity("main")], tx);

    assert_eq!(router.route(frame("main", 7)).await, 0);
    assert_eq!(router.stats().lane_failures, 1);
}

#[tokio::test]
async fn test_route_all_preserves_order() {
    let mut router = OutputRouter::new();
    let (tx, mut rx) = mpsc::channel(8);
    router.add_lane("out0", vec![TopicMap::identity("main")], tx);

    let frames = vec![frame("main", 1), frame("main", 2), frame("main", 3)];
    assert_eq!(router.route_all(frames).await, 3);

    for expected in 1..=3 {
        assert_eq!(rx.recv().await.unwrap().id(), Some(expected));
    }
}
