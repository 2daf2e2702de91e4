//! Inventory scan liveness and cancellation.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use common::{init_tracing, session};
use taglink_core::TagType;
use taglink_hardware::{CancellationToken, InventoryScan, ScanConfig, ScanState, StopReason};

fn wait_for_visits(seen: &AtomicUsize, at_least: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while seen.load(Ordering::SeqCst) < at_least && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_endless_inventory_visits_while_streaming() {
    init_tracing();
    let (session, handle) = session();
    handle.add_tag(TagType::Gen2, &[0xE2, 0x00, 0x00, 0x01]);
    handle.add_tag(TagType::Gen2, &[0xE2, 0x00, 0x00, 0x02]);
    handle.set_endless_inventory(true);

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let mut running = InventoryScan::new(session, ScanConfig::default())
        .spawn(move |_tag| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        })
        .unwrap();

    wait_for_visits(&seen, 10);

    let started = Instant::now();
    let report = running.stop(Duration::from_secs(2)).unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(report.stop_reason.is_cancelled());
    assert_eq!(running.state(), ScanState::Stopped);

    // The round never completes, yet every streamed tag was visited.
    assert!(seen.load(Ordering::SeqCst) >= 10);
    assert_eq!(report.tags_visited, seen.load(Ordering::SeqCst) as u64);
    assert_eq!(report.iterations, 0);
}

#[test]
fn test_cancellation_is_deterministic_across_runs() {
    for run in 0..20 {
        let (session, handle) = session();
        handle.add_tag(TagType::Gen2, &[0xE2, run]);
        handle.set_endless_inventory(true);

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let mut running = InventoryScan::new(session, ScanConfig::default())
            .spawn(move |_tag| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            })
            .unwrap();
        wait_for_visits(&seen, 1);

        let report = running
            .stop(Duration::from_secs(2))
            .unwrap_or_else(|e| panic!("run {run} did not stop: {e}"));
        assert!(report.stop_reason.is_cancelled(), "run {run}");
        assert_eq!(running.state(), ScanState::Stopped, "run {run}");
    }
}

#[test]
fn test_stop_while_reader_is_silent() {
    let (session, handle) = session();
    handle.set_silent(true);

    let mut running = InventoryScan::new(session, ScanConfig::default())
        .spawn(|_tag| true)
        .unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while running.state() != ScanState::Discovering && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }

    let report = running.stop(Duration::from_secs(2)).unwrap();
    assert!(report.stop_reason.is_cancelled());
    assert_eq!(report.tags_visited, 0);
}

#[test]
fn test_stop_during_idle_pause() {
    let (session, handle) = session();
    handle.add_tag(TagType::Iso15693, &[0xE0, 0x04]);

    let config = ScanConfig::default().with_idle_delay(Duration::from_secs(30));
    let visited = Arc::new(AtomicUsize::new(0));
    let counter = visited.clone();
    let mut running = InventoryScan::new(session, config)
        .spawn(move |_tag| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        })
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while visited.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    let report = running.stop(Duration::from_secs(2)).unwrap();
    assert_eq!(report.iterations, 1);
    assert_eq!(report.tags_visited, 1);
    assert!(report.stop_reason.is_cancelled());
}

#[test]
fn test_filter_limits_visits() {
    let (session, handle) = session();
    handle.add_tag(TagType::Gen2, &[0xE2, 0x01]);
    handle.add_tag(TagType::Iso14443A, &[0x04, 0x01]);
    handle.add_tag(TagType::MifareUltralight, &[0x04, 0x02]);

    let config = ScanConfig::default()
        .with_tag_type(TagType::Iso14443A)
        .with_idle_delay(Duration::ZERO);
    let mut scan = InventoryScan::new(session, config);

    let token = CancellationToken::new();
    let stopper = token.clone();
    let mut types = Vec::new();
    let report = scan
        .run(
            |tag| {
                types.push(tag.tag_type);
                if types.len() == 2 {
                    stopper.cancel();
                }
                true
            },
            &token,
        )
        .unwrap();

    assert_eq!(types, [TagType::Iso14443A, TagType::MifareUltralight]);
    assert_eq!(report.tags_visited, 2);
}

#[test]
fn test_cancel_between_visits() {
    let (session, handle) = session();
    for id in 1..=5u8 {
        handle.add_tag(TagType::Gen2, &[0xE2, id]);
    }

    let token = CancellationToken::new();
    let stopper = token.clone();
    let mut scan = InventoryScan::new(session, ScanConfig::default());
    let report = scan
        .run(
            |_tag| {
                stopper.cancel();
                true
            },
            &token,
        )
        .unwrap();
    // The second tag is never visited, so the round does not count.
    assert_eq!(report.tags_visited, 1);
    assert_eq!(report.max_tags_per_iteration, 1);
    assert_eq!(report.iterations, 0);

    let (session, handle) = common::session();
    for id in 1..=5u8 {
        handle.add_tag(TagType::Gen2, &[0xE2, id]);
    }
    let token = CancellationToken::new();
    let stopper = token.clone();
    let mut scan = InventoryScan::new(session, ScanConfig::default().with_continue_after_each(false));
    let report = scan
        .run(
            |_tag| {
                stopper.cancel();
                true
            },
            &token,
        )
        .unwrap();
    // Tags already received are still visited; the token stops the scan
    // once the round is over.
    assert_eq!(report.tags_visited, 5);
    assert_eq!(report.iterations, 1);
}

#[test]
fn test_unplugged_reader_ends_scan() {
    let (session, handle) = session();
    handle.add_tag(TagType::Gen2, &[0xE2, 0x01]);
    let unplug = handle.clone();

    let mut scan = InventoryScan::new(session, ScanConfig::default().with_idle_delay(Duration::ZERO));
    let report = scan
        .run(
            move |_tag| {
                unplug.disconnect();
                true
            },
            &CancellationToken::new(),
        )
        .unwrap();

    assert!(matches!(report.stop_reason, StopReason::Fatal(ref e) if e.is_fatal()));
    assert_eq!(report.iterations, 1);
}
