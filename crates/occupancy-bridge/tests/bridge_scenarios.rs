// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end runs of the ingestion loop against scripted serial streams.

use occupancy_bridge::{
    Bridge, ConnectionManager, DocumentPaths, Event, MemoryStore, SinkWriter, StopHandle,
    StreamSource,
};
use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const DELAY: Duration = Duration::from_millis(20);

enum Step {
    Data(&'static str),
    Fail(io::ErrorKind),
    Idle,
}

/// Stream replaying its steps, then reporting end of stream.
struct ScriptedStream {
    steps: VecDeque<Step>,
    open_handles: Arc<AtomicUsize>,
    idle_forever: bool,
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.steps.pop_front() {
            Some(Step::Data(text)) => {
                let bytes = text.as_bytes();
                assert!(bytes.len() <= buf.len(), "script chunk too large");
                buf[..bytes.len()].copy_from_slice(bytes);
                Ok(bytes.len())
            }
            Some(Step::Fail(kind)) => Err(io::Error::new(kind, "scripted failure")),
            Some(Step::Idle) => Err(io::Error::new(io::ErrorKind::TimedOut, "poll")),
            None if self.idle_forever => {
                std::thread::sleep(Duration::from_millis(5));
                Err(io::Error::new(io::ErrorKind::TimedOut, "poll"))
            }
            None => Ok(0),
        }
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Each open consumes one script; once they run out the source requests
/// shutdown so `run()` returns.
struct ScriptedSource {
    scripts: VecDeque<Option<Vec<Step>>>,
    open_handles: Arc<AtomicUsize>,
    open_times: Arc<Mutex<Vec<Instant>>>,
    idle_forever: bool,
    stop: StopHandle,
}

impl ScriptedSource {
    fn new(scripts: Vec<Option<Vec<Step>>>, stop: StopHandle) -> Self {
        Self {
            scripts: scripts.into(),
            open_handles: Arc::new(AtomicUsize::new(0)),
            open_times: Arc::new(Mutex::new(Vec::new())),
            idle_forever: false,
            stop,
        }
    }
}

impl StreamSource for ScriptedSource {
    type Stream = ScriptedStream;

    fn open(&mut self) -> io::Result<ScriptedStream> {
        self.open_times.lock().unwrap().push(Instant::now());
        match self.scripts.pop_front() {
            Some(Some(steps)) => {
                self.open_handles.fetch_add(1, Ordering::SeqCst);
                Ok(ScriptedStream {
                    steps: steps.into(),
                    open_handles: self.open_handles.clone(),
                    idle_forever: self.idle_forever,
                })
            }
            Some(None) => Err(io::Error::new(io::ErrorKind::NotFound, "port absent")),
            None => {
                self.stop.stop();
                Err(io::Error::new(io::ErrorKind::NotFound, "script exhausted"))
            }
        }
    }

    fn endpoint(&self) -> &str {
        "/dev/rfcomm-test"
    }
}

fn bridge(
    source: ScriptedSource,
    store: &MemoryStore,
    stop: StopHandle,
) -> Bridge<ScriptedSource, MemoryStore> {
    Bridge::new(
        ConnectionManager::new(source, DELAY),
        SinkWriter::new(store.clone(), DocumentPaths::default()),
    )
    .with_stop_handle(stop)
}

#[test]
fn test_read_failure_reconnects_after_fixed_delay() {
    let stop = StopHandle::new();
    let source = ScriptedSource::new(
        vec![
            Some(vec![
                Step::Data("COUNT:1,USAGE_S:10,LIGHT:ON\n"),
                Step::Fail(io::ErrorKind::BrokenPipe),
            ]),
            None,
            Some(vec![Step::Data("COUNT:0,USAGE_S:11,LIGHT:OFF\n")]),
        ],
        stop.clone(),
    );
    let open_times = source.open_times.clone();
    let open_handles = source.open_handles.clone();
    let store = MemoryStore::new();

    let mut bridge = bridge(source, &store, stop);
    bridge.run();

    let paths = DocumentPaths::default();
    let history = store.collection(&paths.history_collection);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].event, Event::Occupied);
    assert_eq!(history[1].event, Event::Empty);
    assert_eq!(store.document(&paths.live_document).unwrap().count, 0);

    // broken pipe on the first stream, EOF on the second
    assert_eq!(bridge.stats().read_failures, 2);
    // second stream came up after the broken pipe; the EOF loss never recovers
    assert_eq!(bridge.stats().reconnects, 1);
    assert_eq!(bridge.connection().stats().read_failures, 2);
    assert_eq!(bridge.connection().stats().connects, 2);
    assert_eq!(bridge.connection().stats().connect_attempts, 4);

    let times = open_times.lock().unwrap();
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= DELAY, "reconnect faster than delay");
    }
    assert_eq!(open_handles.load(Ordering::SeqCst), 0);
}

#[test]
fn test_history_failure_keeps_loop_running() {
    let stop = StopHandle::new();
    let source = ScriptedSource::new(
        vec![Some(vec![
            Step::Data("COUNT:2,USAGE_S:60,LIGHT:ON\n"),
            Step::Data("boot v1.2\n"),
            Step::Data("COUNT:3,USAGE_S:61,LIGHT:ON\n"),
        ])],
        stop.clone(),
    );
    let store = MemoryStore::new();
    store.fail_history(true);

    let mut bridge = bridge(source, &store, stop);
    bridge.run();

    let paths = DocumentPaths::default();
    assert_eq!(store.document(&paths.live_document).unwrap().count, 3);
    assert!(store.collection(&paths.history_collection).is_empty());

    let stats = bridge.stats();
    assert_eq!(stats.live_writes, 2);
    assert_eq!(stats.history_write_failures, 2);
    assert_eq!(stats.diagnostic_lines, 1);
}

#[test]
fn test_bad_lines_do_not_stop_ingestion() {
    let stop = StopHandle::new();
    let source = ScriptedSource::new(
        vec![Some(vec![
            Step::Data("COUNT:5,LIGHT:ON\n"),
            Step::Data("COUNT:x,USAGE_S:1,LIGHT:ON\n"),
            Step::Data("\r\n"),
            Step::Data("COUNT:4,USA"),
            Step::Idle,
            Step::Data("GE_S:7,LIGHT:OFF\r\n"),
        ])],
        stop.clone(),
    );
    let store = MemoryStore::new();

    let mut bridge = bridge(source, &store, stop);
    bridge.run();

    let history = store.collection(&DocumentPaths::default().history_collection);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].count, 4);
    assert_eq!(history[0].usage_s, 7);
    assert_eq!(history[0].light, "OFF");
    assert_eq!(bridge.stats().parse_errors, 2);
}

#[test]
fn test_live_outage_drops_readings_without_retry() {
    let stop = StopHandle::new();
    let source = ScriptedSource::new(
        vec![Some(vec![
            Step::Data("COUNT:1,USAGE_S:1,LIGHT:ON\n"),
            Step::Data("COUNT:2,USAGE_S:2,LIGHT:ON\n"),
        ])],
        stop.clone(),
    );
    let store = MemoryStore::new();
    store.fail_live(true);

    let mut bridge = bridge(source, &store, stop);
    bridge.run();

    assert_eq!(store.document_count(), 0);
    assert!(store
        .collection(&DocumentPaths::default().history_collection)
        .is_empty());
    assert_eq!(bridge.stats().live_write_failures, 2);
    assert_eq!(bridge.stats().readings_parsed, 2);
}

#[test]
fn test_shutdown_during_blocked_read_releases_handle() {
    let stop = StopHandle::new();
    let mut source = ScriptedSource::new(
        vec![Some(vec![Step::Data("COUNT:1,USAGE_S:1,LIGHT:ON\n")])],
        stop.clone(),
    );
    source.idle_forever = true;
    let open_handles = source.open_handles.clone();
    let store = MemoryStore::new();

    let remote = stop.clone();
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        remote.stop();
    });

    let mut bridge = bridge(source, &store, stop);
    let started = Instant::now();
    bridge.run();
    stopper.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(open_handles.load(Ordering::SeqCst), 0);
    assert_eq!(bridge.stats().live_writes, 1);
    assert!(!bridge.connection().is_connected());
}
