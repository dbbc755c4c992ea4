//! Where location fixes come from: the engine only sees `FixSource`.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crossbeam::channel::Receiver;
use flate2::read::GzDecoder;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{TrackerError, TrackerResult};
use crate::session::LifecycleEvent;
use crate::tracker::WorkoutTracker;
use crate::types::{LocationFix, OutcomeCounts};

/// Pull-based stream of fixes. `None` means the source is exhausted.
pub trait FixSource {
    fn next_fix(&mut self) -> Option<LocationFix>;
}

impl<F: FixSource + ?Sized> FixSource for Box<F> {
    fn next_fix(&mut self) -> Option<LocationFix> {
        (**self).next_fix()
    }
}

/// Fixed, in-memory sequence.
#[derive(Debug, Default)]
pub struct ReplaySource {
    fixes: VecDeque<LocationFix>,
}

impl ReplaySource {
    pub fn new(fixes: impl IntoIterator<Item = LocationFix>) -> Self {
        Self {
            fixes: fixes.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.fixes.len()
    }
}

impl FixSource for ReplaySource {
    fn next_fix(&mut self) -> Option<LocationFix> {
        self.fixes.pop_front()
    }
}

/// Blocking receiver side of a crossbeam channel; ends when all senders drop.
pub struct ChannelSource {
    rx: Receiver<LocationFix>,
}

impl ChannelSource {
    pub fn new(rx: Receiver<LocationFix>) -> Self {
        Self { rx }
    }
}

impl FixSource for ChannelSource {
    fn next_fix(&mut self) -> Option<LocationFix> {
        self.rx.recv().ok()
    }
}

/// One JSON `LocationFix` per line. Blank lines are skipped, malformed
/// lines (bad JSON or bad UTF-8) are logged and skipped, a read error ends
/// the stream.
pub struct NdjsonSource<R> {
    reader: R,
    line_no: usize,
    skipped: usize,
    buf: Vec<u8>,
}

impl<R: BufRead> NdjsonSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            skipped: 0,
            buf: Vec::new(),
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead> FixSource for NdjsonSource<R> {
    fn next_fix(&mut self) -> Option<LocationFix> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    warn!("[source] read failed after line {}: {}", self.line_no, e);
                    return None;
                }
            }
            self.line_no += 1;

            if self.buf.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<LocationFix>(&self.buf) {
                Ok(fix) => return Some(fix),
                Err(e) => {
                    self.skipped += 1;
                    warn!("[source] skipping line {}: {}", self.line_no, e);
                }
            }
        }
    }
}

/// Drive `source` to exhaustion through `tracker`, tallying outcomes.
pub fn pump<S: FixSource + ?Sized>(source: &mut S, tracker: &WorkoutTracker) -> OutcomeCounts {
    let mut counts = OutcomeCounts::default();
    while let Some(fix) = source.next_fix() {
        counts.record(tracker.ingest(fix));
    }
    counts
}

/// Lifecycle call recorded alongside the fixes of a replay log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleMark {
    pub timestamp_ms: i64,
    pub event: LifecycleEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplayItem {
    Fix(LocationFix),
    Event(LifecycleMark),
}

impl ReplayItem {
    pub fn timestamp_ms(&self) -> i64 {
        match self {
            ReplayItem::Fix(fix) => fix.timestamp_ms,
            ReplayItem::Event(mark) => mark.timestamp_ms,
        }
    }
}

/// Recorded workout: fixes in delivery order plus lifecycle marks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayLog {
    pub fixes: Vec<LocationFix>,
    #[serde(default)]
    pub events: Vec<LifecycleMark>,
}

impl ReplayLog {
    /// Merge events into the fix stream. Fix delivery order is preserved
    /// (out-of-order timestamps stay out of order); each event is emitted
    /// just before the first fix stamped at or after it.
    pub fn timeline(&self) -> Vec<ReplayItem> {
        let mut events: Vec<LifecycleMark> = self.events.clone();
        events.sort_by_key(|e| e.timestamp_ms);
        let mut pending = events.into_iter().peekable();

        let mut items = Vec::with_capacity(self.fixes.len() + self.events.len());
        for fix in &self.fixes {
            while let Some(mark) = pending.next_if(|m| m.timestamp_ms <= fix.timestamp_ms) {
                items.push(ReplayItem::Event(mark));
            }
            items.push(ReplayItem::Fix(*fix));
        }
        items.extend(pending.map(ReplayItem::Event));
        items
    }

    pub fn from_reader<R: Read>(reader: R, path: &Path) -> TrackerResult<Self> {
        serde_json::from_reader(BufReader::new(reader)).map_err(|e| TrackerError::parse(path, e))
    }

    /// Load `*.json` or gzip-compressed `*.json.gz`.
    pub fn load(path: &Path) -> TrackerResult<Self> {
        let file = File::open(path).map_err(|e| TrackerError::io(path, e))?;
        if path.extension().map(|e| e == "gz").unwrap_or(false) {
            Self::from_reader(GzDecoder::new(file), path)
        } else {
            Self::from_reader(file, path)
        }
    }
}
