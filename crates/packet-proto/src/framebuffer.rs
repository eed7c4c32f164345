//! Bounded, persisted ring of recently seen raw KISS frames (spec §2.1/§4.5 supplement,
//! grounded on `original_source/src/console/frame_history.py`'s bounded replay buffer and
//! on §6's "two files" on-disk-state line, which names a frame-buffer snapshot alongside
//! the station database). Used for debug replay; entries carry the same `seq` number a
//! `Station`'s `ReceptionEvent::frame_ref` points back at.
use crate::error::{Result, StationError};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Rx,
    Tx,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameBufferEntry {
    pub seq: u64,
    pub timestamp: f64,
    pub direction: Direction,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub struct FrameBuffer {
    capacity: usize,
    next_seq: u64,
    entries: VecDeque<FrameBufferEntry>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    next_seq: u64,
    entries: Vec<FrameBufferEntry>,
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_seq: 0,
            entries: VecDeque::new(),
        }
    }

    /// Appends `bytes` to the ring, evicting the oldest entry if at capacity. Returns
    /// the assigned sequence number.
    pub fn push(&mut self, direction: Direction, timestamp: f64, bytes: Vec<u8>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(FrameBufferEntry {
            seq,
            timestamp,
            direction,
            bytes,
        });
        seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameBufferEntry> {
        self.entries.iter()
    }

    pub fn get(&self, seq: u64) -> Option<&FrameBufferEntry> {
        self.entries.iter().find(|e| e.seq == seq)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot = SnapshotFile {
            next_seq: self.next_seq,
            entries: self.entries.iter().cloned().collect(),
        };
        let json = serde_json::to_vec(&snapshot)
            .map_err(|e| StationError::PersistenceError(e.to_string()))?;

        let tmp_path = path.with_extension("tmp");
        let file = File::create(&tmp_path)
            .map_err(|e| StationError::PersistenceError(e.to_string()))?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder
            .write_all(&json)
            .map_err(|e| StationError::PersistenceError(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| StationError::PersistenceError(e.to_string()))?;
        std::fs::rename(&tmp_path, path)
            .map_err(|e| StationError::PersistenceError(e.to_string()))?;
        Ok(())
    }

    pub fn load(path: &Path, capacity: usize) -> Result<Self> {
        let file = File::open(path).map_err(|e| StationError::PersistenceError(e.to_string()))?;
        let mut decoder = GzDecoder::new(file);
        let mut json = Vec::new();
        decoder
            .read_to_end(&mut json)
            .map_err(|e| StationError::PersistenceError(e.to_string()))?;
        let snapshot: SnapshotFile = serde_json::from_slice(&json)
            .map_err(|e| StationError::PersistenceError(e.to_string()))?;
        Ok(Self {
            capacity,
            next_seq: snapshot.next_seq,
            entries: snapshot.entries.into(),
        })
    }
}
