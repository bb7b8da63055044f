//! Track history: the append-only table of per-frame track positions that
//! downstream consumers (result browsers, traffic counters) read.

use crate::{
    track::TrackStatus,
    types::{FrameIndex, TrackId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Position of one live track after one frame was processed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "frame_index")]
    pub frame: FrameIndex,
    pub track_id: TrackId,
    pub x: f64,
    pub y: f64,
    pub status: TrackStatus,
}

/// Ordered (frame, then track identity) record of every live track per frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackHistory {
    entries: Vec<HistoryEntry>,
}

impl TrackHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one frame's entries. Frames must arrive in increasing order.
    pub fn extend_frame(&mut self, entries: &[HistoryEntry]) {
        debug_assert!(entries
            .first()
            .zip(self.entries.last())
            .map_or(true, |(new, last)| new.frame > last.frame));
        self.entries.extend_from_slice(entries);
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry of one track, in frame order.
    pub fn for_track(&self, id: TrackId) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.entries.iter().filter(move |e| e.track_id == id)
    }

    /// Distinct track identities that appear in the history.
    pub fn track_ids(&self) -> BTreeSet<TrackId> {
        self.entries.iter().map(|e| e.track_id).collect()
    }

    pub fn last_frame(&self) -> Option<FrameIndex> {
        self.entries.last().map(|e| e.frame)
    }
}

impl<'a> IntoIterator for &'a TrackHistory {
    type Item = &'a HistoryEntry;
    type IntoIter = std::slice::Iter<'a, HistoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
