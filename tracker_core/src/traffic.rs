//! Hive traffic: per-track summaries, significance filtering, and counting
//! bees that enter or leave the hive entrance.
//!
//! The entrance is modelled as a rotated ellipse in image coordinates. Its
//! upper half (negative y in the ellipse frame, i.e. towards the top of the
//! image) is the inside of the hive; anything else is outside.

use crate::{
    track::Track,
    types::{FrameIndex, TrackId},
};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Track summaries
// ---------------------------------------------------------------------------

/// Condensed record of one track's matched observations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub track_id: TrackId,
    pub first_frame: FrameIndex,
    pub last_frame: FrameIndex,
    pub first_position: (f64, f64),
    pub last_position: (f64, f64),
    /// Detections matched to (or spawning) the track
    pub matched_positions: usize,
    /// Summed distance between prediction and matched detection
    pub distance: f64,
}

impl TrackSummary {
    pub fn from_track(track: &Track) -> Self {
        let first = track.observations.first();
        let last = track.observations.last();
        let pos = |o: Option<&(FrameIndex, crate::types::ObsVec)>| {
            o.map_or((f64::NAN, f64::NAN), |(_, z)| (z[0], z[1]))
        };
        Self {
            track_id: track.id,
            first_frame: first.map_or(track.born_frame, |o| o.0),
            last_frame: last.map_or(track.born_frame, |o| o.0),
            first_position: pos(first),
            last_position: pos(last),
            matched_positions: track.observations.len(),
            distance: track.distance,
        }
    }
}

/// Keeps only tracks long enough to be a real bee rather than detector noise.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinTrackFilter {
    /// Strict lower bound on matched positions
    pub min_positions: usize,
    /// Strict lower bound on summed distance (px)
    pub min_distance: f64,
}

impl Default for MinTrackFilter {
    fn default() -> Self {
        Self {
            min_positions: 5,
            min_distance: 100.0,
        }
    }
}

impl MinTrackFilter {
    pub fn accepts(&self, s: &TrackSummary) -> bool {
        s.matched_positions > self.min_positions && s.distance > self.min_distance
    }

    /// Significant tracks, longest first (ties by identity).
    pub fn apply(&self, summaries: &[TrackSummary]) -> Vec<TrackSummary> {
        let mut kept: Vec<TrackSummary> = summaries
            .iter()
            .filter(|s| self.accepts(s))
            .cloned()
            .collect();
        kept.sort_by(|a, b| {
            b.matched_positions
                .cmp(&a.matched_positions)
                .then(a.track_id.cmp(&b.track_id))
        });
        kept
    }
}

// ---------------------------------------------------------------------------
// Entrance ellipse
// ---------------------------------------------------------------------------

/// Quadrant of a point relative to the entrance ellipse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quadrant {
    UpperLeft,
    UpperRight,
    LowerLeft,
    LowerRight,
    Outside,
}

impl Quadrant {
    /// Upper quadrants are inside the hive.
    pub fn is_inside(&self) -> bool {
        matches!(self, Self::UpperLeft | Self::UpperRight)
    }
}

/// Rotated ellipse marking the hive entrance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntranceEllipse {
    /// Centre (h, k)
    pub center: (f64, f64),
    /// Full axis lengths (width, height)
    pub axes: (f64, f64),
    /// Rotation in degrees
    pub angle_deg: f64,
}

impl EntranceEllipse {
    pub fn quadrant(&self, (x, y): (f64, f64)) -> Quadrant {
        let (h, k) = self.center;
        let a = self.axes.0 / 2.0;
        let b = self.axes.1 / 2.0;
        let theta = self.angle_deg.to_radians();

        // Rotate into the axis-aligned ellipse frame
        let (xp, yp) = (x - h, y - k);
        let x_rot = xp * (-theta).cos() - yp * (-theta).sin();
        let y_rot = xp * (-theta).sin() + yp * (-theta).cos();

        if (x_rot * x_rot) / (a * a) + (y_rot * y_rot) / (b * b) > 1.0 {
            return Quadrant::Outside;
        }
        match (x_rot <= 0.0, y_rot <= 0.0) {
            (true, true) => Quadrant::UpperRight,
            (false, true) => Quadrant::LowerRight,
            (true, false) => Quadrant::UpperLeft,
            (false, false) => Quadrant::LowerLeft,
        }
    }

    /// Direction of travel between a track's first and last position.
    pub fn direction(&self, start: (f64, f64), end: (f64, f64)) -> Direction {
        match (
            self.quadrant(start).is_inside(),
            self.quadrant(end).is_inside(),
        ) {
            (true, true) => Direction::Inside,
            (true, false) => Direction::Exit,
            (false, true) => Direction::Enter,
            (false, false) => Direction::Outside,
        }
    }
}

/// How a track moved relative to the hive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inside,
    Enter,
    Exit,
    Outside,
}

/// Per-direction track counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficCounts {
    pub enter: u64,
    pub exit: u64,
    pub inside: u64,
    pub outside: u64,
}

impl TrafficCounts {
    pub fn record(&mut self, direction: Direction) {
        match direction {
            Direction::Inside => self.inside += 1,
            Direction::Enter => self.enter += 1,
            Direction::Exit => self.exit += 1,
            Direction::Outside => self.outside += 1,
        }
    }

    /// Count the directions of `tracks` through `entrance`.
    pub fn count(entrance: &EntranceEllipse, tracks: &[TrackSummary]) -> Self {
        let mut counts = Self::default();
        for t in tracks {
            counts.record(entrance.direction(t.first_position, t.last_position));
        }
        counts
    }

    pub fn total(&self) -> u64 {
        self.enter + self.exit + self.inside + self.outside
    }
}
