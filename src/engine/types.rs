//! Trajectory and analysis types exchanged with the detection engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single pointer sample recorded by the client.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub x: f64,
    pub y: f64,
}

/// An ordered pointer trajectory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    samples: Vec<Sample>,
}

impl Trajectory {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Milliseconds between consecutive samples.
    pub fn intervals_ms(&self) -> Vec<f64> {
        self.samples
            .windows(2)
            .map(|pair| {
                let delta = pair[1].timestamp - pair[0].timestamp;
                delta.num_microseconds().unwrap_or(i64::MAX) as f64 / 1000.0
            })
            .collect()
    }

    /// Length of the diagonal of the bounding box around all samples.
    pub fn extent(&self) -> f64 {
        let mut iter = self.samples.iter();
        let Some(first) = iter.next() else {
            return 0.0;
        };

        let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
        for s in iter {
            min_x = min_x.min(s.x);
            max_x = max_x.max(s.x);
            min_y = min_y.min(s.y);
            max_y = max_y.max(s.y);
        }
        (max_x - min_x).hypot(max_y - min_y)
    }
}

/// Classification of a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Human,
    Macro,
}

/// Result of analysing one trajectory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    /// Mean deviation from the smoothed path, normalised by the path extent.
    pub error_mean: f64,
    /// Coefficient of variation of the sampling intervals.
    pub interval_cv: f64,
    pub verdict: Verdict,
    pub samples: usize,
}
