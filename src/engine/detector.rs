//! Default trajectory detector.
//!
//! Flags trajectories whose timing is too regular or whose path is too
//! smooth to come from a human hand.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Deserialize;
use uuid::Uuid;

use crate::config::validation::validate_engine;
use crate::config::EngineConfig;
use crate::engine::types::{Analysis, Trajectory, Verdict};
use crate::engine::{DetectionEngine, EngineError};

/// Threshold overrides read from an optional profile file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DetectorProfile {
    smoothing_window: Option<usize>,
    regularity_threshold: Option<f64>,
    error_threshold: Option<f64>,
}

/// Detector parameters after profile merging and validation.
#[derive(Debug, Clone)]
struct Params {
    min_samples: usize,
    half_window: usize,
    regularity_threshold: f64,
    error_threshold: f64,
}

#[derive(Debug)]
pub struct PatternDetector {
    id: Uuid,
    params: Params,
    analyses: AtomicU64,
    released: AtomicBool,
}

impl PatternDetector {
    /// Build a detector from configuration, reading the profile if one is set.
    pub fn load(config: &EngineConfig) -> Result<Self, EngineError> {
        let mut config = config.clone();
        if let Some(path) = config.profile.clone() {
            apply_profile(&mut config, &read_profile(&path)?);
        }

        let errors = validate_engine(&config);
        if !errors.is_empty() {
            let message = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(EngineError::InvalidConfig(message));
        }

        let detector = Self {
            id: Uuid::new_v4(),
            params: Params {
                min_samples: config.min_samples,
                half_window: config.smoothing_window / 2,
                regularity_threshold: config.regularity_threshold,
                error_threshold: config.error_threshold,
            },
            analyses: AtomicU64::new(0),
            released: AtomicBool::new(false),
        };

        tracing::debug!(engine = %detector.id, params = ?detector.params, "Pattern detector built");
        Ok(detector)
    }

    /// Number of trajectories analysed so far.
    pub fn analyses(&self) -> u64 {
        self.analyses.load(Ordering::Relaxed)
    }

    /// Mean distance of each sample from the centroid of its neighbours.
    fn path_error(&self, trajectory: &Trajectory) -> f64 {
        let samples = trajectory.samples();
        let extent = trajectory.extent();
        if samples.is_empty() || extent == 0.0 {
            return 0.0;
        }

        let n = samples.len();
        let total: f64 = (0..n)
            .map(|i| {
                let lo = i.saturating_sub(self.params.half_window);
                let hi = (i + self.params.half_window).min(n - 1);
                let window = &samples[lo..=hi];
                let count = window.len() as f64;
                let cx = window.iter().map(|s| s.x).sum::<f64>() / count;
                let cy = window.iter().map(|s| s.y).sum::<f64>() / count;
                (samples[i].x - cx).hypot(samples[i].y - cy)
            })
            .sum();

        total / n as f64 / extent
    }
}

impl DetectionEngine for PatternDetector {
    fn instance_id(&self) -> Uuid {
        self.id
    }

    fn min_samples(&self) -> usize {
        self.params.min_samples
    }

    fn analyze(&self, trajectory: &Trajectory) -> Result<Analysis, EngineError> {
        if self.released.load(Ordering::Acquire) {
            return Err(EngineError::Released);
        }
        if trajectory.len() < self.params.min_samples {
            return Err(EngineError::InsufficientSamples {
                got: trajectory.len(),
                required: self.params.min_samples,
            });
        }

        let error_mean = self.path_error(trajectory);
        let interval_cv = coefficient_of_variation(&trajectory.intervals_ms());

        let verdict = if interval_cv < self.params.regularity_threshold
            || error_mean < self.params.error_threshold
        {
            Verdict::Macro
        } else {
            Verdict::Human
        };

        self.analyses.fetch_add(1, Ordering::Relaxed);

        Ok(Analysis {
            error_mean,
            interval_cv,
            verdict,
            samples: trajectory.len(),
        })
    }

    fn release(&self) -> Result<(), EngineError> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Err(EngineError::Released);
        }
        tracing::debug!(engine = %self.id, analyses = self.analyses(), "Pattern detector released");
        Ok(())
    }
}

fn read_profile(path: &Path) -> Result<DetectorProfile, EngineError> {
    let content = std::fs::read_to_string(path).map_err(|source| EngineError::ProfileIo {
        path: path.display().to_string(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

fn apply_profile(config: &mut EngineConfig, profile: &DetectorProfile) {
    if let Some(window) = profile.smoothing_window {
        config.smoothing_window = window;
    }
    if let Some(threshold) = profile.regularity_threshold {
        config.regularity_threshold = threshold;
    }
    if let Some(threshold) = profile.error_threshold {
        config.error_threshold = threshold;
    }
}

fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt() / mean
}
