// RailCheck - Anomaly injection
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Defect injection for simulated runs.
//!
//! Each sample gets an independent Bernoulli trial. Nothing is carried
//! between calls, so defects may land on consecutive samples.

use crate::record::{round_to, Defect, DefectType, DEFECT_POSITION_RANGE_M};
use rand::Rng;

/// Default probability of a defect on any sample.
pub const DEFAULT_ANOMALY_RATE: f64 = 0.04;

/// Decides, per sample, whether a defect occurs and what it looks like.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnomalyInjector;

impl AnomalyInjector {
    /// Create a new injector.
    pub fn new() -> Self {
        Self
    }

    /// Run one trial with success probability `anomaly_rate`.
    ///
    /// On success the type is drawn uniformly from
    /// [`DefectType::SIMULATED`] and the sub-position uniformly from
    /// [0, 100] m, rounded to the millimeter. `anomaly_rate` must already be
    /// validated to lie in [0, 1]; values outside are clamped and NaN is
    /// treated as 0.
    pub fn maybe_inject(&self, anomaly_rate: f64, rng: &mut (impl Rng + ?Sized)) -> Option<Defect> {
        let p = if anomaly_rate.is_nan() {
            0.0
        } else {
            anomaly_rate.clamp(0.0, 1.0)
        };
        if !rng.gen_bool(p) {
            return None;
        }
        Some(self.inject(rng))
    }

    /// Draw a defect unconditionally.
    pub fn inject(&self, rng: &mut (impl Rng + ?Sized)) -> Defect {
        let index = rng.gen_range(0..DefectType::SIMULATED.len());
        let defect_type = DefectType::SIMULATED[index].clone();
        let (low, high) = DEFECT_POSITION_RANGE_M;
        let position_m = round_to(rng.gen_range(low..=high), 3);
        Defect::new(defect_type, position_m)
    }
}
