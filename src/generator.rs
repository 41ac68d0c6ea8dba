// RailCheck - Track simulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Synthetic measurement generation.
//!
//! The [`TrackSimulator`] drives a train along a track segment at constant
//! speed and samples its sensors at a fixed interval. Randomness comes from
//! an injected [`Rng`], so a seeded generator reproduces a run exactly.

use crate::anomalies::{AnomalyInjector, DEFAULT_ANOMALY_RATE};
use crate::error::{ConfigError, Result};
use crate::record::{
    round_to, MeasurementRecord, CATENARY_JITTER_M, CATENARY_MAX_M, CATENARY_MIN_M,
    CATENARY_NOMINAL_M, GAUGE_RANGE_MM, LATERAL_DEVIATION_MAX_M,
};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default train speed in km/h.
pub const DEFAULT_SPEED_KMH: f64 = 140.0;
/// Default sampling interval in seconds.
pub const DEFAULT_SAMPLE_INTERVAL_SECS: f64 = 0.1;
/// Default run duration in hours.
pub const DEFAULT_DURATION_HOURS: f64 = 0.1;

/// Generator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Timestamp of the first sample.
    pub start_time: NaiveDateTime,
    /// Run duration in hours.
    pub duration_hours: f64,
    /// Constant train speed in km/h.
    pub speed_kmh: f64,
    /// Interval between samples in seconds.
    pub sample_interval_secs: f64,
    /// Probability of a defect on each sample.
    pub anomaly_rate: f64,
    /// Random seed for reproducibility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            start_time: default_start_time(),
            duration_hours: DEFAULT_DURATION_HOURS,
            speed_kmh: DEFAULT_SPEED_KMH,
            sample_interval_secs: DEFAULT_SAMPLE_INTERVAL_SECS,
            anomaly_rate: DEFAULT_ANOMALY_RATE,
            seed: None,
        }
    }
}

/// 2024-01-15 08:00:00
fn default_start_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 15)
        .and_then(|d| d.and_hms_opt(8, 0, 0))
        .unwrap_or_default()
}

impl GeneratorConfig {
    /// Create a new generator config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set start timestamp.
    pub fn with_start_time(mut self, start_time: NaiveDateTime) -> Self {
        self.start_time = start_time;
        self
    }

    /// Set duration in hours.
    pub fn with_duration_hours(mut self, hours: f64) -> Self {
        self.duration_hours = hours;
        self
    }

    /// Set duration in minutes.
    pub fn with_duration_minutes(mut self, minutes: f64) -> Self {
        self.duration_hours = minutes / 60.0;
        self
    }

    /// Set train speed.
    pub fn with_speed_kmh(mut self, speed_kmh: f64) -> Self {
        self.speed_kmh = speed_kmh;
        self
    }

    /// Set sample interval in seconds.
    pub fn with_sample_interval_secs(mut self, secs: f64) -> Self {
        self.sample_interval_secs = secs;
        self
    }

    /// Set defect probability per sample.
    pub fn with_anomaly_rate(mut self, rate: f64) -> Self {
        self.anomaly_rate = rate;
        self
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Reject configurations no run can be produced from.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(self.speed_kmh.is_finite() && self.speed_kmh > 0.0) {
            return Err(ConfigError::NonPositiveSpeed(self.speed_kmh));
        }
        if !(self.sample_interval_secs.is_finite() && self.sample_interval_secs > 0.0) {
            return Err(ConfigError::NonPositiveInterval(self.sample_interval_secs));
        }
        if !(self.duration_hours.is_finite() && self.duration_hours >= 0.0) {
            return Err(ConfigError::NegativeDuration(self.duration_hours));
        }
        if !(0.0..=1.0).contains(&self.anomaly_rate) {
            return Err(ConfigError::RateOutOfRange(self.anomaly_rate));
        }
        if let Some(last) = self.num_samples().checked_sub(1) {
            if self.timestamp_at(last).is_none() {
                return Err(ConfigError::TimeOverflow {
                    start: self.start_time.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Number of samples: `floor(duration_hours * 3600 / interval)`.
    ///
    /// Only meaningful on a validated config.
    pub fn num_samples(&self) -> usize {
        let exact = self.duration_secs() / self.sample_interval_secs;
        // A few ulps absorb representation error such as 2.9999999999999996
        // without lifting a genuinely fractional quotient to the next integer
        (exact * (1.0 + 4.0 * f64::EPSILON)).floor() as usize
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.duration_hours * 3600.0
    }

    /// Speed in meters per second.
    pub fn speed_m_per_s(&self) -> f64 {
        self.speed_kmh / 3.6
    }

    /// Elapsed time of sample `index`, in whole microseconds.
    fn offset_micros(&self, index: usize) -> i64 {
        (index as f64 * self.sample_interval_secs * 1e6).round() as i64
    }

    fn timestamp_at(&self, index: usize) -> Option<NaiveDateTime> {
        self.start_time
            .checked_add_signed(Duration::microseconds(self.offset_micros(index)))
    }
}

/// Produces ordered measurement sequences for configured runs.
#[derive(Debug, Clone)]
pub struct TrackSimulator<R: Rng = StdRng> {
    rng: R,
    injector: AnomalyInjector,
}

impl TrackSimulator<StdRng> {
    /// Simulator with a reproducible random source.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Simulator seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Simulator seeded from `config.seed`, or from entropy when unset.
    pub fn for_config(config: &GeneratorConfig) -> Self {
        match config.seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }
}

impl<R: Rng> TrackSimulator<R> {
    /// Simulator drawing from the given random source.
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            injector: AnomalyInjector::new(),
        }
    }

    /// Lazily produce the records of a run.
    ///
    /// The configuration is validated up front; an invalid one yields an
    /// error and no records at all.
    pub fn stream(&mut self, config: &GeneratorConfig) -> Result<Run<'_, R>> {
        config.validate()?;
        let height = Normal::new(CATENARY_NOMINAL_M, CATENARY_JITTER_M)
            .map_err(|e| ConfigError::Distribution(e.to_string()))?;
        let count = config.num_samples();

        debug!(
            "Starting run: {} samples, {} km/h, {}s interval, rate {}",
            count, config.speed_kmh, config.sample_interval_secs, config.anomaly_rate
        );

        Ok(Run {
            rng: &mut self.rng,
            injector: self.injector,
            config: config.clone(),
            height,
            index: 0,
            count,
        })
    }

    /// Produce the full record sequence of a run.
    pub fn generate(&mut self, config: &GeneratorConfig) -> Result<Vec<MeasurementRecord>> {
        let records: Vec<MeasurementRecord> = self.stream(config)?.collect();
        debug!(
            "Run complete: {} records, {} defects",
            records.len(),
            records.iter().filter(|r| r.has_defect()).count()
        );
        Ok(records)
    }
}

/// Generate a run, honoring `config.seed`.
pub fn generate_run(config: &GeneratorConfig) -> Result<Vec<MeasurementRecord>> {
    TrackSimulator::for_config(config).generate(config)
}

/// Iterator over the samples of one simulated run.
pub struct Run<'a, R: Rng> {
    rng: &'a mut R,
    injector: AnomalyInjector,
    config: GeneratorConfig,
    height: Normal<f64>,
    index: usize,
    count: usize,
}

impl<R: Rng> Run<'_, R> {
    fn sample(&mut self, index: usize) -> Option<MeasurementRecord> {
        let offset_us = self.config.offset_micros(index);
        let timestamp = self.config.timestamp_at(index)?;
        let elapsed_s = offset_us as f64 / 1e6;
        let position_m = self.config.speed_m_per_s() * elapsed_s;

        // Memoryless: each height is an independent draw, clipped not resampled
        let height = self.height.sample(&mut *self.rng);
        let catenary_height_m = round_to(height.clamp(CATENARY_MIN_M, CATENARY_MAX_M), 2);
        let lateral_deviation_m = round_to(
            self.rng
                .gen_range(-LATERAL_DEVIATION_MAX_M..=LATERAL_DEVIATION_MAX_M),
            2,
        );
        let gauge_mm = round_to(self.rng.gen_range(GAUGE_RANGE_MM.0..=GAUGE_RANGE_MM.1), 1);
        let defect = self
            .injector
            .maybe_inject(self.config.anomaly_rate, &mut *self.rng);

        Some(MeasurementRecord {
            timestamp,
            position_m,
            speed_kmh: self.config.speed_kmh,
            catenary_height_m,
            lateral_deviation_m,
            gauge_mm,
            defect,
        })
    }
}

impl<R: Rng> Iterator for Run<'_, R> {
    type Item = MeasurementRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }
        let index = self.index;
        self.index += 1;
        self.sample(index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.index;
        (remaining, Some(remaining))
    }
}

impl<R: Rng> ExactSizeIterator for Run<'_, R> {}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn seconds_between(a: NaiveDateTime, b: NaiveDateTime) -> f64 {
        (b - a).num_microseconds().unwrap() as f64 / 1e6
    }

    #[test]
    fn test_generator_config_default() {
        let config = GeneratorConfig::default();
        assert_eq!(config.speed_kmh, 140.0);
        assert_eq!(config.sample_interval_secs, 0.1);
        assert_eq!(config.anomaly_rate, 0.04);
        assert_eq!(config.start_time.to_string(), "2024-01-15 08:00:00");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_num_samples() {
        let config = GeneratorConfig::new().with_duration_hours(0.1);
        assert_eq!(config.num_samples(), 3600);

        let config = GeneratorConfig::new()
            .with_duration_hours(1.0)
            .with_sample_interval_secs(0.7);
        // 3600 / 0.7 = 5142.857...
        assert_eq!(config.num_samples(), 5142);

        let config = GeneratorConfig::new().with_duration_minutes(1.5);
        assert_eq!(config.num_samples(), 900);
    }

    #[test]
    fn test_num_samples_is_a_true_floor() {
        // Quotient just below an integer stays below it
        let config = GeneratorConfig::new()
            .with_sample_interval_secs(1.0)
            .with_duration_hours(2.999_999_999_5 / 3600.0);
        assert_eq!(config.num_samples(), 2);

        // Representation noise around an integer is absorbed
        let config = GeneratorConfig::new()
            .with_sample_interval_secs(1.0)
            .with_duration_hours(3.0 / 3600.0);
        assert_eq!(config.num_samples(), 3);

        let config = GeneratorConfig::new()
            .with_sample_interval_secs(0.1)
            .with_duration_hours(0.3 / 3600.0);
        assert_eq!(config.num_samples(), 3);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let base = GeneratorConfig::new();
        let cases = [
            base.clone().with_speed_kmh(0.0),
            base.clone().with_speed_kmh(-10.0),
            base.clone().with_speed_kmh(f64::NAN),
            base.clone().with_sample_interval_secs(0.0),
            base.clone().with_sample_interval_secs(f64::INFINITY),
            base.clone().with_duration_hours(-0.5),
            base.clone().with_anomaly_rate(1.5),
            base.clone().with_anomaly_rate(-0.1),
            base.clone().with_anomaly_rate(f64::NAN),
        ];
        for config in &cases {
            let err = TrackSimulator::seeded(1).generate(config).unwrap_err();
            assert!(err.is_configuration(), "{config:?} gave {err}");
        }
    }

    #[test]
    fn test_invalid_config_yields_no_stream() {
        let mut sim = TrackSimulator::seeded(1);
        let config = GeneratorConfig::new().with_speed_kmh(0.0);
        assert!(matches!(
            sim.stream(&config),
            Err(crate::RailError::Configuration(ConfigError::NonPositiveSpeed(_)))
        ));
    }

    #[test]
    fn test_time_overflow_rejected() {
        let config = GeneratorConfig::new()
            .with_start_time(NaiveDateTime::MAX)
            .with_duration_hours(1.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TimeOverflow { .. })
        ));
    }

    #[test]
    fn test_zero_duration_is_empty() {
        let config = GeneratorConfig::new().with_duration_hours(0.0);
        let records = TrackSimulator::seeded(42).generate(&config).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_reference_run() {
        let config = GeneratorConfig::new().with_duration_hours(0.1);
        let records = TrackSimulator::seeded(42).generate(&config).unwrap();

        assert_eq!(records.len(), 3600);
        assert_eq!(records[0].timestamp, config.start_time);
        assert_eq!(records[0].position_m, 0.0);
        // 140 km/h over 359.9 s
        assert_relative_eq!(
            records[3599].position_m,
            140.0 / 3.6 * 359.9,
            epsilon = 1e-6
        );
        assert_eq!(
            records[1].timestamp.to_string(),
            "2024-01-15 08:00:00.100"
        );
    }

    #[test]
    fn test_positions_consistent_with_timestamps() {
        let config = GeneratorConfig::new()
            .with_duration_minutes(2.0)
            .with_speed_kmh(90.0)
            .with_sample_interval_secs(0.25);
        let records = TrackSimulator::seeded(7).generate(&config).unwrap();
        let speed = config.speed_m_per_s();

        for pair in records.windows(2) {
            assert!(pair[1].position_m > pair[0].position_m);
            assert!(pair[1].timestamp > pair[0].timestamp);
        }
        for (i, j) in [(0, 1), (3, 250), (17, records.len() - 1)] {
            let dt = seconds_between(records[i].timestamp, records[j].timestamp);
            assert_relative_eq!(
                records[j].position_m - records[i].position_m,
                speed * dt,
                epsilon = 1e-6
            );
        }
    }

    #[test]
    fn test_field_ranges() {
        let config = GeneratorConfig::new()
            .with_duration_minutes(5.0)
            .with_anomaly_rate(0.5);
        let records = TrackSimulator::seeded(3).generate(&config).unwrap();

        for record in &records {
            assert!(record.validate().is_ok(), "{record:?}");
            assert_eq!(record.speed_kmh, 140.0);
        }
    }

    #[test]
    fn test_height_centered_on_nominal() {
        let config = GeneratorConfig::new().with_duration_minutes(10.0);
        let records = TrackSimulator::seeded(11).generate(&config).unwrap();
        let mean = records.iter().map(|r| r.catenary_height_m).sum::<f64>() / records.len() as f64;
        assert!((mean - 5.5).abs() < 0.02, "mean {mean}");
    }

    #[test]
    fn test_full_rate_flags_every_sample() {
        let config = GeneratorConfig::new()
            .with_duration_minutes(1.0)
            .with_anomaly_rate(1.0);
        let records = TrackSimulator::seeded(5).generate(&config).unwrap();
        assert!(records.iter().all(|r| r.has_defect()));
        assert!(records
            .iter()
            .filter_map(|r| r.defect.as_ref())
            .all(|d| d.defect_type.is_known() && d.severity().is_some()));
    }

    #[test]
    fn test_reference_anomaly_count() {
        let config = GeneratorConfig::new().with_duration_hours(0.1).with_seed(2024);
        let first = generate_run(&config).unwrap();
        let second = generate_run(&config).unwrap();

        fn count(records: &[MeasurementRecord]) -> usize {
            records.iter().filter(|r| r.has_defect()).count()
        }
        assert_eq!(first.len(), 3600);
        assert_eq!(count(&first), count(&second));
        assert_eq!(count(&first), 155);
    }

    #[test]
    fn test_reproducibility() {
        let config = GeneratorConfig::new().with_duration_minutes(1.0);
        let a = TrackSimulator::seeded(12345).generate(&config).unwrap();
        let b = TrackSimulator::seeded(12345).generate(&config).unwrap();
        assert_eq!(a, b);

        let c = TrackSimulator::seeded(54321).generate(&config).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_stream_matches_generate() {
        let config = GeneratorConfig::new().with_duration_minutes(1.0);
        let mut sim = TrackSimulator::seeded(9);
        let run = sim.stream(&config).unwrap();
        assert_eq!(run.len(), 600);
        let streamed: Vec<_> = run.collect();

        let generated = TrackSimulator::seeded(9).generate(&config).unwrap();
        assert_eq!(streamed, generated);
    }
}
