// RailCheck - Streaming analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Streaming reduction of a measurement run into inspection KPIs.
//!
//! Every operation consumes its input exactly once, front to back, so the
//! same code serves an in-memory run, a live [`crate::generator::Run`] and
//! a persisted file read through [`crate::dataset::RecordReader`].
//!
//! Inputs are iterators of `Result<R>` where `R` borrows a
//! [`MeasurementRecord`]; the first `Err` aborts the pass. Wrap infallible
//! sources with [`infallible`]:
//!
//! ```rust
//! use railcheck::analyzer::{infallible, StreamAnalyzer};
//! use railcheck::generator::{GeneratorConfig, TrackSimulator};
//!
//! let config = GeneratorConfig::new().with_duration_minutes(1.0);
//! let records = TrackSimulator::seeded(42).generate(&config).unwrap();
//!
//! let analyzer = StreamAnalyzer::new();
//! let kpis = analyzer.compute_kpis(infallible(&records)).unwrap();
//! assert_eq!(kpis.total, 600);
//! ```
//!
//! All values that shells display (kilometers, percentages, meters) are
//! rounded to two decimals here so consumers need no further formatting.

use crate::error::{RailError, Result};
use crate::record::{round_to, DefectType, MeasurementRecord, Severity};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::borrow::Borrow;

/// Prefix size used by the visualization call sites.
pub const VISUALIZATION_LIMIT: usize = 500;

/// Lift an infallible record source into analyzer input.
pub fn infallible<I: IntoIterator>(records: I) -> impl Iterator<Item = Result<I::Item>> {
    records.into_iter().map(Ok)
}

/// Run-level inspection KPIs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunKpis {
    /// Number of records.
    pub total: usize,
    /// (max position - min position) in kilometers.
    pub distance_km: f64,
    /// Records carrying a defect.
    pub anomalies: usize,
    /// Share of records without a defect, in percent.
    pub conformity_pct: f64,
}

/// Location of one anomaly along the track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnomalyPosition {
    pub position_m: f64,
    pub position_km: f64,
}

impl AnomalyPosition {
    fn from_meters(position_m: f64) -> Self {
        let position_m = round_to(position_m, 2);
        Self {
            position_m,
            position_km: round_to(position_m / 1000.0, 3),
        }
    }
}

/// Anomalies of one type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyGroup {
    /// Key of the group; serialized as the map key of [`AnomalyGroups`].
    #[serde(skip)]
    pub defect_type: DefectType,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// Ascending track positions.
    pub positions: Vec<AnomalyPosition>,
}

/// Anomalies grouped by type, in first-seen order.
///
/// Serializes as a map `defect_type -> {count, severity, positions}` that
/// keeps first-seen key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnomalyGroups {
    groups: Vec<AnomalyGroup>,
}

impl AnomalyGroups {
    /// Groups in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &AnomalyGroup> {
        self.groups.iter()
    }

    /// Group for a defect type, if any anomaly of that type was seen.
    pub fn get(&self, defect_type: &DefectType) -> Option<&AnomalyGroup> {
        self.groups.iter().find(|g| &g.defect_type == defect_type)
    }

    /// Number of distinct defect types.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Sum of all group counts.
    pub fn total(&self) -> usize {
        self.groups.iter().map(|g| g.count).sum()
    }

    /// Type -> count histogram, first-seen order.
    pub fn counts(&self) -> impl Iterator<Item = (&DefectType, usize)> {
        self.groups.iter().map(|g| (&g.defect_type, g.count))
    }

    /// Serializable view of [`AnomalyGroups::counts`].
    pub fn histogram(&self) -> AnomalyHistogram<'_> {
        AnomalyHistogram(self)
    }
}

impl Serialize for AnomalyGroups {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for group in &self.groups {
            map.serialize_entry(group.defect_type.as_str(), group)?;
        }
        map.end()
    }
}

/// Serializes as a map `defect_type -> count` in first-seen order.
#[derive(Debug, Clone, Copy)]
pub struct AnomalyHistogram<'a>(&'a AnomalyGroups);

impl Serialize for AnomalyHistogram<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (defect_type, count) in self.0.counts() {
            map.serialize_entry(defect_type.as_str(), &count)?;
        }
        map.end()
    }
}

/// Descriptive statistics of the catenary height.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeightSummary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub sample_count: usize,
}

/// One point of the height-vs-position chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfilePoint {
    pub position_m: f64,
    pub height_m: f64,
}

/// Everything the presentation shells show about a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub kpis: RunKpis,
    pub anomalies: AnomalyGroups,
    /// Height statistics over the whole run.
    pub heights: HeightSummary,
    /// Height statistics over the visualization prefix, `None` when the
    /// visualization limit is zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_heights: Option<HeightSummary>,
}

/// Accumulates run KPIs one record at a time.
#[derive(Debug, Clone)]
pub struct KpiAccumulator {
    total: usize,
    anomalies: usize,
    min_position: f64,
    max_position: f64,
}

impl Default for KpiAccumulator {
    fn default() -> Self {
        Self {
            total: 0,
            anomalies: 0,
            min_position: f64::INFINITY,
            max_position: f64::NEG_INFINITY,
        }
    }
}

impl KpiAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, record: &MeasurementRecord) {
        self.total += 1;
        if record.has_defect() {
            self.anomalies += 1;
        }
        self.min_position = self.min_position.min(record.position_m);
        self.max_position = self.max_position.max(record.position_m);
    }

    /// Fails with [`RailError::EmptySeries`] when nothing was observed.
    pub fn finish(&self) -> Result<RunKpis> {
        if self.total == 0 {
            return Err(RailError::EmptySeries {
                operation: "compute_kpis",
            });
        }
        let distance_km = (self.max_position - self.min_position) / 1000.0;
        let conformity_pct =
            (self.total - self.anomalies) as f64 / self.total as f64 * 100.0;
        Ok(RunKpis {
            total: self.total,
            distance_km: round_to(distance_km, 2),
            anomalies: self.anomalies,
            conformity_pct: round_to(conformity_pct, 2),
        })
    }
}

/// Accumulates anomaly positions per defect type.
#[derive(Debug, Clone, Default)]
pub struct AnomalyAccumulator {
    groups: Vec<(DefectType, Vec<f64>)>,
}

impl AnomalyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, record: &MeasurementRecord) {
        let Some(defect) = &record.defect else {
            return;
        };
        match self
            .groups
            .iter_mut()
            .find(|(defect_type, _)| defect_type == &defect.defect_type)
        {
            Some((_, positions)) => positions.push(record.position_m),
            None => self
                .groups
                .push((defect.defect_type.clone(), vec![record.position_m])),
        }
    }

    /// Never fails: a run without defects has no groups.
    pub fn finish(self) -> AnomalyGroups {
        let groups = self
            .groups
            .into_iter()
            .map(|(defect_type, mut positions)| {
                positions.sort_by(f64::total_cmp);
                AnomalyGroup {
                    severity: defect_type.severity(),
                    count: positions.len(),
                    positions: positions
                        .into_iter()
                        .map(AnomalyPosition::from_meters)
                        .collect(),
                    defect_type,
                }
            })
            .collect();
        AnomalyGroups { groups }
    }
}

/// Accumulates catenary height statistics.
#[derive(Debug, Clone)]
pub struct HeightAccumulator {
    sum: f64,
    min: f64,
    max: f64,
    count: usize,
}

impl Default for HeightAccumulator {
    fn default() -> Self {
        Self {
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            count: 0,
        }
    }
}

impl HeightAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, record: &MeasurementRecord) {
        let height = record.catenary_height_m;
        self.sum += height;
        self.min = self.min.min(height);
        self.max = self.max.max(height);
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Fails with [`RailError::EmptySeries`] when nothing was observed.
    pub fn finish(&self) -> Result<HeightSummary> {
        if self.count == 0 {
            return Err(RailError::EmptySeries {
                operation: "height_summary",
            });
        }
        Ok(HeightSummary {
            mean: round_to(self.sum / self.count as f64, 2),
            min: round_to(self.min, 2),
            max: round_to(self.max, 2),
            sample_count: self.count,
        })
    }
}

/// Read-only reductions over a measurement stream.
#[derive(Debug, Clone, Copy)]
pub struct StreamAnalyzer {
    visualization_limit: usize,
}

impl Default for StreamAnalyzer {
    fn default() -> Self {
        Self {
            visualization_limit: VISUALIZATION_LIMIT,
        }
    }
}

impl StreamAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the prefix size of the visualization call sites.
    pub fn with_visualization_limit(mut self, limit: usize) -> Self {
        self.visualization_limit = limit;
        self
    }

    pub fn visualization_limit(&self) -> usize {
        self.visualization_limit
    }

    /// Total, inspected distance, anomaly count and conformity rate.
    pub fn compute_kpis<I, R>(&self, records: I) -> Result<RunKpis>
    where
        I: IntoIterator<Item = Result<R>>,
        R: Borrow<MeasurementRecord>,
    {
        let mut acc = KpiAccumulator::new();
        for record in records {
            acc.observe(record?.borrow());
        }
        acc.finish()
    }

    /// Anomalies grouped by type with sorted track positions.
    pub fn group_anomalies<I, R>(&self, records: I) -> Result<AnomalyGroups>
    where
        I: IntoIterator<Item = Result<R>>,
        R: Borrow<MeasurementRecord>,
    {
        let mut acc = AnomalyAccumulator::new();
        for record in records {
            acc.observe(record?.borrow());
        }
        Ok(acc.finish())
    }

    /// Height statistics over the first `limit` records, or all of them.
    ///
    /// Records past the limit are never pulled from the source.
    pub fn height_summary<I, R>(&self, records: I, limit: Option<usize>) -> Result<HeightSummary>
    where
        I: IntoIterator<Item = Result<R>>,
        R: Borrow<MeasurementRecord>,
    {
        let mut acc = HeightAccumulator::new();
        for record in records.into_iter().take(limit.unwrap_or(usize::MAX)) {
            acc.observe(record?.borrow());
        }
        acc.finish()
    }

    /// Height statistics for KPI consumers: the whole run.
    pub fn kpi_height_summary<I, R>(&self, records: I) -> Result<HeightSummary>
    where
        I: IntoIterator<Item = Result<R>>,
        R: Borrow<MeasurementRecord>,
    {
        self.height_summary(records, None)
    }

    /// Height statistics for charts: the visualization prefix only.
    pub fn visualization_height_summary<I, R>(&self, records: I) -> Result<HeightSummary>
    where
        I: IntoIterator<Item = Result<R>>,
        R: Borrow<MeasurementRecord>,
    {
        self.height_summary(records, Some(self.visualization_limit))
    }

    /// (position, height) points of the first `limit` records, or all.
    pub fn height_profile<I, R>(&self, records: I, limit: Option<usize>) -> Result<Vec<ProfilePoint>>
    where
        I: IntoIterator<Item = Result<R>>,
        R: Borrow<MeasurementRecord>,
    {
        records
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|record| {
                let record = record?;
                let record: &MeasurementRecord = record.borrow();
                Ok(ProfilePoint {
                    position_m: record.position_m,
                    height_m: record.catenary_height_m,
                })
            })
            .collect()
    }

    /// All reductions fused into a single pass.
    pub fn analyze<I, R>(&self, records: I) -> Result<RunReport>
    where
        I: IntoIterator<Item = Result<R>>,
        R: Borrow<MeasurementRecord>,
    {
        let mut kpis = KpiAccumulator::new();
        let mut anomalies = AnomalyAccumulator::new();
        let mut heights = HeightAccumulator::new();
        let mut preview = HeightAccumulator::new();

        for record in records {
            let record = record?;
            let record: &MeasurementRecord = record.borrow();
            kpis.observe(record);
            anomalies.observe(record);
            heights.observe(record);
            if preview.count() < self.visualization_limit {
                preview.observe(record);
            }
        }

        Ok(RunReport {
            kpis: kpis.finish()?,
            anomalies: anomalies.finish(),
            heights: heights.finish()?,
            preview_heights: (preview.count() > 0)
                .then(|| preview.finish())
                .transpose()?,
        })
    }
}
