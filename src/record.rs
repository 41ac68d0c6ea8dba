// RailCheck - Measurement records
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Measurement record model.
//!
//! A [`MeasurementRecord`] is one sample of the recording car's sensors.
//! Records are created once by the simulator (or parsed once from a
//! persisted run) and never mutated afterwards.

use crate::error::RecordError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lower bound of the catenary height in meters.
pub const CATENARY_MIN_M: f64 = 4.0;
/// Upper bound of the catenary height in meters.
pub const CATENARY_MAX_M: f64 = 7.0;
/// Nominal catenary height in meters.
pub const CATENARY_NOMINAL_M: f64 = 5.5;
/// Standard deviation of the catenary height jitter.
pub const CATENARY_JITTER_M: f64 = 0.2;
/// Maximum absolute lateral deviation of the contact wire in meters.
pub const LATERAL_DEVIATION_MAX_M: f64 = 0.2;
/// Track gauge range in millimeters.
pub const GAUGE_RANGE_MM: (f64, f64) = (1430.0, 1440.0);
/// Range of a defect's local sub-position.
pub const DEFECT_POSITION_RANGE_M: (f64, f64) = (0.0, 100.0);

/// Defect categories reported by the recording car.
///
/// Persisted files may carry tokens this version does not know; they are
/// kept verbatim in [`DefectType::Other`] and still count as anomalies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DefectType {
    /// `boulon_manquant`
    MissingBolt,
    /// `signalisation_defaillante`
    FaultySignalling,
    /// `rail_fissure`
    CrackedRail,
    /// Any other non-empty token read from a file.
    Other(String),
}

impl DefectType {
    /// Defect types the simulator draws from, uniformly.
    pub const SIMULATED: [DefectType; 3] = [
        DefectType::MissingBolt,
        DefectType::FaultySignalling,
        DefectType::CrackedRail,
    ];

    /// Parse a persisted token. Never fails: unknown tokens become `Other`.
    pub fn from_token(token: &str) -> Self {
        match token {
            "boulon_manquant" => DefectType::MissingBolt,
            "signalisation_defaillante" => DefectType::FaultySignalling,
            "rail_fissure" => DefectType::CrackedRail,
            other => DefectType::Other(other.to_string()),
        }
    }

    /// Token used in the persisted format.
    pub fn as_str(&self) -> &str {
        match self {
            DefectType::MissingBolt => "boulon_manquant",
            DefectType::FaultySignalling => "signalisation_defaillante",
            DefectType::CrackedRail => "rail_fissure",
            DefectType::Other(token) => token,
        }
    }

    /// Severity of this defect type, `None` for unrecognized tokens.
    pub fn severity(&self) -> Option<Severity> {
        match self {
            DefectType::MissingBolt => Some(Severity::Medium),
            DefectType::FaultySignalling => Some(Severity::Critical),
            DefectType::CrackedRail => Some(Severity::High),
            DefectType::Other(_) => None,
        }
    }

    /// Whether the token is one the simulator produces.
    pub fn is_known(&self) -> bool {
        !matches!(self, DefectType::Other(_))
    }
}

impl fmt::Display for DefectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for DefectType {
    fn from(token: String) -> Self {
        DefectType::from_token(&token)
    }
}

impl From<DefectType> for String {
    fn from(defect_type: DefectType) -> Self {
        match defect_type {
            DefectType::Other(token) => token,
            known => known.as_str().to_string(),
        }
    }
}

/// Severity levels, a pure function of [`DefectType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "moyen")]
    Medium,
    #[serde(rename = "élevé")]
    High,
    #[serde(rename = "critique")]
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Medium => "moyen",
            Severity::High => "élevé",
            Severity::Critical => "critique",
        }
    }
}

/// A flagged irregularity on one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defect {
    pub defect_type: DefectType,
    /// Local sub-position in [0, 100] m. Independent of the record's
    /// track position.
    pub position_m: f64,
}

impl Defect {
    pub fn new(defect_type: DefectType, position_m: f64) -> Self {
        Self {
            defect_type,
            position_m,
        }
    }

    pub fn severity(&self) -> Option<Severity> {
        self.defect_type.severity()
    }
}

/// One sample of the recording car's sensors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Sample instant.
    pub timestamp: NaiveDateTime,
    /// Track position (PK) in meters since the start of the run.
    pub position_m: f64,
    /// Train speed, constant over a run.
    pub speed_kmh: f64,
    /// Height of the overhead contact wire.
    pub catenary_height_m: f64,
    /// Signed lateral offset of the contact wire.
    pub lateral_deviation_m: f64,
    /// Track gauge.
    pub gauge_mm: f64,
    /// Defect flagged on this sample, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defect: Option<Defect>,
}

impl MeasurementRecord {
    /// Whether this sample carries a defect.
    pub fn has_defect(&self) -> bool {
        self.defect.is_some()
    }

    /// Track position in kilometers.
    pub fn position_km(&self) -> f64 {
        self.position_m / 1000.0
    }

    /// Check the ranges a recording car can produce.
    pub fn validate(&self) -> Result<(), RecordError> {
        check_finite("pk_position", self.position_m)?;
        if self.position_m < 0.0 {
            return Err(out_of_range("pk_position", self.position_m));
        }
        check_finite("vitesse", self.speed_kmh)?;
        if self.speed_kmh <= 0.0 {
            return Err(out_of_range("vitesse", self.speed_kmh));
        }
        check_range(
            "hauteur_catenaire",
            self.catenary_height_m,
            CATENARY_MIN_M,
            CATENARY_MAX_M,
        )?;
        check_range(
            "deport_catenaire",
            self.lateral_deviation_m,
            -LATERAL_DEVIATION_MAX_M,
            LATERAL_DEVIATION_MAX_M,
        )?;
        check_range(
            "ecartement_voie",
            self.gauge_mm,
            GAUGE_RANGE_MM.0,
            GAUGE_RANGE_MM.1,
        )?;
        if let Some(defect) = &self.defect {
            check_range(
                "defaut_position",
                defect.position_m,
                DEFECT_POSITION_RANGE_M.0,
                DEFECT_POSITION_RANGE_M.1,
            )?;
        }
        Ok(())
    }
}

fn out_of_range(field: &'static str, value: f64) -> RecordError {
    RecordError::OutOfRange { field, value }
}

fn check_finite(field: &'static str, value: f64) -> Result<(), RecordError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(out_of_range(field, value))
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), RecordError> {
    check_finite(field, value)?;
    if value < min || value > max {
        return Err(out_of_range(field, value));
    }
    Ok(())
}

/// Round half away from zero to `decimals` places.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
