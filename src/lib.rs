// RailCheck - Track recording car simulation and analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # RailCheck
//!
//! Simulation and analysis of rail inspection runs.
//!
//! A track recording car travels at constant speed and samples its sensors
//! at a fixed interval: position along the track (PK), catenary height,
//! lateral deviation of the contact wire, track gauge, and any defect
//! flagged on the sample.
//!
//! ## Quick Start
//!
//! ```rust
//! use railcheck::{infallible, GeneratorConfig, StreamAnalyzer, TrackSimulator};
//!
//! // Six minutes at 140 km/h, 10 samples per second
//! let config = GeneratorConfig::new().with_duration_hours(0.1);
//! let records = TrackSimulator::seeded(7).generate(&config).unwrap();
//! assert_eq!(records.len(), 3600);
//!
//! // One pass over the run
//! let report = StreamAnalyzer::new().analyze(infallible(&records)).unwrap();
//! assert_eq!(report.kpis.total, 3600);
//! assert_eq!(report.kpis.anomalies, report.anomalies.total());
//! ```
//!
//! ## Modules
//!
//! - [`record`]: Measurement records, defect types and severities
//! - [`anomalies`]: Per-sample defect injection
//! - [`generator`]: Run configuration and the track simulator
//! - [`analyzer`]: Streaming KPIs, anomaly grouping and height statistics
//! - [`dataset`]: CSV persistence of runs
//! - [`error`]: Error taxonomy

pub mod analyzer;
pub mod anomalies;
pub mod dataset;
pub mod error;
pub mod generator;
pub mod record;

pub use analyzer::{
    infallible, AnomalyGroup, AnomalyGroups, AnomalyPosition, HeightSummary, ProfilePoint,
    RunKpis, RunReport, StreamAnalyzer,
};
pub use anomalies::AnomalyInjector;
pub use dataset::{count_records, open_run, write_run, RecordReader, RecordWriter};
pub use error::{ConfigError, RailError, RecordError, Result};
pub use generator::{generate_run, GeneratorConfig, TrackSimulator};
pub use record::{Defect, DefectType, MeasurementRecord, Severity};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
