// RailCheck Exporter - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus gauges describing the last analyzed run.

use lazy_static::lazy_static;
use prometheus::{register_gauge, register_gauge_vec, Encoder, Gauge, GaugeVec, TextEncoder};
use railcheck::{AnomalyGroups, RunKpis};

lazy_static! {
    /// Number of records in the run.
    pub static ref MEASUREMENTS_TOTAL: Gauge = register_gauge!(
        "railcheck_mesures_total",
        "Nombre total de mesures"
    ).expect("railcheck_mesures_total registers once");

    /// Inspected distance in kilometers.
    pub static ref DISTANCE_KM: Gauge = register_gauge!(
        "railcheck_distance_km",
        "Distance inspectee en km"
    ).expect("railcheck_distance_km registers once");

    /// Records carrying a defect.
    pub static ref ANOMALIES_TOTAL: Gauge = register_gauge!(
        "railcheck_anomalies_total",
        "Nombre total anomalies"
    ).expect("railcheck_anomalies_total registers once");

    /// Share of defect-free records, in percent.
    pub static ref CONFORMITY_RATE: Gauge = register_gauge!(
        "railcheck_conformite_taux",
        "Taux de conformite en pourcentage"
    ).expect("railcheck_conformite_taux registers once");

    /// Anomalies per defect type.
    pub static ref ANOMALIES_BY_TYPE: GaugeVec = register_gauge_vec!(
        "railcheck_anomalies_par_type",
        "Nombre d'anomalies par type de defaut",
        &["defaut_type"]
    ).expect("railcheck_anomalies_par_type registers once");
}

/// Publish run KPIs.
pub fn update_run_metrics(kpis: &RunKpis) {
    MEASUREMENTS_TOTAL.set(kpis.total as f64);
    DISTANCE_KM.set(kpis.distance_km);
    ANOMALIES_TOTAL.set(kpis.anomalies as f64);
    CONFORMITY_RATE.set(kpis.conformity_pct);
}

/// Publish the per-type histogram. Types absent from this run are dropped.
pub fn update_anomaly_metrics(groups: &AnomalyGroups) {
    ANOMALIES_BY_TYPE.reset();
    for (defect_type, count) in groups.counts() {
        ANOMALIES_BY_TYPE
            .with_label_values(&[defect_type.as_str()])
            .set(count as f64);
    }
}

/// Encode all registered metrics in the Prometheus text format.
pub fn encode_metrics() -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
