//! End-to-end tests: simulate, persist, re-read and analyze runs.

use approx::assert_relative_eq;
use chrono::NaiveDate;
use railcheck::dataset::{open_run, COLUMNS};
use railcheck::*;
use std::fs;
use std::thread;
use tempfile::tempdir;

fn reference_config() -> GeneratorConfig {
    GeneratorConfig::new()
        .with_start_time(
            NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
        )
        .with_duration_hours(0.1)
        .with_speed_kmh(140.0)
        .with_sample_interval_secs(0.1)
        .with_anomaly_rate(0.04)
        .with_seed(42)
}

// ============================================================================
// Simulated runs
// ============================================================================

#[test]
fn test_reference_run_kpis() {
    let records = generate_run(&reference_config()).unwrap();
    let kpis = StreamAnalyzer::new()
        .compute_kpis(infallible(&records))
        .unwrap();

    assert_eq!(kpis.total, 3600);
    // 3599 intervals of 140/36 m
    assert_relative_eq!(kpis.distance_km, 14.0, epsilon = 0.01);
    assert_eq!(kpis.anomalies, 139);
    assert_eq!(kpis.conformity_pct, 96.14);

    let again = generate_run(&reference_config()).unwrap();
    let kpis_again = StreamAnalyzer::new()
        .compute_kpis(infallible(&again))
        .unwrap();
    assert_eq!(kpis, kpis_again);
}

#[test]
fn test_live_stream_matches_materialized_run() {
    let config = reference_config();
    let analyzer = StreamAnalyzer::new();

    let materialized = analyzer
        .analyze(infallible(generate_run(&config).unwrap()))
        .unwrap();

    let mut simulator = TrackSimulator::for_config(&config);
    let live = analyzer
        .analyze(infallible(simulator.stream(&config).unwrap()))
        .unwrap();

    assert_eq!(materialized, live);
}

#[test]
fn test_fused_report_matches_single_operations() {
    let records = generate_run(&reference_config()).unwrap();
    let analyzer = StreamAnalyzer::new();
    let report = analyzer.analyze(infallible(&records)).unwrap();

    assert_eq!(report.kpis, analyzer.compute_kpis(infallible(&records)).unwrap());
    assert_eq!(
        report.anomalies,
        analyzer.group_anomalies(infallible(&records)).unwrap()
    );
    assert_eq!(
        report.heights,
        analyzer.kpi_height_summary(infallible(&records)).unwrap()
    );
    assert_eq!(
        report.preview_heights,
        Some(
            analyzer
                .visualization_height_summary(infallible(&records))
                .unwrap()
        )
    );
    assert_eq!(report.preview_heights.as_ref().unwrap().sample_count, 500);
}

// ============================================================================
// Persisted runs
// ============================================================================

#[test]
fn test_persisted_run_gives_same_report() {
    let records = generate_run(&reference_config()).unwrap();
    let dir = tempdir().unwrap();
    let path = dir.path().join("data").join("raw").join("mesures_ufm160.csv");

    assert_eq!(write_run(&path, &records).unwrap(), 3600);
    assert_eq!(count_records(&path).unwrap(), 3600);

    let analyzer = StreamAnalyzer::new();
    let in_memory = analyzer.analyze(infallible(&records)).unwrap();
    let from_file = analyzer.analyze(open_run(&path).unwrap()).unwrap();

    assert_eq!(in_memory.kpis, from_file.kpis);
    assert_eq!(in_memory.heights, from_file.heights);
    assert_eq!(in_memory.preview_heights, from_file.preview_heights);

    let expected: Vec<_> = in_memory.anomalies.counts().collect();
    let actual: Vec<_> = from_file.anomalies.counts().collect();
    assert_eq!(expected, actual);

    for (memory, file) in in_memory.anomalies.iter().zip(from_file.anomalies.iter()) {
        assert_eq!(memory.severity, file.severity);
        for (a, b) in memory.positions.iter().zip(&file.positions) {
            assert_relative_eq!(a.position_m, b.position_m, epsilon = 0.011);
        }
    }
}

#[test]
fn test_three_record_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mesures.csv");
    let contents = format!(
        "{}\n\
         2024-01-15 08:00:00.0000,0.000,140,5.40,0.10,1435.0,,\n\
         2024-01-15 08:00:00.1000,50.000,140,5.50,0.00,1436.0,rail_fissure,12.345\n\
         2024-01-15 08:00:00.2000,100.000,140,5.60,-0.10,1437.0,,\n",
        COLUMNS.join(",")
    );
    fs::write(&path, contents).unwrap();

    let analyzer = StreamAnalyzer::new();
    let kpis = analyzer.compute_kpis(open_run(&path).unwrap()).unwrap();
    assert_eq!(kpis.total, 3);
    assert_eq!(kpis.anomalies, 1);
    assert_eq!(kpis.conformity_pct, 66.67);
    assert_eq!(kpis.distance_km, 0.1);

    let groups = analyzer.group_anomalies(open_run(&path).unwrap()).unwrap();
    assert_eq!(groups.len(), 1);
    let group = groups.get(&DefectType::CrackedRail).unwrap();
    assert_eq!(group.count, 1);
    assert_eq!(group.severity, Some(Severity::High));
    assert_eq!(group.positions.len(), 1);
    assert_eq!(group.positions[0].position_m, 50.0);
    assert_eq!(group.positions[0].position_km, 0.05);
}

#[test]
fn test_concurrent_reads_are_independent() {
    let records = generate_run(&reference_config().with_seed(9)).unwrap();
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.csv");
    write_run(&path, &records).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let path = path.clone();
            thread::spawn(move || StreamAnalyzer::new().analyze(open_run(&path)?))
        })
        .collect();

    let reports: Vec<RunReport> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();
    for report in &reports[1..] {
        assert_eq!(report, &reports[0]);
    }
}

// ============================================================================
// Error kinds
// ============================================================================

#[test]
fn test_error_kinds_are_distinguishable() {
    let config_err = generate_run(&GeneratorConfig::new().with_speed_kmh(0.0)).unwrap_err();
    assert!(config_err.is_configuration());

    let dir = tempdir().unwrap();
    let empty = dir.path().join("empty.csv");
    fs::write(&empty, format!("{}\n", COLUMNS.join(","))).unwrap();
    let empty_err = StreamAnalyzer::new()
        .compute_kpis(open_run(&empty).unwrap())
        .unwrap_err();
    assert!(empty_err.is_empty_series());

    let malformed = dir.path().join("malformed.csv");
    fs::write(
        &malformed,
        format!(
            "{}\n2024-01-15 08:00:00.0000,not-a-number,140,5.40,0.10,1435.0,,\n",
            COLUMNS.join(",")
        ),
    )
    .unwrap();
    let malformed_err = StreamAnalyzer::new()
        .height_summary(open_run(&malformed).unwrap(), None)
        .unwrap_err();
    assert!(malformed_err.is_malformed());
    assert!(!malformed_err.is_empty_series());
}

#[test]
fn test_zero_duration_run_is_empty_series() {
    let records = generate_run(&reference_config().with_duration_hours(0.0)).unwrap();
    assert!(records.is_empty());
    assert!(StreamAnalyzer::new()
        .compute_kpis(infallible(&records))
        .unwrap_err()
        .is_empty_series());
}
