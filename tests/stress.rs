//! Stress tests for RailCheck
//!
//! Run with: cargo test --release stress -- --ignored

use railcheck::dataset::RecordReader;
use railcheck::*;
use std::io::Cursor;
use std::time::Instant;

#[test]
#[ignore] // Run manually with --ignored
fn stress_test_stream_analysis() {
    // Ten hours at 140 km/h, never materialized
    let config = GeneratorConfig::new().with_duration_hours(10.0).with_seed(42);
    let mut simulator = TrackSimulator::for_config(&config);
    let analyzer = StreamAnalyzer::new();

    let start = Instant::now();
    let report = analyzer
        .analyze(infallible(simulator.stream(&config).unwrap()))
        .unwrap();
    let elapsed = start.elapsed();
    let rate = report.kpis.total as f64 / elapsed.as_secs_f64();

    println!("Analyzed {} records in {:?}", report.kpis.total, elapsed);
    println!("Rate: {:.0} records/second", rate);

    assert_eq!(report.kpis.total, 360_000);
    assert!(
        rate > 500_000.0,
        "Should analyze at least 500k records/s, got {:.0}",
        rate
    );
}

#[test]
#[ignore]
fn stress_test_csv_roundtrip() {
    let config = GeneratorConfig::new().with_duration_hours(2.0).with_seed(7);
    let records = generate_run(&config).unwrap();

    let start = Instant::now();
    let mut writer = RecordWriter::new(Vec::new()).unwrap();
    for record in &records {
        writer.write(record).unwrap();
    }
    let bytes = writer.finish().unwrap();
    let reader = RecordReader::from_reader(Cursor::new(bytes)).unwrap();
    let kpis = StreamAnalyzer::new().compute_kpis(reader).unwrap();
    let elapsed = start.elapsed();
    let rate = records.len() as f64 / elapsed.as_secs_f64();

    println!("Round-tripped {} records in {:?}", records.len(), elapsed);
    println!("Rate: {:.0} records/second", rate);

    assert_eq!(kpis.total, records.len());
    assert!(
        rate > 100_000.0,
        "Should round-trip at least 100k records/s, got {:.0}",
        rate
    );
}
