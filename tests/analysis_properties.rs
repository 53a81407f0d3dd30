use chrono::{Duration, Utc};
use obd_insight::analyzer::statistics::{pearson, sample_std_dev};
use obd_insight::analyzer::{
    Analyzer, Correlator, FaultDetector, FuelEconomyAnalyzer, PerformanceAnalyzer,
};
use obd_insight::model::{AnalysisResult, DiagnosticSession, PidSample, Severity, pid};
use obd_insight::orchestrator::default_analyzers;

fn session_from(columns: &[(&str, Vec<f64>)]) -> DiagnosticSession {
    let start = Utc::now();
    let len = columns.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
    let samples = (0..len)
        .map(|i| {
            columns.iter().fold(
                PidSample::new(start + Duration::milliseconds(i as i64 * 500)),
                |sample, (name, values)| match values.get(i) {
                    Some(v) => sample.with_value(name, *v),
                    None => sample,
                },
            )
        })
        .collect();
    DiagnosticSession::with_samples(samples)
}

/// Ten idle readings around 800 rpm with the given sample standard deviation.
fn idle_rpm_with_std(std: f64) -> Vec<f64> {
    let spread = std * (9.0_f64 / 10.0).sqrt();
    (0..10)
        .map(|i| if i % 2 == 0 { 800.0 + spread } else { 800.0 - spread })
        .collect()
}

fn titles(result: &AnalysisResult) -> Vec<&str> {
    result.findings.iter().map(|f| f.title.as_str()).collect()
}

#[test]
fn correlation_is_symmetric_and_bounded() {
    let x: Vec<f64> = (0..40).map(|i| (i as f64 * 0.37).sin() * 30.0 + i as f64).collect();
    let y: Vec<f64> = (0..40).map(|i| 100.0 - (i as f64 * 0.91).cos() * 12.0).collect();

    let forward = vec![("A".to_string(), x.clone()), ("B".to_string(), y.clone())];
    let backward = vec![("B".to_string(), y), ("A".to_string(), x)];
    let ab = Correlator::lookup(&Correlator::calculate_correlations(&forward), "A", "B").unwrap();
    let ba = Correlator::lookup(&Correlator::calculate_correlations(&backward), "A", "B").unwrap();

    assert!((ab - ba).abs() < 1e-12);
    assert!((-1.0..=1.0).contains(&ab));
}

#[test]
fn exact_linear_relationship_correlates_fully() {
    let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
    let y: Vec<f64> = x.iter().map(|v| 2.0 * v).collect();
    assert!((pearson(&x, &y).unwrap() - 1.0).abs() < 1e-6);
}

#[test]
fn constant_series_is_left_out_of_correlations() {
    let session = session_from(&[
        (pid::RPM, (0..20).map(|i| 800.0 + i as f64 * 50.0).collect()),
        (pid::COOLANT_TEMP, vec![90.0; 20]),
    ]);
    let series = Correlator::extract_series(&session);
    assert_eq!(series.len(), 2);
    let correlations = Correlator::calculate_correlations(&series);
    assert_eq!(Correlator::lookup(&correlations, pid::RPM, pid::COOLANT_TEMP), None);
}

#[test]
fn stuck_sensor_needs_a_flat_series() {
    let flat = FaultDetector::new().analyze(&session_from(&[(pid::MAF, vec![4.2; 25])]));
    assert!(titles(&flat).contains(&"MAF Sensor May Be Stuck"));

    let varied: Vec<f64> = (0..25).map(|i| 4.0 + (i % 4) as f64 * 0.5).collect();
    let moving = FaultDetector::new().analyze(&session_from(&[(pid::MAF, varied)]));
    assert!(!titles(&moving).contains(&"MAF Sensor May Be Stuck"));
}

#[test]
fn mpg_from_speed_and_airflow() {
    assert!((FuelEconomyAnalyzer::mpg(100.0, 20.0) - 23.98).abs() < 0.01);

    // 100 km/h at 1 g/s is far beyond 100 MPG and is dropped
    let mpg = FuelEconomyAnalyzer::mpg_series(&[20.0, 1.0, 40.0], &[100.0, 100.0, 300.0]);
    assert_eq!(mpg.len(), 2);
    assert!(mpg.iter().all(|m| *m > 1.0 && *m < 100.0));
}

#[test]
fn rough_idle_threshold() {
    let rough = idle_rpm_with_std(150.0);
    assert!((sample_std_dev(&rough).unwrap() - 150.0).abs() < 1e-9);
    let result = PerformanceAnalyzer::new().analyze(&session_from(&[(pid::RPM, rough)]));
    assert!(titles(&result).contains(&"Rough Idle Detected"));

    let steady = idle_rpm_with_std(80.0);
    let result = PerformanceAnalyzer::new().analyze(&session_from(&[(pid::RPM, steady)]));
    assert!(!titles(&result).contains(&"Rough Idle Detected"));
}

#[test]
fn lean_rough_idle_points_to_vacuum_leak() {
    let session = session_from(&[
        (pid::RPM, idle_rpm_with_std(120.0)),
        (pid::LONG_FUEL_TRIM_1, vec![18.0; 10]),
    ]);
    let result = FaultDetector::new().analyze(&session);

    let leaks: Vec<_> = result
        .findings
        .iter()
        .filter(|f| f.title == "Vacuum Leak Likely")
        .collect();
    assert_eq!(leaks.len(), 1);
    assert_eq!(leaks[0].confidence, 0.85);
    assert!(!titles(&result).contains(&"Fuel Injector Issue Likely"));
}

#[test]
fn empty_session_yields_one_info_finding_everywhere() {
    let session = DiagnosticSession::new();
    for analyzer in default_analyzers() {
        let result = analyzer.analyze(&session);
        assert_eq!(result.findings.len(), 1, "{}", analyzer.name());
        assert_eq!(result.findings[0].severity, Severity::Info);
        assert!(!result.summary.is_empty());
        assert!(!result.has_issues());
    }
}
