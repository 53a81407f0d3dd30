use crate::analyzer::contract::Analyzer;
use crate::analyzer::statistics;
use crate::model::{AnalysisFinding, AnalysisResult, DiagnosticSession, DtcReadResult, Severity, pid};
use std::collections::HashMap;
use tracing::debug;

/// Idle ceiling for RPM stability. Fault and fuel analysis use 1000.
const IDLE_RPM: f64 = 1200.0;
const MISFIRE_DTCS: &[&str] = &["P0300", "P0301", "P0302", "P0303", "P0304"];

/// Flags engine stability, load, throttle response and thermal anomalies.
pub struct PerformanceAnalyzer;

impl PerformanceAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn analyze_rpm_stability(rpm: &[f64]) -> Vec<AnalysisFinding> {
        let mut findings = Vec::new();
        if rpm.len() < 5 {
            debug!("only {} RPM readings, skipping stability checks", rpm.len());
            return findings;
        }

        let idle: Vec<f64> = rpm.iter().copied().filter(|r| *r < IDLE_RPM).collect();
        if idle.len() > 3 {
            if let Some(idle_std) = statistics::sample_std_dev(&idle).filter(|s| *s > 100.0) {
                findings.push(
                    AnalysisFinding::new(
                        "Rough Idle Detected",
                        format!(
                            "RPM variance at idle is high ({:.0} RPM std). \
                             This may indicate misfires, vacuum leaks, or fuel system issues.",
                            idle_std
                        ),
                    )
                    .severity(Severity::Warning)
                    .category("engine")
                    .confidence(0.8)
                    .recommendations(&[
                        "Check for vacuum leaks",
                        "Inspect spark plugs and ignition coils",
                        "Check fuel injectors",
                        "Clean throttle body",
                    ])
                    .related_pids(&[pid::RPM]),
                );
            }
        }

        let large_drops = statistics::deltas(rpm).iter().filter(|c| c.abs() > 300.0).count();
        if large_drops > 2 {
            findings.push(
                AnalysisFinding::new(
                    "RPM Fluctuations Detected",
                    format!(
                        "Detected {} significant RPM drops (>300 RPM). \
                         This pattern may indicate cylinder misfires.",
                        large_drops
                    ),
                )
                .severity(Severity::Warning)
                .category("engine")
                .confidence(0.7)
                .recommendations(&[
                    "Check for misfire codes (P030x)",
                    "Inspect ignition system",
                    "Check compression",
                ])
                .related_pids(&[pid::RPM])
                .related_dtcs(MISFIRE_DTCS),
            );
        }

        findings
    }

    fn analyze_load_patterns(load: &[f64]) -> Vec<AnalysisFinding> {
        let mut findings = Vec::new();
        if load.len() < 5 {
            debug!("only {} load readings, skipping load checks", load.len());
            return findings;
        }
        let (Some(avg_load), Some(max_load), Some(min_load)) =
            (statistics::mean(load), statistics::max(load), statistics::min(load))
        else {
            return findings;
        };

        if avg_load > 40.0 && max_load == min_load {
            findings.push(
                AnalysisFinding::new(
                    "High Idle Load",
                    format!(
                        "Engine load is consistently high ({:.0}%) even at idle. \
                         This may indicate accessory loads or engine efficiency issues.",
                        avg_load
                    ),
                )
                .category("engine")
                .confidence(0.6)
                .recommendations(&[
                    "Check AC compressor operation",
                    "Check alternator output",
                    "Inspect for dragging brakes",
                ])
                .related_pids(&[pid::ENGINE_LOAD]),
            );
        }

        let spikes = statistics::deltas(load).iter().filter(|c| c.abs() > 30.0).count();
        if spikes > 3 {
            findings.push(
                AnalysisFinding::new(
                    "Load Fluctuations",
                    format!(
                        "Detected {} sudden load changes (>30%). \
                         This could indicate transmission issues or engine hesitation.",
                        spikes
                    ),
                )
                .category("engine")
                .confidence(0.5)
                .related_pids(&[pid::ENGINE_LOAD]),
            );
        }

        findings
    }

    /// Number of throttle openings (>10 points) not followed by a 100 rpm rise two samples later.
    pub fn slow_throttle_responses(throttle: &[f64], rpm: &[f64]) -> usize {
        (1..throttle.len())
            .filter(|&i| throttle[i] - throttle[i - 1] > 10.0)
            .filter(|&i| i + 2 < rpm.len() && rpm[i + 2] - rpm[i] < 100.0)
            .count()
    }

    fn analyze_throttle_response(throttle: &[f64], rpm: &[f64]) -> Vec<AnalysisFinding> {
        let mut findings = Vec::new();
        if throttle.len() < 10 || rpm.len() < 10 {
            debug!(
                "{} throttle / {} RPM readings, skipping throttle response",
                throttle.len(),
                rpm.len()
            );
            return findings;
        }

        if Self::slow_throttle_responses(throttle, rpm) > 2 {
            findings.push(
                AnalysisFinding::new(
                    "Throttle Response Lag",
                    "Engine shows delayed response to throttle input. \
                     This may indicate fuel delivery issues or throttle body problems.",
                )
                .severity(Severity::Warning)
                .category("engine")
                .confidence(0.6)
                .recommendations(&[
                    "Clean throttle body",
                    "Check fuel pressure",
                    "Inspect throttle position sensor",
                    "Check MAF sensor",
                ])
                .related_pids(&[pid::THROTTLE_POS, pid::RPM]),
            );
        }

        findings
    }

    fn analyze_coolant_temp(coolant: &[f64]) -> Vec<AnalysisFinding> {
        let mut findings = Vec::new();
        let (Some(max_temp), Some(avg_temp)) = (statistics::max(coolant), statistics::mean(coolant))
        else {
            debug!("no coolant readings, skipping temperature checks");
            return findings;
        };

        if max_temp > 110.0 {
            findings.push(
                AnalysisFinding::new(
                    "Elevated Coolant Temperature",
                    format!(
                        "Coolant reached {:.0}C, which is above normal operating range. \
                         Risk of engine damage if this continues.",
                        max_temp
                    ),
                )
                .severity(Severity::Critical)
                .category("cooling")
                .confidence(0.9)
                .recommendations(&[
                    "Check coolant level",
                    "Inspect radiator for blockage",
                    "Check thermostat operation",
                    "Inspect water pump",
                    "Check cooling fans",
                ])
                .related_pids(&[pid::COOLANT_TEMP]),
            );
        } else if max_temp > 100.0 {
            findings.push(
                AnalysisFinding::new(
                    "Warm Coolant Temperature",
                    format!("Coolant reached {:.0}C. Monitor closely.", max_temp),
                )
                .severity(Severity::Warning)
                .category("cooling")
                .confidence(0.7)
                .related_pids(&[pid::COOLANT_TEMP]),
            );
        }

        if max_temp < 75.0 && coolant.len() > 20 {
            findings.push(
                AnalysisFinding::new(
                    "Engine Not Reaching Temperature",
                    format!(
                        "Coolant temperature ({:.0}C avg) not reaching normal operating range. \
                         Thermostat may be stuck open.",
                        avg_temp
                    ),
                )
                .severity(Severity::Warning)
                .category("cooling")
                .confidence(0.7)
                .recommendations(&[
                    "Check thermostat operation",
                    "Verify coolant temp sensor accuracy",
                ])
                .related_pids(&[pid::COOLANT_TEMP]),
            );
        }

        findings
    }

    fn analyze_performance_dtcs(dtc_result: &DtcReadResult) -> Vec<AnalysisFinding> {
        let misfires: Vec<&str> = dtc_result
            .all_codes()
            .map(|c| c.code.as_str())
            .filter(|code| code.starts_with("P030"))
            .collect();
        if misfires.is_empty() {
            return Vec::new();
        }

        vec![
            AnalysisFinding::new(
                "Misfire Codes Present",
                format!("Active misfire codes detected: {}", misfires.join(", ")),
            )
            .severity(Severity::Critical)
            .category("engine")
            .confidence(1.0)
            .recommendations(&[
                "Address misfire codes before other analysis",
                "Check ignition system",
                "Inspect fuel injectors",
            ])
            .related_dtcs(&misfires),
        ]
    }
}

impl Default for PerformanceAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for PerformanceAnalyzer {
    fn name(&self) -> &'static str {
        "Performance Analysis"
    }

    fn description(&self) -> &'static str {
        "Analyzes engine performance, detects misfires and sensor issues"
    }

    fn required_pids(&self) -> &'static [&'static str] {
        &[pid::RPM, pid::ENGINE_LOAD, pid::THROTTLE_POS, pid::COOLANT_TEMP]
    }

    fn analyze(&self, session: &DiagnosticSession) -> AnalysisResult {
        if session.pid_samples.is_empty() {
            return self.insufficient_data(
                "No Data",
                "No PID samples available for analysis",
                "Insufficient data for performance analysis",
            );
        }

        let rpm = session.values_of(pid::RPM);
        let load = session.values_of(pid::ENGINE_LOAD);
        let throttle = session.values_of(pid::THROTTLE_POS);
        let coolant = session.values_of(pid::COOLANT_TEMP);

        let mut findings = Vec::new();
        let mut metrics = HashMap::new();

        if let (Some(avg), Some(max)) = (statistics::mean(&rpm), statistics::max(&rpm)) {
            findings.extend(Self::analyze_rpm_stability(&rpm));
            metrics.insert("rpm_avg".to_string(), avg);
            metrics.insert("rpm_max".to_string(), max);
            metrics.insert(
                "rpm_std".to_string(),
                statistics::sample_std_dev(&rpm).unwrap_or(0.0),
            );
        }

        if let (Some(avg), Some(max)) = (statistics::mean(&load), statistics::max(&load)) {
            findings.extend(Self::analyze_load_patterns(&load));
            metrics.insert("load_avg".to_string(), avg);
            metrics.insert("load_max".to_string(), max);
        }

        findings.extend(Self::analyze_throttle_response(&throttle, &rpm));

        if let (Some(avg), Some(max)) = (statistics::mean(&coolant), statistics::max(&coolant)) {
            findings.extend(Self::analyze_coolant_temp(&coolant));
            metrics.insert("coolant_avg".to_string(), avg);
            metrics.insert("coolant_max".to_string(), max);
        }

        if let Some(dtc_result) = &session.dtc_result {
            findings.extend(Self::analyze_performance_dtcs(dtc_result));
        }

        let issue_count = findings
            .iter()
            .filter(|f| f.severity >= Severity::Warning)
            .count();
        let summary = match issue_count {
            0 => "No performance issues detected. Engine appears to be running normally.".to_string(),
            1 => "1 potential performance issue detected. See findings for details.".to_string(),
            n => format!(
                "{} potential performance issues detected. Review findings carefully.",
                n
            ),
        };

        self.create_result(findings, summary, metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DtcInfo, DtcType, PidSample};
    use chrono::Utc;

    fn session_with(pid_name: &str, values: &[f64]) -> DiagnosticSession {
        let now = Utc::now();
        DiagnosticSession::with_samples(
            values.iter().map(|v| PidSample::new(now).with_value(pid_name, *v)).collect(),
        )
    }

    fn titles(result: &AnalysisResult) -> Vec<&str> {
        result.findings.iter().map(|f| f.title.as_str()).collect()
    }

    #[test]
    fn empty_session() {
        let result = PerformanceAnalyzer.analyze(&DiagnosticSession::new());
        assert_eq!(titles(&result), vec!["No Data"]);
        assert_eq!(result.summary, "Insufficient data for performance analysis");
    }

    #[test]
    fn repeated_rpm_swings_flag_misfires() {
        let rpm = [800.0, 1200.0, 800.0, 1200.0, 800.0, 820.0];
        let result = PerformanceAnalyzer.analyze(&session_with(pid::RPM, &rpm));
        let finding = result
            .findings
            .iter()
            .find(|f| f.title == "RPM Fluctuations Detected")
            .expect("fluctuation finding");
        assert_eq!(finding.related_dtcs, MISFIRE_DTCS);
    }

    #[test]
    fn flat_high_load_and_load_spikes() {
        let flat = PerformanceAnalyzer.analyze(&session_with(pid::ENGINE_LOAD, &[45.0; 6]));
        assert_eq!(titles(&flat), vec!["High Idle Load"]);

        let spiky = [10.0, 50.0, 10.0, 50.0, 10.0, 50.0];
        let result = PerformanceAnalyzer.analyze(&session_with(pid::ENGINE_LOAD, &spiky));
        assert_eq!(titles(&result), vec!["Load Fluctuations"]);
    }

    #[test]
    fn slow_throttle_response_counting() {
        let throttle = [10.0, 30.0, 30.0, 50.0, 50.0, 70.0, 70.0, 70.0, 70.0, 70.0];
        let flat_rpm = [900.0; 10];
        assert_eq!(PerformanceAnalyzer::slow_throttle_responses(&throttle, &flat_rpm), 3);

        let rising: Vec<f64> = (0..10).map(|i| 900.0 + 200.0 * i as f64).collect();
        assert_eq!(PerformanceAnalyzer::slow_throttle_responses(&throttle, &rising), 0);

        // an opening at index 8 has no rpm reading two samples later
        let late = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 20.0, 20.0];
        assert_eq!(PerformanceAnalyzer::slow_throttle_responses(&late, &flat_rpm), 0);
    }

    #[test]
    fn throttle_lag_through_analyze() {
        let throttle = [10.0, 30.0, 30.0, 50.0, 50.0, 70.0, 70.0, 70.0, 70.0, 70.0];
        let now = Utc::now();
        let build = |rpm: &dyn Fn(usize) -> f64| {
            DiagnosticSession::with_samples(
                throttle
                    .iter()
                    .enumerate()
                    .map(|(i, t)| {
                        PidSample::new(now)
                            .with_value(pid::THROTTLE_POS, *t)
                            .with_value(pid::RPM, rpm(i))
                    })
                    .collect(),
            )
        };

        let lagging = PerformanceAnalyzer.analyze(&build(&|_| 900.0));
        assert_eq!(titles(&lagging), vec!["Throttle Response Lag"]);
        assert_eq!(lagging.findings[0].severity, Severity::Warning);

        let responsive = PerformanceAnalyzer.analyze(&build(&|i| 900.0 + 200.0 * i as f64));
        assert!(responsive.findings.is_empty());
    }

    #[test]
    fn coolant_bands() {
        let hot = PerformanceAnalyzer.analyze(&session_with(pid::COOLANT_TEMP, &[90.0, 112.0]));
        assert_eq!(hot.findings[0].severity, Severity::Critical);

        let warm = PerformanceAnalyzer.analyze(&session_with(pid::COOLANT_TEMP, &[90.0, 104.0]));
        assert_eq!(titles(&warm), vec!["Warm Coolant Temperature"]);

        let cold = PerformanceAnalyzer.analyze(&session_with(pid::COOLANT_TEMP, &[60.0; 21]));
        assert_eq!(titles(&cold), vec!["Engine Not Reaching Temperature"]);

        let short_cold = PerformanceAnalyzer.analyze(&session_with(pid::COOLANT_TEMP, &[60.0; 20]));
        assert!(short_cold.findings.is_empty());
        assert!(short_cold.summary.starts_with("No performance issues"));
    }

    #[test]
    fn misfire_codes() {
        let mut dtcs = DtcReadResult::new();
        dtcs.stored_codes = vec![
            DtcInfo::from_code("P0420", "", DtcType::Stored).unwrap(),
            DtcInfo::from_code("P0303", "", DtcType::Stored).unwrap(),
        ];
        let session = DiagnosticSession {
            dtc_result: Some(dtcs),
            ..session_with(pid::RPM, &[800.0])
        };
        let result = PerformanceAnalyzer.analyze(&session);
        assert_eq!(titles(&result), vec!["Misfire Codes Present"]);
        assert_eq!(result.findings[0].related_dtcs, vec!["P0303"]);
        assert!(result.summary.starts_with("1 potential"));
    }
}
