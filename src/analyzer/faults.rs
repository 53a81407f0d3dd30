use crate::analyzer::contract::Analyzer;
use crate::analyzer::correlator::Correlator;
use crate::analyzer::statistics;
use crate::model::{
    AnalysisFinding, AnalysisResult, DiagnosticSession, DtcInfo, DtcReadResult, Severity, pid,
};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Idle ceiling for symptom correlation. The performance analyzer uses 1200.
const IDLE_RPM: f64 = 1000.0;

/// One-decimal rounding of the exact stored value, ties to even.
fn rounded_tenths(value: f64) -> String {
    let rounded = format!("{:.1}", value);
    if rounded == "-0.0" {
        "0.0".to_string()
    } else {
        rounded
    }
}

/// Boolean symptoms derived from one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Symptoms {
    pub rough_idle: bool,
    pub lean_running: bool,
    pub rich_running: bool,
    pub overheating: bool,
}

/// Rule engine combining trouble-code structure with sensor-derived symptoms.
pub struct FaultDetector;

impl FaultDetector {
    pub fn new() -> Self {
        Self
    }

    fn analyze_dtcs(dtc_result: &DtcReadResult) -> Vec<AnalysisFinding> {
        let mut findings = Vec::new();
        let all_codes: Vec<&DtcInfo> = dtc_result.all_codes().collect();
        if all_codes.is_empty() {
            return findings;
        }

        if dtc_result.has_critical() {
            let critical: Vec<&str> = all_codes
                .iter()
                .filter(|c| c.severity == Severity::Critical)
                .map(|c| c.code.as_str())
                .collect();
            findings.push(
                AnalysisFinding::new(
                    "Critical DTCs Present",
                    format!(
                        "Critical diagnostic codes detected: {}. \
                         These require immediate attention to prevent damage.",
                        critical.join(", ")
                    ),
                )
                .severity(Severity::Critical)
                .category("dtc")
                .confidence(1.0)
                .recommendations(&[
                    "Address critical codes before driving further",
                    "Consult a professional if unsure",
                ])
                .related_dtcs(&critical),
            );
        }

        // systems in order of first appearance
        let mut systems: Vec<(&str, Vec<&str>)> = Vec::new();
        for code in &all_codes {
            let system = code.system();
            match systems.iter_mut().find(|(s, _)| *s == system) {
                Some((_, codes)) => codes.push(code.code.as_str()),
                None => systems.push((system, vec![code.code.as_str()])),
            }
        }
        for (system, codes) in systems.iter().filter(|(_, codes)| codes.len() > 1) {
            findings.push(
                AnalysisFinding::new(
                    format!("Multiple {} Codes", system),
                    format!(
                        "Multiple codes in the same system: {}. These may share a common cause.",
                        codes.join(", ")
                    ),
                )
                .severity(Severity::Warning)
                .category("dtc")
                .confidence(0.8)
                .recommendations_owned(vec![
                    format!("Focus diagnosis on {} system", system),
                    "Check for common causes between codes".to_string(),
                ])
                .related_dtcs(codes),
            );
        }

        let stored: BTreeSet<&str> = dtc_result.stored_codes.iter().map(|c| c.code.as_str()).collect();
        let pending: BTreeSet<&str> = dtc_result.pending_codes.iter().map(|c| c.code.as_str()).collect();
        let recurring: Vec<&str> = stored.intersection(&pending).copied().collect();
        if !recurring.is_empty() {
            findings.push(
                AnalysisFinding::new(
                    "Recurring Faults",
                    format!(
                        "Codes {} appear in both stored and pending. \
                         The underlying issue may not be fully resolved.",
                        recurring.join(", ")
                    ),
                )
                .severity(Severity::Warning)
                .category("dtc")
                .confidence(0.9)
                .related_dtcs(&recurring),
            );
        }

        findings
    }

    fn analyze_sensor_anomalies(session: &DiagnosticSession) -> Vec<AnalysisFinding> {
        let mut findings = Vec::new();

        let temps = session.values_of(pid::COOLANT_TEMP);
        if temps.len() > 10 {
            let changes = statistics::deltas(&temps);
            let recent = &changes[changes.len().saturating_sub(10)..];
            let latest = temps.last().copied().unwrap_or_default();
            if recent.iter().all(|c| *c >= 0.0) && latest > 100.0 {
                findings.push(
                    AnalysisFinding::new(
                        "Temperature Rising Continuously",
                        "Coolant temperature is continuously rising without stabilizing. \
                         Possible cooling system issue.",
                    )
                    .severity(Severity::Critical)
                    .category("cooling")
                    .confidence(0.8)
                    .recommendations(&[
                        "Stop and check coolant level",
                        "Check for cooling fan operation",
                        "Inspect for leaks",
                    ])
                    .related_pids(&[pid::COOLANT_TEMP]),
                );
            }
        }

        for (name, values) in Correlator::collect_series(session) {
            if values.len() <= 20 {
                continue;
            }
            let unique: BTreeSet<String> = values.iter().map(|v| rounded_tenths(*v)).collect();
            if unique.len() < 3 {
                findings.push(
                    AnalysisFinding::new(
                        format!("{} Sensor May Be Stuck", name),
                        format!(
                            "{} sensor shows almost no variation ({} unique values). \
                             Sensor may be failing or disconnected.",
                            name,
                            unique.len()
                        ),
                    )
                    .severity(Severity::Warning)
                    .category("sensor")
                    .confidence(0.6)
                    .recommendations_owned(vec![
                        format!("Check {} sensor wiring", name),
                        format!("Test {} sensor response", name),
                    ])
                    .related_pids(&[name.as_str()]),
                );
            }
        }

        findings
    }

    fn analyze_fuel_system(session: &DiagnosticSession) -> Vec<AnalysisFinding> {
        let mut findings = Vec::new();
        let short_trim = session.values_of(pid::SHORT_FUEL_TRIM_1);
        let long_trim = session.values_of(pid::LONG_FUEL_TRIM_1);

        if let Some(avg_long) = statistics::mean(&long_trim) {
            if avg_long > 15.0 {
                findings.push(
                    AnalysisFinding::new(
                        "System Running Lean",
                        format!(
                            "Long term fuel trim is +{:.1}%, indicating the engine \
                             is compensating for a lean condition.",
                            avg_long
                        ),
                    )
                    .severity(Severity::Warning)
                    .category("fuel")
                    .confidence(0.8)
                    .recommendations(&[
                        "Check for vacuum leaks",
                        "Clean or replace MAF sensor",
                        "Check fuel pressure",
                        "Inspect intake gaskets",
                    ])
                    .related_pids(&[pid::LONG_FUEL_TRIM_1, pid::SHORT_FUEL_TRIM_1])
                    .related_dtcs(&["P0171", "P0174"]),
                );
            } else if avg_long < -15.0 {
                findings.push(
                    AnalysisFinding::new(
                        "System Running Rich",
                        format!(
                            "Long term fuel trim is {:.1}%, indicating the engine \
                             is compensating for a rich condition.",
                            avg_long
                        ),
                    )
                    .severity(Severity::Warning)
                    .category("fuel")
                    .confidence(0.8)
                    .recommendations(&[
                        "Check fuel injectors for leaks",
                        "Check fuel pressure regulator",
                        "Inspect O2 sensors",
                        "Check for coolant temp sensor issues",
                    ])
                    .related_pids(&[pid::LONG_FUEL_TRIM_1, pid::SHORT_FUEL_TRIM_1])
                    .related_dtcs(&["P0172", "P0175"]),
                );
            }
        }

        if short_trim.len() >= 10 {
            if let Some(std_short) = statistics::population_std_dev(&short_trim) {
                if std_short > 10.0 {
                    findings.push(
                        AnalysisFinding::new(
                            "Erratic Fuel Trim",
                            format!(
                                "Short term fuel trim is highly variable (std: {:.1}%). \
                                 This suggests inconsistent air/fuel mixture.",
                                std_short
                            ),
                        )
                        .category("fuel")
                        .confidence(0.6)
                        .recommendations(&[
                            "Check O2 sensor response",
                            "Look for intermittent vacuum leaks",
                            "Check for fuel delivery issues",
                        ])
                        .related_pids(&[pid::SHORT_FUEL_TRIM_1]),
                    );
                }
            }
        }

        findings
    }

    fn analyze_o2_sensors(session: &DiagnosticSession) -> Vec<AnalysisFinding> {
        let mut findings = Vec::new();
        let o2 = session.values_of(pid::O2_B1S1);
        if o2.len() < 20 {
            debug!("only {} O2 readings, skipping O2 checks", o2.len());
            return findings;
        }
        let (Some(avg_o2), Some(std_o2)) = (statistics::mean(&o2), statistics::sample_std_dev(&o2))
        else {
            return findings;
        };

        if std_o2 < 0.05 {
            findings.push(
                AnalysisFinding::new(
                    "O2 Sensor Not Switching",
                    format!(
                        "O2 sensor voltage is not oscillating (std: {:.3}V). \
                         Sensor may be stuck or engine may not be in closed loop.",
                        std_o2
                    ),
                )
                .severity(Severity::Warning)
                .category("sensor")
                .confidence(0.7)
                .recommendations(&[
                    "Verify engine is at operating temperature",
                    "Check O2 sensor heater operation",
                    "Consider O2 sensor replacement",
                ])
                .related_pids(&[pid::O2_B1S1])
                .related_dtcs(&["P0133", "P0134"]),
            );
        }

        if avg_o2 > 0.7 {
            findings.push(
                AnalysisFinding::new(
                    "O2 Sensor Indicates Rich",
                    format!("O2 sensor average is {:.2}V (rich). Engine may be running rich.", avg_o2),
                )
                .category("fuel")
                .related_pids(&[pid::O2_B1S1]),
            );
        } else if avg_o2 < 0.3 {
            findings.push(
                AnalysisFinding::new(
                    "O2 Sensor Indicates Lean",
                    format!("O2 sensor average is {:.2}V (lean). Engine may be running lean.", avg_o2),
                )
                .category("fuel")
                .related_pids(&[pid::O2_B1S1]),
            );
        }

        findings
    }

    /// Derives symptom flags; missing trim and coolant readings count as zero.
    pub fn symptoms(session: &DiagnosticSession) -> Symptoms {
        let mut symptoms = Symptoms::default();

        let idle_rpm: Vec<f64> = session
            .values_of(pid::RPM)
            .into_iter()
            .filter(|rpm| *rpm < IDLE_RPM)
            .collect();
        if idle_rpm.len() > 5 {
            symptoms.rough_idle = statistics::sample_std_dev(&idle_rpm).is_some_and(|s| s > 50.0);
        }

        let long_trim: Vec<f64> = session
            .pid_samples
            .iter()
            .map(|s| s.get(pid::LONG_FUEL_TRIM_1).unwrap_or(0.0))
            .collect();
        if let Some(avg_trim) = statistics::mean(&long_trim) {
            symptoms.lean_running = avg_trim > 10.0;
            symptoms.rich_running = avg_trim < -10.0;
        }

        let coolant: Vec<f64> = session
            .pid_samples
            .iter()
            .map(|s| s.get(pid::COOLANT_TEMP).unwrap_or(0.0))
            .collect();
        symptoms.overheating = statistics::max(&coolant).is_some_and(|m| m > 105.0);

        symptoms
    }

    fn correlate_symptoms(session: &DiagnosticSession) -> Vec<AnalysisFinding> {
        let mut findings = Vec::new();
        let symptoms = Self::symptoms(session);
        debug!("derived symptoms: {:?}", symptoms);

        if symptoms.rough_idle && symptoms.lean_running {
            findings.push(
                AnalysisFinding::new(
                    "Vacuum Leak Likely",
                    "Combination of rough idle and lean running strongly suggests a vacuum leak.",
                )
                .severity(Severity::Warning)
                .category("diagnosis")
                .confidence(0.85)
                .recommendations(&[
                    "Perform smoke test for vacuum leaks",
                    "Check intake manifold gaskets",
                    "Inspect vacuum hoses",
                    "Check PCV valve",
                ])
                .related_pids(&[pid::RPM, pid::LONG_FUEL_TRIM_1]),
            );
        }

        if symptoms.rough_idle && symptoms.rich_running {
            findings.push(
                AnalysisFinding::new(
                    "Fuel Injector Issue Likely",
                    "Combination of rough idle and rich running suggests fuel injector problems.",
                )
                .severity(Severity::Warning)
                .category("diagnosis")
                .confidence(0.7)
                .recommendations(&[
                    "Check for leaking fuel injectors",
                    "Clean fuel injectors",
                    "Check fuel pressure regulator",
                ])
                .related_pids(&[pid::RPM, pid::LONG_FUEL_TRIM_1]),
            );
        }

        findings
    }
}

impl Default for FaultDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for FaultDetector {
    fn name(&self) -> &'static str {
        "Fault Detection"
    }

    fn description(&self) -> &'static str {
        "Correlates sensor data and DTCs to detect and predict faults"
    }

    fn required_pids(&self) -> &'static [&'static str] {
        &[
            pid::COOLANT_TEMP,
            pid::RPM,
            pid::ENGINE_LOAD,
            pid::O2_B1S1,
            pid::SHORT_FUEL_TRIM_1,
            pid::LONG_FUEL_TRIM_1,
        ]
    }

    fn analyze(&self, session: &DiagnosticSession) -> AnalysisResult {
        let has_codes = session.dtc_result.as_ref().is_some_and(|r| r.total_codes() > 0);
        if session.pid_samples.is_empty() && !has_codes {
            return self.insufficient_data(
                "No Data",
                "No PID samples or trouble codes available for analysis",
                "Insufficient data for fault detection",
            );
        }

        let mut findings = Vec::new();
        let mut metrics = HashMap::new();

        if let Some(dtc_result) = &session.dtc_result {
            findings.extend(Self::analyze_dtcs(dtc_result));
            metrics.insert("dtc_count".to_string(), dtc_result.total_codes() as f64);
        }

        if !session.pid_samples.is_empty() {
            findings.extend(Self::analyze_sensor_anomalies(session));
            findings.extend(Self::analyze_fuel_system(session));
            findings.extend(Self::analyze_o2_sensors(session));
            findings.extend(Self::correlate_symptoms(session));

            if let Some(avg) = statistics::mean(&session.values_of(pid::LONG_FUEL_TRIM_1)) {
                metrics.insert("avg_long_fuel_trim".to_string(), avg);
            }
            if let Some(max) = statistics::max(&session.values_of(pid::COOLANT_TEMP)) {
                metrics.insert("max_coolant_temp".to_string(), max);
            }
            if let Some(avg) = statistics::mean(&session.values_of(pid::O2_B1S1)) {
                metrics.insert("o2_avg".to_string(), avg);
            }
        }

        let critical_count = findings.iter().filter(|f| f.severity == Severity::Critical).count();
        let warning_count = findings.iter().filter(|f| f.severity == Severity::Warning).count();
        let summary = if critical_count > 0 {
            format!(
                "CRITICAL: {} critical issue(s) detected requiring immediate attention.",
                critical_count
            )
        } else if warning_count > 0 {
            format!("Found {} potential issue(s) that should be investigated.", warning_count)
        } else {
            "No significant faults detected. Vehicle appears to be operating normally.".to_string()
        };

        self.create_result(findings, summary, metrics)
    }
}
