use crate::analyzer::contract::Analyzer;
use crate::analyzer::statistics;
use crate::model::{AnalysisFinding, AnalysisResult, DiagnosticSession, Severity, pid};
use std::collections::HashMap;
use tracing::debug;

/// Idle ceiling for airflow checks. The performance analyzer uses 1200.
const IDLE_RPM: f64 = 1000.0;
const KMH_TO_MPH: f64 = 0.621371;
/// Gasoline at stoichiometric AFR 14.7: mph * 7.718 / MAF gives MPG.
const MPG_FACTOR: f64 = 7.718;
const STOICH_AFR: f64 = 14.7;
/// Gasoline density in g/L.
const FUEL_DENSITY: f64 = 750.0;

/// Derives fuel-consumption metrics and flags inefficient driving or airflow patterns.
pub struct FuelEconomyAnalyzer;

impl FuelEconomyAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Instantaneous MPG from speed in km/h and airflow in g/s.
    pub fn mpg(speed_kmh: f64, maf: f64) -> f64 {
        speed_kmh * KMH_TO_MPH * MPG_FACTOR / maf
    }

    /// Plausible MPG values over the aligned MAF/SPEED prefix.
    pub fn mpg_series(maf: &[f64], speed: &[f64]) -> Vec<f64> {
        maf.iter()
            .zip(speed.iter())
            .filter(|(maf, speed)| **speed >= 5.0 && **maf >= 0.5)
            .map(|(maf, speed)| Self::mpg(*speed, *maf))
            .filter(|mpg| *mpg > 1.0 && *mpg < 100.0)
            .collect()
    }

    /// MAF readings whose index-aligned RPM is below idle.
    fn idle_maf(maf: &[f64], rpm: &[f64]) -> Vec<f64> {
        maf.iter()
            .zip(rpm.iter())
            .filter(|(_, rpm)| **rpm < IDLE_RPM)
            .map(|(maf, _)| *maf)
            .collect()
    }

    fn analyze_mpg_patterns(mpg: &[f64]) -> Vec<AnalysisFinding> {
        let mut findings = Vec::new();
        if mpg.len() < 5 {
            debug!("only {} plausible MPG values, skipping economy checks", mpg.len());
            return findings;
        }
        let (Some(avg_mpg), Some(std_mpg)) =
            (statistics::mean(mpg), statistics::population_std_dev(mpg))
        else {
            return findings;
        };

        if avg_mpg < 15.0 {
            findings.push(
                AnalysisFinding::new(
                    "Poor Fuel Economy",
                    format!(
                        "Average fuel economy is {:.1} MPG, which is below typical values. \
                         This may indicate engine or driving efficiency issues.",
                        avg_mpg
                    ),
                )
                .severity(Severity::Warning)
                .category("fuel")
                .confidence(0.7)
                .recommendations(&[
                    "Check for dragging brakes",
                    "Verify tire pressure",
                    "Check air filter",
                    "Consider driving habit adjustments",
                    "Check for engine issues (misfires, O2 sensors)",
                ])
                .related_pids(&[pid::MAF, pid::SPEED]),
            );
        }

        if std_mpg > 10.0 {
            findings.push(
                AnalysisFinding::new(
                    "Inconsistent Fuel Economy",
                    format!(
                        "Fuel economy varies significantly ({:.1} MPG std). \
                         This suggests varied driving conditions or engine inconsistency.",
                        std_mpg
                    ),
                )
                .category("fuel")
                .confidence(0.6)
                .related_pids(&[pid::MAF, pid::SPEED]),
            );
        }

        findings
    }

    fn analyze_maf_patterns(maf: &[f64], rpm: &[f64]) -> Vec<AnalysisFinding> {
        let mut findings = Vec::new();
        if maf.len() < 5 {
            debug!("only {} MAF readings, skipping airflow checks", maf.len());
            return findings;
        }

        if let Some(max_maf) = statistics::max(maf).filter(|m| *m > 200.0) {
            findings.push(
                AnalysisFinding::new(
                    "High Airflow Detected",
                    format!(
                        "Maximum MAF reading of {:.1} g/s detected. \
                         Verify this matches expected engine performance.",
                        max_maf
                    ),
                )
                .category("fuel")
                .related_pids(&[pid::MAF]),
            );
        }

        if let Some(idle_avg) = statistics::mean(&Self::idle_maf(maf, rpm)).filter(|m| *m > 10.0) {
            findings.push(
                AnalysisFinding::new(
                    "High Idle Airflow",
                    format!(
                        "MAF at idle is higher than expected ({:.1} g/s). \
                         This may indicate a vacuum leak or MAF sensor issue.",
                        idle_avg
                    ),
                )
                .severity(Severity::Warning)
                .category("fuel")
                .confidence(0.6)
                .recommendations(&[
                    "Check for vacuum leaks",
                    "Clean MAF sensor",
                    "Check intake system for leaks",
                ])
                .related_pids(&[pid::MAF, pid::RPM]),
            );
        }

        findings
    }

    /// Estimated idle fuel flow in L/h, if at least three idle readings exist.
    pub fn idle_fuel_lph(maf: &[f64], rpm: &[f64]) -> Option<f64> {
        let idle = Self::idle_maf(maf, rpm);
        if idle.len() < 3 {
            return None;
        }
        statistics::mean(&idle).map(|avg| avg * 3600.0 / (STOICH_AFR * FUEL_DENSITY))
    }

    fn analyze_idle_fuel(maf: &[f64], rpm: &[f64]) -> Vec<AnalysisFinding> {
        let mut findings = Vec::new();
        let Some(idle_fuel) = Self::idle_fuel_lph(maf, rpm) else {
            debug!("fewer than 3 idle MAF readings, skipping idle fuel estimate");
            return findings;
        };

        if idle_fuel > 2.0 {
            findings.push(
                AnalysisFinding::new(
                    "High Idle Fuel Consumption",
                    format!(
                        "Estimated idle fuel consumption is {:.1} L/h. \
                         This is higher than typical for most vehicles.",
                        idle_fuel
                    ),
                )
                .category("fuel")
                .confidence(0.5)
                .recommendations(&[
                    "Check for accessories consuming power",
                    "Verify engine is at operating temperature",
                    "Check for vacuum leaks",
                ])
                .related_pids(&[pid::MAF, pid::RPM]),
            );
        }

        findings
    }

    fn analyze_driving_efficiency(speed: &[f64], rpm: &[f64]) -> Vec<AnalysisFinding> {
        let mut findings = Vec::new();
        if speed.len() < 10 || rpm.len() < 10 {
            debug!(
                "{} speed / {} RPM readings, skipping driving efficiency",
                speed.len(),
                rpm.len()
            );
            return findings;
        }

        // km/h per 1000 rpm, a rough gear indicator
        let ratios: Vec<f64> = speed
            .iter()
            .zip(rpm.iter())
            .filter(|(speed, rpm)| **rpm > 500.0 && **speed > 20.0)
            .map(|(speed, rpm)| speed / rpm * 1000.0)
            .collect();

        if statistics::mean(&ratios).is_some_and(|avg| avg < 20.0) {
            findings.push(
                AnalysisFinding::new(
                    "High RPM Driving Pattern",
                    "Vehicle is being driven at higher RPMs than necessary for the speed. \
                     This reduces fuel economy.",
                )
                .category("driving")
                .confidence(0.6)
                .recommendations(&[
                    "Shift to higher gear sooner",
                    "Use eco/economy mode if available",
                    "Accelerate more gradually",
                ])
                .related_pids(&[pid::SPEED, pid::RPM]),
            );
        }

        findings
    }

    fn analyze_acceleration(speed: &[f64]) -> Vec<AnalysisFinding> {
        let mut findings = Vec::new();
        if speed.len() < 10 {
            debug!("only {} speed readings, skipping acceleration checks", speed.len());
            return findings;
        }

        let accelerations = statistics::deltas(speed);
        let aggressive = accelerations.iter().filter(|a| **a > 10.0).count();
        if aggressive as f64 > accelerations.len() as f64 * 0.2 {
            findings.push(
                AnalysisFinding::new(
                    "Aggressive Acceleration Pattern",
                    format!(
                        "Detected frequent rapid acceleration ({} instances). \
                         This significantly impacts fuel economy.",
                        aggressive
                    ),
                )
                .category("driving")
                .confidence(0.7)
                .recommendations(&[
                    "Accelerate more gradually",
                    "Anticipate traffic to avoid sudden acceleration",
                    "Use cruise control when possible",
                ])
                .related_pids(&[pid::SPEED]),
            );
        }

        let stationary = speed.iter().filter(|s| **s < 5.0).count();
        if stationary as f64 > speed.len() as f64 * 0.3 {
            findings.push(
                AnalysisFinding::new(
                    "Excessive Idling Detected",
                    format!(
                        "Vehicle was stationary for {:.0}% of the monitoring period. \
                         Idling wastes fuel.",
                        stationary as f64 / speed.len() as f64 * 100.0
                    ),
                )
                .category("driving")
                .confidence(0.8)
                .recommendations(&[
                    "Turn off engine during extended stops",
                    "Use auto start-stop if equipped",
                    "Plan routes to minimize stop-and-go traffic",
                ])
                .related_pids(&[pid::SPEED]),
            );
        }

        findings
    }
}

impl Default for FuelEconomyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for FuelEconomyAnalyzer {
    fn name(&self) -> &'static str {
        "Fuel Economy Analysis"
    }

    fn description(&self) -> &'static str {
        "Analyzes fuel consumption patterns and identifies inefficiencies"
    }

    fn required_pids(&self) -> &'static [&'static str] {
        &[pid::MAF, pid::SPEED, pid::RPM, pid::ENGINE_LOAD]
    }

    fn analyze(&self, session: &DiagnosticSession) -> AnalysisResult {
        if session.pid_samples.is_empty() {
            return self.insufficient_data(
                "No Data",
                "No PID samples available for analysis",
                "Insufficient data for fuel analysis",
            );
        }

        let maf = session.values_of(pid::MAF);
        let speed = session.values_of(pid::SPEED);
        let rpm = session.values_of(pid::RPM);

        let mut findings = Vec::new();
        let mut metrics = HashMap::new();

        let mpg = Self::mpg_series(&maf, &speed);
        if let (Some(avg), Some(max), Some(min)) =
            (statistics::mean(&mpg), statistics::max(&mpg), statistics::min(&mpg))
        {
            metrics.insert("average_mpg".to_string(), avg);
            metrics.insert("max_mpg".to_string(), max);
            metrics.insert("min_mpg".to_string(), min);
            findings.extend(Self::analyze_mpg_patterns(&mpg));
        }

        if let (Some(avg), Some(max)) = (statistics::mean(&maf), statistics::max(&maf)) {
            metrics.insert("avg_maf".to_string(), avg);
            metrics.insert("max_maf".to_string(), max);
            findings.extend(Self::analyze_maf_patterns(&maf, &rpm));
        }
        if let Some(avg) = statistics::mean(&speed) {
            metrics.insert("avg_speed".to_string(), avg);
        }

        if let Some(idle_fuel) = Self::idle_fuel_lph(&maf, &rpm) {
            metrics.insert("idle_fuel_lph".to_string(), idle_fuel);
        }
        findings.extend(Self::analyze_idle_fuel(&maf, &rpm));
        findings.extend(Self::analyze_driving_efficiency(&speed, &rpm));
        findings.extend(Self::analyze_acceleration(&speed));

        let summary = match metrics.get("average_mpg") {
            Some(avg) => {
                let verdict = if *avg < 15.0 {
                    "Below average efficiency - see recommendations."
                } else if *avg > 30.0 {
                    "Good fuel efficiency."
                } else {
                    "Moderate fuel efficiency."
                };
                format!("Average fuel economy: {:.1} MPG. {}", avg, verdict)
            }
            None => "Fuel economy could not be calculated. Ensure MAF and SPEED data is available."
                .to_string(),
        };

        self.create_result(findings, summary, metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PidSample;
    use chrono::Utc;

    fn session_from(rows: &[(f64, f64, f64)]) -> DiagnosticSession {
        let now = Utc::now();
        DiagnosticSession::with_samples(
            rows.iter()
                .map(|(maf, speed, rpm)| {
                    PidSample::new(now)
                        .with_value(pid::MAF, *maf)
                        .with_value(pid::SPEED, *speed)
                        .with_value(pid::RPM, *rpm)
                })
                .collect(),
        )
    }

    fn titles(result: &AnalysisResult) -> Vec<&str> {
        result.findings.iter().map(|f| f.title.as_str()).collect()
    }

    #[test]
    fn mpg_formula() {
        let mpg = FuelEconomyAnalyzer::mpg(100.0, 20.0);
        assert!((mpg - 23.98).abs() < 0.01);
    }

    #[test]
    fn implausible_and_stationary_readings_are_dropped() {
        let maf = [20.0, 20.0, 0.3, 0.6, 20.0];
        let speed = [100.0, 3.0, 100.0, 100.0, 100.0, 80.0];
        // 0.6 g/s at 100 km/h is ~799 MPG and out of range
        let series = FuelEconomyAnalyzer::mpg_series(&maf, &speed);
        assert_eq!(series.len(), 2);
        assert!(series.iter().all(|m| *m > 1.0 && *m < 100.0));
    }

    #[test]
    fn empty_session() {
        let result = FuelEconomyAnalyzer.analyze(&DiagnosticSession::new());
        assert_eq!(titles(&result), vec!["No Data"]);
        assert_eq!(result.summary, "Insufficient data for fuel analysis");
    }

    #[test]
    fn poor_economy_on_highway() {
        // 60 km/h at 40 g/s is ~7.2 MPG
        let rows: Vec<_> = (0..10).map(|_| (40.0, 60.0, 2500.0)).collect();
        let result = FuelEconomyAnalyzer.analyze(&session_from(&rows));
        assert!(titles(&result).contains(&"Poor Fuel Economy"));
        assert!(result.summary.contains("Below average efficiency"));
        assert!((result.metrics["average_mpg"] - FuelEconomyAnalyzer::mpg(60.0, 40.0)).abs() < 1e-9);
        // 60 / 2500 * 1000 = 24 km/h per 1000 rpm
        assert!(!titles(&result).contains(&"High RPM Driving Pattern"));
    }

    #[test]
    fn idle_airflow_and_fuel_rate() {
        let rows: Vec<_> = (0..10).map(|_| (12.0, 0.0, 800.0)).collect();
        let result = FuelEconomyAnalyzer.analyze(&session_from(&rows));
        let found = titles(&result);
        assert!(found.contains(&"High Idle Airflow"));
        // 12 g/s -> 12 * 3600 / 11025 = 3.9 L/h
        assert!(found.contains(&"High Idle Fuel Consumption"));
        assert!(found.contains(&"Excessive Idling Detected"));
        assert!(!result.metrics.contains_key("average_mpg"));
        assert!(result.summary.starts_with("Fuel economy could not be calculated"));
    }

    #[test]
    fn high_rpm_cruising() {
        let rows: Vec<_> = (0..10).map(|_| (25.0, 50.0, 4000.0)).collect();
        let result = FuelEconomyAnalyzer.analyze(&session_from(&rows));
        assert!(titles(&result).contains(&"High RPM Driving Pattern"));
    }

    #[test]
    fn aggressive_acceleration() {
        let rows: Vec<_> = (0..10)
            .map(|i| (20.0, 20.0 + 15.0 * i as f64, 2000.0 + 100.0 * i as f64))
            .collect();
        let result = FuelEconomyAnalyzer.analyze(&session_from(&rows));
        assert!(titles(&result).contains(&"Aggressive Acceleration Pattern"));
    }

    #[test]
    fn inconsistent_economy() {
        // alternating ~24 and ~96 MPG gives a population std of ~36
        let rows: Vec<_> = (0..10)
            .map(|i| (if i % 2 == 0 { 20.0 } else { 5.0 }, 100.0, 2500.0))
            .collect();
        let result = FuelEconomyAnalyzer.analyze(&session_from(&rows));
        let found = titles(&result);
        assert!(found.contains(&"Inconsistent Fuel Economy"));
        assert!(!found.contains(&"Poor Fuel Economy"));

        let steady: Vec<_> = (0..10).map(|_| (20.0, 100.0, 2500.0)).collect();
        let result = FuelEconomyAnalyzer.analyze(&session_from(&steady));
        assert!(!titles(&result).contains(&"Inconsistent Fuel Economy"));
    }

    #[test]
    fn high_airflow() {
        let rows: Vec<_> = (0..6).map(|i| (150.0 + 20.0 * i as f64, 150.0, 6000.0)).collect();
        let result = FuelEconomyAnalyzer.analyze(&session_from(&rows));
        let finding = result
            .findings
            .iter()
            .find(|f| f.title == "High Airflow Detected")
            .unwrap();
        assert_eq!(finding.severity, Severity::Info);
        assert_eq!(result.metrics["max_maf"], 250.0);

        let rows: Vec<_> = (0..6).map(|_| (200.0, 150.0, 6000.0)).collect();
        let result = FuelEconomyAnalyzer.analyze(&session_from(&rows));
        assert!(!titles(&result).contains(&"High Airflow Detected"));
    }
}
