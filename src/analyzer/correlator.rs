use crate::analyzer::contract::Analyzer;
use crate::analyzer::statistics;
use crate::model::{AnalysisFinding, AnalysisResult, DiagnosticSession, Severity, pid};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

const MIN_SAMPLES: usize = 10;
const MIN_SERIES_LEN: usize = 10;
const MIN_STATS_LEN: usize = 20;
const MIN_BASELINE_LEN: usize = 5;

/// (first, second, minimum correlation, explanation)
const EXPECTED_CORRELATIONS: &[(&str, &str, f64, &str)] = &[
    (pid::RPM, pid::MAF, 0.5, "RPM and MAF should correlate (more RPM = more air)"),
    (pid::THROTTLE_POS, pid::ENGINE_LOAD, 0.4, "Throttle and load should correlate"),
    (pid::SPEED, pid::RPM, 0.3, "Speed and RPM should correlate (in gear)"),
];

/// Per-parameter series in order of first appearance.
pub type SeriesSet = Vec<(String, Vec<f64>)>;

/// Pairwise correlations in the order they were computed.
pub type CorrelationMap = Vec<((String, String), f64)>;

/// Reference statistics for one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub sample_count: usize,
}

/// Cross-signal consistency checks: expected correlations, outliers and drift.
pub struct Correlator;

impl Correlator {
    pub fn new() -> Self {
        Self
    }

    /// Every parameter's values concatenated across samples.
    pub fn collect_series(session: &DiagnosticSession) -> SeriesSet {
        let mut series: SeriesSet = Vec::new();
        for sample in &session.pid_samples {
            for (name, value) in &sample.values {
                match series.iter_mut().find(|(n, _)| n == name) {
                    Some((_, values)) => values.push(*value),
                    None => series.push((name.clone(), vec![*value])),
                }
            }
        }
        series
    }

    /// Series long enough to take part in correlation analysis.
    pub fn extract_series(session: &DiagnosticSession) -> SeriesSet {
        Self::collect_series(session)
            .into_iter()
            .filter(|(_, values)| values.len() >= MIN_SERIES_LEN)
            .collect()
    }

    pub fn calculate_correlations(series: &SeriesSet) -> CorrelationMap {
        let mut correlations = Vec::new();
        for (i, (pid1, values1)) in series.iter().enumerate() {
            for (pid2, values2) in series.iter().skip(i + 1) {
                let len = values1.len().min(values2.len());
                if len < MIN_SERIES_LEN {
                    continue;
                }
                if let Some(corr) = statistics::pearson(&values1[..len], &values2[..len]) {
                    correlations.push(((pid1.clone(), pid2.clone()), corr));
                }
            }
        }
        correlations
    }

    /// Looks a pair up in either order.
    pub fn lookup(correlations: &CorrelationMap, a: &str, b: &str) -> Option<f64> {
        correlations
            .iter()
            .find(|((x, y), _)| (x == a && y == b) || (x == b && y == a))
            .map(|(_, corr)| *corr)
    }

    fn expected_correlation_findings(correlations: &CorrelationMap) -> Vec<AnalysisFinding> {
        let mut findings = Vec::new();

        for &(pid1, pid2, min_corr, explanation) in EXPECTED_CORRELATIONS {
            let Some(actual) = Self::lookup(correlations, pid1, pid2) else {
                continue;
            };
            if actual < min_corr {
                let severity = if actual < 0.0 { Severity::Warning } else { Severity::Info };
                findings.push(
                    AnalysisFinding::new(
                        format!("Unexpected Low Correlation: {}-{}", pid1, pid2),
                        format!(
                            "Expected positive correlation between {} and {}, but found {:.2}. {}",
                            pid1, pid2, actual, explanation
                        ),
                    )
                    .severity(severity)
                    .category("correlation")
                    .confidence(0.6)
                    .related_pids(&[pid1, pid2]),
                );
            }
        }

        if let Some(corr) = Self::lookup(correlations, pid::RPM, pid::SPEED) {
            if corr < -0.3 {
                findings.push(
                    AnalysisFinding::new(
                        "Negative RPM-Speed Correlation",
                        "RPM and Speed are negatively correlated, which is unusual. \
                         May indicate transmission issues or data collection during unusual conditions.",
                    )
                    .category("correlation")
                    .confidence(0.5)
                    .related_pids(&[pid::RPM, pid::SPEED]),
                );
            }
        }

        findings
    }

    fn anomaly_findings(series: &SeriesSet) -> Vec<AnalysisFinding> {
        let mut findings = Vec::new();

        for (name, values) in series {
            if values.len() < MIN_STATS_LEN {
                continue;
            }
            let (Some(mean), Some(std)) =
                (statistics::mean(values), statistics::sample_std_dev(values))
            else {
                continue;
            };
            if std == 0.0 {
                debug!("{} is constant, skipping outlier scan", name);
                continue;
            }

            let outliers = values.iter().filter(|v| (*v - mean).abs() > 3.0 * std).count();
            if outliers as f64 > values.len() as f64 * 0.05 {
                findings.push(
                    AnalysisFinding::new(
                        format!("Data Anomalies in {}", name),
                        format!(
                            "Found {} outlier readings ({:.1}%) in {} data. \
                             This may indicate sensor issues or unusual conditions.",
                            outliers,
                            outliers as f64 / values.len() as f64 * 100.0,
                            name
                        ),
                    )
                    .category("anomaly")
                    .confidence(0.5)
                    .related_pids(&[name.as_str()]),
                );
            }

            let spikes = statistics::deltas(values)
                .iter()
                .filter(|d| d.abs() > 3.0 * std)
                .count();
            if spikes > 5 {
                findings.push(
                    AnalysisFinding::new(
                        format!("Sudden Changes in {}", name),
                        format!(
                            "Detected {} sudden value changes in {}. \
                             This may indicate intermittent sensor issues.",
                            spikes, name
                        ),
                    )
                    .severity(Severity::Warning)
                    .category("anomaly")
                    .confidence(0.6)
                    .related_pids(&[name.as_str()]),
                );
            }
        }

        findings
    }

    fn trend_findings(series: &SeriesSet) -> Vec<AnalysisFinding> {
        let mut findings = Vec::new();

        for (name, values) in series {
            if values.len() < MIN_STATS_LEN {
                continue;
            }
            let Some(slope) = statistics::index_slope(values) else {
                continue;
            };
            let Some(mean) = statistics::mean(values) else {
                continue;
            };
            if mean == 0.0 {
                continue;
            }

            // percent of the mean per sample
            let relative = slope / mean * 100.0;
            if relative.abs() > 1.0 {
                let direction = if slope > 0.0 { "increasing" } else { "decreasing" };
                let severity = if relative.abs() < 2.0 { Severity::Info } else { Severity::Warning };
                findings.push(
                    AnalysisFinding::new(
                        format!("Trending {}", name),
                        format!(
                            "{} shows a consistent {} trend ({:.2}% per sample). \
                             This may indicate a developing issue.",
                            name, direction, relative
                        ),
                    )
                    .severity(severity)
                    .category("trend")
                    .confidence(0.5)
                    .related_pids(&[name.as_str()]),
                );
            }
        }

        findings
    }

    /// Baseline statistics for every series with at least five values.
    pub fn calculate_baseline(series: &SeriesSet) -> HashMap<String, Baseline> {
        series
            .iter()
            .filter(|(_, values)| values.len() >= MIN_BASELINE_LEN)
            .filter_map(|(name, values)| {
                let baseline = Baseline {
                    mean: statistics::mean(values)?,
                    std: statistics::sample_std_dev(values).unwrap_or(0.0),
                    min: statistics::min(values)?,
                    max: statistics::max(values)?,
                    median: statistics::median(values)?,
                    sample_count: values.len(),
                };
                Some((name.clone(), baseline))
            })
            .collect()
    }

    /// Flags current readings more than three standard deviations from their baseline.
    pub fn compare_to_baseline(
        current: &BTreeMap<String, f64>,
        baselines: &HashMap<String, Baseline>,
    ) -> Vec<AnalysisFinding> {
        let mut findings = Vec::new();

        for (name, value) in current {
            let Some(baseline) = baselines.get(name) else {
                continue;
            };
            if baseline.std == 0.0 {
                continue;
            }

            let z_score = (value - baseline.mean) / baseline.std;
            if z_score.abs() > 3.0 {
                let severity = if z_score.abs() > 4.0 { Severity::Warning } else { Severity::Info };
                findings.push(
                    AnalysisFinding::new(
                        format!("{} Outside Normal Range", name),
                        format!(
                            "Current {} value ({:.1}) is {:.1} standard deviations from baseline ({:.1}).",
                            name,
                            value,
                            z_score.abs(),
                            baseline.mean
                        ),
                    )
                    .severity(severity)
                    .category("baseline")
                    .confidence(0.7)
                    .related_pids(&[name.as_str()]),
                );
            }
        }

        findings
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for Correlator {
    fn name(&self) -> &'static str {
        "Statistical Correlation Analysis"
    }

    fn description(&self) -> &'static str {
        "Identifies unusual patterns and correlations in sensor data"
    }

    fn required_pids(&self) -> &'static [&'static str] {
        &[
            pid::RPM,
            pid::SPEED,
            pid::ENGINE_LOAD,
            pid::THROTTLE_POS,
            pid::MAF,
            pid::COOLANT_TEMP,
        ]
    }

    fn analyze(&self, session: &DiagnosticSession) -> AnalysisResult {
        if session.pid_samples.len() < MIN_SAMPLES {
            return self.insufficient_data(
                "Insufficient Data",
                "Need at least 10 samples for correlation analysis",
                "Insufficient data for correlation analysis",
            );
        }

        let series = Self::extract_series(session);
        if series.len() < 2 {
            return self.insufficient_data(
                "Insufficient PIDs",
                "Need at least 2 different PIDs for correlation analysis",
                "Insufficient PID data for correlation",
            );
        }

        let correlations = Self::calculate_correlations(&series);

        let mut metrics = HashMap::new();
        metrics.insert("series_count".to_string(), series.len() as f64);
        for ((a, b), corr) in &correlations {
            metrics.insert(format!("corr:{}/{}", a, b), *corr);
        }

        let mut findings = Self::expected_correlation_findings(&correlations);
        findings.extend(Self::anomaly_findings(&series));
        findings.extend(Self::trend_findings(&series));

        let anomaly_count = findings
            .iter()
            .filter(|f| f.severity >= Severity::Warning)
            .count();
        let summary = if anomaly_count > 0 {
            format!("Found {} anomaly(s) in sensor data correlations.", anomaly_count)
        } else {
            "Sensor data correlations appear normal.".to_string()
        };

        self.create_result(findings, summary, metrics)
    }
}
