use crate::analyzer::{
    Analyzer, Correlator, FaultDetector, FuelEconomyAnalyzer, PerformanceAnalyzer,
};
use crate::config::AnalyzerKind;
use crate::model::{AnalysisResult, DiagnosticSession};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

fn analyzer_of(kind: AnalyzerKind) -> Arc<dyn Analyzer> {
    match kind {
        AnalyzerKind::Correlation => Arc::new(Correlator::new()),
        AnalyzerKind::Faults => Arc::new(FaultDetector::new()),
        AnalyzerKind::Fuel => Arc::new(FuelEconomyAnalyzer::new()),
        AnalyzerKind::Performance => Arc::new(PerformanceAnalyzer::new()),
    }
}

/// All analyzers: correlation, faults, fuel, performance.
pub fn default_analyzers() -> Vec<Arc<dyn Analyzer>> {
    analyzers_for(&AnalyzerKind::ALL)
}

pub fn analyzers_for(kinds: &[AnalyzerKind]) -> Vec<Arc<dyn Analyzer>> {
    kinds.iter().copied().map(analyzer_of).collect()
}

/// Runs every analyzer on its own blocking task and returns results in analyzer order.
///
/// A task that panics is logged and contributes no result.
pub async fn run_analyzers(
    session: Arc<DiagnosticSession>,
    analyzers: Vec<Arc<dyn Analyzer>>,
) -> Vec<AnalysisResult> {
    let tasks: Vec<_> = analyzers
        .into_iter()
        .map(|analyzer| {
            let session = session.clone();
            let name = analyzer.name();
            if !analyzer.has_required_data(&session) {
                warn!("{}: session has none of {:?}", name, analyzer.required_pids());
            }
            let handle = tokio::task::spawn_blocking(move || analyzer.analyze(&session));
            async move { (name, handle.await) }
        })
        .collect();

    let mut results = Vec::with_capacity(tasks.len());
    for (name, outcome) in join_all(tasks).await {
        match outcome {
            Ok(result) => {
                debug!("{} produced {} finding(s)", name, result.findings.len());
                results.push(result);
            }
            Err(e) => error!("Analyzer {} failed: {}", name, e),
        }
    }
    results
}

/// Finding counts across a set of analysis results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub analyzers: usize,
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
}

impl ReportSummary {
    pub fn from_results(results: &[AnalysisResult]) -> Self {
        results.iter().fold(
            Self {
                analyzers: results.len(),
                ..Self::default()
            },
            |acc, r| Self {
                critical: acc.critical + r.critical_count(),
                warning: acc.warning + r.warning_count(),
                info: acc.info + r.info_count(),
                ..acc
            },
        )
    }

    pub fn total_findings(&self) -> usize {
        self.critical + self.warning + self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnalysisFinding, PidSample, Severity, pid};
    use chrono::{Duration, Utc};

    fn idle_session(n: usize) -> DiagnosticSession {
        let start = Utc::now();
        let samples = (0..n)
            .map(|i| {
                PidSample::new(start + Duration::seconds(i as i64))
                    .with_value(pid::RPM, 780.0 + (i % 5) as f64 * 10.0)
                    .with_value(pid::SPEED, 0.0)
                    .with_value(pid::MAF, 3.0 + (i % 3) as f64 * 0.1)
                    .with_value(pid::ENGINE_LOAD, 22.0 + (i % 4) as f64)
                    .with_value(pid::COOLANT_TEMP, 88.0 + (i % 2) as f64)
            })
            .collect();
        DiagnosticSession::with_samples(samples)
    }

    #[test]
    fn default_order_is_stable() {
        let names: Vec<_> = default_analyzers().iter().map(|a| a.name()).collect();
        assert_eq!(
            names,
            vec![
                "Statistical Correlation Analysis",
                "Fault Detection",
                "Fuel Economy Analysis",
                "Performance Analysis"
            ]
        );
        let picked = analyzers_for(&[AnalyzerKind::Performance, AnalyzerKind::Faults]);
        assert_eq!(picked[0].name(), "Performance Analysis");
        assert_eq!(picked[1].name(), "Fault Detection");
    }

    #[tokio::test]
    async fn results_follow_analyzer_order() {
        let session = Arc::new(idle_session(30));
        let results = run_analyzers(session, default_analyzers()).await;
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].analyzer_name, "Statistical Correlation Analysis");
        assert_eq!(results[3].analyzer_name, "Performance Analysis");
        assert!(results.iter().all(|r| !r.summary.is_empty()));
    }

    #[tokio::test]
    async fn empty_session_still_runs_every_analyzer() {
        let session = Arc::new(DiagnosticSession::new());
        let results = run_analyzers(session, default_analyzers()).await;
        assert_eq!(results.len(), 4);
        for result in &results {
            assert_eq!(result.findings.len(), 1);
            assert_eq!(result.findings[0].severity, Severity::Info);
        }
    }

    #[test]
    fn summary_counts_by_severity() {
        let result = AnalysisResult {
            analyzer_name: "x".to_string(),
            timestamp: Utc::now(),
            findings: vec![
                AnalysisFinding::new("a", "a").severity(Severity::Critical),
                AnalysisFinding::new("b", "b").severity(Severity::Warning),
                AnalysisFinding::new("c", "c").severity(Severity::Warning),
                AnalysisFinding::new("d", "d"),
            ],
            summary: String::new(),
            metrics: Default::default(),
        };
        let summary = ReportSummary::from_results(&[result.clone(), result]);
        assert_eq!(summary.analyzers, 2);
        assert_eq!(summary.critical, 2);
        assert_eq!(summary.warning, 4);
        assert_eq!(summary.info, 2);
        assert_eq!(summary.total_findings(), 8);
        assert_eq!(ReportSummary::from_results(&[]), ReportSummary::default());
    }
}
