use crate::model::{AnalysisFinding, AnalysisResult, DiagnosticSession};
use chrono::Utc;
use std::collections::{HashMap, HashSet};

/// Trait defining the interface shared by every session analyzer.
///
/// Implementations only read the session and never fail: missing or short
/// data yields an info finding rather than an error.
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Parameter names this analyzer draws on.
    fn required_pids(&self) -> &'static [&'static str];
    fn analyze(&self, session: &DiagnosticSession) -> AnalysisResult;

    /// True if at least one sample carries at least one required parameter.
    fn has_required_data(&self, session: &DiagnosticSession) -> bool {
        let required: HashSet<&str> = self.required_pids().iter().copied().collect();
        session
            .pid_samples
            .iter()
            .any(|sample| sample.values.keys().any(|k| required.contains(k.as_str())))
    }

    fn create_result(
        &self,
        findings: Vec<AnalysisFinding>,
        summary: impl Into<String>,
        metrics: HashMap<String, f64>,
    ) -> AnalysisResult
    where
        Self: Sized,
    {
        AnalysisResult {
            analyzer_name: self.name().to_string(),
            timestamp: Utc::now(),
            findings,
            summary: summary.into(),
            metrics,
        }
    }

    /// Single info finding plus an explanatory summary.
    fn insufficient_data(&self, title: &str, description: &str, summary: &str) -> AnalysisResult
    where
        Self: Sized,
    {
        self.create_result(
            vec![AnalysisFinding::new(title, description)],
            summary,
            HashMap::new(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PidSample, Severity};

    struct Probe;

    impl Analyzer for Probe {
        fn name(&self) -> &'static str {
            "Probe"
        }
        fn description(&self) -> &'static str {
            "test analyzer"
        }
        fn required_pids(&self) -> &'static [&'static str] {
            &["RPM", "MAF"]
        }
        fn analyze(&self, _session: &DiagnosticSession) -> AnalysisResult {
            self.insufficient_data("No Data", "nothing", "nothing to do")
        }
    }

    #[test]
    fn any_required_parameter_is_enough() {
        let now = Utc::now();
        let session = DiagnosticSession::with_samples(vec![
            PidSample::new(now).with_value("SPEED", 10.0),
            PidSample::new(now).with_value("MAF", 3.0),
        ]);
        assert!(Probe.has_required_data(&session));

        let unrelated =
            DiagnosticSession::with_samples(vec![PidSample::new(now).with_value("SPEED", 10.0)]);
        assert!(!Probe.has_required_data(&unrelated));
        assert!(!Probe.has_required_data(&DiagnosticSession::new()));
    }

    #[test]
    fn result_carries_analyzer_name() {
        let result = Probe.analyze(&DiagnosticSession::new());
        assert_eq!(result.analyzer_name, "Probe");
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].severity, Severity::Info);
        assert!(result.metrics.is_empty());
    }
}
