use obd_insight::analyzer::Correlator;
use obd_insight::config::{AppConfig, load_config};
use obd_insight::loader::{JsonSessionLoader, SessionSource};
use obd_insight::model::{AnalysisFinding, DiagnosticSession, Severity};
use obd_insight::orchestrator::{ReportSummary, analyzers_for, run_analyzers};
use obd_insight::storage::BaselineStore;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Serialize)]
struct Report<'a> {
    summary: ReportSummary,
    session: &'a DiagnosticSession,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load configuration from file
    let config: AppConfig = match load_config("config.json") {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Config load error: {}", e);
            return;
        }
    };

    let loader = JsonSessionLoader::new(&config.session_path);
    let mut session = match loader.load().await {
        Ok(s) => s,
        Err(e) => {
            error!("Session load error: {}", e);
            return;
        }
    };

    let mut storage = match BaselineStore::new(&config.baseline_db) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to initialize baseline storage: {}", e);
            return;
        }
    };

    check_against_baseline(&storage, &config.vehicle_id, &session);

    info!("Running {} analyzer(s)...", config.analyzers.len());
    let shared = Arc::new(session.clone());
    let results = run_analyzers(shared, analyzers_for(&config.analyzers)).await;
    for result in results {
        log_result_findings(&result.analyzer_name, &result.summary, &result.findings);
        session.add_analysis(result);
    }

    let summary = ReportSummary::from_results(&session.analysis_results);
    info!(
        "Findings: {} critical, {} warning, {} info",
        summary.critical, summary.warning, summary.info
    );

    info!("Updating baselines for vehicle {}...", config.vehicle_id);
    let baselines = Correlator::calculate_baseline(&Correlator::collect_series(&session));
    if baselines.is_empty() {
        info!("Not enough data to update baselines");
    } else if let Err(e) = storage.save_baselines(&config.vehicle_id, &baselines) {
        warn!("Baseline update failed: {}", e);
    } else {
        info!("Stored baselines for {} parameter(s)", baselines.len());
    }

    if let Some(path) = &config.report_path {
        write_report(path, &Report { summary, session: &session });
    }
}

/// Logs current readings that deviate from the stored baseline.
fn check_against_baseline(storage: &BaselineStore, vehicle_id: &str, session: &DiagnosticSession) {
    let baselines = match storage.load_baselines(vehicle_id) {
        Ok(b) => b,
        Err(e) => {
            warn!("Baseline load failed: {}", e);
            return;
        }
    };
    if baselines.is_empty() {
        info!("No stored baseline for vehicle {}", vehicle_id);
        return;
    }
    if let Ok(Some(updated)) = storage.last_updated(vehicle_id) {
        info!("Comparing against baseline from {}", updated);
    }

    let deviations = Correlator::compare_to_baseline(&session.latest_values(), &baselines);
    if deviations.is_empty() {
        info!("Latest readings are within baseline range");
    }
    for finding in deviations {
        warn!("{}: {}", finding.title, finding.description);
    }
}

fn log_result_findings(analyzer: &str, summary: &str, findings: &[AnalysisFinding]) {
    info!("{}: {}", analyzer, summary);
    for finding in findings {
        match finding.severity {
            Severity::Critical => error!("[{}] {}: {}", analyzer, finding.title, finding.description),
            Severity::Warning => warn!("[{}] {}: {}", analyzer, finding.title, finding.description),
            Severity::Info => info!("[{}] {}: {}", analyzer, finding.title, finding.description),
        }
    }
}

fn write_report(path: &str, report: &Report<'_>) {
    let json = match serde_json::to_string_pretty(report) {
        Ok(j) => j,
        Err(e) => {
            warn!("Failed to serialize report: {}", e);
            return;
        }
    };
    if let Some(folder) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(folder) {
            warn!("Failed to create report folder: {}", e);
            return;
        }
    }
    if let Err(e) = fs::write(path, json) {
        warn!("Failed to write report: {}", e);
    } else {
        info!("Saved report: {}", path);
    }
}
