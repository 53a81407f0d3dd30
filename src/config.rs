use crate::model::ConfigError;
use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerKind {
    Correlation,
    Faults,
    Fuel,
    Performance,
}

impl AnalyzerKind {
    pub const ALL: [AnalyzerKind; 4] = [
        AnalyzerKind::Correlation,
        AnalyzerKind::Faults,
        AnalyzerKind::Fuel,
        AnalyzerKind::Performance,
    ];
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub session_path: String,
    #[serde(default = "default_vehicle_id")]
    pub vehicle_id: String,
    #[serde(default = "default_baseline_db")]
    pub baseline_db: String,
    #[serde(default)]
    pub report_path: Option<String>,
    #[serde(default = "default_analyzers")]
    pub analyzers: Vec<AnalyzerKind>,
}

fn default_vehicle_id() -> String {
    "default".to_string()
}

fn default_baseline_db() -> String {
    "baselines.db".to_string()
}

fn default_analyzers() -> Vec<AnalyzerKind> {
    AnalyzerKind::ALL.to_vec()
}

pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    Ok(serde_json::from_str(content)?)
}

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}
