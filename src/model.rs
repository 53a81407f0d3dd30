// Core structs: samples, sessions, trouble codes, findings
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

/// Well-known parameter names as reported by the collector.
pub mod pid {
    pub const RPM: &str = "RPM";
    pub const SPEED: &str = "SPEED";
    pub const MAF: &str = "MAF";
    pub const ENGINE_LOAD: &str = "ENGINE_LOAD";
    pub const THROTTLE_POS: &str = "THROTTLE_POS";
    pub const COOLANT_TEMP: &str = "COOLANT_TEMP";
    pub const O2_B1S1: &str = "O2_B1S1";
    pub const SHORT_FUEL_TRIM_1: &str = "SHORT_FUEL_TRIM_1";
    pub const LONG_FUEL_TRIM_1: &str = "LONG_FUEL_TRIM_1";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        };
        f.write_str(label)
    }
}

/// A timestamped set of numeric parameter readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidSample {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub values: BTreeMap<String, f64>,
}

impl PidSample {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, pid: &str, value: f64) -> Self {
        self.values.insert(pid.to_string(), value);
        self
    }

    pub fn get(&self, pid: &str) -> Option<f64> {
        self.values.get(pid).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DtcCategory {
    Powertrain,
    Body,
    Chassis,
    Network,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtcType {
    #[default]
    Stored,
    Pending,
    Permanent,
}

const CRITICAL_DTC_PREFIXES: &[&str] = &[
    "P0300", "P0301", "P0302", "P0303", "P0304", "P0305", "P0306", "P0307", "P0308", "P0217",
    "P0218", "P0520", "P0521",
];

const WARNING_DTC_PREFIXES: &[&str] = &["P04", "P01", "P02", "P03"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DtcInfo {
    pub code: String,
    pub description: String,
    pub category: DtcCategory,
    pub severity: Severity,
    pub dtc_type: DtcType,
    pub timestamp: DateTime<Utc>,
}

impl DtcInfo {
    /// Builds code metadata from the raw code string, deriving category and severity.
    pub fn from_code(code: &str, description: &str, dtc_type: DtcType) -> Result<Self, DtcError> {
        let code = code.trim().to_uppercase();
        if code.chars().count() < 2 {
            return Err(DtcError::Invalid(code));
        }

        let category = match code.chars().next() {
            Some('B') => DtcCategory::Body,
            Some('C') => DtcCategory::Chassis,
            Some('U') => DtcCategory::Network,
            _ => DtcCategory::Powertrain,
        };

        Ok(Self {
            severity: Self::severity_for(&code),
            code,
            description: description.to_string(),
            category,
            dtc_type,
            timestamp: Utc::now(),
        })
    }

    fn severity_for(code: &str) -> Severity {
        if CRITICAL_DTC_PREFIXES.iter().any(|p| code.starts_with(p)) {
            Severity::Critical
        } else if WARNING_DTC_PREFIXES.iter().any(|p| code.starts_with(p)) {
            Severity::Warning
        } else {
            Severity::Info
        }
    }

    /// SAE generic codes carry 0 or 2 in the second position.
    pub fn is_generic(&self) -> bool {
        match self.code.chars().nth(1) {
            Some(c) => c == '0' || c == '2',
            None => true,
        }
    }

    /// Subsystem the code belongs to, keyed on its third character.
    pub fn system(&self) -> &'static str {
        let Some(third) = self.code.chars().nth(2) else {
            return "Unknown";
        };
        match third {
            '1' => "Fuel and Air Metering",
            '2' => "Fuel and Air Metering (Injector Circuit)",
            '3' => "Ignition System or Misfire",
            '4' => "Auxiliary Emissions Controls",
            '5' => "Vehicle Speed Controls and Idle Control System",
            '6' => "Computer Output Circuit",
            '7' | '8' => "Transmission",
            _ => "Unknown System",
        }
    }
}

impl fmt::Display for DtcInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.description)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DtcReadResult {
    #[serde(default)]
    pub stored_codes: Vec<DtcInfo>,
    #[serde(default)]
    pub pending_codes: Vec<DtcInfo>,
    #[serde(default)]
    pub permanent_codes: Vec<DtcInfo>,
    #[serde(default)]
    pub mil_status: bool,
    #[serde(default)]
    pub dtc_count: u32,
    pub timestamp: DateTime<Utc>,
}

impl DtcReadResult {
    pub fn new() -> Self {
        Self {
            stored_codes: Vec::new(),
            pending_codes: Vec::new(),
            permanent_codes: Vec::new(),
            mil_status: false,
            dtc_count: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn total_codes(&self) -> usize {
        self.stored_codes.len() + self.pending_codes.len() + self.permanent_codes.len()
    }

    pub fn has_critical(&self) -> bool {
        self.all_codes().any(|c| c.severity == Severity::Critical)
    }

    /// Stored, then pending, then permanent.
    pub fn all_codes(&self) -> impl Iterator<Item = &DtcInfo> {
        self.stored_codes
            .iter()
            .chain(self.pending_codes.iter())
            .chain(self.permanent_codes.iter())
    }
}

impl Default for DtcReadResult {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisFinding {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub category: String,
    pub confidence: f64,
    pub recommendations: Vec<String>,
    pub related_pids: Vec<String>,
    pub related_dtcs: Vec<String>,
}

impl AnalysisFinding {
    /// Info-severity, "general" finding with full confidence and empty lists.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity: Severity::Info,
            category: "general".to_string(),
            confidence: 1.0,
            recommendations: Vec::new(),
            related_pids: Vec::new(),
            related_dtcs: Vec::new(),
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn recommendations(mut self, items: &[&str]) -> Self {
        self.recommendations = items.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn recommendations_owned(mut self, items: Vec<String>) -> Self {
        self.recommendations = items;
        self
    }

    pub fn related_pids(mut self, pids: &[&str]) -> Self {
        self.related_pids = pids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn related_dtcs<S: AsRef<str>>(mut self, codes: &[S]) -> Self {
        self.related_dtcs = codes.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub analyzer_name: String,
    pub timestamp: DateTime<Utc>,
    pub findings: Vec<AnalysisFinding>,
    pub summary: String,
    pub metrics: HashMap<String, f64>,
}

impl AnalysisResult {
    pub fn has_issues(&self) -> bool {
        self.findings.iter().any(|f| f.severity >= Severity::Warning)
    }

    pub fn critical_count(&self) -> usize {
        self.count_of(Severity::Critical)
    }

    pub fn warning_count(&self) -> usize {
        self.count_of(Severity::Warning)
    }

    pub fn info_count(&self) -> usize {
        self.count_of(Severity::Info)
    }

    fn count_of(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticSession {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default = "unknown_protocol")]
    pub protocol: String,
    pub dtc_result: Option<DtcReadResult>,
    #[serde(default)]
    pub pid_samples: Vec<PidSample>,
    #[serde(default)]
    pub analysis_results: Vec<AnalysisResult>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn unknown_protocol() -> String {
    "Unknown".to_string()
}

impl DiagnosticSession {
    pub fn new() -> Self {
        let start_time = Utc::now();
        Self {
            session_id: format!("{:08x}", start_time.timestamp_millis() as u32),
            start_time,
            end_time: None,
            protocol: unknown_protocol(),
            dtc_result: None,
            pid_samples: Vec::new(),
            analysis_results: Vec::new(),
            notes: String::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_samples(samples: Vec<PidSample>) -> Self {
        Self {
            pid_samples: samples,
            ..Self::new()
        }
    }

    pub fn sample_count(&self) -> usize {
        self.pid_samples.len()
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds() as f64 / 1000.0)
    }

    pub fn add_sample(&mut self, sample: PidSample) {
        self.pid_samples.push(sample);
    }

    pub fn add_analysis(&mut self, result: AnalysisResult) {
        self.analysis_results.push(result);
    }

    pub fn end_session(&mut self) {
        self.end_time = Some(Utc::now());
    }

    /// (timestamp, value) pairs for every sample carrying `pid`.
    pub fn pid_series(&self, pid: &str) -> Vec<(DateTime<Utc>, f64)> {
        self.pid_samples
            .iter()
            .filter_map(|s| s.get(pid).map(|v| (s.timestamp, v)))
            .collect()
    }

    /// Values of `pid` in sample order, skipping samples without it.
    pub fn values_of(&self, pid: &str) -> Vec<f64> {
        self.pid_samples.iter().filter_map(|s| s.get(pid)).collect()
    }

    pub fn latest_values(&self) -> BTreeMap<String, f64> {
        self.pid_samples
            .last()
            .map(|s| s.values.clone())
            .unwrap_or_default()
    }
}

impl Default for DiagnosticSession {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error)]
pub enum DtcError {
    #[error("invalid trouble code: {0:?}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to read session file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse session file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("invalid timestamp in storage: {0}")]
    Timestamp(#[from] chrono::ParseError),
}
