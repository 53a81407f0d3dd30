use crate::loader::traits::SessionSource;
use crate::model::{
    DiagnosticSession, DtcInfo, DtcReadResult, DtcType, PidSample, SessionError, Severity,
};
use crate::utils::parse_datetime;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct SessionDocument {
    session_id: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    protocol: Option<String>,
    #[serde(default)]
    notes: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    samples: Vec<SampleDocument>,
    dtcs: Option<DtcDocument>,
}

#[derive(Debug, Deserialize)]
struct SampleDocument {
    timestamp: Option<String>,
    #[serde(default)]
    values: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct DtcDocument {
    #[serde(default)]
    stored_codes: Vec<Value>,
    #[serde(default)]
    pending_codes: Vec<Value>,
    #[serde(default)]
    permanent_codes: Vec<Value>,
    #[serde(default)]
    mil_status: bool,
    #[serde(default)]
    dtc_count: u32,
}

/// Loads a session previously exported as JSON.
pub struct JsonSessionLoader {
    path: PathBuf,
}

impl JsonSessionLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn parse(content: &str) -> Result<DiagnosticSession, SessionError> {
        let doc: SessionDocument = serde_json::from_str(content)?;
        let mut session = DiagnosticSession::new();

        if let Some(id) = doc.session_id {
            session.session_id = id;
        }
        if let Some(start) = doc.start_time.as_deref().and_then(parse_datetime) {
            session.start_time = start;
        }
        session.end_time = doc.end_time.as_deref().and_then(parse_datetime);
        if let Some(protocol) = doc.protocol {
            session.protocol = protocol;
        }
        session.notes = doc.notes;
        session.tags = doc.tags;

        for sample in doc.samples {
            session.add_sample(Self::convert_sample(sample));
        }
        session.dtc_result = doc.dtcs.map(Self::convert_dtcs);

        Ok(session)
    }

    fn convert_sample(doc: SampleDocument) -> PidSample {
        let timestamp = match doc.timestamp.as_deref() {
            Some(raw) => parse_datetime(raw).unwrap_or_else(|| {
                warn!("Unparseable sample timestamp {:?}, using now", raw);
                Utc::now()
            }),
            None => Utc::now(),
        };

        let mut sample = PidSample::new(timestamp);
        for (name, value) in doc.values {
            // non-numeric readings (status strings, nulls) are not part of the series
            if let Some(v) = value.as_f64() {
                sample.values.insert(name, v);
            }
        }
        sample
    }

    fn convert_dtcs(doc: DtcDocument) -> DtcReadResult {
        let mut result = DtcReadResult::new();
        result.stored_codes = Self::convert_codes(&doc.stored_codes, DtcType::Stored);
        result.pending_codes = Self::convert_codes(&doc.pending_codes, DtcType::Pending);
        result.permanent_codes = Self::convert_codes(&doc.permanent_codes, DtcType::Permanent);
        result.mil_status = doc.mil_status;
        result.dtc_count = doc.dtc_count;
        result
    }

    /// Accepts bare code strings or objects with at least a `code` field.
    fn convert_codes(entries: &[Value], dtc_type: DtcType) -> Vec<DtcInfo> {
        entries
            .iter()
            .filter_map(|entry| {
                let code = entry.as_str().or_else(|| entry.get("code").and_then(Value::as_str));
                let Some(code) = code else {
                    warn!("Skipping trouble code entry without a code: {}", entry);
                    return None;
                };
                let description = entry
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown");

                let mut info = match DtcInfo::from_code(code, description, dtc_type) {
                    Ok(info) => info,
                    Err(e) => {
                        warn!("Skipping trouble code: {}", e);
                        return None;
                    }
                };
                match entry.get("severity").and_then(Value::as_str) {
                    Some("critical") => info.severity = Severity::Critical,
                    Some("warning") => info.severity = Severity::Warning,
                    Some("info") => info.severity = Severity::Info,
                    _ => {}
                }
                Some(info)
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl SessionSource for JsonSessionLoader {
    async fn load(&self) -> Result<DiagnosticSession, SessionError> {
        info!("Loading session from {}", self.path.display());
        let content = tokio::fs::read_to_string(&self.path).await?;
        let session = Self::parse(&content)?;
        info!(
            "Loaded session {}: {} samples, {} trouble codes",
            session.session_id,
            session.sample_count(),
            session.dtc_result.as_ref().map_or(0, |r| r.total_codes())
        );
        Ok(session)
    }
}
