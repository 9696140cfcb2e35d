use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::agents::{PersonaId, PersonaSpec, Section};

/// Body of every `POST /api/recovery` reply
#[derive(Debug, Serialize)]
pub struct RecoveryResponse {
    pub success: bool,
    pub run_id: String,
    pub sections: Vec<Section>,
    /// Warning banners (empty input, skipped uploads, degraded search)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Error banner text; never carries upstream detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RecoveryResponse {
    pub fn new(run_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            success: false,
            run_id: run_id.into(),
            sections: Vec::new(),
            warnings: Vec::new(),
            error: None,
            started_at,
            finished_at: started_at,
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_sections(mut self, sections: Vec<Section>) -> Self {
        self.sections = sections;
        self
    }

    pub fn succeeded(mut self) -> Self {
        self.success = true;
        self.finished_at = Utc::now();
        self
    }

    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(message.into());
        self.finished_at = Utc::now();
        self
    }

    /// Rejected without an error banner, only warnings
    pub fn rejected(mut self) -> Self {
        self.success = false;
        self.finished_at = Utc::now();
        self
    }
}

/// Public view of a persona for `GET /api/personas`
#[derive(Debug, Serialize)]
pub struct PersonaSummary {
    pub id: PersonaId,
    pub name: &'static str,
    pub heading: &'static str,
    pub prompt_label: &'static str,
    pub progress: &'static str,
    pub instructions: &'static [&'static str],
    pub web_search: bool,
}

impl From<&PersonaSpec> for PersonaSummary {
    fn from(spec: &PersonaSpec) -> Self {
        Self {
            id: spec.id,
            name: spec.name,
            heading: spec.heading,
            prompt_label: spec.prompt_label,
            progress: spec.progress,
            instructions: spec.instructions,
            web_search: spec.wants_search,
        }
    }
}
