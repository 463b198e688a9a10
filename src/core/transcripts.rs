use serde::{Deserialize, Serialize};

/// Server-side lifecycle of a transcript. Monotonic: Pending → Processing →
/// Done or Failed, and terminal states never transition again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TranscriptStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl TranscriptStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TranscriptStatus::Done | TranscriptStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TranscriptStatus::Pending => "PENDING",
            TranscriptStatus::Processing => "PROCESSING",
            TranscriptStatus::Done => "DONE",
            TranscriptStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for TranscriptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One diarized utterance. Immutable once its transcript is DONE.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptSegment {
    pub id: i64,
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub speaker: String,
}

/// Cached copy of a server-owned transcript, refreshed by polling or an
/// explicit fetch; the client never mutates one locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub id: i64,
    pub user_id: i64,
    pub audio_url: String,
    pub status: TranscriptStatus,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub full_text: Option<String>,
    #[serde(default)]
    pub segments: Option<Vec<TranscriptSegment>>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// One window over server-side pagination. Replaced wholesale on each list
/// fetch; pages are never merged client-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptListPage {
    pub total: i64,
    pub items: Vec<Transcript>,
    pub skip: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptStatusResponse {
    pub id: i64,
    pub status: TranscriptStatus,
    #[serde(default)]
    pub error_message: Option<String>,
}
