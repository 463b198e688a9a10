use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::core::error::Result;
use crate::core::http::HttpClient;
use crate::core::transcripts::{
    Transcript, TranscriptListPage, TranscriptSegment, TranscriptStatus, TranscriptStatusResponse,
};

// ---- auth wire types ----

/// Current-user snapshot. Replaced wholesale on each fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub full_name: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpVerifyRequest {
    pub email: String,
    pub otp_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

// ---- transcribe / bot wire types ----

/// Response to an audio upload. The backend answers in one of two shapes:
/// an immediate synchronous result (text + segments) or a `transcript_id`
/// for asynchronous processing.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscribeResponse {
    #[serde(default)]
    pub transcript_id: Option<i64>,
    #[serde(default)]
    pub status: Option<TranscriptStatus>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
}

impl TranscribeResponse {
    pub fn is_async(&self) -> bool {
        self.transcript_id.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoomJoinResponse {
    pub message: String,
    pub bot_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoomEndResponse {
    pub message: String,
    pub bot_id: String,
    #[serde(default)]
    pub pid: Option<i64>,
    #[serde(default)]
    pub transcript: Option<ZoomEndTranscript>,
}

/// Summary the bot endpoint returns when ending a session that produced audio.
#[derive(Debug, Clone, Deserialize)]
pub struct ZoomEndTranscript {
    pub status: String,
    #[serde(default)]
    pub transcript_id: Option<i64>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub segments_count: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
}

// ---- the backend seam ----

/// Everything the stores need from the remote service. A trait so the session
/// manager and transcript store can be exercised against a mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn signup(&self, req: SignupRequest) -> Result<MessageResponse>;
    async fn verify_otp(&self, req: OtpVerifyRequest) -> Result<TokenResponse>;
    async fn login(&self, req: LoginRequest) -> Result<TokenResponse>;
    async fn refresh_token(&self, req: RefreshTokenRequest) -> Result<TokenResponse>;
    async fn current_user(&self) -> Result<User>;

    async fn transcribe_audio(&self, file: PathBuf) -> Result<TranscribeResponse>;
    async fn list_transcripts(&self, skip: i64, limit: i64) -> Result<TranscriptListPage>;
    async fn latest_transcript(&self) -> Result<Transcript>;
    async fn transcript_by_id(&self, id: i64) -> Result<Transcript>;
    async fn transcript_status(&self, id: i64) -> Result<TranscriptStatusResponse>;

    async fn zoom_join(&self, meeting_link: String) -> Result<ZoomJoinResponse>;
    async fn zoom_end(&self, bot_id: String) -> Result<ZoomEndResponse>;

    /// Set or clear the bearer token used for subsequent calls.
    fn set_auth_token(&self, token: Option<String>);
}

/// REST implementation over [`HttpClient`].
#[derive(Debug, Clone)]
pub struct RestApi {
    http: HttpClient,
}

impl RestApi {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl BackendApi for RestApi {
    async fn signup(&self, req: SignupRequest) -> Result<MessageResponse> {
        self.http.post("/auth/signup", &req).await
    }

    async fn verify_otp(&self, req: OtpVerifyRequest) -> Result<TokenResponse> {
        self.http.post("/auth/verify-otp", &req).await
    }

    async fn login(&self, req: LoginRequest) -> Result<TokenResponse> {
        self.http.post("/auth/login", &req).await
    }

    async fn refresh_token(&self, req: RefreshTokenRequest) -> Result<TokenResponse> {
        self.http.post("/auth/refresh", &req).await
    }

    async fn current_user(&self) -> Result<User> {
        self.http.get("/users/me").await
    }

    async fn transcribe_audio(&self, file: PathBuf) -> Result<TranscribeResponse> {
        self.http.post_multipart("/transcribe", &file).await
    }

    async fn list_transcripts(&self, skip: i64, limit: i64) -> Result<TranscriptListPage> {
        self.http
            .get_query(
                "/transcripts",
                &[("skip", skip.to_string()), ("limit", limit.to_string())],
            )
            .await
    }

    async fn latest_transcript(&self) -> Result<Transcript> {
        self.http.get("/transcripts/latest").await
    }

    async fn transcript_by_id(&self, id: i64) -> Result<Transcript> {
        self.http.get(&format!("/transcripts/{id}")).await
    }

    async fn transcript_status(&self, id: i64) -> Result<TranscriptStatusResponse> {
        self.http.get(&format!("/transcripts/{id}/status")).await
    }

    async fn zoom_join(&self, meeting_link: String) -> Result<ZoomJoinResponse> {
        self.http
            .post("/zoom/join", &serde_json::json!({ "meeting_link": meeting_link }))
            .await
    }

    async fn zoom_end(&self, bot_id: String) -> Result<ZoomEndResponse> {
        self.http
            .post("/zoom/end", &serde_json::json!({ "bot_id": bot_id }))
            .await
    }

    fn set_auth_token(&self, token: Option<String>) {
        self.http.set_auth_token(token);
    }
}
