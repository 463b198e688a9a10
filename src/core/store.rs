use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::core::api::{BackendApi, ZoomEndResponse, ZoomJoinResponse};
use crate::core::error::Result;
use crate::core::transcripts::{
    Transcript, TranscriptSegment, TranscriptStatus, TranscriptStatusResponse,
};

/// How often an upload poll re-checks transcript status.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Snapshot of everything a consumer renders from: the single-transcript
/// result fields, the paginated list window, and the transient flags.
#[derive(Debug, Clone)]
pub struct TranscriptState {
    pub segments: Vec<TranscriptSegment>,
    pub full_text: String,
    pub language: Option<String>,

    pub transcripts: Vec<Transcript>,
    pub total: i64,
    pub skip: i64,
    pub limit: i64,
    pub current: Option<Transcript>,

    pub loading: bool,
    pub error: Option<String>,
}

impl Default for TranscriptState {
    fn default() -> Self {
        Self {
            segments: Vec::new(),
            full_text: String::new(),
            language: None,
            transcripts: Vec::new(),
            total: 0,
            skip: 0,
            limit: 20,
            current: None,
            loading: false,
            error: None,
        }
    }
}

/// Tracks the upload → processing → done/failed lifecycle via periodic
/// status checks, and manages the paginated list plus single-item selection.
///
/// Invariant: at most one outstanding poll task per transcript id, and each
/// poll resolves exactly once (terminal status, fetch error, or explicit
/// stop).
pub struct TranscriptStore {
    api: Arc<dyn BackendApi>,
    state: Arc<Mutex<TranscriptState>>,
    polls: Arc<Mutex<HashMap<i64, JoinHandle<()>>>>,
    poll_interval: Duration,
}

impl TranscriptStore {
    pub fn new(api: Arc<dyn BackendApi>) -> Self {
        Self::with_poll_interval(api, POLL_INTERVAL)
    }

    pub fn with_poll_interval(api: Arc<dyn BackendApi>, poll_interval: Duration) -> Self {
        Self {
            api,
            state: Arc::new(Mutex::new(TranscriptState::default())),
            polls: Arc::new(Mutex::new(HashMap::new())),
            poll_interval,
        }
    }

    pub fn state(&self) -> TranscriptState {
        self.state.lock().clone()
    }

    /// Send a file for transcription. A synchronous response commits the
    /// result immediately; an asynchronous one (`transcript_id`) starts a
    /// poll loop. The returned bool says whether the upload was accepted,
    /// not whether transcription finished.
    pub async fn upload_audio(&self, file: PathBuf) -> bool {
        {
            let mut state = self.state.lock();
            state.loading = true;
            state.error = None;
        }

        match self.api.transcribe_audio(file).await {
            Ok(resp) if resp.is_async() => {
                // id is present per is_async
                let id = resp.transcript_id.unwrap_or_default();
                info!(transcript_id = id, "transcription queued, polling for status");
                self.spawn_poll(id);
                true
            }
            Ok(resp) => {
                let mut state = self.state.lock();
                state.language = resp.language;
                state.full_text = resp.text;
                state.segments = resp.segments;
                state.loading = false;
                true
            }
            Err(e) => {
                warn!("audio upload failed: {e}");
                let mut state = self.state.lock();
                state.error = Some(e.to_string());
                state.loading = false;
                false
            }
        }
    }

    /// Replace the cached page with a freshly fetched one. On failure the
    /// previously loaded items stay intact; only the error field is set.
    pub async fn load_transcript_list(&self, skip: i64, limit: i64) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.loading = true;
            state.error = None;
        }

        let result = self.api.list_transcripts(skip, limit).await;
        let mut state = self.state.lock();
        state.loading = false;
        match result {
            Ok(page) => {
                state.transcripts = page.items;
                state.total = page.total;
                state.skip = page.skip;
                state.limit = page.limit;
                Ok(())
            }
            Err(e) => {
                state.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Fetch one transcript into `current`. Independent of the list window.
    pub async fn select_transcript(&self, id: i64) -> Result<Transcript> {
        {
            let mut state = self.state.lock();
            state.loading = true;
            state.error = None;
        }

        let result = self.api.transcript_by_id(id).await;
        let mut state = self.state.lock();
        state.loading = false;
        match result {
            Ok(transcript) => {
                state.current = Some(transcript.clone());
                Ok(transcript)
            }
            Err(e) => {
                state.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Fetch the most recent transcript into `current`.
    pub async fn latest_transcript(&self) -> Result<Transcript> {
        let result = self.api.latest_transcript().await;
        let mut state = self.state.lock();
        match result {
            Ok(transcript) => {
                state.current = Some(transcript.clone());
                Ok(transcript)
            }
            Err(e) => {
                state.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Lightweight status probe against `/transcripts/{id}/status`.
    pub async fn check_status(&self, id: i64) -> Result<TranscriptStatusResponse> {
        match self.api.transcript_status(id).await {
            Ok(status) => Ok(status),
            Err(e) => {
                self.state.lock().error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Best-effort background refresh of one transcript: overwrites its list
    /// entry and `current` when the id matches. Fetch errors are logged and
    /// swallowed, never surfaced to the caller.
    pub async fn refresh_transcript_status(&self, id: i64) {
        match self.api.transcript_by_id(id).await {
            Ok(updated) => {
                let mut state = self.state.lock();
                if let Some(entry) = state.transcripts.iter_mut().find(|t| t.id == id) {
                    *entry = updated.clone();
                }
                if state.current.as_ref().is_some_and(|t| t.id == id) {
                    state.current = Some(updated);
                }
            }
            Err(e) => {
                debug!(transcript_id = id, "status refresh failed: {e}");
            }
        }
    }

    /// Ask the bot to join a meeting. Returns the bot id used to end it.
    pub async fn join_meeting(&self, meeting_link: String) -> Result<ZoomJoinResponse> {
        match self.api.zoom_join(meeting_link).await {
            Ok(resp) => Ok(resp),
            Err(e) => {
                self.state.lock().error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// End a bot session. If the backend reports a transcript being
    /// produced, the usual poll loop tracks it to a terminal state.
    pub async fn end_meeting(&self, bot_id: String) -> Result<ZoomEndResponse> {
        match self.api.zoom_end(bot_id).await {
            Ok(resp) => {
                if let Some(id) = resp.transcript.as_ref().and_then(|t| t.transcript_id) {
                    info!(transcript_id = id, "bot produced a transcript, polling");
                    self.state.lock().loading = true;
                    self.spawn_poll(id);
                }
                Ok(resp)
            }
            Err(e) => {
                self.state.lock().error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn clear_transcript(&self) {
        let mut state = self.state.lock();
        state.segments.clear();
        state.full_text.clear();
        state.language = None;
        state.error = None;
    }

    pub fn clear_error(&self) {
        self.state.lock().error = None;
    }

    /// Abort the poll task for one transcript, if any.
    pub fn stop_polling(&self, id: i64) {
        if let Some(handle) = self.polls.lock().remove(&id) {
            handle.abort();
            debug!(transcript_id = id, "poll stopped");
        }
    }

    /// Abort every outstanding poll task. Teardown path.
    pub fn stop_all_polls(&self) {
        let mut polls = self.polls.lock();
        for (id, handle) in polls.drain() {
            handle.abort();
            debug!(transcript_id = id, "poll stopped");
        }
    }

    /// Wait for the poll task of one transcript to finish, if running.
    pub async fn wait_for_poll(&self, id: i64) {
        let handle = self.polls.lock().remove(&id);
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Wait for every outstanding poll task. Used by `upload --wait`.
    pub async fn wait_for_all_polls(&self) {
        loop {
            let handle = {
                let mut polls = self.polls.lock();
                let id = polls.keys().next().copied();
                id.and_then(|id| polls.remove(&id))
            };
            match handle {
                Some(handle) => {
                    let _ = handle.await;
                }
                None => break,
            }
        }
    }

    /// Start the status poll for `id`. Refuses a duplicate: at most one
    /// outstanding poll per transcript id.
    fn spawn_poll(&self, id: i64) {
        let mut polls = self.polls.lock();
        if polls.contains_key(&id) {
            debug!(transcript_id = id, "poll already active, not starting another");
            return;
        }

        let api = self.api.clone();
        let state = self.state.clone();
        let registry = self.polls.clone();
        let interval = self.poll_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval fires immediately; consume
            // it so the first status check happens one interval after upload.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match api.transcript_by_id(id).await {
                    Ok(t) => match t.status {
                        TranscriptStatus::Done => {
                            info!(transcript_id = id, "transcription done");
                            let mut s = state.lock();
                            s.language = t.language.clone();
                            s.full_text = t.full_text.clone().unwrap_or_default();
                            s.segments = t.segments.clone().unwrap_or_default();
                            s.loading = false;
                            break;
                        }
                        TranscriptStatus::Failed => {
                            let message = t
                                .error_message
                                .clone()
                                .unwrap_or_else(|| "Transcription failed".to_string());
                            warn!(transcript_id = id, "transcription failed: {message}");
                            let mut s = state.lock();
                            s.error = Some(message);
                            s.loading = false;
                            break;
                        }
                        // PENDING or PROCESSING: keep polling.
                        _ => {}
                    },
                    Err(e) => {
                        warn!(transcript_id = id, "status poll failed: {e}");
                        let mut s = state.lock();
                        s.error = Some(e.to_string());
                        s.loading = false;
                        break;
                    }
                }
            }
            registry.lock().remove(&id);
        });

        polls.insert(id, handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::api::{MockBackendApi, TranscribeResponse};
    use crate::core::error::ClientError;
    use crate::core::transcripts::TranscriptListPage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const FAST_POLL: Duration = Duration::from_millis(10);

    fn transcript(id: i64, status: TranscriptStatus) -> Transcript {
        Transcript {
            id,
            user_id: 1,
            audio_url: format!("uploads/{id}.wav"),
            status,
            language: None,
            full_text: None,
            segments: None,
            error_message: None,
            created_at: "2025-08-01T10:00:00".to_string(),
            updated_at: "2025-08-01T10:00:00".to_string(),
        }
    }

    fn done_transcript(id: i64) -> Transcript {
        let mut t = transcript(id, TranscriptStatus::Done);
        t.language = Some("en".to_string());
        t.full_text = Some("hello world".to_string());
        t.segments = Some(vec![TranscriptSegment {
            id: 1,
            start: 0.0,
            end: 1.4,
            text: "hello world".to_string(),
            speaker: "SPEAKER_00".to_string(),
        }]);
        t
    }

    fn async_upload_response(id: i64) -> TranscribeResponse {
        serde_json::from_str(&format!(
            r#"{{"transcript_id": {id}, "status": "PENDING", "message": "queued"}}"#
        ))
        .unwrap()
    }

    fn sync_upload_response() -> TranscribeResponse {
        serde_json::from_str(
            r#"{
                "language": "en",
                "text": "inline result",
                "segments": [{"id": 1, "start": 0.0, "end": 2.0, "text": "inline result", "speaker": "SPEAKER_00"}]
            }"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn async_upload_polls_until_done_then_stops() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let fetches_in_mock = fetches.clone();

        let mut api = MockBackendApi::new();
        api.expect_transcribe_audio()
            .times(1)
            .returning(|_| Ok(async_upload_response(42)));
        api.expect_transcript_by_id().returning(move |id| {
            assert_eq!(id, 42);
            let n = fetches_in_mock.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Ok(transcript(42, TranscriptStatus::Processing))
            } else {
                Ok(done_transcript(42))
            }
        });

        let store = TranscriptStore::with_poll_interval(Arc::new(api), FAST_POLL);
        assert!(store.upload_audio(PathBuf::from("meeting.wav")).await);
        store.wait_for_poll(42).await;

        let state = store.state();
        assert_eq!(state.full_text, "hello world");
        assert_eq!(state.segments.len(), 1);
        assert_eq!(state.language.as_deref(), Some("en"));
        assert!(!state.loading);
        assert!(state.error.is_none());

        // The loop must not fetch again after the terminal response.
        let fetched = fetches.load(Ordering::SeqCst);
        tokio::time::sleep(FAST_POLL * 5).await;
        assert_eq!(fetches.load(Ordering::SeqCst), fetched);
        assert_eq!(fetched, 2);
    }

    #[tokio::test]
    async fn failed_status_commits_error_and_stops() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let fetches_in_mock = fetches.clone();

        let mut api = MockBackendApi::new();
        api.expect_transcribe_audio()
            .times(1)
            .returning(|_| Ok(async_upload_response(7)));
        api.expect_transcript_by_id().returning(move |_| {
            fetches_in_mock.fetch_add(1, Ordering::SeqCst);
            let mut t = transcript(7, TranscriptStatus::Failed);
            t.error_message = Some("decode error".to_string());
            Ok(t)
        });

        let store = TranscriptStore::with_poll_interval(Arc::new(api), FAST_POLL);
        assert!(store.upload_audio(PathBuf::from("meeting.wav")).await);
        store.wait_for_poll(7).await;

        let state = store.state();
        assert_eq!(state.error.as_deref(), Some("decode error"));
        assert!(!state.loading);

        tokio::time::sleep(FAST_POLL * 5).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn poll_fetch_error_surfaces_and_stops() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let fetches_in_mock = fetches.clone();

        let mut api = MockBackendApi::new();
        api.expect_transcribe_audio()
            .times(1)
            .returning(|_| Ok(async_upload_response(9)));
        api.expect_transcript_by_id().returning(move |_| {
            fetches_in_mock.fetch_add(1, Ordering::SeqCst);
            Err(ClientError::Request {
                status: 500,
                message: "server exploded".to_string(),
            })
        });

        let store = TranscriptStore::with_poll_interval(Arc::new(api), FAST_POLL);
        assert!(store.upload_audio(PathBuf::from("meeting.wav")).await);
        store.wait_for_poll(9).await;

        let state = store.state();
        assert_eq!(state.error.as_deref(), Some("server exploded"));
        assert!(!state.loading);

        tokio::time::sleep(FAST_POLL * 5).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sync_upload_commits_without_polling() {
        let mut api = MockBackendApi::new();
        api.expect_transcribe_audio()
            .times(1)
            .returning(|_| Ok(sync_upload_response()));
        // No expect_transcript_by_id: a poll would panic the mock.

        let store = TranscriptStore::with_poll_interval(Arc::new(api), FAST_POLL);
        assert!(store.upload_audio(PathBuf::from("meeting.wav")).await);

        let state = store.state();
        assert_eq!(state.full_text, "inline result");
        assert_eq!(state.segments.len(), 1);
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn failed_upload_records_error_and_returns_false() {
        let mut api = MockBackendApi::new();
        api.expect_transcribe_audio().times(1).returning(|_| {
            Err(ClientError::Request {
                status: 413,
                message: "file too large".to_string(),
            })
        });

        let store = TranscriptStore::with_poll_interval(Arc::new(api), FAST_POLL);
        assert!(!store.upload_audio(PathBuf::from("huge.wav")).await);

        let state = store.state();
        assert_eq!(state.error.as_deref(), Some("file too large"));
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn list_failure_keeps_previous_items() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_mock = calls.clone();

        let mut api = MockBackendApi::new();
        api.expect_list_transcripts().returning(move |skip, limit| {
            if calls_in_mock.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(TranscriptListPage {
                    total: 2,
                    items: vec![
                        transcript(1, TranscriptStatus::Done),
                        transcript(2, TranscriptStatus::Processing),
                    ],
                    skip,
                    limit,
                })
            } else {
                Err(ClientError::Request {
                    status: 503,
                    message: "unavailable".to_string(),
                })
            }
        });

        let store = TranscriptStore::with_poll_interval(Arc::new(api), FAST_POLL);
        store.load_transcript_list(0, 20).await.unwrap();
        assert_eq!(store.state().transcripts.len(), 2);

        assert!(store.load_transcript_list(0, 20).await.is_err());
        let state = store.state();
        assert_eq!(state.transcripts.len(), 2);
        assert_eq!(state.error.as_deref(), Some("unavailable"));
    }

    #[tokio::test]
    async fn refresh_updates_list_entry_and_current() {
        let mut api = MockBackendApi::new();
        api.expect_list_transcripts().returning(|skip, limit| {
            Ok(TranscriptListPage {
                total: 1,
                items: vec![transcript(5, TranscriptStatus::Processing)],
                skip,
                limit,
            })
        });
        let served = Arc::new(AtomicUsize::new(0));
        let served_in_mock = served.clone();
        api.expect_transcript_by_id().returning(move |id| {
            served_in_mock.fetch_add(1, Ordering::SeqCst);
            if id == 5 {
                Ok(done_transcript(5))
            } else {
                Ok(transcript(id, TranscriptStatus::Processing))
            }
        });

        let store = TranscriptStore::with_poll_interval(Arc::new(api), FAST_POLL);
        store.load_transcript_list(0, 20).await.unwrap();
        store.select_transcript(5).await.unwrap();
        store.refresh_transcript_status(5).await;

        let state = store.state();
        assert_eq!(state.transcripts[0].status, TranscriptStatus::Done);
        assert_eq!(
            state.current.as_ref().map(|t| t.status),
            Some(TranscriptStatus::Done)
        );
    }

    #[tokio::test]
    async fn refresh_swallows_fetch_errors() {
        let mut api = MockBackendApi::new();
        api.expect_transcript_by_id().returning(|_| {
            Err(ClientError::Request {
                status: 404,
                message: "not found".to_string(),
            })
        });

        let store = TranscriptStore::with_poll_interval(Arc::new(api), FAST_POLL);
        store.refresh_transcript_status(99).await;
        assert!(store.state().error.is_none());
    }

    #[tokio::test]
    async fn duplicate_uploads_share_one_poll() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let fetches_in_mock = fetches.clone();

        let mut api = MockBackendApi::new();
        api.expect_transcribe_audio()
            .times(2)
            .returning(|_| Ok(async_upload_response(11)));
        api.expect_transcript_by_id().returning(move |_| {
            fetches_in_mock.fetch_add(1, Ordering::SeqCst);
            Ok(done_transcript(11))
        });

        let store = TranscriptStore::with_poll_interval(Arc::new(api), FAST_POLL);
        assert!(store.upload_audio(PathBuf::from("a.wav")).await);
        assert!(store.upload_audio(PathBuf::from("a.wav")).await);
        store.wait_for_poll(11).await;

        tokio::time::sleep(FAST_POLL * 5).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_polling_aborts_the_task() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let fetches_in_mock = fetches.clone();

        let mut api = MockBackendApi::new();
        api.expect_transcribe_audio()
            .times(1)
            .returning(|_| Ok(async_upload_response(3)));
        api.expect_transcript_by_id().returning(move |_| {
            fetches_in_mock.fetch_add(1, Ordering::SeqCst);
            Ok(transcript(3, TranscriptStatus::Processing))
        });

        let store = TranscriptStore::with_poll_interval(Arc::new(api), FAST_POLL);
        assert!(store.upload_audio(PathBuf::from("a.wav")).await);
        store.stop_polling(3);

        let fetched = fetches.load(Ordering::SeqCst);
        tokio::time::sleep(FAST_POLL * 5).await;
        assert_eq!(fetches.load(Ordering::SeqCst), fetched);
    }

    #[tokio::test]
    async fn ending_a_bot_session_polls_its_transcript() {
        let mut api = MockBackendApi::new();
        api.expect_zoom_end().times(1).returning(|bot_id| {
            assert_eq!(bot_id, "bot-1");
            Ok(serde_json::from_str(
                r#"{
                    "message": "bot stopped",
                    "bot_id": "bot-1",
                    "pid": 4242,
                    "transcript": {"status": "processing", "transcript_id": 13}
                }"#,
            )
            .unwrap())
        });
        api.expect_transcript_by_id()
            .returning(|_| Ok(done_transcript(13)));

        let store = TranscriptStore::with_poll_interval(Arc::new(api), FAST_POLL);
        let resp = store.end_meeting("bot-1".to_string()).await.unwrap();
        assert_eq!(resp.bot_id, "bot-1");
        store.wait_for_poll(13).await;

        let state = store.state();
        assert_eq!(state.full_text, "hello world");
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn check_status_reports_error_message() {
        let mut api = MockBackendApi::new();
        api.expect_transcript_status().times(1).returning(|id| {
            Ok(TranscriptStatusResponse {
                id,
                status: TranscriptStatus::Failed,
                error_message: Some("no speech detected".to_string()),
            })
        });

        let store = TranscriptStore::with_poll_interval(Arc::new(api), FAST_POLL);
        let status = store.check_status(21).await.unwrap();
        assert_eq!(status.status, TranscriptStatus::Failed);
        assert_eq!(status.error_message.as_deref(), Some("no speech detected"));
    }

    #[tokio::test]
    async fn clear_transcript_resets_result_fields() {
        let mut api = MockBackendApi::new();
        api.expect_transcribe_audio()
            .times(1)
            .returning(|_| Ok(sync_upload_response()));

        let store = TranscriptStore::with_poll_interval(Arc::new(api), FAST_POLL);
        store.upload_audio(PathBuf::from("a.wav")).await;
        store.clear_transcript();

        let state = store.state();
        assert!(state.full_text.is_empty());
        assert!(state.segments.is_empty());
        assert!(state.language.is_none());
    }
}
