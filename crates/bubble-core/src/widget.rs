//! One chat widget instance: sends user messages, streams bot replies into a
//! view, and opens the follow-up forms the bot asks for.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use crate::action::{ActionDirective, ActionKind};
use crate::client::{AppointmentConfirmation, ChatRequest, ChatStream, WidgetClient};
use crate::config::{Config, RenderMode};
use crate::forms::{AppointmentForm, LeadForm, Slot};
use crate::rating::{RatingChoice, should_prompt};
use crate::render::{HtmlRenderer, MarkdownHtml};
use crate::session::{HistoryEntry, Role, SessionStore, StreamSession};
use crate::stream::{FinalizeResult, RenderUpdate, StreamError, StreamingMessageRenderer};

/// Shown instead of a reply when the request or stream fails.
pub const APOLOGY_MESSAGE: &str = "Sorry, something went wrong. Please try again.";

/// Host UI receiving everything the widget wants to display.
pub trait WidgetView: Send {
    fn show_user_message(&mut self, text: &str);

    /// Current state of the reply being streamed.
    fn render_bot(&mut self, update: &RenderUpdate);

    /// Final state of the reply.
    fn finish_bot(&mut self, result: &FinalizeResult);

    fn show_error(&mut self, message: &str);

    fn open_lead_form(&mut self, form: LeadForm);

    fn open_appointment_form(&mut self, form: AppointmentForm);
}

/// Result of [`ChatWidget::send_message`].
#[derive(Debug)]
pub enum SendOutcome {
    /// Blank input, nothing sent.
    Ignored,
    /// A reply is still streaming; the message was not sent.
    Busy,
    Completed(FinalizeResult),
    Failed(StreamError),
}

struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct WidgetState {
    session: StreamSession,
    store: Option<SessionStore>,
}

impl WidgetState {
    /// Stores the session id if the last reply changed it.
    fn persist_new_session_id(&mut self, api_key: &str, previous: Option<&str>) {
        let Some(current) = self.session.session_id.as_deref() else {
            return;
        };
        if previous == Some(current) {
            return;
        }
        if let Some(store) = self.store.as_mut()
            && let Err(err) = store.set_session_id(api_key, current)
        {
            warn!(error = %err, "Failed to persist session id");
        }
    }
}

pub struct ChatWidget {
    client: WidgetClient,
    html: Option<Arc<dyn HtmlRenderer>>,
    history_window: usize,
    busy: AtomicBool,
    state: Mutex<WidgetState>,
}

impl ChatWidget {
    /// Creates a widget with Markdown rendering, the default history window
    /// and no persistence.
    pub fn new(client: WidgetClient) -> Self {
        Self {
            client,
            html: Some(Arc::new(MarkdownHtml)),
            history_window: Config::DEFAULT_HISTORY_WINDOW,
            busy: AtomicBool::new(false),
            state: Mutex::new(WidgetState {
                session: StreamSession::default(),
                store: None,
            }),
        }
    }

    /// Builds the widget described by `config`, resuming the stored session.
    pub fn from_config(config: &Config, store: Option<SessionStore>) -> Result<Self> {
        let api_key = config.require_api_key()?;
        let base = config.api_base_url()?;
        let widget = Self::new(WidgetClient::new(base, api_key))
            .with_history_window(config.history_window)
            .with_html_renderer(match config.render {
                RenderMode::Markdown => Some(Arc::new(MarkdownHtml) as Arc<dyn HtmlRenderer>),
                RenderMode::Plain => None,
            });
        Ok(match store {
            Some(store) => widget.with_session_store(store),
            None => widget,
        })
    }

    #[must_use]
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// `None` displays replies as plain text.
    #[must_use]
    pub fn with_html_renderer(mut self, html: Option<Arc<dyn HtmlRenderer>>) -> Self {
        self.html = html;
        self
    }

    /// Persists session ids in `store` and resumes the one stored for this
    /// api key.
    #[must_use]
    pub fn with_session_store(mut self, store: SessionStore) -> Self {
        let state = self.state.get_mut();
        state.session.session_id = store.session_id(self.client.api_key()).map(str::to_string);
        state.store = Some(store);
        self
    }

    pub fn client(&self) -> &WidgetClient {
        &self.client
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub async fn session_id(&self) -> Option<String> {
        self.state.lock().await.session.session_id.clone()
    }

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.state.lock().await.session.history.clone()
    }

    /// Drops the session id and history; the server assigns a new session on
    /// the next message.
    pub async fn reset_session(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.session = StreamSession::default();
        if let Some(store) = state.store.as_mut() {
            store.clear_session(self.client.api_key())?;
        }
        Ok(())
    }

    /// Sends `text` and streams the reply into `view`.
    ///
    /// At most one message is in flight per widget; a concurrent call returns
    /// [`SendOutcome::Busy`]. Failures show [`APOLOGY_MESSAGE`] and leave the
    /// widget ready for the next message.
    pub async fn send_message(&self, text: &str, view: &mut dyn WidgetView) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Ignored;
        }
        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            debug!("Reply in flight, refusing message");
            return SendOutcome::Busy;
        };

        let reply_id = Uuid::new_v4();
        self.exchange(text, view)
            .instrument(info_span!("reply", %reply_id))
            .await
    }

    async fn exchange(&self, text: &str, view: &mut dyn WidgetView) -> SendOutcome {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        view.show_user_message(text);
        state.session.push(Role::User, text);

        let history = state.session.recent_history(self.history_window).to_vec();
        let session_id = state.session.session_id.clone();
        let request = ChatRequest {
            message: text,
            history: &history,
            session_id: session_id.as_deref(),
        };

        let mut stream = match self.client.open_chat_stream(&request).await {
            Ok(stream) => stream,
            Err(err) => return fail(view, err),
        };

        let renderer = StreamingMessageRenderer::new(&mut state.session, self.html.as_deref());
        let reply = stream_reply(&mut stream, renderer, view).await;
        // The renderer stores ids on the session as they arrive, also ahead of
        // an error in the same chunk.
        state.persist_new_session_id(self.client.api_key(), session_id.as_deref());

        match reply {
            Ok(result) => {
                view.finish_bot(&result);
                if let Some(action) = &result.action {
                    dispatch_action(action, view);
                }
                SendOutcome::Completed(result)
            }
            Err(err) => fail(view, err),
        }
    }

    /// Whether the rating prompt should be offered now.
    ///
    /// Requires a session, and respects both the stored "already offered"
    /// flag and the server's `has_rated` answer.
    pub async fn rating_prompt_due(&self) -> bool {
        let (session_id, shown) = {
            let state = self.state.lock().await;
            let Some(session_id) = state.session.session_id.clone() else {
                return false;
            };
            let shown = state
                .store
                .as_ref()
                .is_some_and(|store| store.rating_shown(self.client.api_key(), &session_id));
            (session_id, shown)
        };
        if shown {
            return false;
        }
        let remote = self.client.has_rated(&session_id).await;
        should_prompt(false, Some(remote))
    }

    /// Records the answer to the rating prompt and submits a rating.
    ///
    /// Returns the server's confirmation message for a submitted rating.
    pub async fn answer_rating(&self, choice: RatingChoice) -> Result<Option<String>> {
        let session_id = {
            let mut state = self.state.lock().await;
            let session_id = state.session.session_id.clone();
            if let (Some(store), Some(id)) = (state.store.as_mut(), session_id.as_deref()) {
                store.mark_rating_shown(self.client.api_key(), id)?;
            }
            session_id
        };
        match choice {
            RatingChoice::Dismissed => Ok(None),
            RatingChoice::Rated(stars) => self
                .client
                .submit_rating(stars, session_id.as_deref())
                .await
                .map(Some),
        }
    }

    pub async fn submit_lead(&self, form: &LeadForm) -> Result<()> {
        let submission = form.submission(Utc::now());
        self.client.submit_lead(&submission).await
    }

    pub async fn available_slots(&self, form: &AppointmentForm) -> Result<Vec<Slot>> {
        let date = form.date().context("Choose a date before listing slots")?;
        self.client
            .available_slots(&date.format("%Y-%m-%d").to_string())
            .await
    }

    pub async fn book_appointment(&self, form: &AppointmentForm) -> Result<AppointmentConfirmation> {
        let body = form.submission()?;
        self.client.create_appointment(&body).await
    }
}

async fn stream_reply(
    stream: &mut ChatStream,
    mut renderer: StreamingMessageRenderer<'_>,
    view: &mut dyn WidgetView,
) -> Result<FinalizeResult, StreamError> {
    while let Some(chunk) = stream.next_chunk().await? {
        let update = renderer.on_chunk(&chunk)?;
        if let Some(id) = &update.session_id {
            debug!(session_id = %id, "Session id received");
        }
        view.render_bot(&update);
    }
    Ok(renderer.finish())
}

fn fail(view: &mut dyn WidgetView, err: StreamError) -> SendOutcome {
    warn!(kind = %err.kind, error = %err.message, "Reply failed");
    view.show_error(APOLOGY_MESSAGE);
    SendOutcome::Failed(err)
}

fn dispatch_action(action: &ActionDirective, view: &mut dyn WidgetView) {
    debug!(kind = action.kind.wire_name(), fields = action.fields.len(), "Opening form");
    match action.kind {
        ActionKind::LeadCapture => {
            view.open_lead_form(LeadForm::new(action.fields.clone(), action.reason.clone()));
        }
        ActionKind::Appointment => view.open_appointment_form(AppointmentForm::new(
            action.fields.clone(),
            action.reason.clone(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::tempdir;
    use url::Url;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::render::DisplayBody;
    use crate::stream::StreamErrorKind;

    #[derive(Debug, Default)]
    struct RecordingView {
        users: Vec<String>,
        updates: Vec<String>,
        finished: Vec<String>,
        errors: Vec<String>,
        lead_forms: Vec<LeadForm>,
        appointment_forms: Vec<AppointmentForm>,
    }

    impl WidgetView for RecordingView {
        fn show_user_message(&mut self, text: &str) {
            self.users.push(text.to_string());
        }

        fn render_bot(&mut self, update: &RenderUpdate) {
            self.updates.push(update.display_text.clone());
        }

        fn finish_bot(&mut self, result: &FinalizeResult) {
            self.finished.push(result.text.clone());
        }

        fn show_error(&mut self, message: &str) {
            self.errors.push(message.to_string());
        }

        fn open_lead_form(&mut self, form: LeadForm) {
            self.lead_forms.push(form);
        }

        fn open_appointment_form(&mut self, form: AppointmentForm) {
            self.appointment_forms.push(form);
        }
    }

    fn sse(lines: &[&str]) -> String {
        lines.iter().map(|line| format!("data: {line}\n\n")).collect()
    }

    async fn mount_reply(server: &MockServer, body: String) {
        Mock::given(method("POST"))
            .and(path("/widget-chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(server)
            .await;
    }

    fn widget(server: &MockServer) -> ChatWidget {
        ChatWidget::new(WidgetClient::new(Url::parse(&server.uri()).unwrap(), "key-1"))
            .with_html_renderer(None)
    }

    #[tokio::test]
    async fn test_reply_streams_into_view_and_history() {
        let server = MockServer::start().await;
        mount_reply(
            &server,
            sse(&[
                r#"{"response":"Hello ","session_id":"s-1"}"#,
                r#"{"response":"world"}"#,
                "[DONE]",
            ]),
        )
        .await;

        let widget = widget(&server);
        let mut view = RecordingView::default();
        let outcome = widget.send_message("  hi  ", &mut view).await;

        let SendOutcome::Completed(result) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(result.text, "Hello world");
        assert_eq!(result.body, DisplayBody::Text("Hello world".to_string()));
        assert_eq!(view.users, ["hi"]);
        assert_eq!(view.updates.last().map(String::as_str), Some("Hello world"));
        assert_eq!(view.finished, ["Hello world"]);
        assert!(view.errors.is_empty());

        assert_eq!(widget.session_id().await.as_deref(), Some("s-1"));
        let history = widget.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].content, "Hello world");
        assert!(!widget.is_busy());
    }

    #[tokio::test]
    async fn test_appointment_directive_opens_form() {
        let server = MockServer::start().await;
        mount_reply(
            &server,
            sse(&[
                r#"{"response":"Thanks!<ACTION>{\"type\":\"appointment\","}"#,
                r#"{"response":"\"fields\":[],\"reason\":\"book\"}</ACTION>"}"#,
                "[DONE]",
            ]),
        )
        .await;

        let widget = widget(&server);
        let mut view = RecordingView::default();
        widget.send_message("book me", &mut view).await;

        assert!(view.updates.iter().all(|u| u == "Thanks!"));
        assert_eq!(view.finished, ["Thanks!"]);
        assert!(view.lead_forms.is_empty());
        assert_eq!(view.appointment_forms.len(), 1);
        let form = &view.appointment_forms[0];
        assert!(form.fields().is_empty());
        assert_eq!(form.reason(), Some("book"));
    }

    #[tokio::test]
    async fn test_lead_directive_opens_form() {
        let server = MockServer::start().await;
        mount_reply(
            &server,
            sse(&[
                r#"{"response":"Sure.<ACTION>{\"type\":\"lead_capture\",\"fields\":[\"name\",\"email\"]}</ACTION>"}"#,
            ]),
        )
        .await;

        let widget = widget(&server);
        let mut view = RecordingView::default();
        widget.send_message("quote please", &mut view).await;

        assert_eq!(view.lead_forms.len(), 1);
        assert_eq!(view.lead_forms[0].fields().len(), 2);
    }

    #[tokio::test]
    async fn test_error_payload_shows_apology_and_recovers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/widget-chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse(&[
                r#"{"response":"par"}"#,
                r#"{"error":"model overloaded"}"#,
            ])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_reply(&server, sse(&[r#"{"response":"ok now"}"#])).await;

        let widget = widget(&server);
        let mut view = RecordingView::default();

        let outcome = widget.send_message("first", &mut view).await;
        let SendOutcome::Failed(err) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(err.kind, StreamErrorKind::Protocol);
        assert_eq!(view.errors, [APOLOGY_MESSAGE]);
        assert!(view.finished.is_empty());
        assert!(!widget.is_busy());

        let outcome = widget.send_message("second", &mut view).await;
        assert!(matches!(outcome, SendOutcome::Completed(_)));
        assert_eq!(view.finished, ["ok now"]);

        let history = widget.history().await;
        let contents: Vec<_> = history.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, ["first", "second", "ok now"]);
    }

    #[tokio::test]
    async fn test_http_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/widget-chat"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let widget = widget(&server);
        let mut view = RecordingView::default();
        let outcome = widget.send_message("hi", &mut view).await;
        assert!(matches!(
            outcome,
            SendOutcome::Failed(StreamError {
                kind: StreamErrorKind::HttpStatus,
                ..
            })
        ));
        assert_eq!(view.errors, [APOLOGY_MESSAGE]);
        assert!(!widget.is_busy());
    }

    #[tokio::test]
    async fn test_blank_message_is_ignored() {
        let server = MockServer::start().await;
        let widget = widget(&server);
        let mut view = RecordingView::default();
        assert!(matches!(
            widget.send_message("   ", &mut view).await,
            SendOutcome::Ignored
        ));
        assert!(view.users.is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_send_is_refused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/widget-chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(sse(&[r#"{"response":"slow"}"#]))
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;

        let widget = widget(&server);
        let mut first_view = RecordingView::default();
        let mut second_view = RecordingView::default();
        let (first, second) = tokio::join!(
            widget.send_message("one", &mut first_view),
            widget.send_message("two", &mut second_view),
        );

        assert!(matches!(first, SendOutcome::Completed(_)));
        assert!(matches!(second, SendOutcome::Busy));
        assert!(second_view.users.is_empty());
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
        assert!(!widget.is_busy());
    }

    #[tokio::test]
    async fn test_history_window_and_session_are_sent() {
        let server = MockServer::start().await;
        mount_reply(
            &server,
            sse(&[r#"{"response":"ack","session_id":"s-9"}"#]),
        )
        .await;

        let widget = widget(&server).with_history_window(2);
        let mut view = RecordingView::default();
        widget.send_message("one", &mut view).await;
        widget.send_message("two", &mut view).await;

        let requests = server.received_requests().await.unwrap();
        let first: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(first["session_id"], serde_json::Value::Null);
        assert_eq!(
            first["history"],
            serde_json::json!([{"role": "user", "content": "one"}])
        );

        let second: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
        assert_eq!(second["message"], "two");
        assert_eq!(second["session_id"], "s-9");
        assert_eq!(
            second["history"],
            serde_json::json!([
                {"role": "assistant", "content": "ack"},
                {"role": "user", "content": "two"}
            ])
        );
    }

    #[tokio::test]
    async fn test_session_id_is_persisted_and_resumed() {
        let dir = tempdir().unwrap();
        let state_path = dir.path().join("state.json");
        let server = MockServer::start().await;
        mount_reply(&server, sse(&[r#"{"response":"hi","session_id":"s-7"}"#])).await;

        let widget =
            widget(&server).with_session_store(SessionStore::open_at(&state_path).unwrap());
        widget.send_message("hello", &mut RecordingView::default()).await;

        let store = SessionStore::open_at(&state_path).unwrap();
        assert_eq!(store.session_id("key-1"), Some("s-7"));

        let resumed = ChatWidget::new(WidgetClient::new(
            Url::parse(&server.uri()).unwrap(),
            "key-1",
        ))
        .with_session_store(store);
        assert_eq!(resumed.session_id().await.as_deref(), Some("s-7"));

        resumed.reset_session().await.unwrap();
        assert_eq!(resumed.session_id().await, None);
        let store = SessionStore::open_at(&state_path).unwrap();
        assert_eq!(store.session_id("key-1"), None);
    }

    #[tokio::test]
    async fn test_session_id_persisted_even_when_reply_fails() {
        let dir = tempdir().unwrap();
        let state_path = dir.path().join("state.json");
        let server = MockServer::start().await;
        // Both payloads arrive in one event, so one chunk holds the id and
        // the error.
        mount_reply(
            &server,
            "data: {\"session_id\":\"s-3\"}\ndata: {\"error\":\"boom\"}\n\n".to_string(),
        )
        .await;

        let widget =
            widget(&server).with_session_store(SessionStore::open_at(&state_path).unwrap());
        let outcome = widget.send_message("hello", &mut RecordingView::default()).await;
        assert!(matches!(outcome, SendOutcome::Failed(_)));
        assert_eq!(widget.session_id().await.as_deref(), Some("s-3"));
        let store = SessionStore::open_at(&state_path).unwrap();
        assert_eq!(store.session_id("key-1"), Some("s-3"));
    }

    #[tokio::test]
    async fn test_rating_prompt_flow() {
        let dir = tempdir().unwrap();
        let state_path = dir.path().join("state.json");
        let server = MockServer::start().await;
        mount_reply(&server, sse(&[r#"{"response":"hi","session_id":"s-5"}"#])).await;
        Mock::given(method("GET"))
            .and(path("/api/has_rated"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"hasRated": false})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rating"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok", "message": "rating stored"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let widget =
            widget(&server).with_session_store(SessionStore::open_at(&state_path).unwrap());
        assert!(!widget.rating_prompt_due().await, "no session yet");

        widget.send_message("hello", &mut RecordingView::default()).await;
        assert!(widget.rating_prompt_due().await);

        let message = widget.answer_rating(RatingChoice::Rated(5)).await.unwrap();
        assert_eq!(message.as_deref(), Some("rating stored"));
        assert!(!widget.rating_prompt_due().await);

        let store = SessionStore::open_at(&state_path).unwrap();
        assert!(store.rating_shown("key-1", "s-5"));
    }

    #[tokio::test]
    async fn test_rating_prompt_shown_when_lookup_fails() {
        let server = MockServer::start().await;
        mount_reply(&server, sse(&[r#"{"response":"hi","session_id":"s-6"}"#])).await;
        Mock::given(method("GET"))
            .and(path("/api/has_rated"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let widget = widget(&server);
        widget.send_message("hello", &mut RecordingView::default()).await;
        assert!(widget.rating_prompt_due().await);

        assert_eq!(widget.answer_rating(RatingChoice::Dismissed).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_appointment_form_books_selected_slot() {
        let server = MockServer::start().await;
        mount_reply(
            &server,
            sse(&[
                r#"{"response":"Sure.<ACTION>{\"type\":\"appointment\",\"fields\":[\"name\"]}</ACTION>"}"#,
                "[DONE]",
            ]),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/available-slots/key-1"))
            .and(query_param("date", "2025-09-25"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "available_slots": [
                    {"datetime": "2025-09-25T09:00:00", "start_time": "09:00", "end_time": "10:00"}
                ],
                "date": "2025-09-25"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/create-appointment/key-1"))
            .and(body_json(serde_json::json!({
                "name": "Ada",
                "appointment_date": "2025-09-25",
                "start_datetime": "2025-09-25T09:00:00"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok", "event_id": "evt-1", "message": "booked"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let widget = widget(&server);
        let mut view = RecordingView::default();
        widget.send_message("book", &mut view).await;
        let mut form = view.appointment_forms.pop().unwrap();

        assert!(widget.available_slots(&form).await.is_err());

        form.set("name", "Ada").unwrap();
        form.set_date("2025-09-25").unwrap();
        let slots = widget.available_slots(&form).await.unwrap();
        assert_eq!(slots.len(), 1);
        form.select_slot(slots[0].clone());

        let confirmation = widget.book_appointment(&form).await.unwrap();
        assert_eq!(confirmation.event_id.as_deref(), Some("evt-1"));
    }
}
