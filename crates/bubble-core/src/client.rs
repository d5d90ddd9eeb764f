//! HTTP client for the widget endpoints of the chatbot backend.

use anyhow::{Context, Result, anyhow, bail};
use bytes::Bytes;
use eventsource_stream::{EventStream, EventStreamError, Eventsource};
use futures_util::stream::{BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::forms::{LeadSubmission, Slot};
use crate::session::HistoryEntry;
use crate::stream::StreamError;

/// Body of `POST /widget-chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub message: &'a str,
    pub history: &'a [HistoryEntry],
    pub session_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct AvailableSlots {
    #[serde(default)]
    available_slots: Vec<Slot>,
}

/// Reply of `POST /create-appointment/{key}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AppointmentConfirmation {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
struct RatingRequest<'a> {
    rating: u8,
    session_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct StatusReply {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HasRatedReply {
    #[serde(rename = "hasRated", default)]
    has_rated: bool,
}

/// Body of a chat reply, read one server-sent event at a time.
pub struct ChatStream {
    events: EventStream<BoxStream<'static, Result<Bytes, StreamError>>>,
}

impl ChatStream {
    /// Wraps any byte stream; used for HTTP bodies and captured replays.
    pub fn new(body: impl Stream<Item = Result<Bytes, StreamError>> + Send + 'static) -> Self {
        Self {
            events: body.boxed().eventsource(),
        }
    }

    /// Returns the next event re-framed as `data: ` lines, or `None` once the
    /// body ended.
    ///
    /// # Errors
    /// Returns the body's `StreamError` when reading fails, or a protocol
    /// error when the event framing is broken.
    pub async fn next_chunk(&mut self) -> Result<Option<String>, StreamError> {
        match self.events.next().await {
            Some(Ok(event)) => Ok(Some(data_lines(&event.data))),
            Some(Err(EventStreamError::Transport(err))) => Err(err),
            Some(Err(err)) => Err(StreamError::protocol(format!("SSE stream error: {err}"))),
            None => Ok(None),
        }
    }
}

/// Multi-line event data becomes one `data: ` line per payload line.
fn data_lines(data: &str) -> String {
    data.split('\n')
        .map(|line| format!("data: {line}\n"))
        .collect()
}

fn classify_reqwest_error(e: &reqwest::Error) -> StreamError {
    if e.is_timeout() {
        StreamError::transport(format!("Request timed out: {e}"))
    } else if e.is_connect() {
        StreamError::transport(format!("Connection failed: {e}"))
    } else {
        StreamError::transport(format!("Network error: {e}"))
    }
}

#[derive(Debug, Clone)]
pub struct WidgetClient {
    base: Url,
    api_key: String,
    http: reqwest::Client,
}

impl WidgetClient {
    pub fn new(base: Url, api_key: impl Into<String>) -> Self {
        Self {
            base,
            api_key: api_key.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Builds `{base}/{segments...}`, keeping any path prefix of the base.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("api_base '{}' cannot be a base URL", self.base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends a chat message and returns the streamed reply body.
    ///
    /// # Errors
    /// `HttpStatus` for non-success responses, `Transport` when the request
    /// cannot be sent.
    pub async fn open_chat_stream(&self, request: &ChatRequest<'_>) -> Result<ChatStream, StreamError> {
        let url = self
            .endpoint(&["widget-chat"])
            .map_err(|e| StreamError::transport(e.to_string()))?;

        let response = self
            .http
            .post(url)
            .query(&[("api_key", self.api_key.as_str())])
            .header("accept", "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(StreamError::http_status(status.as_u16(), &error_body));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| classify_reqwest_error(&e)));
        Ok(ChatStream::new(body))
    }

    pub async fn submit_lead(&self, submission: &LeadSubmission) -> Result<()> {
        let url = self.endpoint(&["submit-lead"])?;
        let response = self
            .http
            .post(url)
            .query(&[("api_key", self.api_key.as_str())])
            .json(submission)
            .send()
            .await
            .context("Failed to send lead")?;
        ensure_success(response, "Lead submission").await?;
        Ok(())
    }

    pub async fn available_slots(&self, date: &str) -> Result<Vec<Slot>> {
        let url = self.endpoint(&["available-slots", &self.api_key])?;
        let response = self
            .http
            .get(url)
            .query(&[("date", date)])
            .send()
            .await
            .context("Failed to request available slots")?;
        let response = ensure_success(response, "Slot lookup").await?;
        let slots: AvailableSlots = response
            .json()
            .await
            .context("Failed to parse available slots")?;
        Ok(slots.available_slots)
    }

    pub async fn create_appointment(
        &self,
        body: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<AppointmentConfirmation> {
        let url = self.endpoint(&["create-appointment", &self.api_key])?;
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send appointment")?;
        let response = ensure_success(response, "Appointment booking").await?;
        response
            .json()
            .await
            .context("Failed to parse appointment confirmation")
    }

    /// Submits a 1-5 rating for the session; returns the server's message.
    pub async fn submit_rating(&self, rating: u8, session_id: Option<&str>) -> Result<String> {
        if !(1..=5).contains(&rating) {
            bail!("Rating must be between 1 and 5, got {rating}");
        }
        let url = self.endpoint(&["rating"])?;
        let response = self
            .http
            .post(url)
            .query(&[("api_key", self.api_key.as_str())])
            .json(&RatingRequest { rating, session_id })
            .send()
            .await
            .context("Failed to send rating")?;
        let response = ensure_success(response, "Rating").await?;
        let reply: StatusReply = response
            .json()
            .await
            .context("Failed to parse rating reply")?;
        let message = reply.message.unwrap_or_default();
        if reply.status != "ok" {
            bail!("Rating rejected: {message}");
        }
        Ok(message)
    }

    pub async fn has_rated(&self, session_id: &str) -> Result<bool> {
        let url = self.endpoint(&["api", "has_rated"])?;
        let response = self
            .http
            .get(url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("session_id", session_id),
            ])
            .send()
            .await
            .context("Failed to query rating status")?;
        let response = ensure_success(response, "Rating status").await?;
        let reply: HasRatedReply = response
            .json()
            .await
            .context("Failed to parse rating status")?;
        Ok(reply.has_rated)
    }
}

async fn ensure_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!("{what} failed: HTTP {}: {}", status.as_u16(), body.trim())
}

#[cfg(test)]
mod tests {
    use futures_util::stream;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::session::Role;
    use crate::stream::StreamErrorKind;

    fn client(server: &MockServer) -> WidgetClient {
        WidgetClient::new(Url::parse(&server.uri()).unwrap(), "key-1")
    }

    #[test]
    fn test_endpoint_keeps_base_prefix_and_encodes() {
        let client = WidgetClient::new(Url::parse("https://bots.example/v1/").unwrap(), "a b/c");
        let url = client.endpoint(&["available-slots", client.api_key()]).unwrap();
        assert_eq!(url.as_str(), "https://bots.example/v1/available-slots/a%20b%2Fc");
    }

    #[tokio::test]
    async fn test_chat_stream_sends_request_and_yields_lines() {
        let server = MockServer::start().await;
        let history = vec![HistoryEntry {
            role: Role::User,
            content: "hi".to_string(),
        }];

        Mock::given(method("POST"))
            .and(path("/widget-chat"))
            .and(query_param("api_key", "key-1"))
            .and(body_json(serde_json::json!({
                "message": "hi",
                "history": [{"role": "user", "content": "hi"}],
                "session_id": null
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string("data: {\"response\":\"Hello\"}\n\ndata: [DONE]\n\n"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let request = ChatRequest {
            message: "hi",
            history: &history,
            session_id: None,
        };
        let mut chat = client(&server).open_chat_stream(&request).await.unwrap();
        let mut text = String::new();
        while let Some(chunk) = chat.next_chunk().await.unwrap() {
            text.push_str(&chunk);
        }
        assert!(text.contains("data: {\"response\":\"Hello\"}"));
        assert!(text.contains("[DONE]"));
    }

    #[tokio::test]
    async fn test_chat_stream_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/widget-chat"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Invalid API key"))
            .mount(&server)
            .await;

        let request = ChatRequest {
            message: "hi",
            history: &[],
            session_id: Some("s"),
        };
        let Err(err) = client(&server).open_chat_stream(&request).await else {
            panic!("expected an error");
        };
        assert_eq!(err.kind, StreamErrorKind::HttpStatus);
        assert!(err.message.contains("403"));
        assert!(err.message.contains("Invalid API key"));
    }

    fn byte_stream(parts: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes, StreamError>> {
        let parts: Vec<Result<Bytes, StreamError>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
        stream::iter(parts)
    }

    #[tokio::test]
    async fn test_chat_stream_rejoins_split_events() {
        let mut chat = ChatStream::new(byte_stream(&[
            b"data: {\"resp",
            b"onse\":\"a\"}\n\ndata: [DO",
            b"NE]\n\n",
        ]));
        assert_eq!(
            chat.next_chunk().await.unwrap().as_deref(),
            Some("data: {\"response\":\"a\"}\n")
        );
        assert_eq!(chat.next_chunk().await.unwrap().as_deref(), Some("data: [DONE]\n"));
        assert_eq!(chat.next_chunk().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_chat_stream_handles_crlf_line_endings() {
        let mut chat = ChatStream::new(byte_stream(&[
            b"data: {\"response\":\"a\"}\r\n\r\ndata: {\"response\":\"b\"}\r\n\r\n",
        ]));
        assert_eq!(
            chat.next_chunk().await.unwrap().as_deref(),
            Some("data: {\"response\":\"a\"}\n")
        );
        assert_eq!(
            chat.next_chunk().await.unwrap().as_deref(),
            Some("data: {\"response\":\"b\"}\n")
        );
    }

    #[tokio::test]
    async fn test_chat_stream_keeps_split_utf8_intact() {
        let text = "data: {\"response\":\"Hello 👋 world\"}\n\n";
        let split = text.find('👋').unwrap() + 2;
        let (head, tail) = text.as_bytes().split_at(split);
        let parts: Vec<Result<Bytes, StreamError>> = vec![
            Ok(Bytes::copy_from_slice(head)),
            Ok(Bytes::copy_from_slice(tail)),
        ];

        let mut chat = ChatStream::new(stream::iter(parts));
        assert_eq!(
            chat.next_chunk().await.unwrap().as_deref(),
            Some("data: {\"response\":\"Hello 👋 world\"}\n")
        );
    }

    #[tokio::test]
    async fn test_chat_stream_splits_multi_line_event_data() {
        let mut chat = ChatStream::new(byte_stream(&[
            b"data: {\"session_id\":\"s-1\"}\ndata: {\"error\":\"boom\"}\n\n",
        ]));
        assert_eq!(
            chat.next_chunk().await.unwrap().as_deref(),
            Some("data: {\"session_id\":\"s-1\"}\ndata: {\"error\":\"boom\"}\n")
        );
    }

    #[tokio::test]
    async fn test_chat_stream_surfaces_body_error() {
        let parts: Vec<Result<Bytes, StreamError>> = vec![
            Ok(Bytes::from_static(b"data: {\"response\":\"a\"}\n\n")),
            Err(StreamError::transport("reset")),
        ];
        let mut chat = ChatStream::new(stream::iter(parts));
        assert!(chat.next_chunk().await.unwrap().is_some());
        let err = chat.next_chunk().await.unwrap_err();
        assert_eq!(err.kind, StreamErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_submit_lead() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit-lead"))
            .and(query_param("api_key", "key-1"))
            .and(body_json(serde_json::json!({
                "leadData": {"name": "Ada"},
                "timestamp": "2025-01-01T00:00:00.000Z"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success", "message": "Lead data received"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let submission = LeadSubmission {
            lead_data: [("name".to_string(), "Ada".to_string())].into(),
            timestamp: "2025-01-01T00:00:00.000Z".to_string(),
        };
        client(&server).submit_lead(&submission).await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_lead_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit-lead"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let submission = LeadSubmission {
            lead_data: Default::default(),
            timestamp: String::new(),
        };
        let err = client(&server).submit_lead(&submission).await.unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn test_available_slots() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/available-slots/key-1"))
            .and(query_param("date", "2025-09-25"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "available_slots": [
                    {"datetime": "2025-09-25T09:00:00", "start_time": "09:00", "end_time": "10:00"},
                    {"datetime": "2025-09-25T10:00:00", "start_time": "10:00", "end_time": "11:00"}
                ],
                "date": "2025-09-25"
            })))
            .mount(&server)
            .await;

        let slots = client(&server).available_slots("2025-09-25").await.unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[1].datetime, "2025-09-25T10:00:00");
    }

    #[tokio::test]
    async fn test_available_slots_calendar_not_connected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/available-slots/key-1"))
            .respond_with(ResponseTemplate::new(409).set_body_string("Calendar is not connected"))
            .mount(&server)
            .await;

        let err = client(&server).available_slots("2025-09-25").await.unwrap_err();
        assert!(err.to_string().contains("409"));
    }

    #[tokio::test]
    async fn test_create_appointment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/create-appointment/key-1"))
            .and(body_json(serde_json::json!({
                "name": "Ada",
                "start_datetime": "2025-09-25T11:00:00"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok", "event_id": "ev-1", "message": "created"
            })))
            .mount(&server)
            .await;

        let mut body = serde_json::Map::new();
        body.insert("name".to_string(), "Ada".into());
        body.insert("start_datetime".to_string(), "2025-09-25T11:00:00".into());
        let confirmation = client(&server).create_appointment(&body).await.unwrap();
        assert_eq!(confirmation.event_id.as_deref(), Some("ev-1"));
    }

    #[tokio::test]
    async fn test_submit_rating() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rating"))
            .and(query_param("api_key", "key-1"))
            .and(body_json(serde_json::json!({"rating": 5, "session_id": "s-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok", "message": "rating stored"
            })))
            .mount(&server)
            .await;

        let message = client(&server).submit_rating(5, Some("s-1")).await.unwrap();
        assert_eq!(message, "rating stored");
    }

    #[tokio::test]
    async fn test_submit_rating_rejected_by_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rating"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "error", "message": "domain not allowed"
            })))
            .mount(&server)
            .await;

        let err = client(&server).submit_rating(3, None).await.unwrap_err();
        assert!(err.to_string().contains("domain not allowed"));
    }

    #[tokio::test]
    async fn test_submit_rating_out_of_range_is_local() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        assert!(client(&server).submit_rating(0, None).await.is_err());
        assert!(client(&server).submit_rating(6, None).await.is_err());
    }

    #[tokio::test]
    async fn test_has_rated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/has_rated"))
            .and(query_param("api_key", "key-1"))
            .and(query_param("session_id", "s-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"hasRated": true})),
            )
            .mount(&server)
            .await;

        assert!(client(&server).has_rated("s-1").await.unwrap());
    }
}
