use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;

use super::event_stream::EventStreamDecoder;
use super::{Dispatcher, MeetingPointClient, MessageHandler, Subscription};
use crate::diagnostics::{DiagnosticSink, Operation, TracingDiagnostics};
use crate::error::{Error, Result};
use crate::models::{ClientConfiguration, HostConfiguration, HostId, RelayedMessage, SessionToken};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// error bodies are read up to this many bytes
const MAX_STATUS_BODY: usize = 4096;

/// Meeting-point client speaking JSON over HTTP with a server-sent event
/// stream for inbound relayed messages.
#[derive(Clone)]
pub struct HttpMeetingPointClient {
    http: reqwest::Client,
    base_url: Url,
    request_timeout: Duration,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl HttpMeetingPointClient {
    pub fn new(base_url: Url) -> std::result::Result<Self, reqwest::Error> {
        Self::with_timeouts(base_url, DEFAULT_REQUEST_TIMEOUT, DEFAULT_CONNECT_TIMEOUT)
    }

    /// `request_timeout` bounds one-shot calls; `connect_timeout` applies to
    /// every call including the event stream, which is otherwise unbounded.
    pub fn with_timeouts(
        base_url: Url,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> std::result::Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self::from_client(http, base_url, request_timeout))
    }

    /// Wraps a preconfigured reqwest client (proxies, TLS roots, headers).
    pub fn from_client(http: reqwest::Client, base_url: Url, request_timeout: Duration) -> Self {
        Self {
            http,
            base_url,
            request_timeout,
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn post(&self, url: &Url) -> RequestBuilder {
        self.http
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .timeout(self.request_timeout)
    }

    async fn init<T: DeserializeOwned>(
        &self,
        operation: Operation,
        action: &str,
        host_id: &HostId,
    ) -> Result<T> {
        let request = self
            .post(&self.base_url)
            .query(&[("action", action), ("hostId", host_id.as_str())]);

        let response = send(request).await?;
        let status = response.status();
        if status == StatusCode::OK {
            return response.json::<T>().await.map_err(|e| {
                Error::meeting_point(format!("malformed {} response", action))
                    .with_status(status.as_u16())
                    .with_source(e)
            });
        }

        let text = status_text(response).await;
        Err(match status {
            StatusCode::BAD_REQUEST if operation == Operation::RegisterHost => {
                Error::host_id_in_use(text)
            }
            StatusCode::BAD_REQUEST => Error::invalid_host_id(text),
            _ => Error::meeting_point(format!("{} {}", status.as_u16(), text)),
        }
        .with_status(status.as_u16()))
    }

    fn report<T>(&self, operation: Operation, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.diagnostics.report(operation, e);
        }
        result
    }
}

#[async_trait]
impl MeetingPointClient for HttpMeetingPointClient {
    async fn register_host(&self, host_id: &HostId) -> Result<HostConfiguration> {
        let result = self.init(Operation::RegisterHost, "host", host_id).await;
        if result.is_ok() {
            info!("Registered host {} at {}", host_id, self.base_url);
        }
        self.report(Operation::RegisterHost, result)
    }

    async fn join_host(&self, host_id: &HostId) -> Result<ClientConfiguration> {
        let result = self.init(Operation::JoinHost, "join", host_id).await;
        if result.is_ok() {
            info!("Joined host {} at {}", host_id, self.base_url);
        }
        self.report(Operation::JoinHost, result)
    }

    async fn send_relayed_message(
        &self,
        token: &SessionToken,
        message: &RelayedMessage,
        endpoint: Option<&Url>,
    ) -> Result<()> {
        let url = endpoint.unwrap_or(&self.base_url);
        let request = self
            .post(url)
            .query(&[("token", token.as_str())])
            .body(message.to_string());

        let result: Result<()> = async {
            let response = send(request).await?;
            let status = response.status();
            if status == StatusCode::OK {
                debug!("Relayed message accepted by {}", url);
                return Ok(());
            }

            let text = status_text(response).await;
            Err(match status {
                StatusCode::BAD_REQUEST => Error::invalid_client_or_host_id(text),
                StatusCode::UNAUTHORIZED => Error::invalid_token(text),
                _ => Error::meeting_point(format!("{} {}", status.as_u16(), text)),
            }
            .with_status(status.as_u16()))
        }
        .await;

        self.report(Operation::SendRelayedMessage, result)
    }

    async fn subscribe_to_relayed_messages(
        &self,
        token: &SessionToken,
        handler: MessageHandler,
        endpoint: Option<&Url>,
    ) -> Result<Subscription> {
        let url = endpoint.unwrap_or(&self.base_url);
        let request = self
            .http
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .query(&[("token", token.as_str())]);

        let result: Result<Response> = async {
            let response = send(request).await?;
            let status = response.status();
            if status != StatusCode::OK {
                let text = status_text(response).await;
                return Err(Error::meeting_point(format!(
                    "event stream rejected: {} {}",
                    status.as_u16(),
                    text
                ))
                .with_status(status.as_u16()));
            }
            Ok(response)
        }
        .await;
        let response = self.report(Operation::SubscribeToRelayedMessages, result)?;

        debug!("Event stream open at {}", url);
        let diagnostics = self.diagnostics.clone();
        Ok(Subscription::spawn(handler, move |dispatcher| async move {
            let result = pump_events(response, dispatcher).await;
            if let Err(e) = &result {
                diagnostics.report(Operation::SubscribeToRelayedMessages, e);
            }
            result
        }))
    }
}

/// Reads the event stream until it ends, fails, or the subscription closes.
async fn pump_events(response: Response, mut dispatcher: Dispatcher) -> Result<()> {
    let mut decoder = EventStreamDecoder::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| Error::meeting_point("event stream failed").with_source(e))?;

        for event in decoder.feed(&chunk)? {
            if !event.is_message() {
                debug!("Ignoring '{}' event", event.event);
                continue;
            }
            let message: RelayedMessage = serde_json::from_str(&event.data).map_err(|e| {
                Error::meeting_point("relayed message is not valid JSON").with_source(e)
            })?;
            if !dispatcher.dispatch(message) {
                return Ok(());
            }
        }
    }

    if dispatcher.is_closed() {
        return Ok(());
    }
    Err(Error::meeting_point("event stream closed by meeting point"))
}

/// Sends the request, classifying any failure before a status as unreachable.
async fn send(request: RequestBuilder) -> Result<Response> {
    request.send().await.map_err(|e| {
        let message = if e.is_timeout() {
            "request timed out".to_string()
        } else if e.is_connect() {
            format!("connection failed: {}", e)
        } else {
            format!("request failed: {}", e)
        };
        Error::unreachable(message).with_source(e)
    })
}

/// Server-provided status text: a non-standard reason phrase when the server
/// sent one, otherwise the start of the body, otherwise the canonical reason
/// phrase.
async fn status_text(mut response: Response) -> String {
    let status = response.status();
    if let Some(reason) = response.extensions().get::<hyper::ext::ReasonPhrase>() {
        return String::from_utf8_lossy(reason.as_bytes()).into_owned();
    }

    let mut body = Vec::new();
    while body.len() < MAX_STATUS_BODY {
        match response.chunk().await {
            Ok(Some(chunk)) => body.extend_from_slice(&chunk),
            _ => break,
        }
    }
    body.truncate(MAX_STATUS_BODY);

    let body = String::from_utf8_lossy(&body);
    let body = body.trim();
    if body.is_empty() {
        status.canonical_reason().unwrap_or("").to_string()
    } else {
        body.to_string()
    }
}
