//! Loopback HTTP meeting point backed by [`MemoryMeetingPoint`], for tests.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::meeting_point::{MeetingPointClient, MemoryMeetingPoint};
use crate::models::{HostId, RelayedMessage, SessionToken};

/// Reason phrase sent by `/rejected`.
pub(crate) const CUSTOM_REASON: &str = "Host Id Taken";

/// Routes:
/// - `/` speaks the meeting-point protocol
/// - `/broken` answers 500 to everything
/// - `/verbose` answers 500 with a large body
/// - `/rejected` answers 400 with [`CUSTOM_REASON`] as the reason phrase
/// - `/malformed` streams one event whose data is not JSON
pub(crate) struct TestMeetingPoint {
    addr: SocketAddr,
    meeting_point: MemoryMeetingPoint,
    task: JoinHandle<()>,
}

impl TestMeetingPoint {
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let meeting_point = MemoryMeetingPoint::new();

        let app = router(meeting_point.clone());
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            meeting_point,
            task,
        }
    }

    pub(crate) fn url(&self) -> Url {
        Url::parse(&format!("http://{}/", self.addr)).unwrap()
    }

    /// Closes every open event stream from the server side.
    pub(crate) async fn drop_streams(&self) {
        self.meeting_point.disconnect_subscribers().await;
    }
}

impl Drop for TestMeetingPoint {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Params {
    action: Option<String>,
    host_id: Option<String>,
    token: Option<String>,
}

fn router(meeting_point: MemoryMeetingPoint) -> Router {
    Router::new()
        .route("/", get(events).post(command))
        .route("/broken", any(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route(
            "/verbose",
            any(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "x".repeat(64 * 1024)) }),
        )
        .route("/rejected", any(rejected))
        .route("/malformed", get(malformed))
        .with_state(meeting_point)
}

fn error_response(error: &Error) -> Response {
    let status = error
        .status()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, error.message().to_string()).into_response()
}

async fn command(
    State(mp): State<MemoryMeetingPoint>,
    Query(params): Query<Params>,
    body: Bytes,
) -> Response {
    debug!("Fixture POST {:?}", params);

    match (params.action.as_deref(), params.token) {
        (Some(action @ ("host" | "join")), _) => {
            let Some(host_id) = params.host_id.as_deref().and_then(|id| HostId::new(id).ok())
            else {
                return (StatusCode::BAD_REQUEST, "missing hostId").into_response();
            };
            let result = if action == "host" {
                mp.register_host(&host_id)
                    .await
                    .map(|config| Json(config).into_response())
            } else {
                mp.join_host(&host_id)
                    .await
                    .map(|config| Json(config).into_response())
            };
            result.unwrap_or_else(|e| error_response(&e))
        }
        (None, Some(token)) => {
            let Ok(message) = serde_json::from_slice::<RelayedMessage>(&body) else {
                return (StatusCode::BAD_REQUEST, "invalid JSON").into_response();
            };
            match mp
                .send_relayed_message(&SessionToken::from(token), &message, None)
                .await
            {
                Ok(()) => StatusCode::OK.into_response(),
                Err(e) => error_response(&e),
            }
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn events(State(mp): State<MemoryMeetingPoint>, Query(params): Query<Params>) -> Response {
    let Some(token) = params.token else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let (tx, rx) = mpsc::unbounded_channel::<RelayedMessage>();
    let subscription = mp
        .subscribe_to_relayed_messages(
            &SessionToken::from(token),
            Box::new(move |message| {
                let _ = tx.send(message);
            }),
            None,
        )
        .await;
    let subscription = match subscription {
        Ok(subscription) => subscription,
        Err(e) => return error_response(&e),
    };

    // the subscription lives as long as the response body
    let connected = stream::once(async { Ok::<_, Infallible>(Event::default().comment("connected")) });
    let messages = stream::unfold((rx, subscription), |(mut rx, subscription)| async move {
        let message = rx.recv().await?;
        Some((
            Ok::<_, Infallible>(Event::default().data(message.to_string())),
            (rx, subscription),
        ))
    });

    Sse::new(connected.chain(messages)).into_response()
}

async fn rejected() -> Response {
    let mut response = StatusCode::BAD_REQUEST.into_response();
    response
        .extensions_mut()
        .insert(hyper::ext::ReasonPhrase::from_static(CUSTOM_REASON.as_bytes()));
    response
}

async fn malformed() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let event = stream::once(async { Ok(Event::default().data("not json")) });
    Sse::new(event.chain(stream::pending()))
}
