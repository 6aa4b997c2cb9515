// Server-Sent Event streams: server state, console, Java install progress, notifications.
// Each stream owns its subscription; a disconnecting client drops the stream and frees it.

use axum::{
    Extension,
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, KeepAliveStream, Sse},
};
use futures_util::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::pin::Pin;
use tokio::sync::broadcast::error::RecvError;

use super::AppState;
use crate::broadcaster::StateEvent;
use crate::error::{PanelError, Result};
use crate::models::{InstallEvent, UserProfile};

type BoxedEvents = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;
type EventStream = Sse<KeepAliveStream<BoxedEvents>>;

/// Boxes a stream; idle streams get comment keep-alives.
fn sse(stream: impl Stream<Item = Result<Event, Infallible>> + Send + 'static) -> EventStream {
    let boxed: BoxedEvents = Box::pin(stream);
    Sse::new(boxed).keep_alive(KeepAlive::default())
}

/// Text event; carriage returns are dropped since SSE fields cannot carry them.
fn text_event(name: &str, text: &str) -> Event {
    Event::default().event(name).data(text.replace('\r', ""))
}

fn json_event(name: &str, data: &impl serde::Serialize) -> Option<Event> {
    match Event::default().event(name).json_data(data) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(error = %e, event = name, "SSE event serialization failed");
            None
        }
    }
}

/// GET /api/server/{id}/state/sse: `update_state` with changed fields, `ping` keep-alives.
/// Only updates published after connecting are delivered.
pub(super) async fn state(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(id): Path<String>,
) -> Result<EventStream> {
    state.servers.get_for(&user, &id).await?;
    let mut subscription = state.broadcaster.subscribe(&id);
    tracing::debug!(server_id = %id, username = %user.username, "state stream opened");
    Ok(sse(async_stream::stream! {
        while let Some(event) = subscription.next().await {
            let sse_event = match &event {
                StateEvent::UpdateState(changes) => json_event(event.name(), changes),
                StateEvent::Ping => Some(Event::default().event(event.name()).data("")),
            };
            if let Some(sse_event) = sse_event {
                yield Ok::<_, Infallible>(sse_event);
            }
        }
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct ConsoleQuery {
    #[serde(default)]
    log_file: Option<String>,
}

/// GET|POST /api/server/{id}/console/sse: `update_console` text chunks.
/// Without `log_file`: the buffered console, then live lines. With `log_file`: that file's
/// contents (relative to the server root), then the stream ends.
pub(super) async fn console(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(id): Path<String>,
    Query(query): Query<ConsoleQuery>,
) -> Result<EventStream> {
    state.servers.get_for(&user, &id).await?;

    if let Some(log_file) = query.log_file.filter(|f| !f.trim().is_empty()) {
        let text = state.files.read_to_string(&id, &log_file).await?;
        return Ok(sse(futures_util::stream::once(async move {
            Ok::<_, Infallible>(text_event("update_console", &text))
        })));
    }

    let (backlog, mut rx) = state.supervisor.logs(&id).subscribe_with_snapshot();
    let server_id = id.clone();
    Ok(sse(async_stream::stream! {
        if !backlog.is_empty() {
            yield Ok::<_, Infallible>(text_event("update_console", &backlog.join("\n")));
        }
        loop {
            match rx.recv().await {
                Ok(line) => yield Ok::<_, Infallible>(text_event("update_console", &line)),
                Err(RecvError::Lagged(n)) => {
                    tracing::debug!(server_id = %server_id, skipped = n, "console stream lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }))
}

/// GET /api/java/install/{runtime}/sse: `progress`, then `done` or `error`. Admins only.
pub(super) async fn java_install(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    Path(runtime): Path<String>,
) -> Result<EventStream> {
    if !user.admin {
        return Err(PanelError::Forbidden);
    }
    let mut rx = state.java.install(&runtime)?;
    Ok(sse(async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            let sse_event = match &event {
                InstallEvent::Progress(files) => json_event(event.name(), files),
                InstallEvent::Error(message) => Some(text_event(event.name(), message)),
                InstallEvent::Done => Some(Event::default().event(event.name()).data("")),
            };
            if let Some(sse_event) = sse_event {
                yield Ok::<_, Infallible>(sse_event);
            }
            if terminal {
                break;
            }
        }
    }))
}

/// GET /api/notifications: `full` with the whole list on connect and after every change.
pub(super) async fn notifications(State(state): State<AppState>) -> EventStream {
    let mut rx = state.notifications.subscribe();
    sse(async_stream::stream! {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if let Some(event) = json_event("full", &snapshot) {
                yield Ok::<_, Infallible>(event);
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
}
