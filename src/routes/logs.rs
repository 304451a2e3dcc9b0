use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::log_capture::{LogEntry, LogSource};
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub source: Option<LogSource>,
}

#[derive(Deserialize)]
pub struct StreamQuery {
    pub source: Option<LogSource>,
}

fn default_limit() -> usize {
    100
}

fn matches_source(entry: &LogEntry, source: Option<LogSource>) -> bool {
    source.is_none() || source == Some(entry.source)
}

/// GET /logs/history: newest entries first, optionally for one `source`.
pub async fn log_history(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> Json<serde_json::Value> {
    let entries: Vec<LogEntry> = state
        .logs
        .history()
        .await
        .into_iter()
        .filter(|e| matches_source(e, query.source))
        .collect();
    let total = entries.len();
    let entries: Vec<_> = entries.into_iter().rev().take(query.limit).collect();

    Json(serde_json::json!({
        "entries": entries,
        "total": total,
        "limit": query.limit,
        "source": query.source,
    }))
}

/// GET /logs/stream: SSE stream of activity entries, optionally for one `source`.
pub async fn log_stream(
    State(state): State<SharedState>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.logs.subscribe());
    let source = query.source;

    let event_stream = stream.filter_map(move |result| match result {
        Ok(entry) if matches_source(&entry, source) => {
            let data = serde_json::to_string(&entry).unwrap_or_default();
            Some(Ok(Event::default().event("log").data(data)))
        }
        // Filtered out, or the subscriber lagged.
        _ => None,
    });

    Sse::new(event_stream).keep_alive(KeepAlive::default())
}
