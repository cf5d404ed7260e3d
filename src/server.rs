use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use log::info;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::case::*;
use crate::error::TopologyError;
use crate::evaluate::Session;
use crate::oracle::ConnectivityOracle;
use crate::table::LookupTable;

/// Everything behind the lock. One session means one oracle, so span
/// queries are served one at a time.
pub struct ServerState {
    session: Session<ConnectivityOracle>,
    table: Option<LookupTable>,
}

type AppState = Arc<Mutex<ServerState>>;

// Helper: respond with JSON
fn json_ok(val: serde_json::Value) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        val.to_string(),
    )
        .into_response()
}

fn json_err(status: StatusCode, msg: &str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        json!({"error": msg}).to_string(),
    )
        .into_response()
}

fn topology_err(err: TopologyError) -> Response {
    let status = match err {
        TopologyError::UnknownSpan(_) | TopologyError::UnknownSwitch(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    json_err(status, &err.to_string())
}

fn outcome_json(span: &Span, endpoints: (BusId, BusId), outcome: SpanOutcome) -> serde_json::Value {
    let (u, v) = endpoints;
    match outcome {
        SpanOutcome::Isolated(best) => json!({
            "status": "ok",
            "span": span.to_string(),
            "from": u,
            "to": v,
            "best_switch": best.switch_id,
            "isolated_buses": best.isolated_buses,
            "kw_interrupted": best.interrupted_kw,
        }),
        SpanOutcome::NoneIsolates => json!({
            "status": "no_isolating_switch",
            "span": span.to_string(),
            "from": u,
            "to": v,
        }),
    }
}

async fn answer_span(state: &AppState, span: Span) -> Response {
    let mut guard = state.lock().await;
    let endpoints = match guard.session.topology().span_endpoints(&span) {
        Ok(e) => e,
        Err(e) => return topology_err(e),
    };
    match guard.session.best_switch_for_span(&span) {
        Ok(outcome) => json_ok(outcome_json(&span, endpoints, outcome)),
        Err(e) => topology_err(e),
    }
}

// GET /
async fn status() -> Response {
    json_ok(json!({"status": "backend ok"}))
}

// GET /api/lines
async fn list_lines(State(state): State<AppState>) -> Response {
    let guard = state.lock().await;
    let lines: Vec<serde_json::Value> = guard
        .session
        .topology()
        .lines()
        .iter()
        .map(|l| json!({"name": l.name, "bus1": l.from_bus, "bus2": l.to_bus, "kind": l.kind}))
        .collect();
    json_ok(json!(lines))
}

// GET /api/switches: effect of each candidate opened alone
async fn map_switches(State(state): State<AppState>) -> Response {
    let mut guard = state.lock().await;
    match guard.session.map_all_switches() {
        Ok(map) => json_ok(json!({"switches": map})),
        Err(e) => topology_err(e),
    }
}

#[derive(Deserialize)]
struct IsolationQuery {
    span: String,
}

// GET /api/isolation?span=l75
async fn isolation(State(state): State<AppState>, Query(q): Query<IsolationQuery>) -> Response {
    answer_span(&state, Span::line(&q.span)).await
}

#[derive(Deserialize)]
struct BestSwitchBody {
    bus_u: String,
    bus_v: String,
}

// POST /api/best-switch  {"bus_u": .., "bus_v": ..}
async fn best_switch(
    State(state): State<AppState>,
    body: axum::extract::Json<BestSwitchBody>,
) -> Response {
    answer_span(&state, Span::buses(&body.bus_u, &body.bus_v)).await
}

// GET /api/table: computed on first request, then served from memory
async fn lookup_table(State(state): State<AppState>) -> Response {
    let mut guard = state.lock().await;
    let state = &mut *guard;
    if state.table.is_none() {
        match LookupTable::recompute(&mut state.session) {
            Ok(table) => state.table = Some(table),
            Err(e) => return topology_err(e),
        }
    }
    let rows = state.table.as_ref().map(|t| t.rows()).unwrap_or_default();
    json_ok(json!({"rows": rows}))
}

pub fn router(session: Session<ConnectivityOracle>) -> Router {
    let state: AppState = Arc::new(Mutex::new(ServerState {
        session,
        table: None,
    }));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(status))
        .route("/api/lines", get(list_lines))
        .route("/api/switches", get(map_switches))
        .route("/api/isolation", get(isolation))
        .route("/api/best-switch", post(best_switch))
        .route("/api/table", get(lookup_table))
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(
    session: Session<ConnectivityOracle>,
    addr: SocketAddr,
) -> std::io::Result<()> {
    let app = router(session);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Isolator running at http://{}", addr);
    axum::serve(listener, app).await
}
