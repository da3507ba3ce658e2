use crate::admin::{self, Mutation, Op, Target};
use crate::blacklist::Blacklists;
use crate::counters::{CounterBank, CounterMode, CounterSource};
use crate::error::{AdminError, BlacklistError};
use crate::pool::PoolHandle;
use crate::storage::Storage;
use crate::verdict::Verdict;
use axum::{
    body::Bytes,
    extract::{
        rejection::JsonRejection,
        ws::{Message, WebSocket},
        ConnectInfo, Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ipnet::IpNet;
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub lists: Arc<Blacklists>,
    pub counters: CounterBank,
    pub pool: PoolHandle,
    pub storage: Arc<Storage>,
    pub start_time: Instant,
}

// ── Prometheus Metrics ────────────────────────────────────────────────────────

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct VerdictLabels {
    verdict: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct TableLabels {
    table: String,
}

struct Metrics {
    registry: Registry,
    packets_total: Family<VerdictLabels, Counter>,
    bytes_total: Family<VerdictLabels, Counter>,
    blacklist_entries: Family<TableLabels, Gauge>,
}

impl Metrics {
    fn new() -> Self {
        let mut registry = Registry::with_prefix("xdpfw");
        let packets_total = Family::<VerdictLabels, Counter>::default();
        let bytes_total = Family::<VerdictLabels, Counter>::default();
        let blacklist_entries = Family::<TableLabels, Gauge>::default();

        registry.register(
            "packets",
            "Packets classified, by verdict",
            packets_total.clone(),
        );
        registry.register("bytes", "Bytes classified, by verdict", bytes_total.clone());
        registry.register(
            "blacklist_entries",
            "Entries currently held per blacklist table",
            blacklist_entries.clone(),
        );

        Self {
            registry,
            packets_total,
            bytes_total,
            blacklist_entries,
        }
    }

    /// Bring the Prometheus families up to the engine's totals.
    fn sync(&self, state: &AppState) {
        // Prometheus counters are monotonic, so advance them by the delta.
        for verdict in Verdict::ALL {
            let Ok(totals) = state.counters.snapshot(verdict.code()) else {
                continue;
            };
            let labels = VerdictLabels {
                verdict: verdict.name().to_string(),
            };
            let packets = self.packets_total.get_or_create(&labels);
            if totals.packets > packets.get() {
                packets.inc_by(totals.packets - packets.get());
            }
            let bytes = self.bytes_total.get_or_create(&labels);
            if totals.bytes > bytes.get() {
                bytes.inc_by(totals.bytes - bytes.get());
            }
        }

        let sizes = state.lists.sizes();
        for (table, len) in [
            ("mac", sizes.mac),
            ("v4", sizes.v4),
            ("v6", sizes.v6),
            ("ports", sizes.ports),
        ] {
            self.blacklist_entries
                .get_or_create(&TableLabels {
                    table: table.to_string(),
                })
                .set(len as i64);
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    TableFull(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::TableFull(m) => (StatusCode::INSUFFICIENT_STORAGE, m),
            ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<AdminError> for ApiError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::Blacklist(BlacklistError::TableFull { .. }) => {
                ApiError::TableFull(err.to_string())
            }
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

// ── Request / Response Types ──────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    workers: usize,
    total_packets: u64,
}

#[derive(Serialize)]
pub struct VerdictStats {
    verdict: Verdict,
    packets: u64,
    bytes: u64,
}

#[derive(Serialize)]
pub struct StatsResponse {
    uptime_seconds: u64,
    counter_mode: CounterMode,
    verdicts: Vec<VerdictStats>,
    total_packets: u64,
    total_bytes: u64,
    packets_per_second: f64,
    bytes_per_second: f64,
}

#[derive(Serialize)]
pub struct ChangedResponse {
    changed: bool,
}

#[derive(Deserialize)]
pub struct HistoryParams {
    limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct MacBody {
    address: String,
}

#[derive(Deserialize)]
pub struct PrefixBody {
    prefix: String,
}

#[derive(Deserialize)]
pub struct PortBody {
    direction: String,
    protocol: String,
    port: u32,
}

fn verdict_stats(source: &dyn CounterSource) -> Vec<VerdictStats> {
    Verdict::ALL
        .iter()
        .filter_map(|&verdict| {
            source.snapshot(verdict.code()).ok().map(|c| VerdictStats {
                verdict,
                packets: c.packets,
                bytes: c.bytes,
            })
        })
        .collect()
}

// ── Router ────────────────────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>, allowed_ips: &[String]) -> Router {
    let metrics = Arc::new(Metrics::new());

    let mut app = Router::new()
        .route("/api/health", get(get_health))
        .route("/api/stats", get(get_stats))
        .route("/api/stats/:verdict", get(get_verdict_stats))
        .route("/api/blacklist", get(get_blacklist))
        .route("/api/blacklist/mac", post(insert_mac).delete(remove_mac))
        .route("/api/blacklist/v4", post(insert_v4).delete(remove_v4))
        .route("/api/blacklist/v6", post(insert_v6).delete(remove_v6))
        .route("/api/blacklist/port", post(insert_port).delete(remove_port))
        .route("/api/classify", post(classify))
        .route("/api/history", get(get_history))
        .route("/api/stream", get(ws_handler))
        .route("/metrics", get({
            let m = metrics.clone();
            let s = state.clone();
            move || get_metrics(s.clone(), m.clone())
        }));

    // Apply IP allowlist middleware if configured.
    if !allowed_ips.is_empty() {
        let nets: Arc<Vec<IpNet>> = Arc::new(
            allowed_ips
                .iter()
                .filter_map(|s| match s.parse::<IpNet>() {
                    Ok(net) => Some(net),
                    Err(_) => {
                        tracing::warn!("Ignoring invalid allowlist entry '{}'", s);
                        None
                    }
                })
                .collect(),
        );
        app = app.layer(middleware::from_fn(move |req, next| {
            let nets = nets.clone();
            ip_allowlist(req, next, nets)
        }));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

// ── IP Allowlist Middleware ────────────────────────────────────────────────────

async fn ip_allowlist(
    req: axum::extract::Request,
    next: middleware::Next,
    allowed: Arc<Vec<IpNet>>,
) -> impl IntoResponse {
    if let Some(connect_info) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        let ip = connect_info.0.ip();
        if allowed.iter().any(|net| net.contains(&ip)) {
            return next.run(req).await.into_response();
        }
        return StatusCode::FORBIDDEN.into_response();
    }
    next.run(req).await.into_response()
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn get_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let total_packets = verdict_stats(&state.counters)
        .iter()
        .map(|s| s.packets)
        .sum();
    Json(HealthResponse {
        status: "ok".to_string(),
        workers: state.pool.workers(),
        total_packets,
    })
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let uptime = state.start_time.elapsed().as_secs();
    let verdicts = verdict_stats(&state.counters);
    let total_packets: u64 = verdicts.iter().map(|s| s.packets).sum();
    let total_bytes: u64 = verdicts.iter().map(|s| s.bytes).sum();

    let packets_per_second = if uptime > 0 {
        total_packets as f64 / uptime as f64
    } else {
        0.0
    };
    let bytes_per_second = if uptime > 0 {
        total_bytes as f64 / uptime as f64
    } else {
        0.0
    };

    Json(StatsResponse {
        uptime_seconds: uptime,
        counter_mode: state.counters.mode(),
        verdicts,
        total_packets,
        total_bytes,
        packets_per_second,
        bytes_per_second,
    })
}

async fn get_verdict_stats(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<VerdictStats>, ApiError> {
    let verdict: Verdict = name
        .parse()
        .map_err(|_| ApiError::NotFound(format!("unknown verdict '{name}'")))?;
    let totals = state
        .counters
        .snapshot(verdict.code())
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(Json(VerdictStats {
        verdict,
        packets: totals.packets,
        bytes: totals.bytes,
    }))
}

async fn get_blacklist(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.lists.sizes())
}

fn mutate(state: &AppState, op: Op, target: Target) -> Result<Json<ChangedResponse>, ApiError> {
    let changed = Mutation { op, target }.apply(&state.lists)?;
    Ok(Json(ChangedResponse { changed }))
}

fn mac_target(body: Result<Json<MacBody>, JsonRejection>) -> Result<Target, ApiError> {
    let Json(body) = body?;
    Ok(Target::Mac(admin::parse_mac(&body.address)?))
}

fn v4_target(body: Result<Json<PrefixBody>, JsonRejection>) -> Result<Target, ApiError> {
    let Json(body) = body?;
    Ok(admin::parse_v4_prefix(&body.prefix)?)
}

fn v6_target(body: Result<Json<PrefixBody>, JsonRejection>) -> Result<Target, ApiError> {
    let Json(body) = body?;
    Ok(admin::parse_v6_prefix(&body.prefix)?)
}

fn port_target(body: Result<Json<PortBody>, JsonRejection>) -> Result<Target, ApiError> {
    let Json(body) = body?;
    let port = u16::try_from(body.port)
        .map_err(|_| AdminError::InvalidPort(body.port.to_string()))?;
    Ok(Target::Port {
        direction: admin::parse_direction(&body.direction)?,
        protocol: admin::parse_protocol(&body.protocol)?,
        port,
    })
}

async fn insert_mac(
    State(state): State<Arc<AppState>>,
    body: Result<Json<MacBody>, JsonRejection>,
) -> Result<Json<ChangedResponse>, ApiError> {
    mutate(&state, Op::Insert, mac_target(body)?)
}

async fn remove_mac(
    State(state): State<Arc<AppState>>,
    body: Result<Json<MacBody>, JsonRejection>,
) -> Result<Json<ChangedResponse>, ApiError> {
    mutate(&state, Op::Remove, mac_target(body)?)
}

async fn insert_v4(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PrefixBody>, JsonRejection>,
) -> Result<Json<ChangedResponse>, ApiError> {
    mutate(&state, Op::Insert, v4_target(body)?)
}

async fn remove_v4(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PrefixBody>, JsonRejection>,
) -> Result<Json<ChangedResponse>, ApiError> {
    mutate(&state, Op::Remove, v4_target(body)?)
}

async fn insert_v6(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PrefixBody>, JsonRejection>,
) -> Result<Json<ChangedResponse>, ApiError> {
    mutate(&state, Op::Insert, v6_target(body)?)
}

async fn remove_v6(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PrefixBody>, JsonRejection>,
) -> Result<Json<ChangedResponse>, ApiError> {
    mutate(&state, Op::Remove, v6_target(body)?)
}

async fn insert_port(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PortBody>, JsonRejection>,
) -> Result<Json<ChangedResponse>, ApiError> {
    mutate(&state, Op::Insert, port_target(body)?)
}

async fn remove_port(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PortBody>, JsonRejection>,
) -> Result<Json<ChangedResponse>, ApiError> {
    mutate(&state, Op::Remove, port_target(body)?)
}

async fn classify(
    State(state): State<Arc<AppState>>,
    frame: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let verdict = state
        .pool
        .submit(frame.to_vec())
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;
    Ok(Json(serde_json::json!({ "verdict": verdict })))
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = params.limit.unwrap_or(100).min(1000);
    let rows = state
        .storage
        .query_history(limit)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(serde_json::json!(rows)))
}

async fn get_metrics(state: Arc<AppState>, metrics: Arc<Metrics>) -> Response {
    metrics.sync(&state);

    let mut buf = String::new();
    if let Err(e) = encode(&mut buf, &metrics.registry) {
        return ApiError::Internal(e.to_string()).into_response();
    }
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        buf,
    )
        .into_response()
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(1));

    loop {
        interval.tick().await;

        let stats = serde_json::json!({
            "uptime_seconds": state.start_time.elapsed().as_secs(),
            "verdicts": verdict_stats(&state.counters),
        });

        if socket.send(Message::Text(stats.to_string())).await.is_err() {
            break;
        }
    }
}
