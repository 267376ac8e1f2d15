// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared test helpers: an in-process walks backend and Firestore gating.
//!
//! The mock backend serves the REST surface on 127.0.0.1 with an
//! in-memory walk table. Transitions are compare-and-swap on `status`
//! under one lock, and writes are authorized against the actor behind the
//! bearer token, like the real backend.

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use walk_tracker::config::Config;
use walk_tracker::db::FirestoreDb;
use walk_tracker::models::{LatLng, RouteCandidate, Walk, WalkStatus, WalkType};
use walk_tracker::services::{
    LocationPermission, LocationSample, LocationSource, WalksApi, WalksApiClient,
};

pub const CLIENT_TOKEN: &str = "client-token";
pub const WALKER_TOKEN: &str = "walker-token";
pub const OTHER_WALKER_TOKEN: &str = "other-walker-token";

pub const CLIENT_ID: &str = "client-1";
pub const WALKER_ID: &str = "walker-1";
pub const OTHER_WALKER_ID: &str = "walker-2";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a mock database connection (offline).
#[allow(dead_code)]
pub fn test_db_offline() -> FirestoreDb {
    FirestoreDb::new_mock()
}

/// Unique id for test isolation.
#[allow(dead_code)]
pub fn unique_walk_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("walk-test-{}", nanos)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Actor {
    Client,
    Walker(&'static str),
}

fn actor(headers: &HeaderMap) -> Option<Actor> {
    let value = headers.get("authorization")?.to_str().ok()?;
    match value.strip_prefix("Bearer ")? {
        CLIENT_TOKEN => Some(Actor::Client),
        WALKER_TOKEN => Some(Actor::Walker(WALKER_ID)),
        OTHER_WALKER_TOKEN => Some(Actor::Walker(OTHER_WALKER_ID)),
        _ => None,
    }
}

#[derive(Default)]
pub struct BackendState {
    walks: Mutex<HashMap<String, Walk>>,
    routes: Mutex<Vec<RouteCandidate>>,
    next_id: AtomicU64,
    route_calls: AtomicUsize,
    /// Applied after a transition is stored, before answering.
    response_delay: Mutex<Option<Duration>>,
    /// Answer the next request with this status and no side effect.
    fail_next: Mutex<Option<StatusCode>>,
}

/// Handle to a running mock backend.
#[derive(Clone)]
pub struct MockBackend {
    pub base_url: String,
    state: Arc<BackendState>,
}

#[allow(dead_code)]
impl MockBackend {
    pub async fn spawn() -> Self {
        let state = Arc::new(BackendState::default());
        *state.routes.lock().unwrap() = vec![scenario_candidate()];

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}/api/v1", addr),
            state,
        }
    }

    pub fn config(&self, token: &str) -> Config {
        Config {
            api_base_url: self.base_url.clone(),
            api_token: Some(token.to_string()),
            request_timeout: Duration::from_secs(5),
            ..Config::test_default()
        }
    }

    pub fn api(&self, token: &str) -> Arc<dyn WalksApi> {
        Arc::new(WalksApiClient::from_config(&self.config(token)).unwrap())
    }

    pub fn set_routes(&self, routes: Vec<RouteCandidate>) {
        *self.state.routes.lock().unwrap() = routes;
    }

    pub fn route_calls(&self) -> usize {
        self.state.route_calls.load(Ordering::SeqCst)
    }

    pub fn set_response_delay(&self, delay: Option<Duration>) {
        *self.state.response_delay.lock().unwrap() = delay;
    }

    pub fn fail_next(&self, status: StatusCode) {
        *self.state.fail_next.lock().unwrap() = Some(status);
    }

    /// Server-side record, bypassing authorization.
    pub fn walk(&self, walk_id: &str) -> Option<Walk> {
        self.state.walks.lock().unwrap().get(walk_id).cloned()
    }

    /// Insert a record directly.
    pub fn seed(&self, walk: Walk) {
        self.state
            .walks
            .lock()
            .unwrap()
            .insert(walk.id.clone(), walk);
    }
}

/// The route candidate from the reference scenario: 2.1 km, 8 min, 35.00.
#[allow(dead_code)]
pub fn scenario_candidate() -> RouteCandidate {
    RouteCandidate {
        polyline_encoded: "wlruBn}`|QgToqA_X_|B".to_string(),
        distance_km: 2.1,
        duration_min: 8,
        price: 35.0,
        price_currency: Some("MXN".to_string()),
    }
}

#[allow(dead_code)]
pub fn scenario_origin() -> LatLng {
    LatLng::new(19.4326, -99.1332)
}

#[allow(dead_code)]
pub fn scenario_destination() -> LatLng {
    LatLng::new(19.4400, -99.1000)
}

/// A consistent record in `status`, owned by the test client.
#[allow(dead_code)]
pub fn walk_in(id: &str, status: WalkStatus) -> Walk {
    let assigned = status != WalkStatus::Pending && status != WalkStatus::Cancelled;
    let started = matches!(status, WalkStatus::Started | WalkStatus::Completed);
    Walk {
        id: id.to_string(),
        client_id: CLIENT_ID.to_string(),
        walker_id: assigned.then(|| WALKER_ID.to_string()),
        walk_type: WalkType::AToB,
        status,
        origin: scenario_origin(),
        destination: Some(scenario_destination()),
        estimated_distance_meters: 2100,
        estimated_duration_seconds: 480,
        selected_route_polyline_encoded: Some(scenario_candidate().polyline_encoded),
        price_amount: 35.0,
        price_currency: "MXN".to_string(),
        payment_method_ids: vec!["cash".to_string(), "card-1".to_string()],
        agreed_payment_method_id: assigned.then(|| "cash".to_string()),
        requested_start_time: "2026-03-01T10:00:00Z".to_string(),
        actual_start_time: started.then(|| "2026-03-01T10:02:00Z".to_string()),
        actual_end_time: (status == WalkStatus::Completed)
            .then(|| "2026-03-01T10:10:00Z".to_string()),
        pet_ids: vec!["pet-1".to_string()],
    }
}

fn router(state: Arc<BackendState>) -> Router {
    Router::new()
        .route("/api/v1/walks/calculate-route", post(calculate_route))
        .route("/api/v1/walks", post(create_walk))
        .route("/api/v1/walks/pending", get(list_pending))
        .route("/api/v1/walks/active", get(list_client_active))
        .route("/api/v1/walker/walks/active", get(list_walker_active))
        .route("/api/v1/walks/available", get(list_available))
        .route("/api/v1/walks/available/{id}", get(get_available_walk))
        .route("/api/v1/walks/{id}", get(get_walk).delete(cancel_walk))
        .route("/api/v1/walks/{id}/accept", post(accept_walk))
        .route("/api/v1/walks/{id}/start", post(start_walk))
        .route("/api/v1/walks/{id}/end", post(end_walk))
        .with_state(state)
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "message": message }))).into_response()
}

fn walk_response(walk: &Walk, message: &str) -> Response {
    Json(json!({ "success": true, "message": message, "walk": walk })).into_response()
}

fn summaries<'a>(walks: impl Iterator<Item = &'a Walk>) -> Response {
    let rows: Vec<Value> = walks
        .map(|w| {
            json!({
                "id": w.id,
                "type": w.walk_type,
                "status": w.status,
                "requestedStartTime": w.requested_start_time,
                "estimatedDistanceMeters": w.estimated_distance_meters,
                "estimatedDurationSeconds": w.estimated_duration_seconds,
                "priceAmount": w.price_amount,
                "priceCurrency": w.price_currency,
            })
        })
        .collect();
    Json(json!({ "success": true, "walks": rows })).into_response()
}

/// Shared prelude: authenticate and apply any injected failure.
fn gate(state: &BackendState, headers: &HeaderMap) -> Result<Actor, Response> {
    if let Some(status) = state.fail_next.lock().unwrap().take() {
        return Err(error(status, "injected failure"));
    }
    actor(headers).ok_or_else(|| error(StatusCode::UNAUTHORIZED, "missing or invalid token"))
}

async fn delayed(state: &BackendState, response: Response) -> Response {
    let delay = *state.response_delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    response
}

async fn calculate_route(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(r) = gate(&state, &headers) {
        return r;
    }
    state.route_calls.fetch_add(1, Ordering::SeqCst);
    if body.get("type").and_then(Value::as_str).is_none() {
        return error(StatusCode::BAD_REQUEST, "type is required");
    }
    let routes = state.routes.lock().unwrap().clone();
    Json(json!({ "success": true, "routes": routes })).into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody {
    #[serde(rename = "type")]
    walk_type: WalkType,
    origin: LatLng,
    destination: Option<LatLng>,
    pickup: LatLng,
    dropoff: LatLng,
    estimated_distance_meters: u32,
    estimated_duration_seconds: u32,
    selected_route_polyline_encoded: String,
    requested_start_time: String,
    price_amount: f64,
    price_currency: Option<String>,
    pet_ids: Vec<String>,
    payment_method_ids: Vec<String>,
}

async fn create_walk(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBody>,
) -> Response {
    match gate(&state, &headers) {
        Ok(Actor::Client) => {}
        Ok(_) => return error(StatusCode::FORBIDDEN, "only clients create walks"),
        Err(r) => return r,
    }
    if body.pet_ids.is_empty() || body.payment_method_ids.is_empty() {
        return error(StatusCode::BAD_REQUEST, "pets and payment methods are required");
    }
    if body.pickup != body.origin || body.dropoff != body.destination.unwrap_or(body.origin) {
        return error(StatusCode::BAD_REQUEST, "pickup/dropoff mismatch");
    }

    let id = format!("walk-{}", state.next_id.fetch_add(1, Ordering::SeqCst) + 1);
    let walk = Walk {
        id: id.clone(),
        client_id: CLIENT_ID.to_string(),
        walker_id: None,
        walk_type: body.walk_type,
        status: WalkStatus::Pending,
        origin: body.origin,
        destination: body.destination,
        estimated_distance_meters: body.estimated_distance_meters,
        estimated_duration_seconds: body.estimated_duration_seconds,
        selected_route_polyline_encoded: Some(body.selected_route_polyline_encoded),
        price_amount: body.price_amount,
        price_currency: body.price_currency.unwrap_or_else(|| "MXN".to_string()),
        payment_method_ids: body.payment_method_ids,
        agreed_payment_method_id: None,
        requested_start_time: body.requested_start_time,
        actual_start_time: None,
        actual_end_time: None,
        pet_ids: body.pet_ids,
    };
    state.walks.lock().unwrap().insert(id.clone(), walk);
    Json(json!({ "success": true, "message": "Walk created", "walk": { "id": id } }))
        .into_response()
}

fn list_where(
    state: &BackendState,
    headers: &HeaderMap,
    keep: impl Fn(Actor, &Walk) -> bool,
) -> Response {
    let actor = match gate(state, headers) {
        Ok(a) => a,
        Err(r) => return r,
    };
    let walks = state.walks.lock().unwrap();
    let mut rows: Vec<&Walk> = walks.values().filter(|w| keep(actor, w)).collect();
    rows.sort_by(|a, b| a.id.cmp(&b.id));
    summaries(rows.into_iter())
}

async fn list_pending(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    list_where(&state, &headers, |actor, w| {
        actor == Actor::Client && w.status == WalkStatus::Pending
    })
}

async fn list_client_active(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
) -> Response {
    list_where(&state, &headers, |actor, w| {
        actor == Actor::Client && matches!(w.status, WalkStatus::Accepted | WalkStatus::Started)
    })
}

async fn list_walker_active(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
) -> Response {
    list_where(&state, &headers, |actor, w| match actor {
        Actor::Walker(id) => {
            w.walker_id.as_deref() == Some(id)
                && matches!(w.status, WalkStatus::Accepted | WalkStatus::Started)
        }
        Actor::Client => false,
    })
}

async fn list_available(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    list_where(&state, &headers, |actor, w| {
        matches!(actor, Actor::Walker(_)) && w.status == WalkStatus::Pending
    })
}

fn can_read(actor: Actor, walk: &Walk) -> bool {
    match actor {
        Actor::Client => walk.client_id == CLIENT_ID,
        Actor::Walker(id) => walk.walker_id.as_deref() == Some(id),
    }
}

async fn get_walk(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let actor = match gate(&state, &headers) {
        Ok(a) => a,
        Err(r) => return r,
    };
    let walk = state.walks.lock().unwrap().get(&id).cloned();
    match walk {
        Some(w) if can_read(actor, &w) => walk_response(&w, "ok"),
        Some(_) => error(StatusCode::FORBIDDEN, "not a party to this walk"),
        None => error(StatusCode::NOT_FOUND, "walk not found"),
    }
}

async fn get_available_walk(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    match gate(&state, &headers) {
        Ok(Actor::Walker(_)) => {}
        Ok(Actor::Client) => return error(StatusCode::FORBIDDEN, "walkers only"),
        Err(r) => return r,
    }
    let walk = state.walks.lock().unwrap().get(&id).cloned();
    match walk {
        Some(w) if w.status == WalkStatus::Pending => walk_response(&w, "ok"),
        _ => error(StatusCode::NOT_FOUND, "walk not available"),
    }
}

/// Compare-and-swap one walk from `from`, applying `update` under the lock.
fn transition(
    state: &BackendState,
    id: &str,
    from: WalkStatus,
    authorize: impl FnOnce(&Walk) -> Result<(), Response>,
    update: impl FnOnce(&mut Walk),
) -> Result<Walk, Response> {
    let mut walks = state.walks.lock().unwrap();
    let walk = walks
        .get_mut(id)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "walk not found"))?;
    authorize(walk)?;
    if walk.status != from {
        return Err(error(
            StatusCode::CONFLICT,
            &format!("walk is {}, expected {}", walk.status, from),
        ));
    }
    update(walk);
    Ok(walk.clone())
}

async fn cancel_walk(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let actor = match gate(&state, &headers) {
        Ok(a) => a,
        Err(r) => return r,
    };
    let result = transition(
        &state,
        &id,
        WalkStatus::Pending,
        |w| {
            if actor == Actor::Client && w.client_id == CLIENT_ID {
                Ok(())
            } else {
                Err(error(StatusCode::FORBIDDEN, "only the client may cancel"))
            }
        },
        |w| w.status = WalkStatus::Cancelled,
    );
    let response = match result {
        Ok(w) => Json(json!({
            "success": true,
            "message": "Walk cancelled",
            "walk": {
                "id": w.id,
                "status": w.status,
                "type": w.walk_type,
                "priceAmount": w.price_amount,
                "priceCurrency": w.price_currency,
                "requestedStartTime": w.requested_start_time,
                "petIds": w.pet_ids,
                "paymentMethodIds": w.payment_method_ids,
            }
        }))
        .into_response(),
        Err(r) => r,
    };
    delayed(&state, response).await
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcceptBody {
    agreed_payment_method_id: String,
}

async fn accept_walk(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AcceptBody>,
) -> Response {
    let walker = match gate(&state, &headers) {
        Ok(Actor::Walker(walker_id)) => walker_id,
        Ok(Actor::Client) => return error(StatusCode::FORBIDDEN, "walkers only"),
        Err(r) => return r,
    };
    let method = body.agreed_payment_method_id;
    let result = transition(
        &state,
        &id,
        WalkStatus::Pending,
        |w| {
            if w.status == WalkStatus::Pending && !w.payment_method_ids.contains(&method) {
                Err(error(StatusCode::BAD_REQUEST, "payment method not proposed"))
            } else {
                Ok(())
            }
        },
        |w| {
            w.status = WalkStatus::Accepted;
            w.walker_id = Some(walker.to_string());
            w.agreed_payment_method_id = Some(method.clone());
        },
    );
    let response = match result {
        Ok(w) => walk_response(&w, "Walk accepted"),
        Err(r) => r,
    };
    delayed(&state, response).await
}

#[derive(Deserialize)]
struct PositionBody {
    lat: f64,
    lng: f64,
}

fn assigned_walker(actor: Actor) -> impl FnOnce(&Walk) -> Result<(), Response> {
    move |w| match actor {
        Actor::Walker(id) if w.walker_id.as_deref() == Some(id) => Ok(()),
        _ => Err(error(StatusCode::FORBIDDEN, "not the assigned walker")),
    }
}

async fn start_walk(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<PositionBody>,
) -> Response {
    let actor = match gate(&state, &headers) {
        Ok(a) => a,
        Err(r) => return r,
    };
    let _ = (body.lat, body.lng);
    let result = transition(
        &state,
        &id,
        WalkStatus::Accepted,
        assigned_walker(actor),
        |w| {
            w.status = WalkStatus::Started;
            w.actual_start_time = Some(chrono::Utc::now().to_rfc3339());
        },
    );
    let response = match result {
        Ok(w) => walk_response(&w, "Walk started"),
        Err(r) => r,
    };
    delayed(&state, response).await
}

async fn end_walk(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<PositionBody>,
) -> Response {
    let actor = match gate(&state, &headers) {
        Ok(a) => a,
        Err(r) => return r,
    };
    let _ = (body.lat, body.lng);
    let result = transition(
        &state,
        &id,
        WalkStatus::Started,
        assigned_walker(actor),
        |w| {
            w.status = WalkStatus::Completed;
            w.actual_end_time = Some(chrono::Utc::now().to_rfc3339());
        },
    );
    let response = match result {
        Ok(w) => walk_response(&w, "Walk completed"),
        Err(r) => r,
    };
    delayed(&state, response).await
}

/// Location source that plays back a fixed list of samples, then keeps
/// reporting the last one.
pub struct ScriptedSource {
    permission: LocationPermission,
    samples: Mutex<VecDeque<LocationSample>>,
    last: Mutex<Option<LocationSample>>,
    reads: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedSource {
    pub fn new(samples: Vec<LocationSample>) -> Self {
        Self {
            permission: LocationPermission::Granted,
            samples: Mutex::new(samples.into()),
            last: Mutex::new(None),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn denied() -> Self {
        Self {
            permission: LocationPermission::Denied,
            ..Self::new(Vec::new())
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationSource for ScriptedSource {
    fn permission(&self) -> LocationPermission {
        self.permission
    }

    async fn current_position(&self) -> walk_tracker::error::Result<Option<LocationSample>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let next = self.samples.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if next.is_some() {
            *last = next;
        }
        Ok(*last)
    }
}

#[allow(dead_code)]
pub fn sample(lat: f64, lng: f64, timestamp_millis: i64) -> LocationSample {
    LocationSample {
        point: LatLng::new(lat, lng),
        timestamp_millis,
    }
}

/// Three samples about 110 m apart, at t = 0 s, 10 s and 20 s.
#[allow(dead_code)]
pub fn three_samples() -> Vec<LocationSample> {
    vec![
        sample(19.4326, -99.1332, 0),
        sample(19.4336, -99.1332, 10_000),
        sample(19.4346, -99.1332, 20_000),
    ]
}
