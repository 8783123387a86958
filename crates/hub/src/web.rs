//! JSON web API: status snapshot, reading queries, device commands, age
//! configuration, and advice endpoints.
//!
//! Authentication and page rendering live in front of this service;
//! handlers take `user_id` explicitly. Errors use the `{"error": ...}`
//! envelope throughout.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use crate::advisor;
use crate::command::{self, Role, VibrationCommand};
use crate::config::MqttSettings;
use crate::db::{AgeConfig, Db, Reading};
use crate::state::SharedState;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) db: Db,
    pub(crate) shared: SharedState,
    pub(crate) mqtt: MqttSettings,
}

// ---------------------------------------------------------------------------
// Error envelope
// ---------------------------------------------------------------------------

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": msg.into() })))
}

fn internal(e: anyhow::Error) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(api_status))
        .route("/api/sensor-data", get(api_sensor_data))
        .route("/api/set-role", post(api_set_role))
        .route("/api/vibration", post(api_vibration))
        .route("/api/age-config", get(api_get_age_config).post(api_set_age_config))
        .route("/api/recommendations", post(api_recommendations))
        .route("/api/chat", post(api_chat))
        .with_state(state)
}

async fn api_status(State(state): State<AppState>) -> impl IntoResponse {
    let st = state.shared.read().await;
    Json(st.to_status())
}

// -- readings ---------------------------------------------------------------

#[derive(Deserialize)]
struct SensorDataParams {
    user_id: String,
    role: Option<String>,
    limit: Option<i64>,
}

async fn api_sensor_data(
    State(state): State<AppState>,
    Query(params): Query<SensorDataParams>,
) -> Result<Json<Vec<Reading>>, ApiError> {
    let role = params.role.unwrap_or_else(|| "user".to_string());
    let limit = params.limit.unwrap_or(100).clamp(0, 1000);
    let role_filter = if role == "all" { None } else { Some(role.as_str()) };

    let readings = state
        .db
        .recent_readings(&params.user_id, role_filter, limit)
        .await
        .map_err(internal)?;
    Ok(Json(readings))
}

// -- device commands --------------------------------------------------------

#[derive(Deserialize)]
struct SetRoleBody {
    #[serde(default)]
    role: String,
}

async fn api_set_role(
    State(state): State<AppState>,
    Json(body): Json<SetRoleBody>,
) -> Result<Json<Value>, ApiError> {
    let role: Role = body
        .role
        .parse()
        .map_err(|e: String| api_error(StatusCode::BAD_REQUEST, e))?;

    let topic = command::publish_role(&state.mqtt, role).await.map_err(|e| {
        api_error(
            StatusCode::BAD_GATEWAY,
            format!("Failed to send role to device: {e:#}"),
        )
    })?;

    let mut st = state.shared.write().await;
    st.record_command(format!("role set to {role}"));

    Ok(Json(json!({
        "success": true,
        "message": format!("Role \"{role}\" sent to device"),
        "role": role.as_str(),
        "topic": topic,
    })))
}

#[derive(Deserialize)]
struct VibrationBody {
    #[serde(default)]
    command: String,
}

async fn api_vibration(
    State(state): State<AppState>,
    Json(body): Json<VibrationBody>,
) -> Result<Json<Value>, ApiError> {
    let cmd = VibrationCommand::parse(&body.command)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    command::publish_vibration(&state.mqtt, &cmd).await.map_err(|e| {
        api_error(
            StatusCode::BAD_GATEWAY,
            format!("Failed to send vibration command to device: {e:#}"),
        )
    })?;

    let mut st = state.shared.write().await;
    st.record_command(format!("vibration set to {}", cmd.as_str()));

    Ok(Json(json!({
        "success": true,
        "message": format!("Vibration motor command \"{}\" sent to device", cmd.as_str()),
        "command": cmd.as_str(),
    })))
}

// -- age configuration -------------------------------------------------------

#[derive(Deserialize)]
struct UserParams {
    user_id: String,
}

async fn api_get_age_config(
    State(state): State<AppState>,
    Query(params): Query<UserParams>,
) -> Result<Json<AgeConfig>, ApiError> {
    let ages = state.db.get_ages(&params.user_id).await.map_err(internal)?;
    Ok(Json(ages))
}

#[derive(Deserialize)]
struct AgeConfigBody {
    user_id: String,
    mother: Option<i64>,
    father: Option<i64>,
    child: Option<i64>,
}

async fn api_set_age_config(
    State(state): State<AppState>,
    Json(body): Json<AgeConfigBody>,
) -> Result<Json<Value>, ApiError> {
    let ages = AgeConfig {
        mother: body.mother,
        father: body.father,
        child: body.child,
    };

    for (role, age) in [
        ("mother", ages.mother),
        ("father", ages.father),
        ("child", ages.child),
    ] {
        if let Some(age) = age {
            if !(1..=120).contains(&age) {
                return Err(api_error(
                    StatusCode::BAD_REQUEST,
                    format!("Invalid age for {role}. Age must be between 1 and 120."),
                ));
            }
        }
    }

    state
        .db
        .set_ages(&body.user_id, &ages)
        .await
        .map_err(internal)?;

    Ok(Json(json!({ "success": true, "ages": ages })))
}

// -- advice -------------------------------------------------------------------

fn default_advice_role() -> String {
    "user".to_string()
}

#[derive(Deserialize)]
struct RecommendationBody {
    user_id: String,
    #[serde(default = "default_advice_role")]
    role: String,
}

async fn api_recommendations(
    State(state): State<AppState>,
    Json(body): Json<RecommendationBody>,
) -> Result<Json<Value>, ApiError> {
    let reading = state
        .db
        .latest_reading(&body.user_id, &body.role)
        .await
        .map_err(internal)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "No sensor data available"))?;

    let ages = state.db.get_ages(&body.user_id).await.map_err(internal)?;
    let age = match body.role.as_str() {
        "mother" => ages.mother,
        "father" => ages.father,
        "child" => ages.child,
        _ => None,
    };

    let advice = advisor::recommend(&reading, &body.role, age);
    let advice_json = serde_json::to_string(&advice)
        .map_err(|e| internal(anyhow::Error::new(e)))?;
    state
        .db
        .insert_recommendation(&body.user_id, &body.role, age, reading.id, &advice_json)
        .await
        .map_err(internal)?;

    Ok(Json(json!({
        "recommendations": advice.recommendations,
        "reasoning": advice.reasoning,
    })))
}

#[derive(Deserialize)]
struct ChatBody {
    user_id: String,
    #[serde(default)]
    message: String,
}

async fn api_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<Value>, ApiError> {
    if body.message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Message is required"));
    }

    // Any role: context is simply the newest reading for this user.
    let latest = state
        .db
        .recent_readings(&body.user_id, None, 1)
        .await
        .map_err(internal)?
        .into_iter()
        .next();

    let response = advisor::reply(&body.message, latest.as_ref());
    Ok(Json(json!({ "response": response })))
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub(crate) async fn serve(state: AppState, port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind web port");

    info!("web api listening on http://{addr}");

    axum::serve(listener, router(state))
        .await
        .expect("web server error");
}

// ===========================================================================
// Tests
// ===========================================================================
