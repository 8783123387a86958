use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::db::Reading;

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub(crate) type SharedState = Arc<RwLock<SystemState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Ephemeral in-memory snapshot for the status API. The ingestion worker
/// writes it; the web server only reads. The authoritative record is the
/// database — losing this on restart is fine.
pub(crate) struct SystemState {
    pub(crate) started_at: Instant,
    pub(crate) mqtt_connected: bool,
    /// Mirror of the ingestion worker's activity gate, for the dashboard.
    pub(crate) combing: bool,
    pub(crate) roles: HashMap<String, RoleState>,
    pub(crate) events: VecDeque<SystemEvent>,
}

/// Last accepted reading per role.
#[derive(Clone, Serialize)]
pub(crate) struct RoleState {
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) last_seen: OffsetDateTime,
    pub(crate) user_id: String,
    pub(crate) temperature: f64,
    pub(crate) light: f64,
    pub(crate) moisture: f64,
    pub(crate) moisture_status: crate::calibrate::MoistureStatus,
}

#[derive(Clone, Serialize)]
pub(crate) struct SystemEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) ts: OffsetDateTime,
    pub(crate) kind: EventKind,
    pub(crate) detail: String,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum EventKind {
    Reading,
    Gate,
    Command,
    Error,
    System,
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub(crate) struct StatusResponse {
    pub(crate) uptime_secs: u64,
    pub(crate) mqtt_connected: bool,
    pub(crate) combing: bool,
    pub(crate) roles: HashMap<String, RoleState>,
    pub(crate) events: Vec<SystemEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl SystemState {
    pub(crate) fn new() -> Self {
        Self {
            started_at: Instant::now(),
            mqtt_connected: false,
            combing: false,
            roles: HashMap::new(),
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    /// Record an accepted (persisted) reading.
    pub(crate) fn record_reading(&mut self, reading: &Reading) {
        self.roles.insert(
            reading.role.clone(),
            RoleState {
                last_seen: OffsetDateTime::now_utc(),
                user_id: reading.user_id.clone(),
                temperature: reading.temperature,
                light: reading.light,
                moisture: reading.moisture,
                moisture_status: reading.moisture_status,
            },
        );

        self.push_event(
            EventKind::Reading,
            format!(
                "{} ({}): temp={}°C light={:.1}% moisture={:.1}% ({})",
                reading.user_id,
                reading.role,
                reading.temperature,
                reading.light,
                reading.moisture,
                reading.moisture_status
            ),
        );
    }

    /// Record an activity-gate transition.
    pub(crate) fn record_gate(&mut self, combing: bool) {
        self.combing = combing;
        let detail = if combing { "combing started" } else { "combing stopped" };
        self.push_event(EventKind::Gate, detail.to_string());
    }

    /// Record an outbound command publish.
    pub(crate) fn record_command(&mut self, detail: String) {
        self.push_event(EventKind::Command, detail);
    }

    /// Record an error event.
    pub(crate) fn record_error(&mut self, detail: String) {
        self.push_event(EventKind::Error, detail);
    }

    /// Record a generic system event.
    pub(crate) fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    /// Build the JSON-serialisable status snapshot, newest events first.
    pub(crate) fn to_status(&self) -> StatusResponse {
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            mqtt_connected: self.mqtt_connected,
            combing: self.combing,
            roles: self.roles.clone(),
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}

// ===========================================================================
// Tests
// ===========================================================================
