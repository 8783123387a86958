//! MQTT ingestion worker: subscribes to the comb's sensor and contact
//! topics, owns the activity gate, and turns accepted sensor messages into
//! persisted readings.
//!
//! Message handling is a plain sequential function (`handle_publish`) so it
//! can be tested without a broker; `run` is the only place that touches the
//! transport. Messages are handled one at a time in delivery order — no
//! ordering is promised *between* the two inbound topics, so a sensor
//! message can race ahead of the contact message that would have opened the
//! gate. Those readings are dropped, not deferred.

use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::calibrate::{classify_moisture, normalize};
use crate::db::{Db, NewReading};
use crate::mqtt::{route, ContactMsg, Route, SensorMsg, IR_SUFFIX};
use crate::state::SharedState;

const BACKOFF_START: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(60);

pub(crate) struct Ingestor {
    base_topic: String,
    /// Activity gate: true while the contact sensor reports the comb in
    /// use. Owned exclusively by this worker; resets with the process.
    combing: bool,
    db: Db,
    shared: SharedState,
}

impl Ingestor {
    pub(crate) fn new(base_topic: String, db: Db, shared: SharedState) -> Self {
        Self {
            base_topic,
            combing: false,
            db,
            shared,
        }
    }

    /// Dispatch one inbound message. Parse failures are logged and dropped;
    /// nothing escapes this function, so one bad message never interrupts
    /// the next.
    pub(crate) async fn handle_publish(&mut self, topic: &str, payload: &[u8]) {
        match route(&self.base_topic, topic) {
            Some(Route::Contact) => self.handle_contact(payload).await,
            Some(Route::Sensor) => self.handle_sensor(payload).await,
            None => debug!(topic, "ignoring unhandled topic"),
        }
    }

    async fn handle_contact(&mut self, payload: &[u8]) {
        let msg: ContactMsg = match serde_json::from_slice(payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("bad contact payload: {e}");
                return;
            }
        };

        self.combing = msg.value == 1;
        debug!(combing = self.combing, "contact sensor update");

        let mut st = self.shared.write().await;
        st.record_gate(self.combing);
    }

    async fn handle_sensor(&mut self, payload: &[u8]) {
        let msg: SensorMsg = match serde_json::from_slice(payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("bad sensor payload: {e}");
                let mut st = self.shared.write().await;
                st.record_error(format!("bad sensor payload: {e}"));
                return;
            }
        };

        // Readings that arrive while the comb is not in use are discarded,
        // not buffered.
        if !self.combing {
            debug!("not combing, ignoring sensor data");
            return;
        }

        let new = NewReading {
            ts: OffsetDateTime::now_utc().unix_timestamp(),
            user_id: msg.user_id,
            role: msg.role,
            temperature: msg.temperature,
            light: normalize(msg.light),
            moisture: normalize(msg.moisture),
            moisture_status: classify_moisture(msg.moisture),
            ir_sensor: msg.ir,
        };

        match self.db.insert_reading(&new).await {
            Ok(id) => {
                info!(
                    user_id = %new.user_id,
                    role = %new.role,
                    temperature = new.temperature,
                    moisture_status = %new.moisture_status,
                    "saved sensor reading"
                );
                let reading = crate::db::Reading {
                    id,
                    ts: new.ts,
                    user_id: new.user_id,
                    role: new.role,
                    temperature: new.temperature,
                    light: new.light,
                    moisture: new.moisture,
                    moisture_status: new.moisture_status,
                    ir_sensor: new.ir_sensor,
                };
                let mut st = self.shared.write().await;
                st.record_reading(&reading);
            }
            Err(e) => {
                // Dropped message, not a dead worker.
                error!("insert_reading failed: {e:#}");
                let mut st = self.shared.write().await;
                st.record_error(format!("insert_reading failed: {e:#}"));
            }
        }
    }

    /// Connect-and-consume loop. Resubscribes on every ConnAck, retries
    /// transport errors with bounded exponential backoff, and exits when
    /// the shutdown channel fires.
    pub(crate) async fn run(
        mut self,
        client: AsyncClient,
        mut eventloop: EventLoop,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let ir_topic = format!("{}{}", self.base_topic, IR_SUFFIX);
        let mut backoff = BACKOFF_START;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("ingestion worker stopping");
                    let _ = client.disconnect().await;
                    return;
                }
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!(base_topic = %self.base_topic, "mqtt connected");
                        backoff = BACKOFF_START;

                        if let Err(e) = client.subscribe(&self.base_topic, QoS::AtLeastOnce).await {
                            error!("subscribe {} failed: {e}", self.base_topic);
                        }
                        if let Err(e) = client.subscribe(&ir_topic, QoS::AtLeastOnce).await {
                            error!("subscribe {ir_topic} failed: {e}");
                        }

                        let mut st = self.shared.write().await;
                        st.mqtt_connected = true;
                        st.record_system("mqtt connected".to_string());
                    }
                    Ok(Event::Incoming(Packet::Publish(p))) => {
                        self.handle_publish(&p.topic, &p.payload).await;
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        warn!("mqtt disconnected");
                        let mut st = self.shared.write().await;
                        st.mqtt_connected = false;
                        st.record_system("mqtt disconnected".to_string());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("mqtt error: {e}; reconnecting in {backoff:?}");
                        {
                            let mut st = self.shared.write().await;
                            st.mqtt_connected = false;
                            st.record_error(format!("mqtt error: {e}"));
                        }
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(BACKOFF_MAX);
                    }
                }
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
