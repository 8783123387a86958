//! Simulated smart comb: publishes contact-sensor and sensor-data payloads
//! the way the firmware does, and applies role/vibration commands coming
//! back from the hub.

use anyhow::Result;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::{env, time::Duration};
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize)]
struct SensorPayload<'a> {
    user_id: &'a str,
    role: &'a str,
    temperature: f64,
    light: i64,
    moisture: i64,
    ir: i64,
}

#[derive(Debug, Serialize)]
struct ContactPayload {
    value: i64,
}

/// Device-side state the hub can change over MQTT.
struct CombState {
    role: String,
    vibration: bool,
}

/// Interpret a vibration command payload. The hub validates before
/// publishing, but the firmware still tolerates anything on the wire.
fn parse_vibration(payload: &str) -> Option<bool> {
    match payload.trim().to_ascii_lowercase().as_str() {
        "on" | "1" | "true" => Some(true),
        "off" | "0" | "false" => Some(false),
        _ => None,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Env config
    let broker = env::var("MQTT_HOST").unwrap_or_else(|_| "broker.hivemq.com".to_string());
    let port: u16 = env::var("MQTT_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1883);
    let base_topic = env::var("BASE_TOPIC").unwrap_or_else(|_| "smartcomb/sensors".to_string());
    let user_id = env::var("USER_ID").unwrap_or_else(|_| "anonymous".to_string());
    let sample_every_s: u64 = env::var("SAMPLE_EVERY_S")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5);
    // 1 simulates combing; 0 lets the hub's gate drop everything we send.
    let ir_value: i64 = env::var("IR_VALUE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);

    let ir_topic = format!("{base_topic}/ir");
    let role_topic = format!("{base_topic}/role");
    let vibration_topic = format!("{base_topic}/vibration");

    let mut mqttoptions = MqttOptions::new(format!("smartcomb-node-{user_id}"), broker, port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

    let state = Arc::new(Mutex::new(CombState {
        role: "user".to_string(),
        vibration: false,
    }));

    // Event-loop task: keeps the connection alive and applies commands.
    {
        let client = client.clone();
        let state = Arc::clone(&state);
        let role_topic = role_topic.clone();
        let vibration_topic = vibration_topic.clone();
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("node connected to mqtt");
                        if let Err(e) = client.subscribe(&role_topic, QoS::AtLeastOnce).await {
                            warn!("subscribe {role_topic} failed: {e}");
                        }
                        if let Err(e) = client.subscribe(&vibration_topic, QoS::AtLeastOnce).await {
                            warn!("subscribe {vibration_topic} failed: {e}");
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(p))) => {
                        let payload = String::from_utf8_lossy(&p.payload).to_string();
                        if p.topic.ends_with("/role") {
                            let role = payload.trim().to_string();
                            info!(role = %role, "role update from hub");
                            state.lock().unwrap().role = role;
                        } else if p.topic.ends_with("/vibration") {
                            match parse_vibration(&payload) {
                                Some(on) => {
                                    info!(on, "vibration motor command");
                                    state.lock().unwrap().vibration = on;
                                }
                                None => warn!("unknown vibration command '{payload}'"),
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("mqtt error: {e}. retrying...");
                        sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });
    }

    info!(ir_topic = %ir_topic, base_topic = %base_topic, "publishing simulated readings");

    loop {
        let contact = ContactPayload { value: ir_value };
        if let Err(e) = client
            .publish(&ir_topic, QoS::AtLeastOnce, false, serde_json::to_vec(&contact)?)
            .await
        {
            warn!("publish error: {e}");
        }

        if ir_value == 1 {
            let role = state.lock().unwrap().role.clone();
            // Fake sensor values in the firmware's usual ranges: DS18B20
            // temperature, raw analog light, moisture already in percent.
            let msg = SensorPayload {
                user_id: &user_id,
                role: &role,
                temperature: (200.0 + fastrand::f64() * 150.0).round() / 10.0,
                light: fastrand::i64(200..=800),
                moisture: fastrand::i64(20..=90),
                ir: ir_value,
            };

            match client
                .publish(&base_topic, QoS::AtLeastOnce, false, serde_json::to_vec(&msg)?)
                .await
            {
                Ok(()) => info!(role = %msg.role, temperature = msg.temperature, "published sensor data"),
                Err(e) => warn!("publish error: {e}"),
            }
        } else {
            info!("not combing, skipping sensor data");
        }

        sleep(Duration::from_secs(sample_every_s)).await;
    }
}

// ===========================================================================
// Tests
// ===========================================================================
