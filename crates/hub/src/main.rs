mod advisor;
mod calibrate;
mod command;
mod config;
mod db;
mod ingest;
mod mqtt;
mod state;
mod web;

use anyhow::Result;
use rumqttc::{AsyncClient, MqttOptions};
use std::{env, sync::Arc, time::Duration};
use tokio::sync::{watch, RwLock};
use tracing::info;
use tracing_subscriber::EnvFilter;

use db::Db;
use ingest::Ingestor;
use state::SystemState;
use web::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let settings = config::load(&config_path)?;
    info!(
        broker = %settings.mqtt.host,
        port = settings.mqtt.port,
        base_topic = %settings.mqtt.base_topic,
        "starting smartcomb hub"
    );

    // ── Database ────────────────────────────────────────────────────
    let db = Db::connect(&settings.database.url).await?;
    db.migrate().await?;

    // ── Shared state (ephemeral, for the status API) ─────────────────
    let shared: state::SharedState = Arc::new(RwLock::new(SystemState::new()));
    {
        let mut st = shared.write().await;
        st.record_system("hub started".to_string());
    }

    // ── Web server ──────────────────────────────────────────────────
    let app_state = AppState {
        db: db.clone(),
        shared: Arc::clone(&shared),
        mqtt: settings.mqtt.clone(),
    };
    let web_port = settings.web.port;
    tokio::spawn(async move {
        web::serve(app_state, web_port).await;
    });

    // ── MQTT ingestion worker ───────────────────────────────────────
    let mut mqttoptions = MqttOptions::new("smartcomb-hub", &settings.mqtt.host, settings.mqtt.port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));
    let (client, eventloop) = AsyncClient::new(mqttoptions, 20);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ingestor = Ingestor::new(settings.mqtt.base_topic.clone(), db, Arc::clone(&shared));
    let worker = tokio::spawn(ingestor.run(client, eventloop, shutdown_rx));

    // ── Shutdown ────────────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = worker.await;

    Ok(())
}
