//! Outbound control commands to the comb: role selection and vibration
//! motor toggling.
//!
//! Each publish uses its own short-lived broker connection, independent of
//! the ingestion worker's, and reports transport failures to the caller —
//! command endpoints are synchronous requests, so "log and continue" is not
//! good enough here. Delivery beyond the broker ack is fire-and-forget.

use anyhow::{anyhow, Context, Result};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

use crate::config::MqttSettings;
use crate::mqtt::{ROLE_SUFFIX, VIBRATION_SUFFIX};

/// How long to wait for the broker to ack a command publish.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Distinguishes concurrent publisher connections on the broker; two
/// clients with the same id would kick each other off.
static PUBLISHER_SEQ: AtomicU64 = AtomicU64::new(0);

// ---------------------------------------------------------------------------
// Command values
// ---------------------------------------------------------------------------

/// A selectable household role. Only these three are ever sent to the
/// device; the ingest path's `"user"` default is not a valid selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Mother,
    Father,
    Child,
}

impl Role {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Role::Mother => "mother",
            Role::Father => "father",
            Role::Child => "child",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mother" => Ok(Role::Mother),
            "father" => Ok(Role::Father),
            "child" => Ok(Role::Child),
            _ => Err("Invalid role. Must be mother, father, or child".to_string()),
        }
    }
}

/// A validated vibration command. Validation is case-insensitive but the
/// caller's original spelling is what goes on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VibrationCommand(String);

impl VibrationCommand {
    const ALLOWED: [&'static str; 6] = ["on", "off", "1", "0", "true", "false"];

    pub(crate) fn parse(s: &str) -> Result<Self, String> {
        if Self::ALLOWED.contains(&s.to_ascii_lowercase().as_str()) {
            Ok(Self(s.to_string()))
        } else {
            Err("Invalid command. Must be on, off, 1, 0, true, or false".to_string())
        }
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

/// Publish a role selection to `<base>/role`. Returns the topic used.
pub(crate) async fn publish_role(mqtt: &MqttSettings, role: Role) -> Result<String> {
    let topic = format!("{}{}", mqtt.base_topic, ROLE_SUFFIX);
    publish_single(mqtt, &topic, role.as_str()).await?;
    info!(role = %role, topic = %topic, "role published");
    Ok(topic)
}

/// Publish a vibration motor command to `<base>/vibration`. Returns the
/// topic used.
pub(crate) async fn publish_vibration(
    mqtt: &MqttSettings,
    command: &VibrationCommand,
) -> Result<String> {
    let topic = format!("{}{}", mqtt.base_topic, VIBRATION_SUFFIX);
    publish_single(mqtt, &topic, command.as_str()).await?;
    info!(command = command.as_str(), topic = %topic, "vibration command published");
    Ok(topic)
}

/// One-shot publish over a dedicated connection: connect, publish at QoS 1,
/// wait for the ack, disconnect.
async fn publish_single(mqtt: &MqttSettings, topic: &str, payload: &str) -> Result<()> {
    let seq = PUBLISHER_SEQ.fetch_add(1, Ordering::Relaxed);
    let client_id = format!("smartcomb-pub-{}-{seq}", std::process::id());

    let mut options = MqttOptions::new(client_id, &mqtt.host, mqtt.port);
    options.set_keep_alive(Duration::from_secs(5));

    let (client, mut eventloop) = AsyncClient::new(options, 4);
    client
        .publish(topic, QoS::AtLeastOnce, false, payload)
        .await
        .with_context(|| format!("failed to queue publish on '{topic}'"))?;

    let wait_for_ack = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::PubAck(_))) => return Ok(()),
                Ok(_) => {}
                Err(e) => {
                    return Err(anyhow::Error::new(e))
                        .with_context(|| format!("broker connection failed for '{topic}'"));
                }
            }
        }
    };

    tokio::time::timeout(PUBLISH_TIMEOUT, wait_for_ack)
        .await
        .map_err(|_| anyhow!("timed out waiting for broker ack on '{topic}'"))??;

    let _ = client.disconnect().await;
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -- Role ---------------------------------------------------------------

    #[test]
    fn role_parses_valid_values() {
        assert_eq!("mother".parse::<Role>(), Ok(Role::Mother));
        assert_eq!("father".parse::<Role>(), Ok(Role::Father));
        assert_eq!("child".parse::<Role>(), Ok(Role::Child));
    }

    #[test]
    fn role_rejects_unknown() {
        assert!("grandparent".parse::<Role>().is_err());
        assert!("user".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
    }

    #[test]
    fn role_is_case_sensitive() {
        // The device firmware matches exact lowercase strings.
        assert!("Mother".parse::<Role>().is_err());
        assert!("CHILD".parse::<Role>().is_err());
    }

    #[test]
    fn role_round_trips_as_str() {
        for role in [Role::Mother, Role::Father, Role::Child] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
    }

    // -- VibrationCommand ---------------------------------------------------

    #[test]
    fn vibration_accepts_all_forms() {
        for cmd in ["on", "off", "1", "0", "true", "false"] {
            assert!(VibrationCommand::parse(cmd).is_ok(), "rejected '{cmd}'");
        }
    }

    #[test]
    fn vibration_validates_case_insensitively_but_preserves_case() {
        let cmd = VibrationCommand::parse("ON").unwrap();
        assert_eq!(cmd.as_str(), "ON");
        let cmd = VibrationCommand::parse("tRuE").unwrap();
        assert_eq!(cmd.as_str(), "tRuE");
    }

    #[test]
    fn vibration_rejects_unknown() {
        assert!(VibrationCommand::parse("maybe").is_err());
        assert!(VibrationCommand::parse("2").is_err());
        assert!(VibrationCommand::parse("").is_err());
        assert!(VibrationCommand::parse(" on ").is_err());
    }
}
