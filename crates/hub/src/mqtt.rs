use serde::Deserialize;

// ---------------------------------------------------------------------------
// Topic layout
// ---------------------------------------------------------------------------
//
// The comb publishes on `<base>` (sensor data) and `<base>/ir` (contact
// sensor); the hub publishes commands on `<base>/role` and
// `<base>/vibration`, which the comb subscribes to.

pub(crate) const IR_SUFFIX: &str = "/ir";
pub(crate) const ROLE_SUFFIX: &str = "/role";
pub(crate) const VIBRATION_SUFFIX: &str = "/vibration";

// ---------------------------------------------------------------------------
// MQTT message types
// ---------------------------------------------------------------------------

fn default_user_id() -> String {
    "anonymous".to_string()
}

fn default_role() -> String {
    "user".to_string()
}

/// Sensor-data payload on `<base>`. Every field is optional on the wire;
/// defaults are applied here, at the parse boundary, so downstream code
/// only ever sees fully-populated values.
#[derive(Debug, Deserialize)]
pub(crate) struct SensorMsg {
    #[serde(default = "default_user_id")]
    pub(crate) user_id: String,
    #[serde(default = "default_role")]
    pub(crate) role: String,
    #[serde(default)]
    pub(crate) temperature: f64,
    #[serde(default)]
    pub(crate) light: f64,
    #[serde(default)]
    pub(crate) moisture: f64,
    #[serde(default)]
    pub(crate) ir: i64,
}

/// Contact-sensor payload on `<base>/ir`. A missing `value` counts as 0
/// (not combing).
#[derive(Debug, Deserialize)]
pub(crate) struct ContactMsg {
    #[serde(default)]
    pub(crate) value: i64,
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    /// Contact-sensor update → activity gate transition.
    Contact,
    /// Sensor-data payload → calibrate and persist.
    Sensor,
}

/// Decide which handler a topic belongs to. `None` means the topic is not
/// ours (retained or foreign messages the broker may deliver) and must be
/// ignored without error.
pub(crate) fn route(base: &str, topic: &str) -> Option<Route> {
    if topic.ends_with(IR_SUFFIX) {
        Some(Route::Contact)
    } else if topic == base {
        Some(Route::Sensor)
    } else {
        None
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "smartcomb/sensors";

    // -- route --------------------------------------------------------------

    #[test]
    fn route_ir_topic_to_contact() {
        assert_eq!(route(BASE, "smartcomb/sensors/ir"), Some(Route::Contact));
    }

    #[test]
    fn route_base_topic_to_sensor() {
        assert_eq!(route(BASE, "smartcomb/sensors"), Some(Route::Sensor));
    }

    #[test]
    fn route_command_topics_ignored() {
        // The hub publishes these; if the broker replays them (retained
        // messages), they must not reach a handler.
        assert_eq!(route(BASE, "smartcomb/sensors/role"), None);
        assert_eq!(route(BASE, "smartcomb/sensors/vibration"), None);
    }

    #[test]
    fn route_foreign_topic_ignored() {
        assert_eq!(route(BASE, "some/other/topic"), None);
        assert_eq!(route(BASE, ""), None);
    }

    #[test]
    fn route_ir_suffix_matches_any_prefix() {
        // Mirrors the suffix-only contract: any topic ending in /ir is
        // treated as a contact-sensor channel.
        assert_eq!(route(BASE, "another/device/ir"), Some(Route::Contact));
    }

    // -- SensorMsg deserialization -------------------------------------------

    #[test]
    fn sensor_msg_full_payload() {
        let json = r#"{"user_id":"u1","role":"mother","temperature":25.5,"light":4095,"moisture":300,"ir":1}"#;
        let msg: SensorMsg = serde_json::from_str(json).unwrap();
        assert_eq!(msg.user_id, "u1");
        assert_eq!(msg.role, "mother");
        assert_eq!(msg.temperature, 25.5);
        assert_eq!(msg.light, 4095.0);
        assert_eq!(msg.moisture, 300.0);
        assert_eq!(msg.ir, 1);
    }

    #[test]
    fn sensor_msg_empty_object_gets_defaults() {
        let msg: SensorMsg = serde_json::from_str("{}").unwrap();
        assert_eq!(msg.user_id, "anonymous");
        assert_eq!(msg.role, "user");
        assert_eq!(msg.temperature, 0.0);
        assert_eq!(msg.light, 0.0);
        assert_eq!(msg.moisture, 0.0);
        assert_eq!(msg.ir, 0);
    }

    #[test]
    fn sensor_msg_partial_payload() {
        let msg: SensorMsg = serde_json::from_str(r#"{"light":512}"#).unwrap();
        assert_eq!(msg.light, 512.0);
        assert_eq!(msg.user_id, "anonymous");
    }

    #[test]
    fn sensor_msg_extra_fields_ignored() {
        let msg: SensorMsg = serde_json::from_str(r#"{"user_id":"u1","battery":87}"#).unwrap();
        assert_eq!(msg.user_id, "u1");
    }

    #[test]
    fn sensor_msg_non_object_fails() {
        assert!(serde_json::from_str::<SensorMsg>("[1,2,3]").is_err());
        assert!(serde_json::from_str::<SensorMsg>("not json").is_err());
    }

    // -- ContactMsg deserialization ------------------------------------------

    #[test]
    fn contact_msg_value_one() {
        let msg: ContactMsg = serde_json::from_str(r#"{"value":1}"#).unwrap();
        assert_eq!(msg.value, 1);
    }

    #[test]
    fn contact_msg_missing_value_defaults_to_zero() {
        let msg: ContactMsg = serde_json::from_str("{}").unwrap();
        assert_eq!(msg.value, 0);
    }

    #[test]
    fn contact_msg_garbage_fails() {
        assert!(serde_json::from_str::<ContactMsg>("combing!").is_err());
    }
}
