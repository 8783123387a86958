//! Rule-based hair-care advice derived from a persisted reading, the
//! selected role, and an optional configured age.
//!
//! The hosted language-model service is an external collaborator; this
//! module is the deterministic stand-in the system runs on when that
//! service is not configured, and it defines the function shape the
//! collaborator must satisfy: reading + role + age → advice, and
//! message + optional reading → reply.

use serde::Serialize;

use crate::calibrate::MoistureStatus;
use crate::db::Reading;

/// Scalp temperature above this reads as heat/irritation.
const HOT_SCALP_C: f64 = 33.0;

/// Light percentage above this reads as dense hair.
const DENSE_HAIR_PCT: f64 = 60.0;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Advice {
    pub(crate) recommendations: Vec<String>,
    pub(crate) reasoning: String,
}

fn age_note(role: &str, age: i64) -> Option<&'static str> {
    match role {
        "child" => Some(if age < 3 {
            "Toddler: stick to gentle, tear-free formulas only"
        } else if age < 12 {
            "Child: use mild, safe products"
        } else {
            "Teenager: specialized products for changing scalp chemistry are fine"
        }),
        "mother" | "father" => Some(if age < 30 {
            "Young adult: lightweight daily-use products work well"
        } else if age < 50 {
            "Adult: standard strength products are appropriate"
        } else {
            "Mature: prefer age-appropriate, moisture-supporting products"
        }),
        _ => None,
    }
}

/// Build product recommendations from the latest reading.
pub(crate) fn recommend(reading: &Reading, role: &str, age: Option<i64>) -> Advice {
    let mut recommendations = Vec::new();

    match reading.moisture_status {
        MoistureStatus::Dry => {
            recommendations.push("Use a moisturizing shampoo".to_string());
            recommendations.push("Apply a leave-in conditioner after washing".to_string());
            recommendations.push("Treat the scalp with a nourishing oil once a week".to_string());
        }
        MoistureStatus::Oily => {
            recommendations.push("Use a clarifying shampoo".to_string());
            recommendations.push("Apply conditioner to the ends only".to_string());
            recommendations.push("Avoid heavy serums and styling oils".to_string());
        }
        MoistureStatus::Normal => {
            recommendations.push("Use a gentle daily shampoo".to_string());
            recommendations.push("Condition regularly to maintain balance".to_string());
        }
    }

    if reading.temperature > HOT_SCALP_C {
        recommendations.push("Scalp is running warm: try a cooling, soothing tonic".to_string());
    }
    if reading.light > DENSE_HAIR_PCT {
        recommendations.push("For dense hair: use volumizing products".to_string());
    }
    if let Some(age) = age {
        if let Some(note) = age_note(role, age) {
            recommendations.push(note.to_string());
        }
    }

    let age_part = match age {
        Some(age) => format!(", age {age}"),
        None => String::new(),
    };
    let reasoning = format!(
        "Based on {} scalp ({:.1}% moisture), {:.1}% hair density and {:.1}°C scalp temperature for role '{role}'{age_part}.",
        reading.moisture_status, reading.moisture, reading.light, reading.temperature
    );

    Advice {
        recommendations,
        reasoning,
    }
}

/// Answer a free-form question using the latest reading as context.
pub(crate) fn reply(message: &str, latest: Option<&Reading>) -> String {
    let Some(reading) = latest else {
        return "No sensor data has been recorded yet. Comb for a few seconds and ask again."
            .to_string();
    };

    let m = message.to_lowercase();
    if m.contains("moisture") || m.contains("oily") || m.contains("dry") {
        format!(
            "Your latest reading shows {:.1}% moisture, which classifies as {}.",
            reading.moisture, reading.moisture_status
        )
    } else if m.contains("temperature") || m.contains("hot") || m.contains("warm") {
        format!(
            "Your scalp temperature was {:.1}°C on the last reading{}.",
            reading.temperature,
            if reading.temperature > HOT_SCALP_C {
                ", which is on the warm side"
            } else {
                ", which is in the normal range"
            }
        )
    } else if m.contains("light") || m.contains("density") || m.contains("dense") {
        format!(
            "The light sensor read {:.1}%, which tracks hair density.",
            reading.light
        )
    } else {
        format!(
            "Latest reading for {}: {:.1}°C, {:.1}% light, {:.1}% moisture ({}).",
            reading.user_id,
            reading.temperature,
            reading.light,
            reading.moisture,
            reading.moisture_status
        )
    }
}

// ===========================================================================
// Tests
// ===========================================================================
