//! Conversion of recorded samples into the canonical [`Sample`].
//!
//! Recordings come in several shapes: bare numbers, objects holding raw
//! multi-channel `data`, and objects that already carry a `probability`.
//! Each raw value is classified once into a [`SampleShape`] and then turned
//! into a [`Sample`]. Normalization never fails; anything unrecognized becomes
//! a neutral record so a malformed file degrades instead of aborting replay.

use crate::types::{clamp_unit, Sample, CALM_LABEL};
use serde_json::{Map, Value};

/// Spacing used when a recording has no timestamps of its own
pub const SYNTHETIC_STEP_MS: i64 = 1000;

/// Probability used when a shape carries nothing usable
pub const NEUTRAL_PROBABILITY: f64 = 0.5;

/// Recognized recording shapes, resolved once at ingestion
#[derive(Debug, Clone, PartialEq)]
pub enum SampleShape {
    /// A bare number taken as the probability
    Bare(f64),
    /// Multi-channel raw data, optionally with an explicit probability
    Channels {
        data: Vec<f64>,
        probability: Option<f64>,
        timestamp: Option<i64>,
        label: Option<String>,
    },
    /// An object already shaped as a probability record
    Probability {
        probability: f64,
        raw_value: Option<f64>,
        timestamp: Option<i64>,
        label: Option<String>,
    },
    /// Anything else; fields are kept as-is
    Unrecognized {
        timestamp: Option<i64>,
        label: Option<String>,
        fields: Map<String, Value>,
    },
}

impl SampleShape {
    pub fn classify(raw: &Value) -> Self {
        match raw {
            Value::Number(n) => match n.as_f64() {
                Some(value) => Self::Bare(value),
                None => Self::unrecognized(Map::new()),
            },
            Value::Object(fields) => Self::classify_object(fields),
            _ => Self::unrecognized(Map::new()),
        }
    }

    fn classify_object(fields: &Map<String, Value>) -> Self {
        let timestamp = fields.get("timestamp").and_then(as_millis);
        let label = fields
            .get("label")
            .and_then(Value::as_str)
            .map(str::to_string);
        let probability = fields.get("probability").and_then(Value::as_f64);

        if let Some(Value::Array(channels)) = fields.get("data") {
            let data = channels.iter().filter_map(Value::as_f64).collect();
            return Self::Channels {
                data,
                probability,
                timestamp,
                label,
            };
        }

        if let Some(probability) = probability {
            return Self::Probability {
                probability,
                raw_value: fields.get("rawValue").and_then(Value::as_f64),
                timestamp,
                label,
            };
        }

        Self::Unrecognized {
            timestamp,
            label,
            fields: fields.clone(),
        }
    }

    fn unrecognized(fields: Map<String, Value>) -> Self {
        Self::Unrecognized {
            timestamp: None,
            label: None,
            fields,
        }
    }
}

/// Normalize one raw recorded value at position `index`
pub fn normalize(raw: &Value, index: usize, dataset_start_ms: i64) -> Sample {
    let offset = i64::try_from(index)
        .unwrap_or(i64::MAX)
        .saturating_mul(SYNTHETIC_STEP_MS);
    let synthetic = dataset_start_ms.saturating_add(offset);

    match SampleShape::classify(raw) {
        SampleShape::Bare(value) => Sample {
            probability: clamp_unit(value),
            timestamp: synthetic,
            label: CALM_LABEL.to_string(),
            raw_value: Some(value),
            extra: Map::new(),
        },
        SampleShape::Channels {
            data,
            probability,
            timestamp,
            label,
        } => {
            let first = data.first().copied();
            let probability = match (probability, first) {
                (Some(p), _) => clamp_unit(p),
                (None, Some(channel)) => channel_probability(channel),
                (None, None) => NEUTRAL_PROBABILITY,
            };
            Sample {
                probability,
                timestamp: timestamp.unwrap_or(synthetic),
                label: label.unwrap_or_else(|| CALM_LABEL.to_string()),
                raw_value: first,
                extra: Map::new(),
            }
        }
        SampleShape::Probability {
            probability,
            raw_value,
            timestamp,
            label,
        } => Sample {
            probability: clamp_unit(probability),
            timestamp: timestamp.unwrap_or(synthetic),
            label: label.unwrap_or_else(|| CALM_LABEL.to_string()),
            raw_value: Some(raw_value.unwrap_or(probability)),
            extra: Map::new(),
        },
        SampleShape::Unrecognized {
            timestamp,
            label,
            mut fields,
        } => {
            for key in ["probability", "timestamp", "label", "rawValue"] {
                fields.remove(key);
            }
            Sample {
                probability: NEUTRAL_PROBABILITY,
                timestamp: timestamp.unwrap_or(synthetic),
                label: label.unwrap_or_else(|| CALM_LABEL.to_string()),
                raw_value: None,
                extra: fields,
            }
        }
    }
}

/// Map a raw channel reading onto a probability in [0.1, 0.9]
fn channel_probability(channel: f64) -> f64 {
    if !channel.is_finite() {
        return NEUTRAL_PROBABILITY;
    }
    (NEUTRAL_PROBABILITY + channel / 100.0).clamp(0.1, 0.9)
}

fn as_millis(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|v| v.is_finite()).map(|v| v as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const START: i64 = 1_700_000_000_000;

    #[test]
    fn test_bare_number() {
        let sample = normalize(&json!(0.42), 3, START);
        assert_eq!(sample.probability, 0.42);
        assert_eq!(sample.raw_value, Some(0.42));
        assert_eq!(sample.timestamp, START + 3000);
        assert_eq!(sample.label, "calm");
    }

    #[test]
    fn test_bare_number_out_of_range_is_clamped() {
        assert_eq!(normalize(&json!(4.2), 0, START).probability, 1.0);
        assert_eq!(normalize(&json!(-3), 0, START).probability, 0.0);
    }

    #[test]
    fn test_channel_data_with_explicit_probability() {
        let sample = normalize(
            &json!({"data": [12.5, 3.0], "probability": 0.7, "timestamp": 55}),
            0,
            START,
        );
        assert_eq!(sample.probability, 0.7);
        assert_eq!(sample.raw_value, Some(12.5));
        assert_eq!(sample.timestamp, 55);
    }

    #[test]
    fn test_channel_data_derives_probability() {
        let sample = normalize(&json!({"data": [20.0]}), 1, START);
        assert!((sample.probability - 0.7).abs() < 1e-9);
        assert_eq!(sample.timestamp, START + 1000);

        let high = normalize(&json!({"data": [500.0]}), 0, START);
        assert_eq!(high.probability, 0.9);

        let low = normalize(&json!({"data": [-500.0]}), 0, START);
        assert_eq!(low.probability, 0.1);
    }

    #[test]
    fn test_empty_channel_data_is_neutral() {
        let sample = normalize(&json!({"data": []}), 0, START);
        assert_eq!(sample.probability, 0.5);
        assert_eq!(sample.raw_value, None);
    }

    #[test]
    fn test_probability_record_passes_through() {
        let sample = normalize(
            &json!({"probability": 0.25, "timestamp": 10, "label": "focus"}),
            0,
            START,
        );
        assert_eq!(sample.probability, 0.25);
        assert_eq!(sample.raw_value, Some(0.25));
        assert_eq!(sample.timestamp, 10);
        assert_eq!(sample.label, "focus");
    }

    #[test]
    fn test_probability_record_is_clamped() {
        let sample = normalize(&json!({"probability": 1.5}), 0, START);
        assert_eq!(sample.probability, 1.0);
        assert_eq!(sample.raw_value, Some(1.5));
    }

    #[test]
    fn test_unrecognized_object_keeps_fields() {
        let sample = normalize(&json!({"mood": "sleepy", "timestamp": 99}), 0, START);
        assert_eq!(sample.probability, 0.5);
        assert_eq!(sample.label, "calm");
        assert_eq!(sample.timestamp, 99);
        assert_eq!(sample.extra.get("mood"), Some(&json!("sleepy")));
        assert!(!sample.extra.contains_key("timestamp"));
    }

    #[test]
    fn test_non_object_values_fall_back() {
        for raw in [json!("text"), json!(null), json!([1, 2]), json!(true)] {
            let sample = normalize(&raw, 2, START);
            assert_eq!(sample.probability, 0.5);
            assert_eq!(sample.timestamp, START + 2000);
        }
    }

    #[test]
    fn test_every_shape_stays_in_unit_range() {
        let inputs = [
            json!(7),
            json!(-7),
            json!({"data": [1e9]}),
            json!({"data": [0.0], "probability": -2}),
            json!({"probability": 99}),
            json!({"other": 1}),
        ];
        for raw in inputs {
            let p = normalize(&raw, 0, START).probability;
            assert!((0.0..=1.0).contains(&p), "{raw} gave {p}");
        }
    }

    #[test]
    fn test_synthetic_timestamp_saturates() {
        assert_eq!(normalize(&json!(0.4), 1, i64::MAX - 10).timestamp, i64::MAX);
        assert_eq!(normalize(&json!(0.4), usize::MAX, 0).timestamp, i64::MAX);
        assert_eq!(normalize(&json!(0.4), 3, i64::MIN).timestamp, i64::MIN + 3000);
    }
}
