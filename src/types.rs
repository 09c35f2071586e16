use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// Opaque identity of one connected client transport
pub type SessionId = Uuid;

/// Label carried by every sample produced today
pub const CALM_LABEL: &str = "calm";

/// One normalized calm-probability data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    /// Calm score, always within [0, 1]
    pub probability: f64,
    /// Milliseconds since epoch; ordering key within a dataset
    pub timestamp: i64,
    /// Metric identity (e.g. "calm")
    pub label: String,
    /// First raw channel value, kept for diagnostics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_value: Option<f64>,
    /// Unrecognized fields carried through from the recording
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Sample {
    /// Build a sample from a live device reading
    pub fn live(probability: f64, timestamp: i64) -> Self {
        Self {
            probability: clamp_unit(probability),
            timestamp,
            label: CALM_LABEL.to_string(),
            raw_value: Some(probability),
            extra: serde_json::Map::new(),
        }
    }
}

/// Clamp into [0, 1]; NaN collapses to the neutral 0.5
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.5
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Colour bucket used by clients and console logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalmLevel {
    Blue,
    Green,
    Orange,
    Red,
}

impl CalmLevel {
    pub fn from_probability(probability: f64) -> Self {
        if probability > 0.4 {
            Self::Blue
        } else if probability > 0.3 {
            Self::Green
        } else if probability > 0.2 {
            Self::Orange
        } else {
            Self::Red
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Self::Blue => "🟦",
            Self::Green => "🟩",
            Self::Orange => "🟧",
            Self::Red => "🟥",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Self::Blue => "#3498db",
            Self::Green => "#2ecc71",
            Self::Orange => "#e67e22",
            Self::Red => "#e74c3c",
        }
    }
}

/// A recorded dataset found on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetDescriptor {
    pub filename: String,
    /// Path relative to the dataset root, `/`-separated
    pub relative_path: String,
    /// Human-readable category derived from the directory name
    pub category: String,
}

impl DatasetDescriptor {
    /// Display title used for `datasetTitle` events
    pub fn title(&self) -> String {
        format!("{}: {}", self.category, self.filename)
    }
}

/// Dataset entry as exposed over HTTP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub id: usize,
    pub name: String,
    pub path: String,
    pub category: String,
}

impl DatasetInfo {
    pub fn new(id: usize, descriptor: &DatasetDescriptor) -> Self {
        Self {
            id,
            name: descriptor.filename.clone(),
            path: descriptor.relative_path.clone(),
            category: descriptor.category.clone(),
        }
    }
}

/// Datasets grouped by category, categories in catalog listing order.
///
/// Serialized as a JSON object whose keys keep that order, so flattening it
/// reproduces the catalog ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetGroups(Vec<(String, Vec<DatasetDescriptor>)>);

impl DatasetGroups {
    /// Append to the descriptor's category group, creating it at the end
    pub fn push(&mut self, descriptor: DatasetDescriptor) {
        match self.0.iter_mut().find(|(c, _)| *c == descriptor.category) {
            Some((_, entries)) => entries.push(descriptor),
            None => self.0.push((descriptor.category.clone(), vec![descriptor])),
        }
    }

    pub fn get(&self, category: &str) -> Option<&[DatasetDescriptor]> {
        self.0
            .iter()
            .find(|(c, _)| c == category)
            .map(|(_, entries)| entries.as_slice())
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(c, _)| c.as_str())
    }

    /// Descriptors in listing order
    pub fn flatten(&self) -> impl Iterator<Item = &DatasetDescriptor> {
        self.0.iter().flat_map(|(_, entries)| entries.iter())
    }

}

impl FromIterator<DatasetDescriptor> for DatasetGroups {
    fn from_iter<I: IntoIterator<Item = DatasetDescriptor>>(iter: I) -> Self {
        let mut groups = Self::default();
        for descriptor in iter {
            groups.push(descriptor);
        }
        groups
    }
}

impl Serialize for DatasetGroups {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (category, entries) in &self.0 {
            map.serialize_entry(category, entries)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DatasetGroups {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GroupsVisitor;

        impl<'de> Visitor<'de> for GroupsVisitor {
            type Value = DatasetGroups;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of category to datasets")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut groups = Vec::new();
                while let Some((category, entries)) =
                    access.next_entry::<String, Vec<DatasetDescriptor>>()?
                {
                    groups.push((category, entries));
                }
                Ok(DatasetGroups(groups))
            }
        }

        deserializer.deserialize_map(GroupsVisitor)
    }
}

/// What is currently feeding the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CurrentSource {
    None,
    Live,
    Replay { dataset_id: usize },
}

/// Server to client events (JSON text frames)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    /// One sample
    #[serde(rename_all = "camelCase")]
    Calm {
        probability: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
        label: String,
        emoji: String,
        color: String,
    },

    /// Active source display name changed
    DatasetTitle { title: String },

    /// Replay switched datasets
    DatasetSelected {
        path: String,
        name: String,
        message: String,
    },

    /// Sent once per new session
    #[serde(rename_all = "camelCase")]
    Init {
        current_dataset: Option<String>,
        available_datasets: DatasetGroups,
    },

    /// Informational
    #[serde(rename_all = "camelCase")]
    Status {
        message: String,
        current_dataset: Option<String>,
    },

    /// Request failed; only sent to the requester
    Error { message: String },
}

impl ServerEvent {
    pub fn calm(sample: &Sample) -> Self {
        let level = CalmLevel::from_probability(sample.probability);
        Self::Calm {
            probability: sample.probability,
            timestamp: Some(sample.timestamp),
            label: sample.label.clone(),
            emoji: level.emoji().to_string(),
            color: level.color().to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Client to server control messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Switch replay to the dataset at this 1-based catalog position
    #[serde(rename_all = "camelCase")]
    SelectDataset { dataset_index: i64 },

    /// Switch back to the live device feed
    SelectLive,
}
