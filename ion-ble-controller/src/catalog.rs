//! Mood and notification descriptors
//!
//! The lamp only knows numeric ids; names and config bounds come from a JSON
//! catalog shipped alongside the driver. Names match ignoring case and
//! whitespace, so "Digital Rain", "digitalrain" and "digital rain" are the
//! same mood.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub moods: Vec<MoodDescriptor>,
    #[serde(default)]
    pub notifications: Vec<NotificationDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodDescriptor {
    pub id: u8,
    pub name: String,
    #[serde(default)]
    pub configs: Vec<ConfigDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDescriptor {
    pub id: u8,
    pub name: String,
    pub min: u32,
    pub max: u32,
    pub default: u32,
}

impl ConfigDescriptor {
    /// "Color" configs span two ids on the lamp: hue at `id`, saturation at `id + 1`
    pub fn is_color(&self) -> bool {
        normalize_name(&self.name) == "color"
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= i64::from(self.min) && value <= i64::from(self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDescriptor {
    pub id: u8,
    pub name: String,
}

/// Lowercase with all whitespace removed
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

impl Catalog {
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&data).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn mood(&self, name: &str) -> Option<&MoodDescriptor> {
        let name = normalize_name(name);
        self.moods.iter().find(|m| normalize_name(&m.name) == name)
    }

    /// Normalized name of the mood with `id`
    pub fn mood_name(&self, id: u8) -> Option<String> {
        self.moods
            .iter()
            .find(|m| m.id == id)
            .map(|m| normalize_name(&m.name))
    }

    pub fn mood_config(&self, mood: &str, config: &str) -> Option<(&MoodDescriptor, &ConfigDescriptor)> {
        let mood = self.mood(mood)?;
        let config = normalize_name(config);
        mood.configs
            .iter()
            .find(|c| normalize_name(&c.name) == config)
            .map(|c| (mood, c))
    }

    pub fn notification(&self, name: &str) -> Option<&NotificationDescriptor> {
        let name = normalize_name(name);
        self.notifications
            .iter()
            .find(|n| normalize_name(&n.name) == name)
    }
}

#[cfg(test)]
pub(crate) fn test_catalog() -> Catalog {
    Catalog::from_json(
        r#"{
            "moods": [
                {
                    "id": 12,
                    "name": "Digital Rain",
                    "configs": [
                        { "id": 1, "name": "Color", "min": 0, "max": 359, "default": 120 },
                        { "id": 3, "name": "Speed", "min": 1, "max": 10, "default": 5 }
                    ]
                },
                { "id": 3, "name": "Candle", "configs": [] },
                { "id": 7, "name": "Pulse", "configs": [
                    { "id": 1, "name": "Brightness", "min": 10, "max": 255, "default": 200 }
                ] }
            ],
            "notifications": [
                { "id": 1, "name": "Blink" },
                { "id": 4, "name": "Slow Fade" }
            ]
        }"#,
    )
    .unwrap()
}
