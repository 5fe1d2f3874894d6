//! Persisted scene configuration for the driving simulator.
//!
//! The simulator reads its scene from a flat key/value storage map.
//! Only three keys belong to the scene; any other keys already in a
//! storage file are preserved when the scene is saved into it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

/// Storage key for [`Topography`].
pub const TOPOGRAPHY_KEY: &str = "config-scene-topography";
/// Storage key for [`Season`].
pub const SEASON_KEY: &str = "config-scene-skin";
/// Storage key for [`Weather`].
pub const WEATHER_KEY: &str = "config-scene-weather-index";

/// Flat key/value storage map as the simulator persists it. Values
/// are strings or numbers.
pub type StorageMap = BTreeMap<String, serde_json::Value>;

/// Road shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topography {
    /// Straight road.
    #[default]
    Straight,
    /// Gentle curves.
    Casual,
    /// Easy curves.
    Easy,
    /// Normal curves.
    Normal,
    /// Hard curves.
    Hard,
}

impl Topography {
    const ALL: [Self; 5] = [
        Self::Straight,
        Self::Casual,
        Self::Easy,
        Self::Normal,
        Self::Hard,
    ];

    const fn as_str(self) -> &'static str {
        match self {
            Self::Straight => "straight",
            Self::Casual => "casual",
            Self::Easy => "easy",
            Self::Normal => "normal",
            Self::Hard => "hard",
        }
    }
}

/// Landscape skin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    /// Summer, stored as the simulator's `default` skin.
    #[default]
    Summer,
    /// Autumn.
    Autumn,
    /// Spring.
    Spring,
    /// Winter.
    Winter,
}

impl Season {
    const ALL: [Self; 4] = [Self::Summer, Self::Autumn, Self::Spring, Self::Winter];

    const fn as_str(self) -> &'static str {
        match self {
            Self::Summer => "default",
            Self::Autumn => "autumn",
            Self::Spring => "spring",
            Self::Winter => "winter",
        }
    }
}

/// Time of day and sky, stored as an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    /// Index 0.
    #[default]
    Sunrise,
    /// Index 1.
    Sun,
    /// Index 2.
    Cloudy,
    /// Index 3.
    Sunset,
    /// Index 4.
    Night,
}

impl Weather {
    const ALL: [Self; 5] = [
        Self::Sunrise,
        Self::Sun,
        Self::Cloudy,
        Self::Sunset,
        Self::Night,
    ];

    /// Storage index.
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Sunrise => "sunrise",
            Self::Sun => "sun",
            Self::Cloudy => "cloudy",
            Self::Sunset => "sunset",
            Self::Night => "night",
        }
    }
}

macro_rules! name_conversions {
    ($ty:ty, $what:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = SceneError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .into_iter()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
                    .ok_or_else(|| SceneError::UnknownValue {
                        key: $what,
                        value: s.to_string(),
                    })
            }
        }
    };
}

name_conversions!(Topography, "topography");
name_conversions!(Season, "season");

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Weather {
    type Err = SceneError;

    /// Accepts a name (`"night"`) or a storage index (`"4"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|w| w.as_str().eq_ignore_ascii_case(s) || w.index().to_string() == s)
            .ok_or_else(|| SceneError::UnknownValue {
                key: "weather",
                value: s.to_string(),
            })
    }
}

/// A scene value that the simulator does not know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SceneError {
    /// Unrecognized value for a scene key.
    #[error("unknown {key} value {value:?}")]
    UnknownValue {
        /// Which setting.
        key: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Scene parameters written before a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Road shape.
    pub topography: Topography,
    /// Landscape skin.
    pub season: Season,
    /// Time of day.
    pub weather: Weather,
}

impl SceneConfig {
    /// Write the scene keys into `storage`, leaving other keys alone.
    pub fn apply_to(&self, storage: &mut StorageMap) {
        let mut set = |key: &str, value: String| {
            storage.insert(key.to_string(), serde_json::Value::String(value));
        };
        set(TOPOGRAPHY_KEY, self.topography.to_string());
        set(SEASON_KEY, self.season.to_string());
        set(WEATHER_KEY, self.weather.index().to_string());
    }

    /// The scene as a storage map holding only the scene keys.
    #[must_use]
    pub fn to_storage(&self) -> StorageMap {
        let mut storage = StorageMap::new();
        self.apply_to(&mut storage);
        storage
    }

    /// Read the scene keys from `storage`. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::UnknownValue`] for a present but
    /// unrecognized value.
    pub fn from_storage(storage: &StorageMap) -> Result<Self, SceneError> {
        let text = |key: &str| {
            storage.get(key).map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        };
        let mut scene = Self::default();
        if let Some(v) = text(TOPOGRAPHY_KEY) {
            scene.topography = v.parse()?;
        }
        if let Some(v) = text(SEASON_KEY) {
            scene.season = v.parse()?;
        }
        if let Some(v) = text(WEATHER_KEY) {
            scene.weather = v.parse()?;
        }
        Ok(scene)
    }

    /// Load the scene from a JSON storage file.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Io`] or [`RuntimeError::Json`] if the file
    /// cannot be read or parsed, and [`RuntimeError::Scene`] for an
    /// unknown scene value.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let storage: StorageMap = serde_json::from_str(&json)?;
        Ok(Self::from_storage(&storage)?)
    }

    /// Save the scene into a JSON storage file, keeping any other keys
    /// already in it.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Io`] or [`RuntimeError::Json`] on failure.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RuntimeError> {
        let path = path.as_ref();
        let mut storage: StorageMap = match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StorageMap::new(),
            Err(e) => return Err(e.into()),
        };
        self.apply_to(&mut storage);
        std::fs::write(path, serde_json::to_string_pretty(&storage)?)?;
        tracing::info!(path = %path.display(), scene = %self, "scene configuration saved");
        Ok(())
    }
}

impl fmt::Display for SceneConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.topography, self.season, self.weather)
    }
}
