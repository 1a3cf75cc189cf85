use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// RAM used when the config file is missing or unreadable.
pub const DEFAULT_RAM_GB: u32 = 4;
/// Smallest heap the game is allowed to run with.
pub const MIN_RAM_GB: u32 = 2;
pub const MAX_RAM_GB: u32 = 64;

/// Settings persisted to `config/app.json`.
///
/// The on-disk shape is `{ "ram": 4, "version": "1.2.0" }`. Keys this type
/// does not know about are carried in `extra` so a read-modify-write never
/// drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Older builds stored whatever the UI sent, so `"8"` and `8.0` are
    /// accepted too. Anything else falls back to the default.
    #[serde(rename = "ram", default = "default_ram", deserialize_with = "lenient_ram")]
    pub ram_gb: u32,

    /// Tag of the content currently extracted in the install directory.
    #[serde(rename = "version", default, skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,

    /// Set while a destructive update is in flight; cleared on commit.
    #[serde(default, skip_serializing_if = "is_false")]
    pub broken: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ram_gb: DEFAULT_RAM_GB,
            installed_version: None,
            broken: false,
            extra: Map::new(),
        }
    }
}

impl AppConfig {
    pub fn sanitized(mut self) -> Self {
        self.ram_gb = self.ram_gb.clamp(MIN_RAM_GB, MAX_RAM_GB);
        if self
            .installed_version
            .as_deref()
            .is_some_and(|v| v.trim().is_empty())
        {
            self.installed_version = None;
        }
        self
    }

    /// Whether the install directory holds complete content that can be
    /// launched without contacting the update server.
    pub fn has_usable_install(&self) -> bool {
        !self.broken && self.installed_version.is_some()
    }
}

fn default_ram() -> u32 {
    DEFAULT_RAM_GB
}

fn lenient_ram<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(ram_from_value(&value).unwrap_or_else(|| {
        warn!("Ignoring unreadable ram value {}", value);
        DEFAULT_RAM_GB
    }))
}

fn ram_from_value(value: &Value) -> Option<u32> {
    let whole = match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    }?;
    // Out-of-range values are clamped later by `sanitized`.
    Some(u32::try_from(whole).unwrap_or(u32::MAX))
}

fn integral(value: f64) -> Option<u64> {
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0).then_some(value as u64)
}

fn is_false(value: &bool) -> bool {
    !*value
}
