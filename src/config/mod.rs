use crate::error::ConfigError;
use crate::reconcile::ScopedPublisherPolicy;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

// Re-export existing config types
pub use crate::messaging::NatsConfig;

/// Complete bridge configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub ego_vehicle: EgoVehicleConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub nats: NatsConfig,
}

/// Simulation world configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WorldConfig {
    /// Interval between simulation ticks
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Map name used when no scenario is loaded
    #[serde(default = "default_map")]
    pub map: String,
    /// JSON scenario to populate the scripted world with
    #[serde(default)]
    pub scenario: Option<PathBuf>,
}

fn default_tick_interval_ms() -> u64 {
    50
}

fn default_map() -> String {
    "Town01".to_string()
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            map: default_map(),
            scenario: None,
        }
    }
}

/// Ego vehicle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EgoVehicleConfig {
    /// Role names that mark a vehicle as an ego vehicle
    #[serde(default = "default_role_names")]
    pub role_name: Vec<String>,
    /// Remove an ego vehicle's object-list publisher when the vehicle is destroyed
    #[serde(default)]
    pub drop_object_list_on_destroy: bool,
}

fn default_role_names() -> Vec<String> {
    vec!["hero".to_string(), "ego_vehicle".to_string()]
}

impl Default for EgoVehicleConfig {
    fn default() -> Self {
        Self {
            role_name: default_role_names(),
            drop_object_list_on_destroy: false,
        }
    }
}

/// Reconciliation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    /// How long the reconcile lock stays held after each pass
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

fn default_cooldown_ms() -> u64 {
    1000
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

impl BridgeConfig {
    /// Apply env var overrides on top of the file values.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup` (env var name -> value). Unparseable
    /// values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("SIMBRIDGE_EGO_ROLE_NAMES") {
            let names: Vec<String> = v
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
            if !names.is_empty() {
                self.ego_vehicle.role_name = names;
            }
        }
        if let Some(v) = lookup("SIMBRIDGE_RECONCILE_COOLDOWN_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.reconcile.cooldown_ms = n;
            }
        }
        if let Some(v) = lookup("SIMBRIDGE_DROP_OBJECT_LIST_ON_DESTROY") {
            if let Ok(b) = v.parse::<bool>() {
                self.ego_vehicle.drop_object_list_on_destroy = b;
            }
        }
        self
    }

    /// Parameter tree handed to the message bus
    pub fn parameters(&self) -> Value {
        json!({
            "ego_vehicle": {
                "role_name": self.ego_vehicle.role_name,
            },
            "reconcile": {
                "cooldown_ms": self.reconcile.cooldown_ms,
            },
        })
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.world.tick_interval_ms)
    }

    pub fn reconcile_cooldown(&self) -> Duration {
        Duration::from_millis(self.reconcile.cooldown_ms)
    }

    pub fn scoped_publisher_policy(&self) -> ScopedPublisherPolicy {
        if self.ego_vehicle.drop_object_list_on_destroy {
            ScopedPublisherPolicy::DropWithVehicle
        } else {
            ScopedPublisherPolicy::Retain
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<BridgeConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: BridgeConfig = toml::from_str(&contents)?;
    Ok(config)
}
