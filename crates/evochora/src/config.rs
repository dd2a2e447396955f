//! Simulation configuration.

use std::fmt;

/// Snapshot-queue behavior when the downstream consumer falls behind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backpressure {
    /// Wait until the queue accepts the snapshot.
    #[default]
    Block,
    /// Drop the snapshot (never the tick itself).
    Drop,
}

/// What a stack overflow does to the offending organism.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    Trap,
    #[default]
    Halt,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct WorldConfig {
    /// Axis sizes; the list length is the world dimensionality.
    pub dimensions: Vec<i64>,
    pub seed: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            dimensions: vec![64, 64],
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SchedulerConfig {
    pub backpressure: Backpressure,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StackConfig {
    pub max_depth: usize,
    pub on_overflow: OverflowPolicy,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            max_depth: 64,
            on_overflow: OverflowPolicy::Halt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OrganismConfig {
    pub data_registers: usize,
    pub proc_registers: usize,
    pub location_registers: usize,
    pub data_pointers: usize,
    pub initial_energy: u64,
}

impl Default for OrganismConfig {
    fn default() -> Self {
        Self {
            data_registers: 8,
            proc_registers: 4,
            location_registers: 4,
            data_pointers: 2,
            initial_energy: 1000,
        }
    }
}

/// Everything a simulation needs to know, deserializable from TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SimulationConfig {
    pub world: WorldConfig,
    pub scheduler: SchedulerConfig,
    pub stacks: StackConfig,
    pub organism: OrganismConfig,
}

impl SimulationConfig {
    /// Parses a configuration from TOML text; unknown keys are rejected.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|err| ConfigError(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.world.dimensions.is_empty() {
            return Err(ConfigError("world.dimensions must not be empty".to_owned()));
        }
        if self.world.dimensions.iter().any(|&s| s <= 0) {
            return Err(ConfigError("world axis sizes must be positive".to_owned()));
        }
        if self.stacks.max_depth == 0 {
            return Err(ConfigError("stacks.max_depth must be positive".to_owned()));
        }
        if self.organism.data_pointers == 0 {
            return Err(ConfigError("organism.data_pointers must be positive".to_owned()));
        }
        Ok(())
    }

    /// World dimensionality implied by the axis list.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.world.dimensions.len()
    }
}

/// A rejected configuration, with the reason.
#[derive(Debug, Clone)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_defaults() {
        let config = SimulationConfig::from_toml_str("").unwrap();
        assert_eq!(config, SimulationConfig::default());
        assert_eq!(config.dimensions(), 2);
    }

    #[test]
    fn parses_documented_options() {
        let config = SimulationConfig::from_toml_str(
            r#"
[world]
dimensions = [16, 16, 16]
seed = 99

[scheduler]
backpressure = "drop"

[stacks]
max_depth = 32
on_overflow = "trap"
"#,
        )
        .unwrap();
        assert_eq!(config.dimensions(), 3);
        assert_eq!(config.world.seed, 99);
        assert_eq!(config.scheduler.backpressure, Backpressure::Drop);
        assert_eq!(config.stacks.on_overflow, OverflowPolicy::Trap);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(SimulationConfig::from_toml_str("[world]\nspeed = 3\n").is_err());
    }

    #[test]
    fn zero_axis_is_rejected() {
        assert!(SimulationConfig::from_toml_str("[world]\ndimensions = [0, 4]\n").is_err());
    }
}
