//! executor.toml configuration parser.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub reconcile: ReconcileConfig,
    pub pressure: PressureRatios,
    pub capacity: CapacityConfig,
    pub resources: ResourcesConfig,
    pub cluster: ClusterConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub interval_ms: u64,
    /// How long a confirmed creation keeps reserving its request.
    pub created_jobs_ttl_ms: u64,
    pub max_jobs_per_tick: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            created_jobs_ttl_ms: 15_000,
            max_jobs_per_tick: 100,
        }
    }
}

/// Fraction of each node's capacity usable for new admissions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureRatios {
    pub cpu: f64,
    pub memory: f64,
    pub gpu: f64,
}

impl Default for PressureRatios {
    fn default() -> Self {
        Self {
            cpu: 0.9,
            memory: 0.8,
            gpu: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    pub initial: f64,
    pub min: f64,
    pub max: f64,
    /// Weight of the previous estimate in the exponential update.
    pub smoothing: f64,
    /// Batch window is `capacity * window_factor` requests.
    pub window_factor: f64,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            initial: 10.0,
            min: 2.0,
            max: 50.0,
            smoothing: 0.9,
            window_factor: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerShape {
    pub cpu: f64,
    /// MiB.
    pub mem: f64,
}

/// Fields left out of a configured shape take the worker container defaults.
impl Default for ContainerShape {
    fn default() -> Self {
        Self { cpu: 0.1, mem: 512.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcesConfig {
    pub use_resource_limits: bool,
    pub apply_worker_resources: bool,
    pub worker: ContainerShape,
    pub sidecar: ContainerShape,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            use_resource_limits: false,
            apply_worker_resources: false,
            worker: ContainerShape::default(),
            sidecar: ContainerShape { cpu: 0.1, mem: 128.0 },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub image_pull_secret: Option<String>,
    pub default_storage: Option<String>,
    pub is_privileged: bool,
}

impl ExecutorConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: ExecutorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let ratios = [
            ("cpu", self.pressure.cpu),
            ("memory", self.pressure.memory),
            ("gpu", self.pressure.gpu),
        ];
        for (name, ratio) in ratios {
            if !(ratio > 0.0 && ratio <= 1.0) {
                anyhow::bail!("pressure.{name} must be in (0, 1], got {ratio}");
            }
        }
        let capacity = &self.capacity;
        if capacity.min <= 0.0 || capacity.min > capacity.max {
            anyhow::bail!(
                "capacity bounds are invalid: min {} max {}",
                capacity.min,
                capacity.max
            );
        }
        if !(0.0..1.0).contains(&capacity.smoothing) {
            anyhow::bail!("capacity.smoothing must be in [0, 1), got {}", capacity.smoothing);
        }
        if self.reconcile.interval_ms == 0 {
            anyhow::bail!("reconcile.interval_ms must be positive");
        }
        Ok(())
    }
}
