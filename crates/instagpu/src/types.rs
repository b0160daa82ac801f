//! Regions, instances, GPUs and spot prices.
//!
//! Instances share their owning [`Region`] through an [`Arc`], and [`Prices`]
//! share their [`Instance`] the same way. Both relationships are read-only.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

/// Round-trip latency to a region endpoint, in whole milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Latency {
    /// Fastest observed round trip.
    pub min: u64,
    /// Mean round trip.
    pub avg: u64,
    /// Slowest observed round trip.
    pub max: u64,
}

/// A cloud region.
///
/// Latency is written at most once, by the region prober, while the region is
/// already shared with the instances enumerated for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Region name (e.g., "us-east-1").
    pub name: String,
    /// Provider identifier (e.g., "aws").
    pub provider: String,
    /// Network endpoint used for latency probes.
    pub endpoint: String,
    /// Measured latency, absent until probed.
    #[serde(default, with = "latency_cell")]
    latency: OnceLock<Latency>,
}

impl Region {
    /// Create an unmeasured region.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        provider: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            endpoint: endpoint.into(),
            latency: OnceLock::new(),
        }
    }

    /// Measured latency, or zeros if the region was never probed.
    #[must_use]
    pub fn latency(&self) -> Latency {
        self.latency.get().copied().unwrap_or_default()
    }

    /// Whether latency has been recorded.
    #[must_use]
    pub fn is_measured(&self) -> bool {
        self.latency.get().is_some()
    }

    /// Record the measured latency.
    ///
    /// # Errors
    /// Returns the rejected value if latency was already recorded.
    pub fn set_latency(&self, latency: Latency) -> Result<(), Latency> {
        self.latency.set(latency)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "📍 {}-{}\t🐢 {}ms",
            self.provider,
            self.name,
            self.latency().avg
        )
    }
}

mod latency_cell {
    use std::sync::OnceLock;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Latency;

    pub fn serialize<S: Serializer>(
        cell: &OnceLock<Latency>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        cell.get().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<OnceLock<Latency>, D::Error> {
        let cell = OnceLock::new();
        if let Some(latency) = Option::<Latency>::deserialize(deserializer)? {
            let _ = cell.set(latency);
        }
        Ok(cell)
    }
}

/// GPU attached to an instance type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gpu {
    /// Manufacturer (e.g., "NVIDIA").
    pub vendor: String,
    /// Model name (e.g., "H100").
    pub name: String,
    /// Number of devices.
    pub count: u32,
    /// Total GPU memory in MiB.
    pub memory: u64,
    /// Aggregate FP32 throughput in TFLOPS across all devices.
    #[serde(default)]
    pub fp32: Option<f64>,
}

impl Gpu {
    /// Capability tag used for registry lookups (`<vendor>-<model>`).
    #[must_use]
    pub fn tag(&self) -> String {
        format!("{}-{}", self.vendor, self.name)
    }

    /// Total GPU memory in GiB.
    #[must_use]
    pub fn memory_gib(&self) -> u64 {
        self.memory / 1024
    }
}

impl fmt::Display for Gpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "🎨 {}x{}", self.count, self.tag())?;
        if let Some(fp32) = self.fp32 {
            write!(f, "\t⚡ {fp32:.2} fp32")?;
        }
        write!(f, "\t🧠 {}GiB", self.memory_gib())
    }
}

/// A GPU instance type offered in a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Instance type name (e.g., "g5.xlarge").
    pub name: String,
    /// CPU manufacturer.
    pub vendor: String,
    /// CPU architecture (e.g., "`x86_64`").
    pub arch: String,
    /// Sustained clock speed in GHz.
    pub clock_speed: f64,
    /// Number of vCPUs.
    pub vcpus: u32,
    /// Memory in MiB.
    pub memory: u64,
    /// Peak network bandwidth in Gbps.
    pub network: f64,
    /// Owning region.
    pub region: Arc<Region>,
    /// Attached GPU.
    pub gpu: Gpu,
}

impl Instance {
    /// Instance memory in GiB.
    #[must_use]
    pub fn memory_gib(&self) -> u64 {
        self.memory / 1024
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t💻 {}: {}x{}-{}@{:.2}GHz, {}GiB\t{}\t🌐 {:.2}Gbps",
            self.region,
            self.name,
            self.vcpus,
            self.vendor,
            self.arch,
            self.clock_speed,
            self.memory_gib(),
            self.gpu,
            self.network
        )
    }
}

/// Spot prices observed for an instance type over the lookback window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prices {
    /// Priced instance type.
    pub instance: Arc<Instance>,
    /// Average price in USD/h.
    pub avg: f64,
    /// Lowest price in USD/h.
    pub min: f64,
    /// Highest price in USD/h.
    pub max: f64,
    /// Number of availability zones with a live offer.
    pub availability_zones: u32,
}

impl Prices {
    /// Throughput-per-dollar index: aggregate FP32 TFLOPS per USD/h.
    ///
    /// `None` when the GPU throughput is unknown, the average price is not
    /// positive, or the result is not a finite positive number.
    #[must_use]
    pub fn score(&self) -> Option<f64> {
        let fp32 = self.instance.gpu.fp32?;
        (self.avg > 0.0)
            .then(|| fp32 / self.avg)
            .filter(|score| score.is_finite() && *score > 0.0)
    }
}

impl fmt::Display for Prices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t💰 {:.2} USD/h ({:.2} <-> {:.2}) over {} AZs",
            self.instance, self.avg, self.min, self.max, self.availability_zones
        )
    }
}
