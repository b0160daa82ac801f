//! GPU capability registry.
//!
//! Maps `<vendor>-<model>` tags, as reported by providers, to the peak FP32
//! throughput of a single device in TFLOPS.

use std::collections::HashMap;

use tracing::warn;

use crate::types::Gpu;

/// Reference FP32 TFLOPS per device, sourced from techpowerup.com GPU specs.
const DEVICES: &[(&str, f64)] = &[
    ("AMD-Radeon Pro V520", 7.373),
    ("NVIDIA-A100", 19.49),
    ("NVIDIA-A10G", 31.52),
    ("NVIDIA-H100", 66.91),
    ("NVIDIA-K80", 4.113),
    ("NVIDIA-L4", 30.29),
    ("NVIDIA-L40S", 91.61),
    ("NVIDIA-M60", 4.825),
    ("NVIDIA-T4", 8.141),
    ("NVIDIA-T4g", 8.141),
    ("NVIDIA-V100", 16.35),
];

/// Immutable lookup table from GPU tag to per-device FP32 TFLOPS.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    devices: HashMap<String, f64>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(DEVICES.iter().map(|(tag, tflops)| ((*tag).to_string(), *tflops)))
    }
}

impl DeviceRegistry {
    /// Create a registry from `(tag, tflops)` pairs.
    pub fn new(devices: impl IntoIterator<Item = (String, f64)>) -> Self {
        Self {
            devices: devices.into_iter().collect(),
        }
    }

    /// Per-device FP32 TFLOPS for a tag.
    #[must_use]
    pub fn lookup(&self, tag: &str) -> Option<f64> {
        self.devices.get(tag).copied()
    }

    /// Number of known devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Fill in the aggregate throughput of `gpu`.
    ///
    /// Unknown tags leave `fp32` untouched and emit a warning.
    pub fn measure(&self, gpu: &mut Gpu) -> Option<f64> {
        let tag = gpu.tag();
        let Some(tflops) = self.lookup(&tag) else {
            warn!(tag = %tag, "No device data for GPU tag, throughput unknown");
            return None;
        };

        let total = tflops * f64::from(gpu.count);
        gpu.fp32 = Some(total);
        Some(total)
    }
}
