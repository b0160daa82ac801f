//! Result filters.

use std::fmt;
use std::sync::Arc;

use crate::types::Prices;

/// A predicate over spot prices.
///
/// Filters are independent and combined with logical AND.
#[derive(Clone)]
pub enum Filter {
    /// GPU vendor equals the given name.
    GpuVendor(String),
    /// Average region latency is at most the given milliseconds.
    MaxRegionLatency(u64),
    /// Average price is at most the given USD/h.
    MaxPrice(f64),
    /// Instance memory is at least the given GiB.
    MinInstanceMemory(u64),
    /// GPU memory is at least the given GiB.
    MinGpuMemory(u64),
    /// GPU throughput is at least the given TFLOPS; unknown throughput fails.
    MinGpuTflops(f64),
    /// Arbitrary predicate.
    Custom(Arc<dyn Fn(&Prices) -> bool + Send + Sync>),
}

impl Filter {
    /// Wrap a closure as a filter.
    pub fn custom(predicate: impl Fn(&Prices) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(predicate))
    }

    /// Whether `prices` passes this filter.
    #[must_use]
    pub fn matches(&self, prices: &Prices) -> bool {
        let instance = &prices.instance;
        match self {
            Self::GpuVendor(vendor) => instance.gpu.vendor == *vendor,
            Self::MaxRegionLatency(millis) => instance.region.latency().avg <= *millis,
            Self::MaxPrice(price) => prices.avg <= *price,
            Self::MinInstanceMemory(gib) => instance.memory >= gib.saturating_mul(1024),
            Self::MinGpuMemory(gib) => instance.gpu.memory_gib() >= *gib,
            Self::MinGpuTflops(tflops) => instance.gpu.fp32.is_some_and(|fp32| fp32 >= *tflops),
            Self::Custom(predicate) => predicate(prices),
        }
    }

    /// Whether `prices` passes every filter.
    #[must_use]
    pub fn all(filters: &[Filter], prices: &Prices) -> bool {
        filters.iter().all(|filter| filter.matches(prices))
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GpuVendor(vendor) => f.debug_tuple("GpuVendor").field(vendor).finish(),
            Self::MaxRegionLatency(millis) => {
                f.debug_tuple("MaxRegionLatency").field(millis).finish()
            }
            Self::MaxPrice(price) => f.debug_tuple("MaxPrice").field(price).finish(),
            Self::MinInstanceMemory(gib) => f.debug_tuple("MinInstanceMemory").field(gib).finish(),
            Self::MinGpuMemory(gib) => f.debug_tuple("MinGpuMemory").field(gib).finish(),
            Self::MinGpuTflops(tflops) => f.debug_tuple("MinGpuTflops").field(tflops).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Gpu, Instance, Latency, Region};

    fn prices(fp32: Option<f64>) -> Prices {
        let region = Region::new("us-east-1", "aws", "ec2.us-east-1.amazonaws.com");
        region
            .set_latency(Latency {
                min: 20,
                avg: 25,
                max: 30,
            })
            .unwrap();

        Prices {
            instance: Arc::new(Instance {
                name: "g6.2xlarge".to_string(),
                vendor: "AMD".to_string(),
                arch: "x86_64".to_string(),
                clock_speed: 3.4,
                vcpus: 8,
                memory: 32_768,
                network: 10.0,
                region: Arc::new(region),
                gpu: Gpu {
                    vendor: "NVIDIA".to_string(),
                    name: "L4".to_string(),
                    count: 1,
                    memory: 22_888,
                    fp32,
                },
            }),
            avg: 0.45,
            min: 0.40,
            max: 0.50,
            availability_zones: 3,
        }
    }

    #[test]
    fn test_attribute_filters() {
        let p = prices(Some(30.29));

        assert!(Filter::GpuVendor("NVIDIA".to_string()).matches(&p));
        assert!(!Filter::GpuVendor("AMD".to_string()).matches(&p));

        assert!(Filter::MaxRegionLatency(25).matches(&p));
        assert!(!Filter::MaxRegionLatency(24).matches(&p));

        assert!(Filter::MaxPrice(0.45).matches(&p));
        assert!(!Filter::MaxPrice(0.44).matches(&p));

        assert!(Filter::MinInstanceMemory(32).matches(&p));
        assert!(!Filter::MinInstanceMemory(33).matches(&p));

        assert!(Filter::MinGpuMemory(22).matches(&p));
        assert!(!Filter::MinGpuMemory(23).matches(&p));

        assert!(Filter::MinGpuTflops(30.0).matches(&p));
        assert!(!Filter::MinGpuTflops(31.0).matches(&p));
    }

    #[test]
    fn test_min_tflops_rejects_unknown_throughput() {
        let p = prices(None);
        assert!(!Filter::MinGpuTflops(0.0).matches(&p));
        assert!(Filter::all(&[], &p));
    }

    #[test]
    fn test_all_is_conjunction() {
        let p = prices(Some(30.29));
        let cheap_nvidia = [
            Filter::GpuVendor("NVIDIA".to_string()),
            Filter::MaxPrice(1.0),
        ];
        assert!(Filter::all(&cheap_nvidia, &p));

        let with_custom = [
            Filter::MaxPrice(1.0),
            Filter::custom(|p| p.availability_zones > 3),
        ];
        assert!(!Filter::all(&with_custom, &p));
    }
}
