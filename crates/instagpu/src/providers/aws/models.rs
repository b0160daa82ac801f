//! EC2 Query API response models.
//!
//! EC2 answers with XML; lists are wrapped in `<item>` elements.

use serde::Deserialize;

// ============================================================================
// Common wrapper types
// ============================================================================

/// A `<fooSet><item>...</item></fooSet>` list.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ItemSet<T> {
    /// List entries.
    #[serde(rename = "item", default)]
    pub items: Vec<T>,
}

impl<T> Default for ItemSet<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

/// EC2 error response.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    /// Reported errors.
    #[serde(rename = "Errors")]
    pub errors: ErrorList,
}

/// EC2 error list.
#[derive(Debug, Deserialize)]
pub struct ErrorList {
    /// Individual errors.
    #[serde(rename = "Error", default)]
    pub errors: Vec<ApiError>,
}

/// A single EC2 error.
#[derive(Debug, Deserialize)]
pub struct ApiError {
    /// Error code (e.g., `AuthFailure`).
    #[serde(rename = "Code")]
    pub code: String,
    /// Human-readable message.
    #[serde(rename = "Message", default)]
    pub message: String,
}

// ============================================================================
// DescribeRegions
// ============================================================================

/// `DescribeRegions` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeRegionsResponse {
    /// Enabled regions.
    #[serde(default)]
    pub region_info: ItemSet<RegionItem>,
}

/// A region entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionItem {
    /// Region name.
    pub region_name: String,
    /// EC2 endpoint host.
    pub region_endpoint: String,
}

// ============================================================================
// DescribeInstanceTypes
// ============================================================================

/// `DescribeInstanceTypes` response page.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeInstanceTypesResponse {
    /// Instance types on this page.
    #[serde(default)]
    pub instance_type_set: ItemSet<InstanceTypeItem>,
    /// Pagination token.
    pub next_token: Option<String>,
}

/// An instance type entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceTypeItem {
    /// Instance type name.
    pub instance_type: String,
    /// Processor details.
    pub processor_info: Option<ProcessorInfo>,
    /// vCPU details.
    #[serde(rename = "vCpuInfo")]
    pub v_cpu_info: Option<VCpuInfo>,
    /// Memory details.
    pub memory_info: Option<MemoryInfo>,
    /// Network details.
    pub network_info: Option<NetworkInfo>,
    /// GPU details (absent for non-GPU types).
    pub gpu_info: Option<GpuInfo>,
}

/// Processor details.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorInfo {
    /// Supported architectures.
    #[serde(default)]
    pub supported_architectures: ItemSet<String>,
    /// Sustained clock speed in GHz.
    pub sustained_clock_speed_in_ghz: Option<f64>,
    /// CPU manufacturer.
    pub manufacturer: Option<String>,
}

/// vCPU details.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VCpuInfo {
    /// Default number of vCPUs.
    #[serde(rename = "defaultVCpus")]
    pub default_v_cpus: u32,
}

/// Memory details.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryInfo {
    /// Size in MiB.
    #[serde(rename = "sizeInMiB")]
    pub size_in_mib: u64,
}

/// Network details.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    /// Network cards.
    #[serde(default)]
    pub network_cards: ItemSet<NetworkCard>,
}

/// A network card.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkCard {
    /// Peak bandwidth in Gbps.
    pub peak_bandwidth_in_gbps: Option<f64>,
}

/// GPU details.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuInfo {
    /// GPU kinds attached.
    #[serde(default)]
    pub gpus: ItemSet<GpuDevice>,
    /// Total GPU memory in MiB.
    #[serde(rename = "totalGpuMemoryInMiB")]
    pub total_gpu_memory_in_mib: Option<u64>,
}

/// A GPU kind.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuDevice {
    /// Model name.
    pub name: String,
    /// Manufacturer.
    pub manufacturer: String,
    /// Device count.
    pub count: u32,
}

// ============================================================================
// DescribeSpotPriceHistory
// ============================================================================

/// `DescribeSpotPriceHistory` response page.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeSpotPriceHistoryResponse {
    /// Price points on this page.
    #[serde(default)]
    pub spot_price_history_set: ItemSet<SpotPriceItem>,
    /// Pagination token.
    pub next_token: Option<String>,
}

/// A spot price point.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotPriceItem {
    /// Availability zone of the offer.
    pub availability_zone: String,
    /// Price in USD/h, as a decimal string.
    pub spot_price: String,
}
