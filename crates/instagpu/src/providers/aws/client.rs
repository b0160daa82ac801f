//! AWS EC2 API client implementation.
//!
//! Requests go to the EC2 Query API as signed form-encoded POSTs and
//! responses are decoded from XML.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use super::models::{
    DescribeInstanceTypesResponse, DescribeRegionsResponse, DescribeSpotPriceHistoryResponse,
    ErrorResponse, InstanceTypeItem, SpotPriceItem,
};
use super::signing::{self, Credentials};
use crate::providers::traits::{Provider, ProviderError};
use crate::types::{Gpu, Instance, Prices, Region};

/// Provider identifier.
pub const NAME: &str = "aws";

/// EC2 API version.
const API_VERSION: &str = "2016-11-15";

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Spot price lookback window.
const PRICE_WINDOW_HOURS: i64 = 24 * 7;

/// Only Linux offers are priced.
const PRODUCT_DESCRIPTION: &str = "Linux/UNIX";

const CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// AWS spot GPU provider.
#[derive(Clone)]
pub struct Aws {
    /// HTTP client.
    client: Client,
    /// Signing credentials.
    credentials: Credentials,
    /// Home region used for region enumeration.
    region: String,
    /// Endpoint override for all regions.
    endpoint: Option<String>,
}

impl Aws {
    /// Create a new AWS provider.
    ///
    /// # Arguments
    /// * `credentials` - Static AWS credentials
    /// * `region` - Home region used to list regions (e.g., "us-east-1")
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn new(credentials: Credentials, region: impl Into<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            credentials,
            region: region.into(),
            endpoint: None,
        })
    }

    /// Send every request to `endpoint` instead of the regional EC2 endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Get EC2 API endpoint for a region.
    fn ec2_endpoint(&self, region: &str) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://ec2.{region}.amazonaws.com/"))
    }

    /// Sign and execute an EC2 Query API action.
    async fn ec2_request<T: DeserializeOwned>(
        &self,
        region: &str,
        action: &str,
        params: &[(String, String)],
    ) -> Result<T, ProviderError> {
        let url = Url::parse(&self.ec2_endpoint(region))
            .map_err(|e| ProviderError::Config(format!("Invalid EC2 endpoint: {e}")))?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(ProviderError::Config(format!(
                    "EC2 endpoint has no host: {url}"
                )))
            }
        };

        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("Action", action)
            .append_pair("Version", API_VERSION)
            .extend_pairs(params)
            .finish();

        let signed = signing::sign(
            &self.credentials,
            region,
            &host,
            CONTENT_TYPE,
            &body,
            Utc::now(),
        )?;

        debug!(url = %url, action = %action, region = %region, "EC2 request");

        let mut request = self
            .client
            .post(url)
            .header("Content-Type", CONTENT_TYPE)
            .header("X-Amz-Date", signed.amz_date)
            .header("Authorization", signed.authorization);
        if let Some(token) = signed.security_token {
            request = request.header("X-Amz-Security-Token", token);
        }

        let response = request.body(body).send().await?;
        Self::handle_response(response).await
    }

    /// Handle API response, decoding XML or error.
    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            quick_xml::de::from_str(&text).map_err(|e| {
                warn!(error = %e, body = %text, "Failed to parse response");
                ProviderError::Xml(e)
            })
        } else {
            let message = quick_xml::de::from_str::<ErrorResponse>(&text)
                .ok()
                .and_then(|r| r.errors.errors.into_iter().next())
                .map_or(text, |e| format!("{}: {}", e.code, e.message));
            Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    /// Convert an EC2 instance type to our `Instance` type.
    ///
    /// Returns `None` for types without GPU information.
    fn to_instance(item: InstanceTypeItem, region: &Arc<Region>) -> Option<Instance> {
        let gpu_info = item.gpu_info?;
        let Some(device) = gpu_info.gpus.items.into_iter().next() else {
            warn!(instance = %item.instance_type, "Instance type lists no GPU devices");
            return None;
        };

        let processor = item.processor_info;
        let arch = processor
            .as_ref()
            .and_then(|p| p.supported_architectures.items.first().cloned())
            .unwrap_or_default();

        Some(Instance {
            name: item.instance_type,
            vendor: processor
                .as_ref()
                .and_then(|p| p.manufacturer.clone())
                .unwrap_or_default(),
            arch,
            clock_speed: processor
                .as_ref()
                .and_then(|p| p.sustained_clock_speed_in_ghz)
                .unwrap_or(0.0),
            vcpus: item.v_cpu_info.map_or(0, |v| v.default_v_cpus),
            memory: item.memory_info.map_or(0, |m| m.size_in_mib),
            network: item
                .network_info
                .and_then(|n| n.network_cards.items.into_iter().next())
                .and_then(|c| c.peak_bandwidth_in_gbps)
                .unwrap_or(0.0),
            region: Arc::clone(region),
            gpu: Gpu {
                vendor: device.manufacturer,
                name: device.name,
                count: device.count,
                memory: gpu_info.total_gpu_memory_in_mib.unwrap_or(0),
                fp32: None,
            },
        })
    }
}

/// Reduce spot price history to avg/min/max and distinct AZ count.
///
/// Returns `None` when there are no price points.
///
/// # Errors
/// Returns an error if a price is not a decimal number.
pub fn summarize_prices(
    instance: &Arc<Instance>,
    history: &[SpotPriceItem],
) -> Result<Option<Prices>, ProviderError> {
    if history.is_empty() {
        return Ok(None);
    }

    let mut zones = HashSet::new();
    let mut total = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for item in history {
        let price: f64 = item.spot_price.trim().parse().map_err(|_| {
            ProviderError::Parse(format!("Invalid spot price {:?}", item.spot_price))
        })?;
        zones.insert(item.availability_zone.as_str());
        total += price;
        min = min.min(price);
        max = max.max(price);
    }

    #[allow(clippy::cast_precision_loss)]
    let avg = total / history.len() as f64;

    Ok(Some(Prices {
        instance: Arc::clone(instance),
        avg,
        min,
        max,
        availability_zones: u32::try_from(zones.len()).unwrap_or(u32::MAX),
    }))
}

/// Treat empty `<nextToken/>` elements as the last page.
fn next_page(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.trim().is_empty())
}

#[async_trait]
impl Provider for Aws {
    fn name(&self) -> &str {
        NAME
    }

    async fn regions(&self) -> Result<Vec<Region>, ProviderError> {
        let params = [
            ("Filter.1.Name".to_string(), "opt-in-status".to_string()),
            ("Filter.1.Value.1".to_string(), "opt-in-not-required".to_string()),
            ("Filter.1.Value.2".to_string(), "opted-in".to_string()),
        ];

        let response: DescribeRegionsResponse = self
            .ec2_request(&self.region, "DescribeRegions", &params)
            .await?;

        Ok(response
            .region_info
            .items
            .into_iter()
            .map(|r| Region::new(r.region_name, NAME, r.region_endpoint))
            .collect())
    }

    async fn instances(&self, region: &Arc<Region>) -> Result<Vec<Instance>, ProviderError> {
        let filters = [
            ("Filter.1.Name", "current-generation"),
            ("Filter.1.Value.1", "true"),
            ("Filter.2.Name", "instance-type"),
            ("Filter.2.Value.1", "g*"),
            ("Filter.2.Value.2", "p*"),
            ("Filter.3.Name", "supported-usage-class"),
            ("Filter.3.Value.1", "spot"),
        ];

        let mut instances = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut params: Vec<(String, String)> = filters
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect();
            if let Some(token) = &token {
                params.push(("NextToken".to_string(), token.clone()));
            }

            let page: DescribeInstanceTypesResponse = self
                .ec2_request(&region.name, "DescribeInstanceTypes", &params)
                .await?;

            for item in page.instance_type_set.items {
                let name = item.instance_type.clone();
                match Self::to_instance(item, region) {
                    Some(instance) => instances.push(instance),
                    None => debug!(instance = %name, "Skipping instance type without GPU"),
                }
            }

            token = next_page(page.next_token);
            if token.is_none() {
                break;
            }
        }

        debug!(region = %region.name, count = instances.len(), "Enumerated GPU instance types");
        Ok(instances)
    }

    async fn prices(
        &self,
        region: &Arc<Region>,
        instance: &Arc<Instance>,
    ) -> Result<Option<Prices>, ProviderError> {
        let start = (Utc::now() - chrono::Duration::hours(PRICE_WINDOW_HOURS))
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();

        let mut history = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut params = vec![
                ("InstanceType.1".to_string(), instance.name.clone()),
                (
                    "ProductDescription.1".to_string(),
                    PRODUCT_DESCRIPTION.to_string(),
                ),
                ("StartTime".to_string(), start.clone()),
            ];
            if let Some(token) = &token {
                params.push(("NextToken".to_string(), token.clone()));
            }

            let page: DescribeSpotPriceHistoryResponse = self
                .ec2_request(&region.name, "DescribeSpotPriceHistory", &params)
                .await?;

            history.extend(page.spot_price_history_set.items);

            token = next_page(page.next_token);
            if token.is_none() {
                break;
            }
        }

        summarize_prices(instance, &history)
    }
}
