//! Provider trait and common error type.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Instance, Prices, Region};

/// Errors that can occur during provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response body could not be decoded.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),

    /// Response contained an unexpected value.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Trait for spot GPU providers.
///
/// Implementations own credentials, pagination and API error translation.
/// Callers cancel an operation by dropping its future.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider identifier (e.g., "aws").
    fn name(&self) -> &str;

    /// List the regions available to the account.
    async fn regions(&self) -> Result<Vec<Region>, ProviderError>;

    /// List GPU instance types offered as spot in `region`.
    async fn instances(&self, region: &Arc<Region>) -> Result<Vec<Instance>, ProviderError>;

    /// Summarize recent spot prices of `instance` in `region`.
    ///
    /// Returns `None` when there is no live spot offer.
    async fn prices(
        &self,
        region: &Arc<Region>,
        instance: &Arc<Instance>,
    ) -> Result<Option<Prices>, ProviderError>;
}
