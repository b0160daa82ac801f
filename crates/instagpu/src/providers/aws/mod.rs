//! AWS EC2 spot provider.
//!
//! Implements the [`Provider`](crate::providers::Provider) trait on top of
//! the EC2 Query API:
//!
//! - **Regions** - `DescribeRegions`, opted-in regions only
//! - **Instances** - `DescribeInstanceTypes`, current-generation `g*`/`p*`
//!   types that support the spot usage class
//! - **Prices** - `DescribeSpotPriceHistory`, `Linux/UNIX` over the last week
//!
//! ## Example
//!
//! ```ignore
//! use instagpu::providers::aws::{Aws, Credentials};
//! use instagpu::providers::Provider;
//!
//! let provider = Aws::new(Credentials::new(access_key_id, secret_access_key), "us-east-1")?;
//!
//! let regions = provider.regions().await?;
//! ```

mod client;
mod models;
mod signing;

pub use client::{summarize_prices, Aws, NAME};
pub use models::SpotPriceItem;
pub use signing::Credentials;
