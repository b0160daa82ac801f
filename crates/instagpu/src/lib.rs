//! Spot GPU discovery and ranking.
//!
//! This crate finds spot-priced GPU instances across cloud regions and ranks
//! them by GPU throughput per dollar.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   regions / instances / prices   ┌────────────────────┐
//! │  Providers   │ ───────────────────────────────► │  Gatherer          │
//! │  (AWS, ...)  │                                  │  • latency probes  │
//! └──────────────┘                                  │  • GPU throughput  │
//!                                                   └─────────┬──────────┘
//!                                                             │ Database
//!                              ┌──────────────────┐           ▼
//!                              │  Snapshot (JSON) │ ◄──► rank → filter → limit
//!                              └──────────────────┘
//! ```
//!
//! ## Supported Providers
//!
//! - **AWS** - EC2 spot instances of the `g*` and `p*` families
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use instagpu::database::{Database, Filter};
//! use instagpu::providers::aws::{Aws, Credentials};
//! use tokio_util::sync::CancellationToken;
//!
//! let aws = Aws::new(Credentials::new(access_key_id, secret_access_key), "us-east-1")?;
//! let db = Database::gather(&[Arc::new(aws)], &CancellationToken::new()).await?;
//!
//! for result in db.filter(10, &[Filter::MaxPrice(2.0)]) {
//!     println!("{result}");
//! }
//! ```

pub mod database;
pub mod devices;
pub mod latency;
pub mod providers;
pub mod types;

pub use database::{Database, Filter, GatherError, Gatherer, RankedResult, SnapshotError};
pub use devices::DeviceRegistry;
pub use latency::{EchoProbe, LatencyError, RegionProber, TcpEcho};
pub use providers::{Provider, ProviderError};
pub use types::{Gpu, Instance, Latency, Prices, Region};
