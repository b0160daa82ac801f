//! Spot GPU provider implementations.
//!
//! This module contains the [`Provider`] trait and implementations
//! for cloud providers offering spot GPU instances.

pub mod aws;
pub mod traits;

pub use traits::{Provider, ProviderError};
