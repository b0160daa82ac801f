//! The spot price database.
//!
//! A [`Database`] is the flat list of spot prices produced by a gather. It is
//! the unit of persistence and the input to ranking.

mod filter;
mod gather;
mod rank;
mod snapshot;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::Prices;

pub use filter::Filter;
pub use gather::{GatherError, GatherOptions, Gatherer, DEFAULT_MAX_CONCURRENT_PRICES};
pub use rank::{filter_and_limit, rank, RankedResult};
pub use snapshot::SnapshotError;

/// Gathered spot prices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Database(Vec<Arc<Prices>>);

impl Database {
    /// Wrap gathered records.
    #[must_use]
    pub fn new(records: Vec<Arc<Prices>>) -> Self {
        Self(records)
    }

    /// All records, in gather order.
    #[must_use]
    pub fn records(&self) -> &[Arc<Prices>] {
        &self.0
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the database is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Rank every record, best first.
    #[must_use]
    pub fn rank(&self) -> Vec<RankedResult> {
        rank(&self.0)
    }

    /// Rank, then keep the best `max` results that pass every filter.
    #[must_use]
    pub fn filter(&self, max: usize, filters: &[Filter]) -> Vec<RankedResult> {
        filter_and_limit(self.rank(), filters, max)
    }
}

impl FromIterator<Prices> for Database {
    fn from_iter<I: IntoIterator<Item = Prices>>(iter: I) -> Self {
        Self(iter.into_iter().map(Arc::new).collect())
    }
}
