//! Concurrent gathering of spot prices from providers.
//!
//! ```text
//! gather
//!  └─ per provider: regions()                       (sequential)
//!      └─ per region                                (region JoinSet)
//!          ├─ latency task: RegionProber::measure
//!          └─ instance task: instances()
//!              └─ per instance                      (nested JoinSet)
//!                  └─ price task: prices() -> push into shared results
//! ```
//!
//! All tasks share one [`CancellationToken`]. The first failing task cancels
//! it; sibling tasks observe the cancellation and stop, and their
//! cancellation errors are discarded in favour of the original failure.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Database;
use crate::devices::DeviceRegistry;
use crate::latency::{LatencyError, RegionProber};
use crate::providers::{Provider, ProviderError};
use crate::types::{Instance, Prices, Region};

/// Default cap on simultaneous price lookups.
pub const DEFAULT_MAX_CONCURRENT_PRICES: usize = 32;

/// Errors that abort a gather.
#[derive(Error, Debug)]
pub enum GatherError {
    /// A provider call failed.
    #[error("Provider {provider} failed: {source}")]
    Provider {
        provider: String,
        #[source]
        source: ProviderError,
    },

    /// Measuring region latency failed.
    #[error("Failed to measure latency of region {region}: {source}")]
    Latency {
        region: String,
        #[source]
        source: LatencyError,
    },

    /// A task panicked or was aborted.
    #[error("Gather task failed: {0}")]
    Task(String),

    /// The gather was cancelled.
    #[error("Gather cancelled")]
    Cancelled,
}

impl GatherError {
    /// Whether this error only reflects cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::Latency {
                    source: LatencyError::Cancelled,
                    ..
                }
        )
    }
}

/// Gather tuning.
#[derive(Debug, Clone)]
pub struct GatherOptions {
    /// Maximum number of price lookups in flight.
    pub max_concurrent_prices: usize,
}

impl Default for GatherOptions {
    fn default() -> Self {
        Self {
            max_concurrent_prices: DEFAULT_MAX_CONCURRENT_PRICES,
        }
    }
}

/// Builds a [`Database`] by querying providers concurrently.
#[derive(Clone, Default)]
pub struct Gatherer {
    registry: Arc<DeviceRegistry>,
    prober: RegionProber,
    options: GatherOptions,
}

/// State shared by every task of one gather.
struct Shared {
    registry: Arc<DeviceRegistry>,
    prober: RegionProber,
    results: Mutex<Vec<Arc<Prices>>>,
    permits: Semaphore,
    cancel: CancellationToken,
}

impl Gatherer {
    /// Create a gatherer with the default registry, TCP prober and options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different capability registry.
    #[must_use]
    pub fn with_registry(mut self, registry: DeviceRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Use a different latency prober.
    #[must_use]
    pub fn with_prober(mut self, prober: RegionProber) -> Self {
        self.prober = prober;
        self
    }

    /// Override tuning options.
    #[must_use]
    pub fn with_options(mut self, options: GatherOptions) -> Self {
        self.options = options;
        self
    }

    /// Gather spot prices for every GPU instance type of every provider.
    ///
    /// Cancelling `cancel` aborts the gather. No partial database is returned
    /// on failure.
    ///
    /// # Errors
    /// Returns the first provider, latency or task failure.
    pub async fn gather(
        &self,
        providers: &[Arc<dyn Provider>],
        cancel: &CancellationToken,
    ) -> Result<Database, GatherError> {
        let shared = Arc::new(Shared {
            registry: Arc::clone(&self.registry),
            prober: self.prober.clone(),
            results: Mutex::new(Vec::new()),
            permits: Semaphore::new(self.options.max_concurrent_prices.max(1)),
            cancel: cancel.child_token(),
        });
        let mut tasks = JoinSet::new();

        for provider in providers {
            info!(provider = %provider.name(), "Enumerating regions");

            let regions = guarded(&shared.cancel, provider.regions())
                .await
                .and_then(|r| r.map_err(|source| provider_error(provider.as_ref(), source)));
            let regions = match regions {
                Ok(regions) => regions,
                Err(err) => {
                    shared.cancel.cancel();
                    // A task that already failed takes precedence over the
                    // cancellation it caused here.
                    let joined = join_all(&mut tasks, &shared.cancel).await;
                    return match joined {
                        Err(first) if err.is_cancelled() => Err(first),
                        _ => Err(err),
                    };
                }
            };

            debug!(provider = %provider.name(), count = regions.len(), "Regions enumerated");

            for region in regions {
                let region = Arc::new(region);

                tasks.spawn(cancel_on_error(
                    shared.cancel.clone(),
                    measure_region(Arc::clone(&shared), Arc::clone(&region)),
                ));
                tasks.spawn(cancel_on_error(
                    shared.cancel.clone(),
                    gather_region(Arc::clone(&shared), Arc::clone(provider), region),
                ));
            }
        }

        debug!(tasks = tasks.len(), "Waiting for results");
        join_all(&mut tasks, &shared.cancel).await?;

        let records = std::mem::take(&mut *shared.results.lock().await);
        info!(records = records.len(), "Gather complete");
        Ok(Database::new(records))
    }
}

impl Database {
    /// Gather a fresh database with a default [`Gatherer`].
    ///
    /// # Errors
    /// Returns the first provider, latency or task failure.
    pub async fn gather(
        providers: &[Arc<dyn Provider>],
        cancel: &CancellationToken,
    ) -> Result<Self, GatherError> {
        Gatherer::new().gather(providers, cancel).await
    }
}

async fn measure_region(shared: Arc<Shared>, region: Arc<Region>) -> Result<(), GatherError> {
    shared
        .prober
        .measure(&region, &shared.cancel)
        .await
        .map(|_| ())
        .map_err(|source| GatherError::Latency {
            region: region.name.clone(),
            source,
        })
}

async fn gather_region(
    shared: Arc<Shared>,
    provider: Arc<dyn Provider>,
    region: Arc<Region>,
) -> Result<(), GatherError> {
    debug!(provider = %provider.name(), region = %region.name, "Gathering instances");

    let instances = guarded(&shared.cancel, provider.instances(&region))
        .await?
        .map_err(|source| provider_error(provider.as_ref(), source))?;

    let mut prices = JoinSet::new();
    for mut instance in instances {
        if shared.registry.measure(&mut instance.gpu).is_none() {
            warn!(
                region = %region.name,
                instance = %instance.name,
                "GPU throughput unknown"
            );
        }

        prices.spawn(cancel_on_error(
            shared.cancel.clone(),
            gather_prices(
                Arc::clone(&shared),
                Arc::clone(&provider),
                Arc::clone(&region),
                Arc::new(instance),
            ),
        ));
    }

    join_all(&mut prices, &shared.cancel).await
}

async fn gather_prices(
    shared: Arc<Shared>,
    provider: Arc<dyn Provider>,
    region: Arc<Region>,
    instance: Arc<Instance>,
) -> Result<(), GatherError> {
    let _permit = guarded(&shared.cancel, shared.permits.acquire())
        .await?
        .map_err(|_| GatherError::Cancelled)?;

    debug!(region = %region.name, instance = %instance.name, "Gathering prices");

    let prices = guarded(&shared.cancel, provider.prices(&region, &instance))
        .await?
        .map_err(|source| provider_error(provider.as_ref(), source))?;

    match prices {
        Some(prices) => shared.results.lock().await.push(Arc::new(prices)),
        None => debug!(
            region = %region.name,
            instance = %instance.name,
            "No live spot offer"
        ),
    }
    Ok(())
}

/// Race `future` against cancellation.
async fn guarded<F: Future>(cancel: &CancellationToken, future: F) -> Result<F::Output, GatherError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(GatherError::Cancelled),
        output = future => Ok(output),
    }
}

/// Cancel siblings as soon as `future` fails for a reason other than
/// cancellation.
async fn cancel_on_error<F>(cancel: CancellationToken, future: F) -> Result<(), GatherError>
where
    F: Future<Output = Result<(), GatherError>>,
{
    let result = future.await;
    if let Err(err) = &result {
        if !err.is_cancelled() {
            cancel.cancel();
        }
    }
    result
}

/// Wait for every task, returning the first real error.
///
/// Cancellation errors only win if nothing else failed.
async fn join_all(
    tasks: &mut JoinSet<Result<(), GatherError>>,
    cancel: &CancellationToken,
) -> Result<(), GatherError> {
    let mut first: Option<GatherError> = None;

    while let Some(joined) = tasks.join_next().await {
        let result = joined.unwrap_or_else(|e| Err(GatherError::Task(e.to_string())));
        let Err(err) = result else { continue };

        cancel.cancel();
        match &first {
            None => first = Some(err),
            Some(current) if current.is_cancelled() && !err.is_cancelled() => first = Some(err),
            Some(_) => debug!(error = %err, "Discarding error after cancellation"),
        }
    }

    first.map_or(Ok(()), Err)
}

fn provider_error(provider: &dyn Provider, source: ProviderError) -> GatherError {
    GatherError::Provider {
        provider: provider.name().to_string(),
        source,
    }
}
