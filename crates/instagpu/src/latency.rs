//! Region latency probing.
//!
//! A [`RegionProber`] sends a fixed number of echo probes to a region's
//! endpoint and records `{min, avg, max}` on the region. The echo itself is
//! pluggable through [`EchoProbe`]; [`TcpEcho`] times a TCP handshake, which
//! needs no raw-socket privileges.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::{lookup_host, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::{Latency, Region};

/// Number of probes per region.
pub const PROBE_COUNT: usize = 3;

/// Default port for TCP echo probes.
const DEFAULT_PORT: u16 = 443;

/// Default timeout for a single probe.
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Errors that can occur while probing a region.
#[derive(Error, Debug)]
pub enum LatencyError {
    /// Endpoint could not be resolved.
    #[error("Failed to resolve endpoint {endpoint}: {source}")]
    Resolve {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// Probe could not be executed.
    #[error("Failed to probe endpoint {endpoint}: {source}")]
    Probe {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// Probe did not complete in time.
    #[error("Probe to {endpoint} timed out after {timeout_ms}ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// Region latency was already recorded.
    #[error("Latency for region {0} was already measured")]
    AlreadyMeasured(String),

    /// Probing was cancelled.
    #[error("Latency probe cancelled")]
    Cancelled,
}

/// A single round-trip measurement against an endpoint.
#[async_trait]
pub trait EchoProbe: Send + Sync {
    /// Measure one round trip to `endpoint`.
    async fn echo(&self, endpoint: &str) -> Result<Duration, LatencyError>;
}

/// Echo probe timing a TCP handshake.
#[derive(Debug, Clone)]
pub struct TcpEcho {
    port: u16,
    timeout: Duration,
}

impl Default for TcpEcho {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl TcpEcho {
    /// Create a probe against port 443.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe a different port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the per-probe timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn resolve(&self, host: &str) -> Result<SocketAddr, LatencyError> {
        let resolve_err = |source| LatencyError::Resolve {
            endpoint: host.to_string(),
            source,
        };

        lookup_host((host, self.port))
            .await
            .map_err(resolve_err)?
            .next()
            .ok_or_else(|| resolve_err(io::Error::new(io::ErrorKind::NotFound, "no addresses")))
    }
}

#[async_trait]
impl EchoProbe for TcpEcho {
    async fn echo(&self, endpoint: &str) -> Result<Duration, LatencyError> {
        let host = host_of(endpoint);
        let addr = self.resolve(host).await?;

        let start = Instant::now();
        match tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => Ok(start.elapsed()),
            Ok(Err(source)) => Err(LatencyError::Probe {
                endpoint: host.to_string(),
                source,
            }),
            Err(_) => Err(LatencyError::Timeout {
                endpoint: host.to_string(),
                timeout_ms: millis(self.timeout),
            }),
        }
    }
}

/// Whole milliseconds, saturating.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Strip a URL scheme and path from an endpoint, leaving the host.
fn host_of(endpoint: &str) -> &str {
    let rest = endpoint
        .split_once("://")
        .map_or(endpoint, |(_, rest)| rest);
    rest.split('/').next().unwrap_or(rest)
}

impl Latency {
    /// Reduce round-trip samples to whole-millisecond `{min, avg, max}`.
    #[must_use]
    pub fn from_samples(samples: &[Duration]) -> Self {
        let Some(min) = samples.iter().min() else {
            return Self::default();
        };
        let max = samples.iter().max().unwrap_or(min);
        let total: Duration = samples.iter().sum();
        let count = u32::try_from(samples.len()).unwrap_or(u32::MAX);

        Self {
            min: millis(*min),
            avg: millis(total / count),
            max: millis(*max),
        }
    }
}

/// Measures and records region latency.
#[derive(Clone)]
pub struct RegionProber {
    probe: Arc<dyn EchoProbe>,
    count: usize,
}

impl Default for RegionProber {
    fn default() -> Self {
        Self::new(TcpEcho::default())
    }
}

impl RegionProber {
    /// Create a prober sending [`PROBE_COUNT`] probes per region.
    pub fn new(probe: impl EchoProbe + 'static) -> Self {
        Self {
            probe: Arc::new(probe),
            count: PROBE_COUNT,
        }
    }

    /// Override the number of probes (at least one).
    #[must_use]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count.max(1);
        self
    }

    /// Probe `region` and record its latency.
    ///
    /// # Errors
    /// Returns an error if any probe fails, if `cancel` fires, or if the
    /// region was already measured. Nothing is recorded on failure.
    pub async fn measure(
        &self,
        region: &Region,
        cancel: &CancellationToken,
    ) -> Result<Latency, LatencyError> {
        debug!(region = %region.name, endpoint = %region.endpoint, "Measuring latency");

        let mut samples = Vec::with_capacity(self.count);
        for _ in 0..self.count {
            let rtt = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(LatencyError::Cancelled),
                rtt = self.probe.echo(&region.endpoint) => rtt?,
            };
            samples.push(rtt);
        }

        let latency = Latency::from_samples(&samples);
        region
            .set_latency(latency)
            .map_err(|_| LatencyError::AlreadyMeasured(region.name.clone()))?;

        debug!(
            region = %region.name,
            min_ms = latency.min,
            avg_ms = latency.avg,
            max_ms = latency.max,
            "Latency measured"
        );
        Ok(latency)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use tokio::net::TcpListener;

    use super::*;

    /// Replays 10ms, 20ms, 30ms, ...
    struct SteppedEcho {
        calls: AtomicU64,
    }

    #[async_trait]
    impl EchoProbe for SteppedEcho {
        async fn echo(&self, _endpoint: &str) -> Result<Duration, LatencyError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Duration::from_millis(n * 10))
        }
    }

    struct FailingEcho;

    #[async_trait]
    impl EchoProbe for FailingEcho {
        async fn echo(&self, endpoint: &str) -> Result<Duration, LatencyError> {
            Err(LatencyError::Probe {
                endpoint: endpoint.to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
            })
        }
    }

    struct HangingEcho;

    #[async_trait]
    impl EchoProbe for HangingEcho {
        async fn echo(&self, _endpoint: &str) -> Result<Duration, LatencyError> {
            std::future::pending().await
        }
    }

    fn region() -> Region {
        Region::new("us-west-2", "aws", "ec2.us-west-2.amazonaws.com")
    }

    #[test]
    fn test_from_samples() {
        let latency = Latency::from_samples(&[
            Duration::from_micros(12_900),
            Duration::from_micros(30_100),
            Duration::from_micros(21_000),
        ]);
        assert_eq!(
            latency,
            Latency {
                min: 12,
                avg: 21,
                max: 30
            }
        );
        assert_eq!(Latency::from_samples(&[]), Latency::default());
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_micros(12_999)), 12);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("ec2.us-east-1.amazonaws.com"), "ec2.us-east-1.amazonaws.com");
        assert_eq!(host_of("https://ec2.us-east-1.amazonaws.com/"), "ec2.us-east-1.amazonaws.com");
    }

    #[tokio::test]
    async fn test_measure_records_latency() {
        let prober = RegionProber::new(SteppedEcho {
            calls: AtomicU64::new(0),
        });
        let region = region();

        let latency = prober
            .measure(&region, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            latency,
            Latency {
                min: 10,
                avg: 20,
                max: 30
            }
        );
        assert_eq!(region.latency(), latency);
    }

    #[tokio::test]
    async fn test_measure_twice_is_rejected() {
        let prober = RegionProber::new(SteppedEcho {
            calls: AtomicU64::new(0),
        });
        let region = region();
        let cancel = CancellationToken::new();

        prober.measure(&region, &cancel).await.unwrap();
        let err = prober.measure(&region, &cancel).await.unwrap_err();
        assert!(matches!(err, LatencyError::AlreadyMeasured(name) if name == "us-west-2"));
    }

    #[tokio::test]
    async fn test_failed_probe_records_nothing() {
        let prober = RegionProber::new(FailingEcho);
        let region = region();

        let err = prober
            .measure(&region, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LatencyError::Probe { .. }));
        assert!(!region.is_measured());
    }

    #[tokio::test]
    async fn test_cancelled_probe() {
        let prober = RegionProber::new(HangingEcho);
        let region = region();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = prober.measure(&region, &cancel).await.unwrap_err();
        assert!(matches!(err, LatencyError::Cancelled));
        assert!(!region.is_measured());
    }

    #[tokio::test]
    async fn test_tcp_echo_against_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((_socket, _)) = listener.accept().await {}
        });

        let prober = RegionProber::new(TcpEcho::new().with_port(port));
        let region = Region::new("local", "test", "127.0.0.1");

        let latency = prober
            .measure(&region, &CancellationToken::new())
            .await
            .unwrap();
        assert!(latency.min <= latency.avg && latency.avg <= latency.max);
        assert!(region.is_measured());
    }
}
