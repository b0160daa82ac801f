//! Scoring and ranking.
//!
//! Ranking orders spot prices by throughput per dollar, best first, and
//! records each result's position and score relative to the best one.
//! Filtering afterwards keeps those values as computed for the full
//! population.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use super::filter::Filter;
use crate::types::Prices;

/// A scored and ranked spot price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    /// Position in the full ranking, 0 is best.
    pub index: usize,
    /// Highest index in the full ranking.
    pub index_max: usize,
    /// Ranked prices.
    pub prices: Arc<Prices>,
    /// Score divided by the best score.
    #[serde(rename = "score_relative_to_best")]
    pub relative: f64,
    /// Throughput-per-dollar index.
    pub score: f64,
}

impl fmt::Display for RankedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "🏅 {:2} / {:2}\t🔢 {:3.2}\t🔝 {:3.2}%\t{}",
            self.index,
            self.index_max,
            self.score,
            self.relative * 100.0,
            self.prices
        )
    }
}

/// Rank spot prices by score, best first.
///
/// Prices without a computable score (unknown or zero GPU throughput, or a
/// non-positive price) are left out with a warning. Equal scores keep
/// their input order.
#[must_use]
pub fn rank(records: &[Arc<Prices>]) -> Vec<RankedResult> {
    let mut scored: Vec<(f64, &Arc<Prices>)> = records
        .iter()
        .filter_map(|prices| match prices.score() {
            Some(score) => Some((score, prices)),
            None => {
                warn!(
                    instance = %prices.instance.name,
                    region = %prices.instance.region.name,
                    "Excluding instance without a computable score"
                );
                None
            }
        })
        .collect();

    scored.sort_by(|(a, _), (b, _)| b.total_cmp(a));

    let Some(&(top, _)) = scored.first() else {
        return Vec::new();
    };
    let index_max = scored.len() - 1;

    scored
        .into_iter()
        .enumerate()
        .map(|(index, (score, prices))| RankedResult {
            index,
            index_max,
            prices: Arc::clone(prices),
            relative: score / top,
            score,
        })
        .collect()
}

/// Keep the best `max` results that pass every filter.
///
/// Indices and relative scores are not recomputed.
#[must_use]
pub fn filter_and_limit(
    ranked: Vec<RankedResult>,
    filters: &[Filter],
    max: usize,
) -> Vec<RankedResult> {
    ranked
        .into_iter()
        .filter(|result| Filter::all(filters, &result.prices))
        .take(max)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Gpu, Instance, Region};

    fn prices(name: &str, fp32: Option<f64>, avg: f64) -> Arc<Prices> {
        Arc::new(Prices {
            instance: Arc::new(Instance {
                name: name.to_string(),
                vendor: "Intel".to_string(),
                arch: "x86_64".to_string(),
                clock_speed: 2.5,
                vcpus: 8,
                memory: 65_536,
                network: 25.0,
                region: Arc::new(Region::new("us-east-1", "aws", "ec2.us-east-1.amazonaws.com")),
                gpu: Gpu {
                    vendor: "NVIDIA".to_string(),
                    name: "X".to_string(),
                    count: 1,
                    memory: 81_920,
                    fp32,
                },
            }),
            avg,
            min: avg,
            max: avg,
            availability_zones: 1,
        })
    }

    fn names(results: &[RankedResult]) -> Vec<&str> {
        results
            .iter()
            .map(|r| r.prices.instance.name.as_str())
            .collect()
    }

    #[test]
    fn test_rank_two_records() {
        let records = vec![
            prices("a100", Some(19.49), 1.0),
            prices("h100", Some(66.91), 2.0),
        ];

        let ranked = rank(&records);

        assert_eq!(names(&ranked), ["h100", "a100"]);
        assert!((ranked[0].score - 33.455).abs() < 1e-9);
        assert!((ranked[1].score - 19.49).abs() < 1e-9);
        assert!((ranked[0].relative - 1.0).abs() < f64::EPSILON);
        assert!((ranked[1].relative - 19.49 / 33.455).abs() < 1e-9);
        assert!((ranked[1].relative - 0.582).abs() < 1e-3);
        assert_eq!(ranked[0].index, 0);
        assert_eq!(ranked[1].index, 1);
        assert_eq!(ranked[0].index_max, 1);
    }

    #[test]
    fn test_filter_keeps_original_rank() {
        let records = vec![
            prices("a100", Some(19.49), 1.0),
            prices("h100", Some(66.91), 2.0),
        ];

        let results = filter_and_limit(rank(&records), &[Filter::MaxPrice(1.5)], 10);

        assert_eq!(names(&results), ["a100"]);
        assert_eq!(results[0].index, 1);
        assert!((results[0].relative - 0.582).abs() < 1e-3);
    }

    #[test]
    fn test_rank_is_dense_and_relative_bounded() {
        let records: Vec<_> = (1..=25u32)
            .map(|i| prices(&format!("i{i}"), Some(f64::from(i % 7 + 1)), f64::from(i % 3 + 1)))
            .collect();

        let ranked = rank(&records);

        assert_eq!(ranked.len(), records.len());
        for (position, result) in ranked.iter().enumerate() {
            assert_eq!(result.index, position);
            assert_eq!(result.index_max, records.len() - 1);
            assert!(result.relative > 0.0 && result.relative <= 1.0);
        }
        assert_eq!(ranked[0].relative, 1.0);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_ties_keep_input_order() {
        let records = vec![
            prices("first", Some(10.0), 1.0),
            prices("second", Some(20.0), 2.0),
            prices("third", Some(5.0), 0.5),
        ];
        assert_eq!(names(&rank(&records)), ["first", "second", "third"]);
    }

    #[test]
    fn test_rank_excludes_unknown_throughput() {
        let records = vec![
            prices("unknown", None, 0.1),
            prices("known", Some(8.141), 0.5),
        ];

        let ranked = rank(&records);

        assert_eq!(names(&ranked), ["known"]);
        assert_eq!(ranked[0].index, 0);
        assert_eq!(ranked[0].relative, 1.0);
    }

    #[test]
    fn test_rank_excludes_zero_throughput() {
        let records = vec![
            prices("empty", Some(0.0), 1.0),
            prices("t4", Some(8.141), 0.5),
        ];

        let ranked = rank(&records);

        assert_eq!(names(&ranked), ["t4"]);
        assert_eq!(ranked[0].relative, 1.0);

        assert!(rank(&[prices("empty", Some(0.0), 1.0)]).is_empty());
    }

    #[test]
    fn test_empty_inputs() {
        assert!(rank(&[]).is_empty());
        assert!(filter_and_limit(Vec::new(), &[], 10).is_empty());

        let ranked = rank(&[prices("a", Some(1.0), 1.0)]);
        assert!(filter_and_limit(ranked, &[], 0).is_empty());
    }

    #[test]
    fn test_limit_applies_after_filtering() {
        let records: Vec<_> = (0..10u32)
            .map(|i| prices(&format!("i{i}"), Some(f64::from(10 - i)), if i % 2 == 0 { 1.0 } else { 5.0 }))
            .collect();
        let ranked = rank(&records);

        let results = filter_and_limit(ranked.clone(), &[Filter::MaxPrice(1.0)], 3);

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.prices.avg <= 1.0));
        for result in &results {
            let original = ranked.iter().find(|r| Arc::ptr_eq(&r.prices, &result.prices)).unwrap();
            assert_eq!(original.index, result.index);
            assert_eq!(original.relative, result.relative);
        }
        assert!(results.windows(2).all(|w| w[0].index < w[1].index));
    }

    #[test]
    fn test_display() {
        let ranked = rank(&[prices("g5.xlarge", Some(31.52), 1.0)]);
        let line = ranked[0].to_string();
        assert!(line.starts_with("🏅  0 /  0"));
        assert!(line.contains("100.00%"));
        assert!(line.contains("g5.xlarge"));
    }
}
