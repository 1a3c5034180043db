//! Operator-facing summary of response cache health.

use serde::Serialize;

use crate::cache::CacheStats;

/// Qualitative label for a cache hit rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Efficiency {
    /// No lookups recorded yet
    Idle,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl Efficiency {
    pub fn classify(stats: &CacheStats) -> Self {
        if stats.lookups() == 0 {
            return Efficiency::Idle;
        }
        match stats.hit_rate {
            80.. => Efficiency::Excellent,
            60..=79 => Efficiency::Good,
            40..=59 => Efficiency::Fair,
            _ => Efficiency::Poor,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheReport {
    pub stats: CacheStats,
    pub efficiency: Efficiency,
    pub recommendations: Vec<String>,
}

impl CacheReport {
    pub fn from_stats(stats: CacheStats) -> Self {
        let efficiency = Efficiency::classify(&stats);
        let mut recommendations = Vec::new();

        match efficiency {
            Efficiency::Idle => {
                recommendations.push("No cache lookups recorded yet".to_string());
            }
            Efficiency::Poor => {
                recommendations.push(
                    "Hit rate is below 40%; consider longer TTLs for stable resources".to_string(),
                );
                recommendations.push(
                    "Check that equivalent queries normalize to the same cache key".to_string(),
                );
            }
            Efficiency::Fair => {
                recommendations
                    .push("Hit rate is moderate; review TTLs of frequently read resources".to_string());
            }
            Efficiency::Good | Efficiency::Excellent => {}
        }

        if stats.size >= stats.max_entries {
            recommendations.push(
                "Cache is at capacity; consider raising CACHE_MAX_ENTRIES to reduce evictions"
                    .to_string(),
            );
        }

        if recommendations.is_empty() {
            recommendations.push("Cache is performing well".to_string());
        }

        Self {
            stats,
            efficiency,
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(hits: u64, misses: u64, size: usize, max_entries: usize) -> CacheStats {
        let total = hits + misses;
        CacheStats {
            size,
            hits,
            misses,
            hit_rate: if total == 0 {
                0
            } else {
                ((hits as f64 / total as f64) * 100.0).round() as u32
            },
            max_entries,
        }
    }

    #[test]
    fn test_efficiency_thresholds() {
        assert_eq!(Efficiency::classify(&stats(0, 0, 0, 10)), Efficiency::Idle);
        assert_eq!(Efficiency::classify(&stats(8, 2, 0, 10)), Efficiency::Excellent);
        assert_eq!(Efficiency::classify(&stats(6, 4, 0, 10)), Efficiency::Good);
        assert_eq!(Efficiency::classify(&stats(4, 6, 0, 10)), Efficiency::Fair);
        assert_eq!(Efficiency::classify(&stats(39, 61, 0, 10)), Efficiency::Poor);
    }

    #[test]
    fn test_poor_cache_at_capacity_gets_recommendations() {
        let report = CacheReport::from_stats(stats(1, 9, 10, 10));
        assert_eq!(report.efficiency, Efficiency::Poor);
        assert_eq!(report.recommendations.len(), 3);
        assert!(report.recommendations[2].contains("CACHE_MAX_ENTRIES"));
    }

    #[test]
    fn test_healthy_cache_report() {
        let report = CacheReport::from_stats(stats(90, 10, 3, 10));
        assert_eq!(report.efficiency, Efficiency::Excellent);
        assert_eq!(report.recommendations, vec!["Cache is performing well"]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["efficiency"], "excellent");
        assert_eq!(json["stats"]["hitRate"], 90);
    }
}
