//! Prometheus metrics for the permission engine
//!
//! All metrics live in [`REGISTRY`]; [`gather_metrics`] renders them in the
//! text exposition format for whatever scrape endpoint the host exposes.

use prometheus::{
    register_counter_vec_with_registry, register_histogram_vec_with_registry, CounterVec,
    Encoder, HistogramVec, Registry, TextEncoder,
};

/// Global metrics registry
pub static REGISTRY: std::sync::LazyLock<Registry> = std::sync::LazyLock::new(Registry::new);

/// Parsed-permission cache operations
pub mod cache {
    use super::{register_counter_vec_with_registry, CounterVec, REGISTRY};

    /// Cache hit counter (`mode` = point | batch)
    pub static PARSED_PERMISSION_HITS: std::sync::LazyLock<CounterVec> =
        std::sync::LazyLock::new(|| {
            register_counter_vec_with_registry!(
                "parsed_permission_cache_hits_total",
                "Parsed-permission rows served from the cache",
                &["mode"],
                REGISTRY.clone()
            )
            .expect("Failed to register PARSED_PERMISSION_HITS")
        });

    /// Cache miss counter (`mode` = point | batch)
    pub static PARSED_PERMISSION_MISSES: std::sync::LazyLock<CounterVec> =
        std::sync::LazyLock::new(|| {
            register_counter_vec_with_registry!(
                "parsed_permission_cache_misses_total",
                "Parsed-permission rows that had to be resolved",
                &["mode"],
                REGISTRY.clone()
            )
            .expect("Failed to register PARSED_PERMISSION_MISSES")
        });

    /// Deleted rows by invalidation reason
    pub static INVALIDATED_ROWS: std::sync::LazyLock<CounterVec> =
        std::sync::LazyLock::new(|| {
            register_counter_vec_with_registry!(
                "parsed_permission_invalidated_rows_total",
                "Parsed-permission rows deleted by invalidation",
                &["reason"],
                REGISTRY.clone()
            )
            .expect("Failed to register INVALIDATED_ROWS")
        });
}

/// Resolution work
pub mod resolution {
    use super::{
        register_counter_vec_with_registry, register_histogram_vec_with_registry, CounterVec,
        HistogramVec, REGISTRY,
    };

    /// Resolutions performed (`kind` = user | forum)
    pub static RESOLUTIONS_TOTAL: std::sync::LazyLock<CounterVec> =
        std::sync::LazyLock::new(|| {
            register_counter_vec_with_registry!(
                "permission_resolutions_total",
                "Permission resolutions computed from source data",
                &["kind"],
                REGISTRY.clone()
            )
            .expect("Failed to register RESOLUTIONS_TOTAL")
        });

    /// Resolution latency including storage round trips
    pub static RESOLUTION_DURATION: std::sync::LazyLock<HistogramVec> =
        std::sync::LazyLock::new(|| {
            register_histogram_vec_with_registry!(
                "permission_resolution_duration_seconds",
                "Permission resolution duration in seconds",
                &["kind"],
                REGISTRY.clone()
            )
            .expect("Failed to register RESOLUTION_DURATION")
        });
}

/// Authorization decisions
pub mod authorization {
    use super::{register_counter_vec_with_registry, CounterVec, REGISTRY};

    pub static DECISIONS_TOTAL: std::sync::LazyLock<CounterVec> =
        std::sync::LazyLock::new(|| {
            register_counter_vec_with_registry!(
                "authorization_decisions_total",
                "Authorization decisions by resource type and outcome",
                &["resource", "outcome"],
                REGISTRY.clone()
            )
            .expect("Failed to register DECISIONS_TOTAL")
        });

    pub fn record(resource: &str, allowed: bool) {
        DECISIONS_TOTAL
            .with_label_values(&[resource, if allowed { "allow" } else { "deny" }])
            .inc();
    }
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_recorded_metrics() {
        authorization::record("thread", true);
        cache::PARSED_PERMISSION_HITS.with_label_values(&["point"]).inc();

        let text = gather_metrics();
        assert!(text.contains("authorization_decisions_total"));
        assert!(text.contains("parsed_permission_cache_hits_total"));
    }
}
