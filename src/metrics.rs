use lazy_static::lazy_static;
use prometheus::{self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

lazy_static! {
    // Registry for holding metric state
    pub static ref REGISTRY: Registry = Registry::new();
    // Backing store lookups by provider kind and hit/miss
    pub static ref BACKING_STORE_LOOKUPS: IntCounterVec = IntCounterVec::new(
        Opts::new("backing_store_lookups", "The number of backing store entry lookups"),
        &["kind", "result"]
    ).expect("valid metric definition");
    // Provider builds from source files by provider kind
    pub static ref PROVIDER_BUILDS: IntCounterVec = IntCounterVec::new(
        Opts::new("provider_builds", "The number of providers built from source files"),
        &["kind"]
    ).expect("valid metric definition");
    // Provider build histogram by build time
    pub static ref PROVIDER_BUILD_TIME: HistogramVec = HistogramVec::new(
        HistogramOpts{
            common_opts: Opts::new("provider_build_time", "The time taken to build a provider from source files"),
            buckets: prometheus::DEFAULT_BUCKETS.to_vec(), // Change buckets here if desired
        },
        &["kind"],
    ).expect("valid metric definition");
}

/// Register all metrics with [REGISTRY]. Call once at startup.
pub fn register_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(BACKING_STORE_LOOKUPS.clone()))?;
    REGISTRY.register(Box::new(PROVIDER_BUILDS.clone()))?;
    REGISTRY.register(Box::new(PROVIDER_BUILD_TIME.clone()))?;
    Ok(())
}

/// Registered metrics in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!("failed to encode metrics: {}", err);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
