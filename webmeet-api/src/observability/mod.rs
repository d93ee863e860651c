pub mod metrics;
pub mod metrics_middleware;
