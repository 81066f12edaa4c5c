#![allow(dead_code)]

use keel_core::{df, DataFrame, ExecutionConfig, ExecutionContext};
use std::sync::Once;

static TRACING: Once = Once::new();

/// Installs a test subscriber once per binary. Set `KEEL_LOG=debug` to see
/// plan and operator events.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_env("KEEL_LOG")
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A context that splits even small inputs across `workers` threads.
pub fn parallel_ctx(workers: usize) -> ExecutionContext {
    ExecutionContext::new(&ExecutionConfig {
        max_workers: Some(workers),
        min_rows_for_parallel: 0,
        morsel_size: 16,
        ..ExecutionConfig::default()
    })
    .unwrap()
}

pub fn employees() -> DataFrame {
    df!(
        "name" => ["ana", "bo", "cy", "di", "ed", "flo"],
        "dept" => ["eng", "ops", "eng", "sales", "ops", "eng"],
        "salary" => [120.0, 80.0, 100.0, 70.0, 90.0, 110.0],
        "years" => [Some(5), Some(2), None, Some(7), Some(1), Some(3)],
    )
    .unwrap()
}
