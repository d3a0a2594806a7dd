//! Test doubles and helpers for exercising the runtime without PostgreSQL.

mod mock;

pub use mock::{MockLeaseStore, ResignCall};

/// Initialize tracing output for tests. Safe to call repeatedly.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
