mod client;
mod server;

pub use client::{Session, TestClient, bom_line, colorway, measurement, test_config};
pub use server::{FakeServer, Op, ResponseShape};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "techpack_engine=debug,techpack_storage=debug";

/// Install a test-friendly subscriber once per process. Later calls are
/// no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
