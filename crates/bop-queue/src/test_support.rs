use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Installs an env-filtered fmt subscriber once per test binary. Set
/// `RUST_LOG=bop_queue=trace` to see park and wake records.
pub(crate) fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
