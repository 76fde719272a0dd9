#![allow(dead_code)]

use std::sync::Once;

use tracing_subscriber::EnvFilter;

pub const ROUND: usize = 10_000;

pub fn setup_log() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .with_test_writer()
            .try_init();
    });
}

/// Lets every spawned task on a paused current-thread runtime run until it
/// parks. The clock only auto-advances once all tasks are idle.
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
}
