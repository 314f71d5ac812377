//! Logging setup for the scenario binaries.

use tracing::Level;

/// Installs the fmt subscriber at INFO, `RUST_LOG` overrides it.
///
/// ```bash
/// RUST_LOG=uwb_pose_graph=debug cargo run
/// ```
pub fn init_logger() {
    init_logger_with_level(Level::INFO)
}

pub fn init_logger_with_level(default_level: Level) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();
}
