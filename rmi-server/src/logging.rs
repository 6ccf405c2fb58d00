use tracing_subscriber::EnvFilter;

// Module targets use the crates' underscored names, not the hyphenated
// package names.
const DEFAULT_FILTER: &str =
    "rmi_core=debug,rmi_transport=debug,rmi_server=debug,rmi_client=debug,warn";
const TEST_FILTER: &str =
    "rmi_core=trace,rmi_transport=trace,rmi_server=trace,rmi_client=trace,debug";

/// Initialize console logging for a serving process. `RUST_LOG` overrides
/// the default filter.
pub fn init_logging() -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;
    Ok(())
}

/// Initialize simple console-only logging for tests.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(TEST_FILTER)),
        )
        .try_init();
}
