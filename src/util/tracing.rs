use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub type Result<T> = core::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub const DEFAULT_FILTER: &str = "stream_scout=debug,reqwest=info,info";

/// Installs the global subscriber. `RUST_LOG` replaces the default filter when set.
///
/// Output goes to stderr so it doesn't interleave with the roster printed on stdout.
pub fn build_subscriber() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .try_init()?;

    Ok(())
}
