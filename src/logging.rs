use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Install the global log subscriber.
///
/// `filter` uses `EnvFilter` directives (`info`, `pcmbridge::stream=debug`,
/// ...). An empty filter defers to `RUST_LOG`, then to `info`. Logs go to
/// `logfile` if given, stderr otherwise. Calling this again after a
/// subscriber is installed does nothing.
pub fn init(filter: &str, logfile: Option<&Path>) -> anyhow::Result<()> {
    let filter = if filter.trim().is_empty() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::try_new(filter)
            .map_err(|e| anyhow::anyhow!("bad log filter {:?}: {}", filter, e))?
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true);

    let result = match logfile {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| anyhow::anyhow!("could not open log file {}: {}", path.display(), e))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    if result.is_err() {
        tracing::debug!("log subscriber already installed");
    }
    Ok(())
}
