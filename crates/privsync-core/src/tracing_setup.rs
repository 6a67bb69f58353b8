use std::fs::OpenOptions;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install the global subscriber.
///
/// Console output goes to stderr, filtered by `PRIVSYNC_LOG` (default `info`).
/// Setting `PRIVSYNC_LOG_FILE` additionally appends debug-level logs to that file.
pub fn init_tracing_with_service(service_name: &str) {
    let console_filter =
        EnvFilter::try_from_env("PRIVSYNC_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter);

    let registry = tracing_subscriber::registry().with(console);

    let file_logging = std::env::var("PRIVSYNC_LOG_FILE").ok();
    let file = file_logging.as_ref().and_then(|log_path| {
        match OpenOptions::new().create(true).append(true).open(log_path) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Failed to open log file {}: {}", log_path, e);
                None
            }
        }
    });

    if let Some(file) = file {
        let file_layer = fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_filter(tracing_subscriber::filter::LevelFilter::DEBUG);

        let _ = registry.with(file_layer).try_init();
    } else {
        let _ = registry.try_init();
    }

    tracing::debug!("tracing initialized for {}", service_name);
}
