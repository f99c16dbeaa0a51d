use once_cell::sync::OnceCell;
use tracing_subscriber::{EnvFilter, fmt};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Output layout of the subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable, one event per line.
    #[default]
    Text,
    /// Structured JSON, one object per line (production).
    Json,
}

impl LogFormat {
    /// `APP_ENV=production` selects JSON, anything else plain text.
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV").unwrap_or_default().as_str() {
            "production" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Install the global subscriber. Safe to call more than once; only the
/// first call has an effect.
pub fn init_logger(service_name: &'static str, format: LogFormat) {
    LOGGER_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let builder = fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_span_events(fmt::format::FmtSpan::CLOSE)
            .with_writer(std::io::stderr);

        // A subscriber may already be installed by a test harness.
        let installed = match format {
            LogFormat::Json => builder.json().try_init().is_ok(),
            LogFormat::Text => builder.try_init().is_ok(),
        };

        if installed {
            tracing::info!(service = service_name, ?format, "logger initialized");
        }
    });
}
