//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `HD_LOG_LEVEL`: Log-Level oder Filter-Direktive (z.B. `huddle_crypto=debug`), Standard: info
//! - `HD_LOG_FORMAT`: Format (text/json), Standard: text
//!
//! Umgebungsvariablen haben Vorrang vor den Werten aus der Konfiguration.

use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_LEVEL_VAR: &str = "HD_LOG_LEVEL";
pub const LOG_FORMAT_VAR: &str = "HD_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Schlaegt fehl, wenn bereits ein globaler Subscriber gesetzt ist.
pub fn logging_initialisieren(level: &str, format: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_VAR)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format_env = std::env::var(LOG_FORMAT_VAR).unwrap_or_else(|_| format.to_string());

    let ergebnis = match format_env.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        _ => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    ergebnis.map_err(|e| anyhow::anyhow!("Logging konnte nicht initialisiert werden: {e}"))
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
