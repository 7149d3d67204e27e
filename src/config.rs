use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the signaling conductor.
#[derive(Debug, Clone)]
pub struct ConductorConfig {
    /// ICE server URI handed to the session engine for every session.
    pub ice_server: String,
    /// Name announced to the relay at sign-in.
    pub display_name: String,
    /// Sink for the legacy per-value stats records. Truncated at startup.
    pub legacy_stats_path: PathBuf,
    /// Sink for the modern attribute-dump stats records. Truncated at startup.
    pub modern_stats_path: PathBuf,
    /// Sleep between legacy stats polls.
    pub legacy_poll_interval: Duration,
    /// Delay between modern stats continuations.
    pub modern_poll_interval: Duration,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            ice_server: "stun:stun.l.google.com:19302".to_string(),
            display_name: default_display_name(),
            legacy_stats_path: PathBuf::from("legacy_output_stats.txt"),
            modern_stats_path: PathBuf::from("output_stats.txt"),
            legacy_poll_interval: Duration::from_millis(100),
            modern_poll_interval: Duration::from_secs(1),
        }
    }
}

impl ConductorConfig {
    /// Override the ICE server used for session creation.
    pub fn with_ice_server(mut self, uri: impl Into<String>) -> Self {
        self.ice_server = uri.into();
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }
}

fn default_display_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "peer".to_string())
}
