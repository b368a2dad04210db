use crate::reconnect::ReconnectPolicy;

/// Client configuration parsed from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Host (and optional port) serving the game, e.g. `play.example.com`.
    pub host: String,
    /// Whether the hosting page is served over an encrypted transport.
    pub secure: bool,
    /// Backoff applied after the socket drops.
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = ReconnectPolicy::default();
        ClientConfig {
            host: std::env::var("PARTY_HOST").unwrap_or_else(|_| "localhost:8080".to_string()),
            secure: std::env::var("PARTY_SECURE")
                .ok()
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            reconnect: ReconnectPolicy {
                max_attempts: env_parse("PARTY_WS_MAX_RECONNECT_ATTEMPTS")
                    .unwrap_or(defaults.max_attempts),
                base_delay_ms: env_parse("PARTY_WS_RECONNECT_BASE_MS")
                    .unwrap_or(defaults.base_delay_ms),
                max_delay_ms: env_parse("PARTY_WS_RECONNECT_MAX_MS")
                    .unwrap_or(defaults.max_delay_ms),
            },
        }
    }

    /// `ws` or `wss`, following the page's transport security.
    pub fn scheme(&self) -> &'static str {
        if self.secure { "wss" } else { "ws" }
    }

    /// Socket endpoint for a room.
    pub fn ws_url(&self, room: &str) -> String {
        format!("{}://{}/ws?room={room}", self.scheme(), self.host)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: "localhost:8080".to_string(),
            secure: false,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
