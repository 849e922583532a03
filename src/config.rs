//! Service locations and timings, from flags or the environment (`.env` is
//! loaded first).
use std::time::Duration;

use clap::Args;

pub const DEFAULT_BACKEND_URL:   &str = "http://localhost:8101";
pub const DEFAULT_TRANSPORT_URL: &str = "ws://localhost:8101";

/* ------------ backend ------------ */
#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8101")]
    pub bind: String,

    #[arg(long, env = "JWT_SECRET", default_value = "secret")]
    pub jwt_secret: String,

    /// Lifetime of issued room tokens.
    #[arg(long, env = "TOKEN_TTL_SECS", default_value_t = 60)]
    pub token_ttl_secs: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind:           "0.0.0.0:8101".into(),
            jwt_secret:     "secret".into(),
            token_ttl_secs: 60,
        }
    }
}

/* ------------ client ------------ */
#[derive(Debug, Clone, Args)]
pub struct ClientConfig {
    #[arg(long, env = "BACKEND_URL", default_value = DEFAULT_BACKEND_URL)]
    pub backend_url: String,

    #[arg(long, env = "TRANSPORT_URL", default_value = DEFAULT_TRANSPORT_URL)]
    pub transport_url: String,

    /// Pause between disconnect and reconnect.
    #[arg(long = "reconnect-delay-ms", value_parser = parse_millis, default_value = "1000")]
    pub reconnect_delay: Duration,

    /// Delay before the post-increment metadata log line.
    #[arg(long = "diagnostic-delay-ms", value_parser = parse_millis, default_value = "1000")]
    pub diagnostic_delay: Duration,

    #[arg(long = "connect-timeout-ms", value_parser = parse_millis, default_value = "10000")]
    pub connect_timeout: Duration,

    #[arg(long = "request-timeout-ms", value_parser = parse_millis, default_value = "10000")]
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url:      DEFAULT_BACKEND_URL.into(),
            transport_url:    DEFAULT_TRANSPORT_URL.into(),
            reconnect_delay:  Duration::from_secs(1),
            diagnostic_delay: Duration::from_secs(1),
            connect_timeout:  Duration::from_secs(10),
            request_timeout:  Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// `{backend_url}/{path}` without doubled slashes.
    pub fn backend_endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.backend_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

fn parse_millis(s: &str) -> Result<Duration, std::num::ParseIntError> {
    s.parse().map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        client: ClientConfig,
    }

    #[test]
    fn endpoint_joins_cleanly() {
        let cfg = ClientConfig { backend_url: "http://api.local/".into(), ..Default::default() };
        assert_eq!(cfg.backend_endpoint("/create-room"), "http://api.local/create-room");
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "client",
            "--backend-url", "http://10.0.0.2:9000",
            "--reconnect-delay-ms", "250",
        ]).unwrap();
        assert_eq!(cli.client.backend_url, "http://10.0.0.2:9000");
        assert_eq!(cli.client.reconnect_delay, Duration::from_millis(250));
        assert_eq!(cli.client.diagnostic_delay, Duration::from_secs(1));
    }
}
