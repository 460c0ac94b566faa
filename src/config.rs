// Application configuration, loaded from environment variables and CLI flags.

/// Fallback used when `REDIS_URL` is not set.
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379/0";

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Key-value store connection URL.
    pub redis_url: String,
    /// Address to bind the HTTP server to.
    pub bind_addr: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `REDIS_URL` - store connection URL (default: `redis://localhost:6379/0`)
    /// - `BIND_ADDR` - listen address (default: `0.0.0.0`)
    /// - `PORT` - HTTP server port (default: 5000)
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();

        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());

        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string());

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(&args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| std::env::var("PORT").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(5000);

        Config {
            redis_url,
            bind_addr,
            port,
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

/// Where the store client connects, for startup logging. The password
/// itself is never kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEndpoint {
    pub addr: String,
    pub db: i64,
    pub has_password: bool,
}

impl From<&redis::ConnectionInfo> for StoreEndpoint {
    fn from(info: &redis::ConnectionInfo) -> Self {
        StoreEndpoint {
            addr: info.addr.to_string(),
            db: info.redis.db,
            has_password: info.redis.password.is_some(),
        }
    }
}

impl std::fmt::Display for StoreEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.db)?;
        if self.has_password {
            write!(f, " (auth)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(url: &str) -> StoreEndpoint {
        let client = redis::Client::open(url).unwrap();
        StoreEndpoint::from(client.get_connection_info())
    }

    #[test]
    fn test_endpoint_default_url() {
        let ep = endpoint(DEFAULT_REDIS_URL);
        assert_eq!(
            ep,
            StoreEndpoint {
                addr: "localhost:6379".into(),
                db: 0,
                has_password: false,
            }
        );
    }

    #[test]
    fn test_endpoint_with_password_and_db() {
        let ep = endpoint("redis://:s3cret@cache.internal:6380/4");
        assert_eq!(ep.addr, "cache.internal:6380");
        assert_eq!(ep.db, 4);
        assert!(ep.has_password);
        assert_eq!(ep.to_string(), "cache.internal:6380/4 (auth)");
        assert!(!ep.to_string().contains("s3cret"));
    }

    #[test]
    fn test_endpoint_defaults_port_and_db() {
        let ep = endpoint("redis://redis");
        assert_eq!(ep.addr, "redis:6379");
        assert_eq!(ep.db, 0);
    }

    #[test]
    fn test_endpoint_accepts_ipv6_host() {
        let ep = endpoint("redis://[::1]/0");
        assert_eq!(ep.db, 0);
        assert!(ep.addr.ends_with(":6379"));
        assert!(ep.addr.contains("::1"));
    }

    #[test]
    fn test_bad_urls_rejected_by_client() {
        assert!(redis::Client::open("http://localhost").is_err());
        assert!(redis::Client::open("redis://localhost/zero").is_err());
    }

    #[test]
    fn test_parse_cli_port() {
        let args: Vec<String> = ["bin", "--port", "8080"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            Config::parse_cli_value(&args, "--port").as_deref(),
            Some("8080")
        );
        assert_eq!(Config::parse_cli_value(&args, "--other"), None);
    }
}
