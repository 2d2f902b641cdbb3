use std::env;

/// Application configuration. All values read from environment variables;
/// the four Supabase values are required, everything else has a default.
///
/// Environment variables:
/// - `HOST` / `PORT` — bind address (default: 0.0.0.0:8000)
/// - `CORS_ORIGINS` — comma-separated origins, or `*` (default: `*`)
/// - `SUPABASE_URL`, `SUPABASE_KEY`, `SUPABASE_SERVICE_KEY`, `SUPABASE_JWT_SECRET`
/// - `REDIS_URL` (default: redis://localhost:6379), `REDIS_PASSWORD`
/// - `MAX_MESSAGES_PER_MINUTE` — per-user send rate (default: 30)
/// - `MAX_CONNECTIONS_PER_IP` — concurrent sockets per client IP (default: 5)
/// - `MESSAGE_QUEUE_RETENTION` — offline queue TTL in seconds (default: 86400)
/// - `SOCKETIO_PING_TIMEOUT` / `SOCKETIO_PING_INTERVAL` — keepalive (default: 60 / 25)
/// - `TYPING_TIMEOUT` — seconds until a typing indicator expires (default: 10)
/// - `ENVIRONMENT` (default: production), `DEBUG` (default: false)
#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,
    pub debug: bool,
    pub environment: String,

    pub host: String,
    pub port: u16,
    pub cors_origins: String,

    pub supabase_url: String,
    pub supabase_key: String,
    pub supabase_service_key: String,
    pub supabase_jwt_secret: String,

    pub redis_url: String,
    pub redis_password: Option<String>,

    pub max_messages_per_minute: u32,
    pub max_connections_per_ip: usize,
    pub message_queue_retention: u64,

    pub ping_timeout: u64,
    pub ping_interval: u64,
    pub typing_timeout: u64,
}

/// A required environment variable was absent.
#[derive(Debug)]
pub struct MissingVar(pub &'static str);

impl std::fmt::Display for MissingVar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "missing required environment variable {}", self.0)
    }
}

impl std::error::Error for MissingVar {}

fn required(name: &'static str) -> Result<String, MissingVar> {
    env::var(name).ok().filter(|v| !v.is_empty()).ok_or(MissingVar(name))
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from the environment. Fails only when a required
    /// Supabase value is missing; the caller turns that into a fatal exit.
    pub fn from_env() -> Result<Self, MissingVar> {
        Ok(Config {
            app_name: env::var("APP_NAME").unwrap_or_else(|_| "Chat Backend".to_string()),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            debug: parsed_or("DEBUG", false),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "production".to_string()),

            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parsed_or("PORT", 8000),
            cors_origins: env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string()),

            supabase_url: required("SUPABASE_URL")?,
            supabase_key: required("SUPABASE_KEY")?,
            supabase_service_key: required("SUPABASE_SERVICE_KEY")?,
            supabase_jwt_secret: required("SUPABASE_JWT_SECRET")?,

            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            redis_password: env::var("REDIS_PASSWORD").ok().filter(|v| !v.is_empty()),

            max_messages_per_minute: parsed_or("MAX_MESSAGES_PER_MINUTE", 30),
            max_connections_per_ip: parsed_or("MAX_CONNECTIONS_PER_IP", 5),
            message_queue_retention: parsed_or("MESSAGE_QUEUE_RETENTION", 86_400),

            ping_timeout: parsed_or("SOCKETIO_PING_TIMEOUT", 60),
            ping_interval: parsed_or("SOCKETIO_PING_INTERVAL", 25),
            typing_timeout: parsed_or("TYPING_TIMEOUT", 10),
        })
    }

    /// A config suitable for tests: no environment reads, dummy secrets.
    pub fn for_tests() -> Self {
        Config {
            app_name: "Chat Backend".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            debug: false,
            environment: "test".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: "*".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_key: "test-anon-key".to_string(),
            supabase_service_key: "test-service-key".to_string(),
            supabase_jwt_secret: "test-jwt-secret".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            redis_password: None,
            max_messages_per_minute: 30,
            max_connections_per_ip: 5,
            message_queue_retention: 86_400,
            ping_timeout: 60,
            ping_interval: 25,
            typing_timeout: 10,
        }
    }

    /// Parsed CORS origins: `None` means allow any origin.
    pub fn cors_origin_list(&self) -> Option<Vec<String>> {
        if self.cors_origins.trim() == "*" {
            return None;
        }
        Some(
            self.cors_origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }
}
