use std::env;
use std::path::PathBuf;
use std::time::Duration;

use super::cli::Cli;

/// Size of a single read from the archiver, matching what browsers handle well.
pub const DEFAULT_CHUNK_SIZE: usize = 100 * 1024;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub photos_dir: PathBuf,
    pub index_path: PathBuf,
    pub logging: bool,
    pub low_speed: bool,
    pub low_speed_delay_ms: u64,
    pub chunk_size: usize,
    pub archiver: String,
    pub read_idle_timeout_seconds: Option<u64>,
    pub cors_origins: Vec<String>,
    pub request_timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            photos_dir: PathBuf::from("test_photos"),
            index_path: PathBuf::from("index.html"),
            logging: false,
            low_speed: false,
            low_speed_delay_ms: 2000,
            chunk_size: DEFAULT_CHUNK_SIZE,
            archiver: "zip".to_string(),
            read_idle_timeout_seconds: None,
            cors_origins: vec!["*".to_string()],
            request_timeout_seconds: 30,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }

        if let Ok(port) = env::var("PORT") {
            if let Ok(port_num) = port.parse::<u16>() {
                config.port = port_num;
            }
        }

        if let Ok(photos_dir) = env::var("PHOTOS_DIR") {
            config.photos_dir = PathBuf::from(photos_dir);
        }

        if let Ok(index_path) = env::var("INDEX_PATH") {
            config.index_path = PathBuf::from(index_path);
        }

        if let Ok(logging) = env::var("ARCHIVE_LOGGING") {
            config.logging = parse_flag(&logging);
        }

        if let Ok(low_speed) = env::var("LOW_SPEED") {
            config.low_speed = parse_flag(&low_speed);
        }

        if let Ok(delay) = env::var("LOW_SPEED_DELAY_MS") {
            if let Ok(delay_ms) = delay.parse::<u64>() {
                config.low_speed_delay_ms = delay_ms;
            }
        }

        if let Ok(chunk_size) = env::var("CHUNK_SIZE") {
            match chunk_size.parse::<usize>() {
                Ok(size) if size > 0 => config.chunk_size = size,
                _ => tracing::warn!("Ignoring invalid CHUNK_SIZE: {}", chunk_size),
            }
        }

        if let Ok(archiver) = env::var("ARCHIVER") {
            config.archiver = archiver;
        }

        if let Ok(timeout) = env::var("READ_IDLE_TIMEOUT_SECONDS") {
            if let Ok(timeout_num) = timeout.parse::<u64>() {
                config.read_idle_timeout_seconds = Some(timeout_num).filter(|t| *t > 0);
            }
        }

        if let Ok(origins) = env::var("CORS_ORIGINS") {
            config.cors_origins = origins.split(',').map(|s| s.trim().to_string()).collect();
        }

        if let Ok(timeout) = env::var("REQUEST_TIMEOUT_SECONDS") {
            if let Ok(timeout_num) = timeout.parse::<u64>() {
                config.request_timeout_seconds = timeout_num;
            }
        }

        config
    }

    /// Command-line flags win over the environment. Boolean flags can only
    /// switch a mode on.
    pub fn with_cli(mut self, cli: &Cli) -> Self {
        if let Some(host) = &cli.host {
            self.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(path) = &cli.path {
            self.photos_dir = path.clone();
        }
        if let Some(index) = &cli.index {
            self.index_path = index.clone();
        }
        self.logging |= cli.logging;
        self.low_speed |= cli.low_speed;
        self
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Pause inserted after every chunk, only when low-speed simulation is on.
    pub fn throttle_delay(&self) -> Option<Duration> {
        self.low_speed
            .then(|| Duration::from_millis(self.low_speed_delay_ms))
    }

    pub fn read_idle_timeout(&self) -> Option<Duration> {
        self.read_idle_timeout_seconds.map(Duration::from_secs)
    }

    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|origin| origin == "*")
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
