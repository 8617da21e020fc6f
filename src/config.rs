use log::info;
use serde_derive::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::sync::atomic::{compiler_fence, Ordering};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::errors::Error;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Overwrite `bytes` with zeros. Volatile writes keep the stores from being
/// optimized away even when the buffer is freed right after.
pub(crate) fn wipe(bytes: &mut [u8]) {
    for byte in bytes.iter_mut() {
        // SAFETY: `byte` comes from a live `&mut [u8]`, so it is valid and aligned.
        unsafe { std::ptr::write_volatile(byte, 0) };
    }
    compiler_fence(Ordering::SeqCst);
}

/// Password held as sensitive material: never printed, wiped on drop.
/// Best effort: copies made before it was wrapped are out of reach.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Password {
        Password(password.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overwrite the password bytes with zeros and empty it.
    pub fn clear(&mut self) {
        let mut bytes = std::mem::take(&mut self.0).into_bytes();
        wipe(&mut bytes);
        drop(bytes);
    }
}

impl Drop for Password {
    fn drop(&mut self) {
        self.clear();
    }
}

impl Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Password(***)")
    }
}

impl From<&str> for Password {
    fn from(password: &str) -> Password {
        Password::new(password)
    }
}

/// Log output format.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Structured,
    Debug,
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let str = match *self {
            LogFormat::Text => "text",
            LogFormat::Structured => "structured",
            LogFormat::Debug => "debug",
        };
        write!(f, "{}", str)
    }
}

/// Connection and pool settings. Immutable once the client is built.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PgProperties {
    #[serde(default = "PgProperties::default_host")]
    pub host: String,

    #[serde(default = "PgProperties::default_port")]
    pub port: u16,

    #[serde(default = "PgProperties::default_username")]
    pub username: String,

    #[serde(default = "PgProperties::default_password")]
    pub password: Password,

    // Defaults to the username when empty.
    #[serde(default)]
    pub database: String,

    #[serde(default = "PgProperties::default_application_name")]
    pub application_name: String,

    #[serde(default = "PgProperties::default_min_pool_size")]
    pub min_pool_size: usize,

    #[serde(default = "PgProperties::default_max_pool_size")]
    pub max_pool_size: usize,

    // Acquire timeout, ms.
    #[serde(default = "PgProperties::default_timeout")]
    pub timeout: u64,

    // Connect + startup handshake timeout, ms. 0 disables it.
    #[serde(default = "PgProperties::default_connect_timeout")]
    pub connect_timeout: u64,

    #[serde(default = "PgProperties::default_tcp_keepalives_idle")]
    pub tcp_keepalives_idle: u64,
    #[serde(default = "PgProperties::default_tcp_keepalives_count")]
    pub tcp_keepalives_count: u32,
    #[serde(default = "PgProperties::default_tcp_keepalives_interval")]
    pub tcp_keepalives_interval: u64,
    #[serde(default = "PgProperties::default_tcp_so_linger")]
    pub tcp_so_linger: u64,
    #[serde(default = "PgProperties::default_tcp_no_delay")]
    pub tcp_no_delay: bool,

    #[serde(default = "PgProperties::default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

impl PgProperties {
    pub fn default_host() -> String {
        "localhost".into()
    }

    pub fn default_port() -> u16 {
        5432
    }

    pub fn default_username() -> String {
        "postgres".into()
    }

    pub fn default_password() -> Password {
        Password::new("postgres")
    }

    pub fn default_application_name() -> String {
        "pg_wire3".into()
    }

    pub fn default_min_pool_size() -> usize {
        10
    }

    pub fn default_max_pool_size() -> usize {
        100
    }

    pub fn default_timeout() -> u64 {
        5_000
    }

    pub fn default_connect_timeout() -> u64 {
        3_000
    }

    // These keepalive defaults should detect a dead connection within 30 seconds.
    pub fn default_tcp_keepalives_idle() -> u64 {
        5 // 5 seconds
    }

    pub fn default_tcp_keepalives_count() -> u32 {
        5 // 5 time
    }

    pub fn default_tcp_keepalives_interval() -> u64 {
        5 // 5 seconds
    }

    pub fn default_tcp_so_linger() -> u64 {
        0 // 0 seconds
    }

    pub fn default_tcp_no_delay() -> bool {
        true
    }

    pub fn default_log_level() -> String {
        "info".into()
    }

    /// The database to connect to: the configured one, or the username.
    pub fn database(&self) -> &str {
        if self.database.is_empty() {
            &self.username
        } else {
            &self.database
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        match self.connect_timeout {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.username.is_empty() {
            return Err(Error::BadConfig("username must not be empty".to_string()));
        }
        if self.min_pool_size == 0 {
            return Err(Error::BadConfig(
                "min_pool_size must be greater than 0".to_string(),
            ));
        }
        if self.min_pool_size > self.max_pool_size {
            return Err(Error::BadConfig(format!(
                "min_pool_size of {} cannot be larger than max_pool_size of {}",
                self.min_pool_size, self.max_pool_size
            )));
        }
        if self.timeout == 0 {
            return Err(Error::BadConfig("timeout must be greater than 0".to_string()));
        }
        Ok(())
    }

    /// Parse and validate properties from TOML.
    pub fn from_toml(contents: &str) -> Result<PgProperties, Error> {
        let props: PgProperties = match toml::from_str(contents) {
            Ok(props) => props,
            Err(err) => {
                return Err(Error::BadConfig(format!(
                    "Could not parse properties: {}",
                    err
                )));
            }
        };
        props.validate()?;
        Ok(props)
    }
}

impl Default for PgProperties {
    fn default() -> PgProperties {
        PgProperties {
            host: Self::default_host(),
            port: Self::default_port(),
            username: Self::default_username(),
            password: Self::default_password(),
            database: String::new(),
            application_name: Self::default_application_name(),
            min_pool_size: Self::default_min_pool_size(),
            max_pool_size: Self::default_max_pool_size(),
            timeout: Self::default_timeout(),
            connect_timeout: Self::default_connect_timeout(),
            tcp_keepalives_idle: Self::default_tcp_keepalives_idle(),
            tcp_keepalives_count: Self::default_tcp_keepalives_count(),
            tcp_keepalives_interval: Self::default_tcp_keepalives_interval(),
            tcp_so_linger: Self::default_tcp_so_linger(),
            tcp_no_delay: Self::default_tcp_no_delay(),
            log_level: Self::default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl Display for PgProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}@{}:{}/{}",
            self.username,
            self.host,
            self.port,
            self.database()
        )
    }
}

async fn load_file(path: &str) -> Result<String, Error> {
    let mut contents = String::new();
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(err) => {
            return Err(Error::BadConfig(format!(
                "Could not open '{}': {}",
                path, err
            )));
        }
    };
    match file.read_to_string(&mut contents).await {
        Ok(_) => (),
        Err(err) => {
            return Err(Error::BadConfig(format!(
                "Could not read config file {}: {}",
                path, err
            )));
        }
    };
    Ok(contents)
}

/// Load connection properties from a TOML file.
pub async fn load(path: &str) -> Result<PgProperties, Error> {
    let contents = load_file(path).await?;
    let props = PgProperties::from_toml(&contents)?;
    info!("Loaded connection properties for {} from {}", props, path);
    Ok(props)
}
