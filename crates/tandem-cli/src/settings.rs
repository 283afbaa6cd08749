//! Configuration file handling for tandem.
//!
//! Looks for `.config/tandem.toml` in the current directory or any parent
//! directory, then layers `TANDEM_*` environment variables on top
//! (`TANDEM_LEFT__PASSWORD` sets `left.password`).

use std::fmt;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use tandem::ConnectParams;
use thiserror::Error;

const CONFIG_FILE: &str = ".config/tandem.toml";

/// Settings for one comparison run.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default)]
    pub left: DatabaseSettings,
    #[serde(default)]
    pub right: DatabaseSettings,
}

fn default_schema() -> String {
    "public".to_string()
}

/// Connection settings for one side.
#[derive(Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub dbname: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            label: None,
            host: default_host(),
            port: default_port(),
            dbname: String::new(),
            user: String::new(),
            password: None,
        }
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("label", &self.label)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl DatabaseSettings {
    fn to_params(&self) -> ConnectParams {
        ConnectParams {
            host: self.host.clone(),
            port: self.port,
            dbname: self.dbname.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
        }
    }
}

/// Command-line values that take precedence over the file and environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub schema: Option<String>,
    pub left_url: Option<String>,
    pub right_url: Option<String>,
}

/// One database, ready to connect.
#[derive(Debug, Clone)]
pub struct Target {
    pub label: String,
    pub params: ConnectParams,
}

/// Everything needed to run a comparison.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub schema: String,
    pub left: Target,
    pub right: Target,
}

/// Load settings, searching up from the current directory unless `explicit`
/// names a file. Returns the file that was used, if any.
pub fn load(explicit: Option<&Path>) -> Result<(Settings, Option<PathBuf>), ConfigError> {
    let path = match explicit {
        Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
        Some(path) => Some(path.to_path_buf()),
        None => {
            let cwd = std::env::current_dir()?;
            find_config_file(&cwd)
        }
    };
    let settings = build(path.as_deref(), environment())?;
    Ok((settings, path))
}

fn environment() -> Environment {
    Environment::with_prefix("TANDEM")
        .prefix_separator("_")
        .separator("__")
}

fn build(path: Option<&Path>, env: Environment) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).format(FileFormat::Toml));
    }
    builder
        .add_source(env)
        .build()
        .and_then(Config::try_deserialize)
        .map_err(|source| ConfigError::Parse {
            path: path.map(Path::to_path_buf),
            source,
        })
}

/// Find `.config/tandem.toml` by searching up the directory tree.
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

impl Settings {
    /// Apply command-line overrides and check both sides can be connected to.
    pub fn resolve(self, overrides: Overrides) -> Result<Resolved, ConfigError> {
        let left = resolve_side("left", self.left, overrides.left_url.as_deref())?;
        let right = resolve_side("right", self.right, overrides.right_url.as_deref())?;
        Ok(Resolved {
            schema: overrides.schema.unwrap_or(self.schema),
            left,
            right,
        })
    }
}

fn resolve_side(
    side: &'static str,
    settings: DatabaseSettings,
    url: Option<&str>,
) -> Result<Target, ConfigError> {
    let params = match url {
        Some(url) => ConnectParams::from_url(url).map_err(|source| ConfigError::InvalidUrl {
            side,
            url: mask_password(url),
            source,
        })?,
        None => settings.to_params(),
    };
    if params.user.is_empty() {
        return Err(ConfigError::Incomplete { side });
    }
    Ok(Target {
        label: settings.label.unwrap_or_else(|| side.to_string()),
        params,
    })
}

/// Mask passwords in a connection string for display.
///
/// Covers the `user:password@` part of a URL, `password=` query parameters,
/// and `password=` keywords (quoted or not) in key=value strings.
pub fn mask_password(url: &str) -> String {
    mask_password_keywords(&mask_userinfo(url))
}

fn mask_userinfo(url: &str) -> String {
    if let Some(start) = url.find("://") {
        if let Some(at) = url.rfind('@') {
            if at > start {
                let prefix = &url[..start + 3];
                let suffix = &url[at..];
                if let Some(colon) = url[start + 3..at].find(':') {
                    let user = &url[start + 3..start + 3 + colon];
                    return format!("{prefix}{user}:***{suffix}");
                }
            }
        }
    }
    url.to_string()
}

fn mask_password_keywords(conn: &str) -> String {
    const KEY: &str = "password";
    let bytes = conn.as_bytes();
    let mut masked = String::with_capacity(conn.len());
    let mut copied = 0;
    let mut search = 0;

    while let Some(found) = conn[search..].find(KEY) {
        let key_start = search + found;
        let mut i = key_start + KEY.len();
        search = i;

        // Only a whole keyword counts: `old_password=` is left alone.
        let at_boundary = key_start == 0
            || matches!(bytes[key_start - 1], b'?' | b'&')
            || bytes[key_start - 1].is_ascii_whitespace();
        if !at_boundary {
            continue;
        }
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes.get(i) != Some(&b'=') {
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let value_start = i;
        if bytes.get(i) == Some(&b'\'') {
            i += 1;
            while i < bytes.len() && bytes[i] != b'\'' {
                i += if bytes[i] == b'\\' { 2 } else { 1 };
            }
            i = (i + 1).min(bytes.len());
        } else {
            while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'&' {
                i += 1;
            }
        }

        masked.push_str(&conn[copied..value_start]);
        masked.push_str("***");
        copied = i;
        search = i;
    }
    masked.push_str(&conn[copied..]);
    masked
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file {} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to load configuration{}: {source}", path_suffix(.path))]
    Parse {
        path: Option<PathBuf>,
        #[source]
        source: config::ConfigError,
    },

    #[error("invalid --{side}-url {url}: {source}")]
    InvalidUrl {
        side: &'static str,
        url: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("no user for the {side} database; set [{side}] in .config/tandem.toml or --{side}-url")]
    Incomplete { side: &'static str },
}

fn path_suffix(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" from {}", path.display()),
        None => String::new(),
    }
}
