//! Runtime configuration: `PANEL_*` environment variables with defaults,
//! overridden by a few command-line flags.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_DB_PATH: &str = "panel.db";
pub const DEV_JWT_SECRET: &str = "dev-jwt-secret-change-in-production";

const USAGE: &str =
    "Usage: panel_agent [--port PORT|-p PORT|--port=PORT] [--db PATH|--db=PATH] [-h|--help]";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgsError {
    #[error("{0}")]
    Help(String),
    #[error("{0}\n{}", USAGE)]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind: IpAddr,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub cpu_interval: Duration,
    /// `None` leaves collection to an external scheduler hitting `/api/metrics/save`.
    pub collect_interval: Option<Duration>,
    pub collect_token: Option<String>,
    /// Seeded as an admin when no users exist yet.
    pub admin_seed: Option<(String, String)>,
    pub bcrypt_cost: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            cpu_interval: Duration::from_millis(1_000),
            collect_interval: None,
            collect_token: None,
            admin_seed: None,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

fn parse_num<T: std::str::FromStr>(v: Option<String>) -> Option<T> {
    v.and_then(|s| s.trim().parse().ok())
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.is_empty())
}

impl Config {
    /// Resolve from environment variables through `lookup`; unparsable
    /// values fall back to the defaults.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let d = Config::default();
        let collect_secs: u64 = parse_num(lookup("PANEL_COLLECT_INTERVAL_SECS")).unwrap_or(0);
        let admin_seed = match (
            non_empty(lookup("PANEL_ADMIN_USER")),
            non_empty(lookup("PANEL_ADMIN_PASSWORD")),
        ) {
            (Some(u), Some(p)) => Some((u, p)),
            _ => None,
        };
        Self {
            bind: parse_num(lookup("PANEL_BIND")).unwrap_or(d.bind),
            port: parse_num(lookup("PANEL_PORT")).unwrap_or(d.port),
            db_path: non_empty(lookup("PANEL_DB_PATH"))
                .map(PathBuf::from)
                .unwrap_or(d.db_path),
            jwt_secret: non_empty(lookup("PANEL_JWT_SECRET")).unwrap_or(d.jwt_secret),
            cpu_interval: parse_num(lookup("PANEL_CPU_SAMPLE_MS"))
                .map(Duration::from_millis)
                .unwrap_or(d.cpu_interval),
            collect_interval: (collect_secs > 0).then(|| Duration::from_secs(collect_secs)),
            collect_token: non_empty(lookup("PANEL_COLLECT_TOKEN")),
            admin_seed,
            bcrypt_cost: parse_num(lookup("PANEL_BCRYPT_COST")).unwrap_or(d.bcrypt_cost),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Environment first, then command-line overrides.
    pub fn load<I: IntoIterator<Item = String>>(args: I) -> Result<Self, ArgsError> {
        let mut cfg = Self::from_env();
        cfg.apply_args(args)?;
        Ok(cfg)
    }

    pub fn apply_args<I: IntoIterator<Item = String>>(&mut self, args: I) -> Result<(), ArgsError> {
        let mut it = args.into_iter();
        let _ = it.next(); // program name
        while let Some(a) = it.next() {
            match a.as_str() {
                "-h" | "--help" => return Err(ArgsError::Help(USAGE.to_string())),
                "--port" | "-p" => self.port = port_value(it.next())?,
                "--db" => {
                    self.db_path = it
                        .next()
                        .map(PathBuf::from)
                        .ok_or_else(|| ArgsError::Invalid("--db needs a path".into()))?
                }
                _ if a.starts_with("--port=") => {
                    self.port = port_value(a.split_once('=').map(|(_, v)| v.to_string()))?
                }
                _ if a.starts_with("--db=") => {
                    if let Some((_, v)) = a.split_once('=') {
                        self.db_path = PathBuf::from(v);
                    }
                }
                other => return Err(ArgsError::Invalid(format!("unexpected argument {other:?}"))),
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

fn port_value(v: Option<String>) -> Result<u16, ArgsError> {
    let v = v.ok_or_else(|| ArgsError::Invalid("--port needs a value".into()))?;
    v.parse()
        .map_err(|_| ArgsError::Invalid(format!("invalid port {v:?}")))
}
