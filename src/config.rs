use crate::error::{AppError, AppResult};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_DATA_DIR: &str = "database";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_AI_TIMEOUT_SECS: u64 = 30;
const SESSION_DURATION: u64 = 24 * 60 * 60; // 24 hours in seconds

/// Runtime configuration of the server
///
/// Values come from the process environment, optionally seeded from a `.env` file.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interface to bind the HTTP listener on
    pub host: String,

    /// TCP port for the HTTP listener
    pub port: u16,

    /// Directory holding `users.json`, `files.json` and the `uploads/` folder
    pub data_dir: PathBuf,

    /// Gemini API key; AI insights are disabled when absent
    pub gemini_api_key: Option<String>,

    /// Gemini model name used for `generateContent`
    pub gemini_model: String,

    /// Base URL of the Gemini REST API
    pub gemini_endpoint: String,

    /// Secret that promotes registrations to the admin role
    pub admin_secret: Option<String>,

    /// Upper bound for a single text-generation call
    pub ai_timeout: Duration,

    /// Ask the generator for tagged JSON sections instead of free text
    pub structured_output: bool,

    /// Lifetime of a login session
    pub session_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            gemini_api_key: None,
            gemini_model: DEFAULT_MODEL.to_string(),
            gemini_endpoint: DEFAULT_ENDPOINT.to_string(),
            admin_secret: None,
            ai_timeout: Duration::from_secs(DEFAULT_AI_TIMEOUT_SECS),
            structured_output: true,
            session_ttl: Duration::from_secs(SESSION_DURATION),
        }
    }
}

impl Config {
    /// Load configuration from `.env` and the process environment
    ///
    /// # Errors
    /// * Returns `AppError::Config` if a numeric or boolean variable cannot be parsed
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        Ok(Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parse_var("PORT")?.unwrap_or(defaults.port),
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            gemini_api_key: non_empty_var("GEMINI_API_KEY"),
            gemini_model: non_empty_var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_endpoint: non_empty_var("GEMINI_ENDPOINT")
                .unwrap_or(defaults.gemini_endpoint),
            admin_secret: non_empty_var("ADMIN_SECRET"),
            ai_timeout: parse_var("AI_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.ai_timeout),
            structured_output: parse_var("AI_STRUCTURED_OUTPUT")?
                .unwrap_or(defaults.structured_output),
            session_ttl: defaults.session_ttl,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &str) -> AppResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AppError::Config(format!("{name}={raw}: {e}"))),
        None => Ok(None),
    }
}
