//! TOML configuration parsing and environment overrides.
//!
//! All sections carry serde defaults, so a near-empty file is a valid
//! configuration. Secrets (bot token, API keys) are normally supplied through
//! the environment and merged in by [`Config::apply_env`].

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub persona: PersonaConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    #[serde(default = "default_corpus_root")]
    pub root: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Soft cap on accumulated record text, in characters.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Wall-clock bound on one search. `0` disables it.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    #[serde(default = "default_reserved_keys")]
    pub reserved_keys: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_header")]
    pub header: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: default_corpus_root(),
            extension: default_extension(),
            max_chars: default_max_chars(),
            deadline_ms: default_deadline_ms(),
            reserved_keys: default_reserved_keys(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            header: default_header(),
        }
    }
}

fn default_corpus_root() -> PathBuf {
    PathBuf::from("data/5etools")
}
fn default_extension() -> String {
    "json".to_string()
}
fn default_max_chars() -> usize {
    8000
}
fn default_deadline_ms() -> u64 {
    2000
}
fn default_reserved_keys() -> Vec<String> {
    vec!["_meta".to_string(), "linkedFile".to_string()]
}
fn default_header() -> String {
    "DATI TECNICI DA 5ETOOLS (usa questi per rispondere con precisione):".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersonaConfig {
    #[serde(default = "default_persona_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_persona_files")]
    pub files: Vec<String>,
    #[serde(default = "default_preamble")]
    pub preamble: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            dir: default_persona_dir(),
            files: default_persona_files(),
            preamble: default_preamble(),
        }
    }
}

fn default_persona_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_persona_files() -> Vec<String> {
    vec![
        "SOUL.md".to_string(),
        "IDENTITY.md".to_string(),
        "USER.md".to_string(),
    ]
}
fn default_preamble() -> String {
    "Sei Codex20, un assistente digitale evoluto e Dungeon Master esperto. Rispondi in italiano.\n"
        .to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub api_keys: Vec<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            api_keys: Vec::new(),
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_timeout_secs() -> u64 {
    60
}

impl LlmConfig {
    /// The configured model, or the provider's default one.
    pub fn model_name(&self) -> &str {
        match (&self.model, self.provider.as_str()) {
            (Some(model), _) => model,
            (None, "groq") => "llama-3.3-70b-versatile",
            (None, "gemini") => "gemini-2.0-flash",
            (None, _) => "none",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub authorized_user_id: Option<i64>,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_max_reply_chars")]
    pub max_reply_chars: usize,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            authorized_user_id: None,
            poll_timeout_secs: default_poll_timeout_secs(),
            max_reply_chars: default_max_reply_chars(),
        }
    }
}

fn default_poll_timeout_secs() -> u64 {
    30
}
fn default_max_reply_chars() -> usize {
    4000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

impl Config {
    /// Merge overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Merge overrides using an arbitrary variable lookup.
    ///
    /// | Variable | Effect |
    /// |----------|--------|
    /// | `TELEGRAM_TOKEN` | `telegram.token` |
    /// | `AUTHORIZED_USER_ID` | `telegram.authorized_user_id` |
    /// | `GEMINI_API_KEYS` | `llm.api_keys` when the provider is `gemini` (comma-separated) |
    /// | `GROQ_API_KEY` | `llm.api_keys` when the provider is `groq` |
    /// | `PORT` | port of `server.bind` |
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TELEGRAM_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.telegram.token = Some(token.trim().to_string());
        }

        if let Some(id) = lookup("AUTHORIZED_USER_ID").filter(|v| !v.trim().is_empty()) {
            let id = id
                .trim()
                .parse::<i64>()
                .with_context(|| format!("AUTHORIZED_USER_ID is not a user id: '{}'", id))?;
            self.telegram.authorized_user_id = Some(id);
        }

        let keys_var = match self.llm.provider.as_str() {
            "gemini" => Some("GEMINI_API_KEYS"),
            "groq" => Some("GROQ_API_KEY"),
            _ => None,
        };
        if let Some(raw) = keys_var.and_then(|var| lookup(var)) {
            let keys = split_keys(&raw);
            if !keys.is_empty() {
                self.llm.api_keys = keys;
            }
        }

        if let Some(port) = lookup("PORT").filter(|p| !p.trim().is_empty()) {
            let port = port
                .trim()
                .parse::<u16>()
                .with_context(|| format!("PORT is not a port number: '{}'", port))?;
            let host = self
                .server
                .bind
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            self.server.bind = format!("{}:{}", host, port);
        }

        Ok(())
    }

    /// Check value ranges and known enumerations.
    pub fn validate(&self) -> Result<()> {
        if self.corpus.max_chars == 0 {
            bail!("corpus.max_chars must be > 0");
        }
        if self.corpus.extension.trim().is_empty() {
            bail!("corpus.extension must not be empty");
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            bail!("llm.temperature must be in [0.0, 2.0]");
        }
        if self.telegram.max_reply_chars == 0 {
            bail!("telegram.max_reply_chars must be > 0");
        }
        match self.llm.provider.as_str() {
            "disabled" | "gemini" | "groq" => {}
            other => bail!(
                "Unknown llm provider: '{}'. Must be disabled, gemini, or groq.",
                other
            ),
        }
        Ok(())
    }
}

fn split_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Where the CLI looks for its configuration when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./config/codex20.toml";

/// Read, parse, and validate a configuration file, then merge the environment.
pub fn load_config(path: &Path) -> Result<Config> {
    load_config_from(path, false, |key| std::env::var(key).ok())
}

/// Like [`load_config`], but when `optional` is set a missing file means
/// built-in defaults plus the environment.
pub fn load_config_or_default(path: &Path, optional: bool) -> Result<Config> {
    load_config_from(path, optional, |key| std::env::var(key).ok())
}

fn load_config_from<F>(path: &Path, optional: bool, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = if optional && !path.exists() {
        tracing::info!(path = %path.display(), "no config file, using defaults");
        Config::default()
    } else {
        parse_config_file(path)?
    };
    config.apply_env_from(lookup)?;
    config.validate()?;
    Ok(config)
}

/// Read and parse a configuration file without consulting the environment.
pub fn parse_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}
