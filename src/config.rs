//! Configuration for voxbrief.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (VOXBRIEF_HOME, VOXBRIEF_API_KEY / OPENAI_API_KEY,
//!    VOXBRIEF_API_BASE)
//! 2. Config file (.voxbrief/config.yaml)
//! 3. Defaults (~/.voxbrief)
//!
//! Config file discovery:
//! - Searches current directory and parents for .voxbrief/config.yaml
//! - Paths in config file are relative to the .voxbrief/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Deserialize;

use crate::api::ChunkLimits;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Shortest allowed session validity window
pub const MIN_SESSION_WINDOW_MINUTES: u32 = 15;

/// Longest allowed session validity window
pub const MAX_SESSION_WINDOW_MINUTES: u32 = 60;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub api: Option<ApiConfig>,
    #[serde(default)]
    pub refresh: Option<RefreshConfig>,
    #[serde(default)]
    pub inbox: Option<InboxConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .voxbrief/)
    pub home: Option<String>,
    /// Directory scanned for new recordings (relative to .voxbrief/)
    pub inbox: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    pub transcription_model: Option<String>,
    pub extraction_model: Option<String>,
    pub digest_model: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub language: Option<String>,
    pub chunking: Option<ChunkLimits>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    pub session_window_minutes: Option<u32>,
    /// Offset of the local calendar, e.g. "+02:00"
    pub utc_offset: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboxConfig {
    pub extensions: Option<Vec<String>>,
    pub stability_delay_secs: Option<u64>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to voxbrief home (journal, state)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub api: ApiSettings,
    pub refresh: RefreshSettings,
    pub inbox: InboxSettings,
}

impl ResolvedConfig {
    /// Journal file holding notes, extractions, summaries and state
    pub fn journal_path(&self) -> PathBuf {
        self.home.join("journal.jsonl")
    }
}

/// Remote API settings
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub transcription_model: String,
    pub extraction_model: String,
    pub digest_model: String,
    pub timeout_seconds: u64,
    pub language: Option<String>,
    pub chunking: ChunkLimits,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            transcription_model: "whisper-1".to_string(),
            extraction_model: "gpt-4o-mini".to_string(),
            digest_model: "gpt-4o-mini".to_string(),
            timeout_seconds: 120,
            language: None,
            chunking: ChunkLimits::default(),
        }
    }
}

/// Tier policy settings
#[derive(Debug, Clone, Copy)]
pub struct RefreshSettings {
    /// Session validity window in minutes (15 to 60)
    pub session_window_minutes: u32,
    /// Fixed offset for the local calendar; `None` follows the system
    /// time zone, including daylight saving changes
    pub utc_offset: Option<FixedOffset>,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            session_window_minutes: 30,
            utc_offset: None,
        }
    }
}

impl RefreshSettings {
    pub fn session_window(&self) -> Duration {
        Duration::minutes(i64::from(self.session_window_minutes))
    }

    /// Local calendar date of an instant
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        match self.utc_offset {
            Some(offset) => now.with_timezone(&offset).date_naive(),
            None => now.with_timezone(&Local).date_naive(),
        }
    }

    /// The instant a local calendar date begins
    pub fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_time(NaiveTime::MIN);
        if let Some(offset) = self.utc_offset {
            return (midnight - Duration::seconds(i64::from(offset.local_minus_utc()))).and_utc();
        }
        // A DST jump can skip local midnight; the day then starts at the
        // first hour that exists
        (0..=3)
            .find_map(|h| {
                Local
                    .from_local_datetime(&(midnight + Duration::hours(h)))
                    .earliest()
            })
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| midnight.and_utc())
    }

    /// Label for the configured calendar
    pub fn calendar_label(&self) -> String {
        match self.utc_offset {
            Some(offset) => offset.to_string(),
            None => format!("system local ({})", Local::now().offset()),
        }
    }
}

/// Inbox scanner settings
#[derive(Debug, Clone)]
pub struct InboxSettings {
    pub path: PathBuf,
    pub extensions: Vec<String>,
    pub stability_delay_secs: u64,
}

impl InboxSettings {
    /// Default extensions and stability delay for an inbox at `path`
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            extensions: default_extensions(),
            stability_delay_secs: 5,
        }
    }
}

fn default_extensions() -> Vec<String> {
    ["m4a", "mp3", "wav", "ogg", "webm"]
        .iter()
        .map(|e| e.to_string())
        .collect()
}

/// Clamp a session window to the supported range
pub fn clamp_session_window(minutes: u32) -> u32 {
    minutes.clamp(MIN_SESSION_WINDOW_MINUTES, MAX_SESSION_WINDOW_MINUTES)
}

/// Parse "+HH:MM", "-HH:MM", "+HHMM", "Z" or "UTC"
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).context("Invalid UTC offset");
    }

    let (sign, rest) = match value.chars().next() {
        Some('+') => (1, &value[1..]),
        Some('-') => (-1, &value[1..]),
        _ => anyhow::bail!("UTC offset must start with '+' or '-': {}", value),
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        anyhow::bail!("UTC offset must look like +HH:MM: {}", value);
    }

    let hours: i32 = digits[..2].parse()?;
    let minutes: i32 = digits[2..].parse()?;
    if hours > 23 || minutes > 59 {
        anyhow::bail!("UTC offset out of range: {}", value);
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .with_context(|| format!("Invalid UTC offset: {}", value))
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".voxbrief").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".voxbrief");

    resolve(find_config_file(), default_home, &env_var)
}

/// Merge a config file, environment lookups and defaults
fn resolve(
    config_file: Option<PathBuf>,
    default_home: PathBuf,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let file = match &config_file {
        Some(path) => Some(load_config_file(path)?),
        None => None,
    };
    let config_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or(Path::new("."));

    // Home
    let home = if let Some(env_home) = env("VOXBRIEF_HOME") {
        PathBuf::from(env_home)
    } else if let Some(home_path) = file.as_ref().and_then(|f| f.paths.home.as_deref()) {
        resolve_path(config_dir, home_path)
    } else {
        default_home
    };

    // API
    let mut api = ApiSettings::default();
    if let Some(cfg) = file.as_ref().and_then(|f| f.api.as_ref()) {
        if let Some(v) = &cfg.base_url {
            api.base_url = v.clone();
        }
        if let Some(v) = &cfg.transcription_model {
            api.transcription_model = v.clone();
        }
        if let Some(v) = &cfg.extraction_model {
            api.extraction_model = v.clone();
        }
        if let Some(v) = &cfg.digest_model {
            api.digest_model = v.clone();
        }
        if let Some(v) = cfg.timeout_seconds {
            api.timeout_seconds = v.max(1);
        }
        api.language = cfg.language.clone();
        if let Some(v) = cfg.chunking {
            api.chunking = v;
        }
    }
    if let Some(base) = env("VOXBRIEF_API_BASE") {
        api.base_url = base;
    }
    api.api_key = env("VOXBRIEF_API_KEY").or_else(|| env("OPENAI_API_KEY"));

    // Refresh tiers
    let mut refresh = RefreshSettings::default();
    if let Some(cfg) = file.as_ref().and_then(|f| f.refresh.as_ref()) {
        if let Some(minutes) = cfg.session_window_minutes {
            refresh.session_window_minutes = clamp_session_window(minutes);
        }
        if let Some(offset) = &cfg.utc_offset {
            refresh.utc_offset = Some(parse_utc_offset(offset)?);
        }
    }

    // Inbox
    let inbox_path = file
        .as_ref()
        .and_then(|f| f.paths.inbox.as_deref())
        .map(|p| resolve_path(config_dir, p))
        .unwrap_or_else(|| home.join("inbox"));
    let mut inbox = InboxSettings::with_path(inbox_path);
    if let Some(cfg) = file.as_ref().and_then(|f| f.inbox.as_ref()) {
        if let Some(exts) = &cfg.extensions {
            inbox.extensions = exts.clone();
        }
        if let Some(delay) = cfg.stability_delay_secs {
            inbox.stability_delay_secs = delay;
        }
    }

    Ok(ResolvedConfig {
        home,
        config_file,
        api,
        refresh,
        inbox,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
