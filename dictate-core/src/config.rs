//! Configuration loading and layering.
//!
//! Three layers, lowest to highest precedence: compiled-in defaults, an
//! optional JSON file, then environment variables read once at startup. The
//! merged result is frozen — nothing re-reads the environment or disk after
//! [`Config::load`] returns.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "DICTATE_CONFIG";
const LLM_API_KEY_ENV: &str = "DICTATE_LLM_API_KEY";
const LLM_MODEL_ENV: &str = "DICTATE_LLM_MODEL";
const LLM_TEMPERATURE_ENV: &str = "DICTATE_LLM_TEMPERATURE";
const SOCKET_PATH_ENV: &str = "DICTATE_SOCKET_PATH";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// Unix domain socket the daemon listens on.
    pub socket_path: PathBuf,
    /// Directory for rotating text logs, if file logging is enabled.
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/tmp/v2m.sock"),
            log_dir: PathBuf::from("/tmp/dictate-logs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Target sample rate for capture and ASR (Hz). Fixed at 16 kHz mono.
    pub sample_rate: u32,
    /// Samples per chunk delivered to the capture service.
    pub chunk_size: usize,
    /// Preferred input device name; `None` selects the system default.
    pub preferred_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            chunk_size: 1_600, // 100 ms at 16 kHz
            preferred_device: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VadConfig {
    /// Speech probability / energy threshold in [0, 1].
    pub threshold: f32,
    pub min_speech_duration_ms: u32,
    pub min_silence_duration_ms: u32,
    /// Hangover frames for the energy-based fallback detector.
    pub hangover_frames: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_speech_duration_ms: 250,
            min_silence_duration_ms: 500,
            hangover_frames: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AsrConfig {
    pub model: String,
    pub language: String,
    pub beam_size: u32,
    pub compute_type: String,
    pub vad_filter: bool,
    /// Minimum PCM duration (ms) before the engine is invoked at all.
    pub min_speech_duration_ms: u32,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            model: "large-v3-turbo".to_string(),
            language: "auto".to_string(),
            beam_size: 5,
            compute_type: "float16".to_string(),
            vad_filter: true,
            min_speech_duration_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_input_chars: usize,
    pub request_timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_min_wait_secs: u64,
    pub retry_max_wait_secs: u64,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.perplexity.ai/chat/completions".to_string(),
            model: "sonar-pro".to_string(),
            temperature: 0.3,
            max_input_chars: 6_000,
            request_timeout_secs: 30,
            retry_attempts: 3,
            retry_min_wait_secs: 2,
            retry_max_wait_secs: 10,
            api_key: None,
        }
    }
}

/// Top-level, immutable-after-load configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub audio: AudioConfig,
    pub vad: VadConfig,
    pub asr: AsrConfig,
    pub llm: LlmConfig,
}

impl Config {
    /// Load configuration: defaults, overlaid by an optional JSON file,
    /// overlaid by environment variables. Never re-read after this call.
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(path) = Self::config_file_path() {
            if path.exists() {
                config = Self::merge_from_file(config, &path)?;
            }
        }

        // A `.env` file sits below the process environment: `dotenvy::dotenv`
        // never overwrites a variable that's already set, so an explicit
        // shell export still wins over a stale dotfile.
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!(path = %path.display(), "loaded .env file"),
            Err(dotenvy::Error::Io(_)) => {}
            Err(e) => tracing::warn!("failed to parse .env file: {e}"),
        }

        config.apply_env_overrides();
        Ok(config)
    }

    fn config_file_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs_home().map(|home| home.join(".config/dictate/config.json"))
    }

    fn merge_from_file(base: Config, path: &Path) -> Result<Config> {
        let contents = std::fs::read_to_string(path)?;
        let file_config: Config = serde_json::from_str(&contents)?;
        tracing::info!(path = %path.display(), "loaded config file");
        Ok(file_config.or(base))
    }

    /// Field-by-field merge: `self` wins where it differs from a fresh default,
    /// `fallback` fills the rest. Used so a JSON file need only specify the
    /// fields it cares about.
    fn or(self, fallback: Config) -> Config {
        let default = Config::default();
        Config {
            paths: if self.paths != default.paths { self.paths } else { fallback.paths },
            audio: if self.audio != default.audio { self.audio } else { fallback.audio },
            vad: if self.vad != default.vad { self.vad } else { fallback.vad },
            asr: if self.asr != default.asr { self.asr } else { fallback.asr },
            llm: if self.llm != default.llm { self.llm } else { fallback.llm },
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(LLM_API_KEY_ENV) {
            self.llm.api_key = Some(key);
        }
        if let Ok(model) = std::env::var(LLM_MODEL_ENV) {
            self.llm.model = model;
        }
        if let Ok(temp) = std::env::var(LLM_TEMPERATURE_ENV) {
            if let Ok(parsed) = temp.parse::<f32>() {
                self.llm.temperature = parsed;
            } else {
                tracing::warn!(value = %temp, "ignoring unparseable {LLM_TEMPERATURE_ENV}");
            }
        }
        if let Ok(socket) = std::env::var(SOCKET_PATH_ENV) {
            self.paths.socket_path = PathBuf::from(socket);
        }
    }
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
