use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_char(profile: &str, key: &str, default: char) -> char {
    profiled_env_opt(profile, key)
        .and_then(|v| v.chars().next())
        .unwrap_or(default)
}

fn profiled_env_list(profile: &str, key: &str, default: &str) -> Vec<String> {
    profiled_env_or(profile, key, default)
        .split(',')
        .map(|s| s.trim().trim_start_matches('.').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Fallback user root when neither env nor CLI name one.
fn default_user_root() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".talon").join("user"))
        .unwrap_or_else(|| PathBuf::from("user"))
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub paths: PathsConfig,
    pub personalization: PersonalizationConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `PERSONA_PROFILE` env var. When set (e.g. `WORK`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("PERSONA_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            paths: PathsConfig::from_env_profiled(p),
            personalization: PersonalizationConfig::from_env_profiled(p),
        }
    }

    /// Config rooted at an explicit user directory with every other value
    /// at its default. Used by tests and embedding hosts.
    pub fn for_root(user_root: impl Into<PathBuf>) -> Self {
        let user_root = user_root.into();
        Self {
            profile: String::new(),
            paths: PathsConfig::for_root(user_root),
            personalization: PersonalizationConfig::default(),
        }
    }

    /// Override the user root. A config dir still at its default follows
    /// the new root.
    pub fn with_user_root(mut self, user_root: impl Into<PathBuf>) -> Self {
        let user_root = user_root.into();
        if self.paths.config_dir == default_config_dir(&self.paths.user_root) {
            self.paths.config_dir = default_config_dir(&user_root);
        }
        self.paths.user_root = user_root;
        self
    }

    pub fn with_config_dir(mut self, config_dir: impl Into<PathBuf>) -> Self {
        self.paths.config_dir = config_dir.into();
        self
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  user_root:   {}", self.paths.user_root.display());
        tracing::info!("  config_dir:  {}", self.paths.config_dir.display());
        tracing::info!("  output_root: {}", self.paths.output_root().display());
        tracing::info!(
            "  controls:    list={}, command={}",
            self.personalization.list_control_file,
            self.personalization.command_control_file
        );
        tracing::info!("  tag:         {}", self.personalization.tag);
    }

    /// Return a JSON view of the resolved configuration.
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "paths": {
                "user_root": self.paths.user_root,
                "config_dir": self.paths.config_dir,
                "output_root": self.paths.output_root(),
            },
            "personalization": {
                "tag": self.personalization.tag,
                "list_control_file": self.personalization.list_control_file,
                "command_control_file": self.personalization.command_control_file,
                "data_extension": self.personalization.data_extension,
                "escape_char": self.personalization.escape_char.to_string(),
                "rule_extension": self.personalization.rule_extension,
                "module_extensions": self.personalization.module_extensions,
            },
        })
    }
}

// ── Paths ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of all user rule sets; identifiers are relative to it.
    pub user_root: PathBuf,
    /// Directory holding control files and their data files.
    pub config_dir: PathBuf,
    /// Name of the generated-output directory directly under `user_root`.
    pub output_dir_name: String,
}

impl PathsConfig {
    fn from_env_profiled(p: &str) -> Self {
        let user_root = profiled_env_opt(p, "PERSONA_USER_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(default_user_root);
        let config_dir = profiled_env_opt(p, "PERSONA_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_config_dir(&user_root));
        Self {
            user_root,
            config_dir,
            output_dir_name: profiled_env_or(p, "PERSONA_OUTPUT_DIR_NAME", DEFAULT_OUTPUT_DIR_NAME),
        }
    }

    fn for_root(user_root: PathBuf) -> Self {
        Self {
            config_dir: default_config_dir(&user_root),
            user_root,
            output_dir_name: DEFAULT_OUTPUT_DIR_NAME.to_string(),
        }
    }

    /// Directory that receives generated artifacts.
    pub fn output_root(&self) -> PathBuf {
        self.user_root.join(&self.output_dir_name)
    }
}

const DEFAULT_OUTPUT_DIR_NAME: &str = "_personalization_generated";

fn default_config_dir(user_root: &Path) -> PathBuf {
    user_root.join("settings").join("personalization")
}

// ── Personalization ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalizationConfig {
    /// Capability tag appended to every generated context.
    pub tag: String,
    pub list_control_file: String,
    pub command_control_file: String,
    /// Required extension of data files, without the dot.
    pub data_extension: String,
    pub escape_char: char,
    /// Extension marking rule files (kept as the last identifier segment).
    pub rule_extension: String,
    /// Module/data file extensions, in lookup order.
    pub module_extensions: Vec<String>,
}

impl Default for PersonalizationConfig {
    fn default() -> Self {
        Self {
            tag: DEFAULT_TAG.to_string(),
            list_control_file: DEFAULT_LIST_CONTROL.to_string(),
            command_control_file: DEFAULT_COMMAND_CONTROL.to_string(),
            data_extension: DEFAULT_DATA_EXTENSION.to_string(),
            escape_char: '\\',
            rule_extension: DEFAULT_RULE_EXTENSION.to_string(),
            module_extensions: DEFAULT_MODULE_EXTENSIONS.split(',').map(str::to_string).collect(),
        }
    }
}

impl PersonalizationConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            tag: profiled_env_or(p, "PERSONA_TAG", DEFAULT_TAG),
            list_control_file: profiled_env_or(p, "PERSONA_LIST_CONTROL", DEFAULT_LIST_CONTROL),
            command_control_file: profiled_env_or(p, "PERSONA_COMMAND_CONTROL", DEFAULT_COMMAND_CONTROL),
            data_extension: profiled_env_or(p, "PERSONA_DATA_EXTENSION", DEFAULT_DATA_EXTENSION)
                .trim_start_matches('.')
                .to_string(),
            escape_char: profiled_env_char(p, "PERSONA_ESCAPE_CHAR", '\\'),
            rule_extension: profiled_env_or(p, "PERSONA_RULE_EXTENSION", DEFAULT_RULE_EXTENSION)
                .trim_start_matches('.')
                .to_string(),
            module_extensions: profiled_env_list(p, "PERSONA_MODULE_EXTENSIONS", DEFAULT_MODULE_EXTENSIONS),
        }
    }
}

const DEFAULT_TAG: &str = "user.personalization";
const DEFAULT_LIST_CONTROL: &str = "list_personalization.csv";
const DEFAULT_COMMAND_CONTROL: &str = "command_personalization.csv";
const DEFAULT_DATA_EXTENSION: &str = "csv";
const DEFAULT_RULE_EXTENSION: &str = "talon";
const DEFAULT_MODULE_EXTENSIONS: &str = "py,talon-list";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_root_uses_defaults_under_root() {
        let config = Config::for_root("/tmp/user");
        assert_eq!(config.paths.config_dir, PathBuf::from("/tmp/user/settings/personalization"));
        assert_eq!(config.paths.output_root(), PathBuf::from("/tmp/user/_personalization_generated"));
        assert_eq!(config.personalization.tag, "user.personalization");
        assert_eq!(config.personalization.module_extensions, vec!["py", "talon-list"]);
        assert_eq!(config.profile_label(), "default");
    }

    #[test]
    fn user_root_override_moves_default_config_dir() {
        let config = Config::for_root("/tmp/user").with_user_root("/srv/voice");
        assert_eq!(config.paths.config_dir, PathBuf::from("/srv/voice/settings/personalization"));

        let config = Config::for_root("/tmp/user")
            .with_config_dir("/etc/persona")
            .with_user_root("/srv/voice");
        assert_eq!(config.paths.config_dir, PathBuf::from("/etc/persona"));
        assert_eq!(config.paths.user_root, PathBuf::from("/srv/voice"));
    }

    #[test]
    fn redacted_summary_reports_paths() {
        let config = Config::for_root("/tmp/user");
        let summary = config.redacted_summary();
        assert_eq!(summary["profile"], "default");
        assert_eq!(summary["personalization"]["data_extension"], "csv");
        assert_eq!(summary["personalization"]["escape_char"], "\\");
    }
}
