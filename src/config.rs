use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    // Agent identity
    #[serde(default = "default_username", alias = "agent_name")]
    pub username: String,

    // System prompt (persona + directive protocol)
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    // LLM configuration (OpenAI-compatible: Ollama, LM Studio, vLLM, OpenAI, etc.)
    #[serde(default = "default_llm_url")]
    pub llm_api_url: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default)]
    pub llm_api_key: Option<String>,

    // World bridge
    #[serde(default = "default_world_url")]
    pub world_url: String,
    /// Server-noise chat lines starting with any of these are dropped before
    /// they reach the turn controller.
    #[serde(default)]
    pub ignored_message_prefixes: Vec<String>,

    // Turn-taking
    /// Maximum directive/response turns per inbound message; -1 means unlimited.
    #[serde(default = "default_max_directive_turns", alias = "max_commands")]
    pub max_directive_turns: i64,
    /// Emit the model's full text when it uses a directive, instead of the
    /// short `*used name*` summary.
    #[serde(default)]
    pub verbose_directives: bool,

    // Background cadence
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,
    #[serde(default = "default_self_prompt_cooldown_ms")]
    pub self_prompt_cooldown_ms: u64,

    // Startup behavior
    #[serde(default)]
    pub init_message: Option<String>,
    #[serde(default)]
    pub load_memory: bool,

    // Persistence
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_username() -> String {
    "golem".to_string()
}

fn default_system_prompt() -> String {
    "You are an autonomous actor embedded in a shared world. Act and speak \
     like a regular participant: be brief, stay in character, and never \
     narrate your own reasoning. To act, end your response with a single \
     directive such as !commands; anything you write after a directive is \
     discarded. Use at most one directive per response. If there is nothing \
     to do, just respond conversationally."
        .to_string()
}

fn default_llm_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_llm_model() -> String {
    "llama3.2".to_string()
}

fn default_world_url() -> String {
    "ws://127.0.0.1:8071/world".to_string()
}

fn default_max_directive_turns() -> i64 {
    -1
}

fn default_tick_period_ms() -> u64 {
    300
}

fn default_self_prompt_cooldown_ms() -> u64 {
    1000
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|dir| dir.join("golem").join("history.db"))
        .unwrap_or_else(|| PathBuf::from("golem_history.db"))
        .display()
        .to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            system_prompt: default_system_prompt(),
            llm_api_url: default_llm_url(),
            llm_model: default_llm_model(),
            llm_api_key: None,
            world_url: default_world_url(),
            ignored_message_prefixes: Vec::new(),
            max_directive_turns: default_max_directive_turns(),
            verbose_directives: false,
            tick_period_ms: default_tick_period_ms(),
            self_prompt_cooldown_ms: default_self_prompt_cooldown_ms(),
            init_message: None,
            load_memory: false,
            database_path: default_database_path(),
        }
    }
}

impl AgentConfig {
    /// Get the directory containing the executable
    fn get_base_dir() -> PathBuf {
        match std::env::current_exe() {
            Ok(exe_path) => exe_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            Err(_) => PathBuf::from("."),
        }
    }

    /// Get the path to the config file (relative to executable)
    pub fn config_path() -> PathBuf {
        Self::get_base_dir().join("golem_config.toml")
    }

    /// Load config from golem_config.toml (next to executable), falling back
    /// to defaults + environment variables.
    pub fn load() -> Self {
        let path = Self::config_path();

        if let Ok(contents) = fs::read_to_string(&path) {
            match toml::from_str::<AgentConfig>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    return config;
                }
                Err(e) => {
                    tracing::error!("Failed to parse {:?}: {}", path, e);
                }
            }
        }

        tracing::warn!("No config file found, using defaults + env vars");
        Self::from_env()
    }

    /// Load from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = env::var("GOLEM_NAME") {
            config.username = name;
        }

        if let Ok(url) = env::var("LLM_API_URL") {
            config.llm_api_url = url;
        }

        if let Ok(model) = env::var("LLM_MODEL") {
            config.llm_model = model;
        }

        if let Ok(key) = env::var("LLM_API_KEY") {
            config.llm_api_key = Some(key);
        }

        if let Ok(url) = env::var("GOLEM_WORLD_URL") {
            config.world_url = url;
        }

        if let Ok(turns) = env::var("GOLEM_MAX_DIRECTIVE_TURNS") {
            if let Ok(turns) = turns.parse() {
                config.max_directive_turns = turns;
            }
        }

        if let Ok(period) = env::var("GOLEM_TICK_PERIOD_MS") {
            if let Ok(millis) = period.parse() {
                config.tick_period_ms = millis;
            }
        }

        if let Ok(message) = env::var("GOLEM_INIT_MESSAGE") {
            if !message.trim().is_empty() {
                config.init_message = Some(message);
            }
        }

        if let Ok(enabled) = env::var("GOLEM_LOAD_MEMORY") {
            config.load_memory = enabled.eq_ignore_ascii_case("1")
                || enabled.eq_ignore_ascii_case("true")
                || enabled.eq_ignore_ascii_case("yes");
        }

        if let Ok(path) = env::var("GOLEM_DATABASE_PATH") {
            if !path.trim().is_empty() {
                config.database_path = path;
            }
        }

        config
    }

    /// The per-message directive turn budget; `None` is unlimited.
    pub fn directive_turn_budget(&self) -> Option<usize> {
        if self.max_directive_turns < 0 {
            None
        } else {
            Some(self.max_directive_turns as usize)
        }
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms.max(1))
    }

    pub fn self_prompt_cooldown(&self) -> Duration {
        Duration::from_millis(self.self_prompt_cooldown_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AgentConfig::default();
        assert_eq!(config.username, "golem");
        assert_eq!(config.tick_period_ms, 300);
        assert_eq!(config.max_directive_turns, -1);
        assert_eq!(config.directive_turn_budget(), None);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: AgentConfig = toml::from_str(
            r#"
            username = "scout"
            max_directive_turns = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.username, "scout");
        assert_eq!(config.directive_turn_budget(), Some(3));
        assert_eq!(config.llm_model, default_llm_model());
        assert!(!config.verbose_directives);
    }

    #[test]
    fn legacy_aliases_are_accepted() {
        let config: AgentConfig = toml::from_str(
            r#"
            agent_name = "scout"
            max_commands = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.username, "scout");
        assert_eq!(config.directive_turn_budget(), Some(5));
    }

    #[test]
    fn zero_budget_is_not_unlimited() {
        let config: AgentConfig = toml::from_str("max_directive_turns = 0").unwrap();
        assert_eq!(config.directive_turn_budget(), Some(0));
    }
}
