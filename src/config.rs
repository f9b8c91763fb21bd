use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expires_in_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// Analyst prompt variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    Standard,
    Compact,
}

/// Wire dialect of the chat-completion endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmDialect {
    /// Top-level `system` string, `content: [{type:text,text}]` response,
    /// `usage.input_tokens` / `usage.output_tokens`.
    Anthropic,
    /// `messages: [system, system, user]`, optional json_object response
    /// format, `choices[0].message.content`.
    OpenAi,
}

/// Pricing profile in dollars per million tokens.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl Default for ProviderPricing {
    fn default() -> Self {
        Self { input_per_mtok: 3.0, output_per_mtok: 15.0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Disables the analyst phase entirely when false.
    pub enabled: bool,
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Per-call deadline in seconds.
    pub timeout_secs: u64,
    /// Bounded fan-out: outbound analyst calls in flight per search.
    pub max_concurrent: usize,
    /// When true, analyst failures degrade the affected candidates to
    /// rule-only matches instead of failing the search.
    pub fallback_enabled: bool,
    pub prompt_mode: PromptMode,
    pub dialect: LlmDialect,
    pub pricing: ProviderPricing,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: "https://api.anthropic.com".to_string(),
            api_key: None,
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
            temperature: 0.2,
            timeout_secs: 60,
            max_concurrent: 5,
            fallback_enabled: true,
            prompt_mode: PromptMode::Standard,
            dialect: LlmDialect::Anthropic,
            pricing: ProviderPricing::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Umbrella deadline for the whole analyst phase, in seconds.
    pub timeout_secs: u64,
    pub cache_ttl_hours: i64,
    pub max_results: usize,
    /// Weight of the rule score in the fused total. Must sum to 1 with
    /// `llm_score_weight`.
    pub rule_score_weight: f64,
    pub llm_score_weight: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            cache_ttl_hours: 24,
            max_results: 50,
            rule_score_weight: 0.4,
            llm_score_weight: 0.6,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Whether the background monitor loop starts with the server.
    pub enabled: bool,
    /// Interval between monitor sweeps in seconds.
    pub check_interval_secs: u64,
    /// Interval between catalog deadline-expiry sweeps in seconds.
    pub expiry_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { enabled: true, check_interval_secs: 3600, expiry_interval_secs: 86_400 }
    }
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone)]
#[command(name = "foerderscout")]
#[command(version, about = "Foerderscout - Austrian funding program matching service")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Server host (overrides config file)
    #[arg(long, value_name = "HOST")]
    pub server_host: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    /// JWT secret key (overrides config file)
    #[arg(long, value_name = "SECRET")]
    pub jwt_secret: Option<String>,

    /// Logging level (overrides config file, e.g. "info,foerderscout=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Monitor sweep interval in seconds (overrides config file)
    #[arg(long, value_name = "SECS")]
    pub monitor_interval_secs: Option<u64>,

    /// Disable the background monitor loop
    #[arg(long)]
    pub no_monitor: bool,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load() -> Result<Self, anyhow::Error> {
        // Pick up a local .env before reading the environment.
        let _ = dotenvy::dotenv();
        let cli_args = CommandLineArgs::parse();
        Self::load_with_args(&cli_args)
    }

    pub fn load_with_args(cli_args: &CommandLineArgs) -> Result<Self, anyhow::Error> {
        // 1. Load from config file (use CLI --config if provided, otherwise find default)
        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        // 2. Override with environment variables
        config.apply_env_overrides();

        // 3. Override with command line arguments (highest priority)
        config.apply_cli_overrides(cli_args);

        // 4. Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Server/database/auth settings use the APP_ prefix; the matching and
    /// analyst knobs use their canonical names (LLM_MODEL, SEARCH_TIMEOUT,
    /// RULE_SCORE_WEIGHT, ...).
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("APP_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("APP_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
        }
        if let Ok(db_url) = std::env::var("APP_DATABASE_URL") {
            self.database.url = db_url;
        }
        if let Ok(secret) = std::env::var("APP_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
        }

        // Analyst configuration
        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Ok(base) = std::env::var("LLM_API_BASE") {
            self.llm.api_base = base;
        }
        env_parse("LLM_MAX_TOKENS", &mut self.llm.max_tokens);
        env_parse("LLM_TEMPERATURE", &mut self.llm.temperature);
        env_parse("LLM_TIMEOUT", &mut self.llm.timeout_secs);
        env_parse("LLM_MAX_CONCURRENT", &mut self.llm.max_concurrent);
        env_parse("LLM_FALLBACK_ENABLED", &mut self.llm.fallback_enabled);
        if let Ok(mode) = std::env::var("PROMPT_MODE") {
            match mode.as_str() {
                "standard" => self.llm.prompt_mode = PromptMode::Standard,
                "compact" => self.llm.prompt_mode = PromptMode::Compact,
                other => tracing::warn!("Invalid PROMPT_MODE '{}' (keep current)", other),
            }
        }
        // PROVIDER_PRICING: "input,output" in dollars per million tokens
        if let Ok(pricing) = std::env::var("PROVIDER_PRICING") {
            match pricing.split_once(',').and_then(|(i, o)| {
                Some((i.trim().parse::<f64>().ok()?, o.trim().parse::<f64>().ok()?))
            }) {
                Some((input, output)) => {
                    self.llm.pricing = ProviderPricing { input_per_mtok: input, output_per_mtok: output };
                },
                None => tracing::warn!("Invalid PROVIDER_PRICING '{}' (keep current)", pricing),
            }
        }

        // Search configuration
        env_parse("SEARCH_TIMEOUT", &mut self.search.timeout_secs);
        env_parse("SEARCH_CACHE_TTL_HOURS", &mut self.search.cache_ttl_hours);
        env_parse("MAX_RESULTS_PER_SEARCH", &mut self.search.max_results);
        env_parse("RULE_SCORE_WEIGHT", &mut self.search.rule_score_weight);
        env_parse("LLM_SCORE_WEIGHT", &mut self.search.llm_score_weight);
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.server_host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.server_port {
            self.server.port = port;
        }
        if let Some(db_url) = &args.database_url {
            self.database.url = db_url.clone();
        }
        if let Some(secret) = &args.jwt_secret {
            self.auth.jwt_secret = secret.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if let Some(interval) = args.monitor_interval_secs {
            self.monitor.check_interval_secs = interval;
        }
        if args.no_monitor {
            self.monitor.enabled = false;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.auth.jwt_secret == "dev-secret-key-change-in-production" {
            tracing::warn!("Using the default JWT secret; set APP_JWT_SECRET for production");
        }

        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        // The orchestrator's score fusion depends on the weights summing
        // to exactly one.
        let weight_sum = self.search.rule_score_weight + self.search.llm_score_weight;
        if (weight_sum - 1.0).abs() > 1e-9 {
            anyhow::bail!(
                "RULE_SCORE_WEIGHT + LLM_SCORE_WEIGHT must sum to 1 (got {})",
                weight_sum
            );
        }
        if !(0.0..=1.0).contains(&self.search.rule_score_weight) {
            anyhow::bail!("RULE_SCORE_WEIGHT must be within [0, 1]");
        }
        if self.search.max_results == 0 {
            anyhow::bail!("MAX_RESULTS_PER_SEARCH must be > 0");
        }
        if self.search.timeout_secs == 0 || self.llm.timeout_secs == 0 {
            anyhow::bail!("SEARCH_TIMEOUT and LLM_TIMEOUT must be > 0");
        }
        if self.llm.max_concurrent == 0 {
            anyhow::bail!("LLM_MAX_CONCURRENT must be > 0");
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            anyhow::bail!("LLM_TEMPERATURE must be within [0, 2]");
        }
        if self.llm.pricing.input_per_mtok < 0.0 || self.llm.pricing.output_per_mtok < 0.0 {
            anyhow::bail!("PROVIDER_PRICING rates must be non-negative");
        }
        if self.monitor.check_interval_secs == 0 {
            anyhow::bail!("monitor.check_interval_secs must be > 0");
        }

        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse() {
            Ok(val) => *target = val,
            Err(_) => tracing::warn!("Invalid {} '{}' (keep current)", name, raw),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://data/foerderscout.db".to_string() }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dev-secret-key-change-in-production".to_string(),
            jwt_expires_in_hours: 24,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,foerderscout=debug".to_string(),
            file: Some("logs/foerderscout.log".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_weight_sum_enforced() {
        let mut config = Config::default();
        config.search.rule_score_weight = 0.5;
        config.search.llm_score_weight = 0.6;
        assert!(config.validate().is_err());

        config.search.rule_score_weight = 0.3;
        config.search.llm_score_weight = 0.7;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = Config::default();
        config.llm.max_concurrent = 0;
        assert!(config.validate().is_err());
    }
}
