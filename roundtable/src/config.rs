use anyhow::anyhow;

/// Which response-generation backend to wire up at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Anthropic-compatible messages API
    Anthropic,
    /// OpenAI-style chat-completions API
    OpenAi,
    /// Deterministic canned responses (offline dev, tests)
    Scripted,
}

impl ProviderKind {
    fn from_env(value: &str) -> anyhow::Result<Self> {
        match value {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "scripted" => Ok(Self::Scripted),
            other => Err(anyhow!(
                "Invalid ROUNDTABLE_PROVIDER '{other}'. Expected 'anthropic', 'openai' or 'scripted'"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Port the server listens on
    pub port: u16,
    /// SQLite database URL
    pub database_url: String,
    /// Response-generation backend
    pub provider: ProviderKind,
    /// Model identifier passed to the provider
    pub model: String,
    /// Base URL of the provider API
    pub provider_base_url: String,
    /// Name of the env var holding the provider API key
    pub provider_api_key_env: String,
    /// Per-persona generation budget over a rolling 60s window
    pub rate_limit_per_minute: usize,
    /// Allowed CORS origins
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let provider = ProviderKind::from_env(&env_str("ROUNDTABLE_PROVIDER", "scripted"))?;
        Ok(Self {
            port: env_parse("ROUNDTABLE_PORT", 8080)?,
            database_url: env_str("ROUNDTABLE_DATABASE_URL", "sqlite:./data/roundtable.db"),
            provider,
            model: env_str("ROUNDTABLE_MODEL", "claude-sonnet-4-20250514"),
            provider_base_url: env_str(
                "ROUNDTABLE_PROVIDER_BASE_URL",
                match provider {
                    ProviderKind::OpenAi => "https://api.openai.com",
                    _ => "https://api.anthropic.com",
                },
            ),
            provider_api_key_env: env_str(
                "ROUNDTABLE_PROVIDER_API_KEY_ENV",
                match provider {
                    ProviderKind::OpenAi => "OPENAI_API_KEY",
                    _ => "ANTHROPIC_API_KEY",
                },
            ),
            rate_limit_per_minute: env_parse("ROUNDTABLE_RATE_LIMIT_PER_MINUTE", 20)?,
            allowed_origins: env_csv(
                "ROUNDTABLE_ALLOWED_ORIGINS",
                &["http://localhost:3000", "http://127.0.0.1:3000"],
            ),
        })
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow!("Failed to parse env var {key}={val}: {e}")),
        Err(_) => Ok(default),
    }
}

fn env_csv(key: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect(),
        Err(_) => default.iter().map(|s| (*s).to_string()).collect(),
    }
}
