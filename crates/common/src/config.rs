use crate::{Error, Result, TradingMode};

const DEFAULT_WS_URL: &str = "wss://ws.derivws.com/websockets/v3";
const DEFAULT_BOT_CONFIG_PATH: &str = "config/bot.toml";

/// Process-level configuration loaded from environment variables at startup.
/// Trading parameters live in the TOML file named by `bot_config_path`.
#[derive(Debug, Clone)]
pub struct Config {
    pub trading_mode: TradingMode,

    // Venue
    pub app_id: String,
    /// Required in live mode only; paper mode streams public market data.
    pub api_token: Option<String>,
    pub ws_url: String,

    pub bot_config_path: String,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key).filter(|v| !v.trim().is_empty()).ok_or_else(|| {
                Error::Config(format!(
                    "Required environment variable '{key}' is not set. Check your .env file."
                ))
            })
        };

        let trading_mode = match required("TRADING_MODE")?.to_lowercase().as_str() {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => {
                return Err(Error::Config(format!(
                    "TRADING_MODE must be 'paper' or 'live', got: '{other}'"
                )))
            }
        };

        let app_id = required("DERIV_APP_ID")?;
        if app_id.parse::<u32>().is_err() {
            return Err(Error::Config(format!(
                "DERIV_APP_ID must be numeric, got: '{app_id}'"
            )));
        }

        let api_token = match trading_mode {
            TradingMode::Live => Some(required("DERIV_API_TOKEN")?),
            TradingMode::Paper => lookup("DERIV_API_TOKEN"),
        };

        Ok(Config {
            trading_mode,
            app_id,
            api_token,
            ws_url: lookup("DERIV_WS_URL").unwrap_or_else(|| DEFAULT_WS_URL.to_string()),
            bot_config_path: lookup("BOT_CONFIG_PATH")
                .unwrap_or_else(|| DEFAULT_BOT_CONFIG_PATH.to_string()),
        })
    }

    /// Full endpoint including the application id query parameter.
    pub fn endpoint(&self) -> String {
        format!("{}?app_id={}", self.ws_url, self.app_id)
    }
}
