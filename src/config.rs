use crate::domain::entities::challenge::RiskThresholds;
use crate::domain::services::ledger::{LedgerRules, TradeCountTiming};
use std::time::Duration;

/// Service configuration for the challenge ledger
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Thresholds given to new challenges
    pub default_thresholds: RiskThresholds,
    pub trade_count_timing: TradeCountTiming,
    /// Run the midnight UTC daily rollover job
    pub daily_rollover_enabled: bool,
    pub bind_address: String,
    /// Quote endpoint used to price closes without an explicit exit price
    pub market_data_url: Option<String>,
    pub market_data_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_thresholds: RiskThresholds::default(), // 5% daily, 10% total, 10% target
            trade_count_timing: TradeCountTiming::Open,
            daily_rollover_enabled: true,
            bind_address: "0.0.0.0:3000".to_string(),
            market_data_url: None,
            market_data_timeout_ms: 5000,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value.to_lowercase() == "true" || value == "1"
}

/// Parse a percentage in (0, 100], falling back to `current` with a warning.
fn parse_pct(name: &str, raw: &str, current: f64) -> f64 {
    match raw.parse::<f64>() {
        Ok(value) if value > 0.0 && value <= 100.0 => value,
        Ok(value) => {
            tracing::warn!(
                "Invalid {} value: {} (must be in (0, 100]), using default: {}",
                name,
                value,
                current
            );
            current
        }
        Err(e) => {
            tracing::warn!(
                "Failed to parse {} '{}': {}, using default: {}",
                name,
                raw,
                e,
                current
            );
            current
        }
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> LedgerConfig {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> LedgerConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = LedgerConfig::default();

        if let Some(raw) = lookup("MAX_DAILY_LOSS_PCT") {
            config.default_thresholds.max_daily_loss_pct = parse_pct(
                "MAX_DAILY_LOSS_PCT",
                &raw,
                config.default_thresholds.max_daily_loss_pct,
            );
        }

        if let Some(raw) = lookup("MAX_TOTAL_LOSS_PCT") {
            config.default_thresholds.max_total_loss_pct = parse_pct(
                "MAX_TOTAL_LOSS_PCT",
                &raw,
                config.default_thresholds.max_total_loss_pct,
            );
        }

        if let Some(raw) = lookup("PROFIT_TARGET_PCT") {
            config.default_thresholds.profit_target_pct = parse_pct(
                "PROFIT_TARGET_PCT",
                &raw,
                config.default_thresholds.profit_target_pct,
            );
        }

        if let Some(raw) = lookup("TRADE_COUNT_TIMING") {
            match raw.parse::<TradeCountTiming>() {
                Ok(timing) => config.trade_count_timing = timing,
                Err(e) => {
                    tracing::warn!(
                        "Invalid TRADE_COUNT_TIMING '{}': {}, using default: {:?}",
                        raw,
                        e,
                        config.trade_count_timing
                    );
                }
            }
        }

        if let Some(enabled) = lookup("DAILY_ROLLOVER_ENABLED") {
            config.daily_rollover_enabled = parse_flag(&enabled);
        }

        if let Some(addr) = lookup("BIND_ADDRESS") {
            if !addr.trim().is_empty() {
                config.bind_address = addr.trim().to_string();
            }
        }

        if let Some(url) = lookup("MARKET_DATA_URL") {
            let url = url.trim();
            if !url.is_empty() {
                config.market_data_url = Some(url.to_string());
            }
        }

        if let Some(timeout) = lookup("MARKET_DATA_TIMEOUT_MS") {
            match timeout.parse::<u64>() {
                Ok(value) if (100..=60000).contains(&value) => {
                    config.market_data_timeout_ms = value;
                }
                _ => {
                    tracing::warn!(
                        "Invalid MARKET_DATA_TIMEOUT_MS '{}' (must be 100-60000), using default: {}",
                        timeout,
                        config.market_data_timeout_ms
                    );
                }
            }
        }

        config
    }

    pub fn ledger_rules(&self) -> LedgerRules {
        LedgerRules {
            trade_count_timing: self.trade_count_timing,
        }
    }

    pub fn market_data_timeout(&self) -> Duration {
        Duration::from_millis(self.market_data_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> LedgerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LedgerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert_eq!(config.default_thresholds.max_daily_loss_pct, 5.0);
        assert_eq!(config.default_thresholds.max_total_loss_pct, 10.0);
        assert_eq!(config.default_thresholds.profit_target_pct, 10.0);
        assert_eq!(config.trade_count_timing, TradeCountTiming::Open);
        assert!(config.daily_rollover_enabled);
        assert!(config.market_data_url.is_none());
    }

    #[test]
    fn test_overrides_from_variables() {
        let config = config_from(&[
            ("MAX_DAILY_LOSS_PCT", "4"),
            ("PROFIT_TARGET_PCT", "8.5"),
            ("TRADE_COUNT_TIMING", "close"),
            ("DAILY_ROLLOVER_ENABLED", "false"),
            ("BIND_ADDRESS", "127.0.0.1:8080"),
            ("MARKET_DATA_URL", "http://quotes.local"),
            ("MARKET_DATA_TIMEOUT_MS", "1500"),
        ]);
        assert_eq!(config.default_thresholds.max_daily_loss_pct, 4.0);
        assert_eq!(config.default_thresholds.max_total_loss_pct, 10.0);
        assert_eq!(config.default_thresholds.profit_target_pct, 8.5);
        assert_eq!(config.trade_count_timing, TradeCountTiming::Close);
        assert!(!config.daily_rollover_enabled);
        assert_eq!(config.bind_address, "127.0.0.1:8080");
        assert_eq!(config.market_data_url.as_deref(), Some("http://quotes.local"));
        assert_eq!(config.market_data_timeout(), Duration::from_millis(1500));
        assert_eq!(config.ledger_rules().trade_count_timing, TradeCountTiming::Close);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = config_from(&[
            ("MAX_DAILY_LOSS_PCT", "-3"),
            ("MAX_TOTAL_LOSS_PCT", "abc"),
            ("PROFIT_TARGET_PCT", "250"),
            ("TRADE_COUNT_TIMING", "sometimes"),
            ("MARKET_DATA_TIMEOUT_MS", "5"),
        ]);
        assert_eq!(config.default_thresholds, RiskThresholds::default());
        assert_eq!(config.trade_count_timing, TradeCountTiming::Open);
        assert_eq!(config.market_data_timeout_ms, 5000);
    }
}
