//! Environment-driven configuration (spec §6: every name below is
//! normative). Layered over [`config::Config`] rather than bare
//! `std::env::var`, so a future `.toml`/`.json` source can be added
//! without touching call sites — but no file source is wired up today,
//! matching `config_loader.py`'s "env vars with defaults" shape.

use anyhow::Context;
use std::time::Duration;

/// All tunables `spec.md` §6 names, plus the ambient connection strings
/// every deployment needs. Defaults mirror `MatchingConfig::default`'s
/// and `PhaseServiceConfig::default`'s so an unconfigured dev instance
/// behaves identically to the original matcher's defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub postgres_dsn: String,
    pub bus_broker: String,
    pub log_level: String,

    pub retrieval_topk: u32,
    pub sim_deep_min: f64,
    pub inliers_min: f64,
    pub match_best_min: f64,
    pub match_cons_min: u32,
    pub match_accept: f64,

    pub watermark_ttl_secs: u64,
    pub handler_deadline_secs: u64,
    pub prefetch: u32,
    pub dlq_max_retries: u32,
}

impl AppConfig {
    /// Load from environment variables (spec §6 names), falling back to
    /// the documented defaults for every tunable but the two connection
    /// strings, which must be set explicitly.
    pub fn from_env() -> anyhow::Result<Self> {
        let source = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to read environment")?;

        let get_string = |key: &str| -> Option<String> { source.get_string(key).ok() };
        let get_or = |key: &str, default: &str| -> anyhow::Result<String> {
            Ok(get_string(key).unwrap_or_else(|| default.to_string()))
        };
        let parse_or = |key: &str, default: &str| -> anyhow::Result<f64> {
            get_or(key, default)?.parse().with_context(|| format!("{key} must be a number"))
        };
        let parse_int_or = |key: &str, default: &str| -> anyhow::Result<u32> {
            get_or(key, default)?.parse().with_context(|| format!("{key} must be an integer"))
        };

        Ok(Self {
            postgres_dsn: get_string("POSTGRES_DSN").context("POSTGRES_DSN must be set")?,
            bus_broker: get_or("BUS_BROKER", "local")?,
            log_level: get_or("LOG_LEVEL", "info")?,

            retrieval_topk: parse_int_or("RETRIEVAL_TOPK", "20")?,
            sim_deep_min: parse_or("SIM_DEEP_MIN", "0.82")?,
            inliers_min: parse_or("INLIERS_MIN", "0.35")?,
            match_best_min: parse_or("MATCH_BEST_MIN", "0.88")?,
            match_cons_min: parse_int_or("MATCH_CONS_MIN", "2")?,
            match_accept: parse_or("MATCH_ACCEPT", "0.80")?,

            watermark_ttl_secs: parse_int_or("WATERMARK_TTL_SECS", "300")? as u64,
            handler_deadline_secs: parse_int_or("HANDLER_DEADLINE_SECS", "120")? as u64,
            prefetch: parse_int_or("PREFETCH", "32")?,
            dlq_max_retries: parse_int_or("DLQ_MAX_RETRIES", "5")?,
        })
    }

    pub fn watermark_ttl(&self) -> Duration {
        Duration::from_secs(self.watermark_ttl_secs)
    }

    pub fn handler_deadline(&self) -> Duration {
        Duration::from_secs(self.handler_deadline_secs)
    }

    pub fn matching_config(&self) -> pvm_matching::MatchingConfig {
        let defaults = pvm_matching::MatchingConfig::default();
        pvm_matching::MatchingConfig {
            retrieval_topk: self.retrieval_topk,
            sim_deep_min: self.sim_deep_min,
            inliers_min: self.inliers_min,
            match_best_min: self.match_best_min,
            match_cons_min: self.match_cons_min,
            match_accept: self.match_accept,
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watermark_ttl_converts_seconds() {
        let cfg = AppConfig {
            postgres_dsn: "postgres://".into(),
            bus_broker: "local".into(),
            log_level: "info".into(),
            retrieval_topk: 20,
            sim_deep_min: 0.82,
            inliers_min: 0.35,
            match_best_min: 0.88,
            match_cons_min: 2,
            match_accept: 0.80,
            watermark_ttl_secs: 300,
            handler_deadline_secs: 120,
            prefetch: 32,
            dlq_max_retries: 5,
        };
        assert_eq!(cfg.watermark_ttl(), Duration::from_secs(300));
        assert_eq!(cfg.matching_config().match_cons_min, 2);
    }
}
