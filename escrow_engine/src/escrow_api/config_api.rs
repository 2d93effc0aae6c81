use std::{collections::HashMap, fmt::Debug, str::FromStr, sync::Arc};

use chrono::Duration;
use escrow_common::parse_duration;
use log::*;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};

use crate::{
    db_types::ConfigEntry,
    policy::{default_value, keys, EscrowPolicy, DEFAULT_CONFIG},
    traits::{ConfigStorage, EscrowError},
};

/// Typed, cached access to the `config` table.
///
/// Clones share the same cache, so a single `ConfigApi` should be created per process and cloned into the other APIs.
/// Missing keys are never an error and are never cached.
#[derive(Clone)]
pub struct ConfigApi<B> {
    db: B,
    cache: Arc<RwLock<HashMap<String, String>>>,
    write_lock: Arc<Mutex<()>>,
}

impl<B> Debug for ConfigApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConfigApi")
    }
}

impl<B> ConfigApi<B> {
    pub fn new(db: B) -> Self {
        Self { db, cache: Arc::new(RwLock::new(HashMap::new())), write_lock: Arc::new(Mutex::new(())) }
    }

    /// Drops a single key from the cache. The next read goes to the database.
    pub async fn invalidate(&self, key: &str) {
        self.cache.write().await.remove(key);
    }

    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }
}

impl<B> ConfigApi<B>
where B: ConfigStorage
{
    pub async fn get(&self, key: &str) -> Result<Option<String>, EscrowError> {
        if let Some(value) = self.cache.read().await.get(key) {
            return Ok(Some(value.clone()));
        }
        let Some(value) = self.db.fetch_config_value(key).await? else {
            trace!("🪛️ Config key '{key}' is not set");
            return Ok(None);
        };
        // A concurrent `set` may have cached a newer value while we were reading. That one wins.
        let mut cache = self.cache.write().await;
        let cached = cache.entry(key.to_string()).or_insert(value);
        Ok(Some(cached.clone()))
    }

    /// Persists the value and updates the cache. Concurrent calls are serialized, so the cache always holds the value
    /// of the last write to reach the database.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), EscrowError> {
        let _guard = self.write_lock.lock().await;
        self.db.upsert_config_value(key, value).await?;
        self.cache.write().await.insert(key.to_string(), value.to_string());
        info!("🪛️ Config '{key}' set to '{value}'");
        Ok(())
    }

    pub async fn get_float(&self, key: &str, default: f64) -> Result<f64, EscrowError> {
        self.get_parsed(key, default, |s| f64::from_str(s).ok()).await
    }

    pub async fn get_decimal(&self, key: &str, default: Decimal) -> Result<Decimal, EscrowError> {
        self.get_parsed(key, default, |s| Decimal::from_str(s.trim()).ok()).await
    }

    pub async fn get_duration(&self, key: &str, default: Duration) -> Result<Duration, EscrowError> {
        self.get_parsed(key, default, |s| parse_duration(s).ok()).await
    }

    async fn get_parsed<T, F>(&self, key: &str, default: T, parse: F) -> Result<T, EscrowError>
    where F: Fn(&str) -> Option<T> {
        let result = match self.get(key).await? {
            Some(raw) => parse(&raw).unwrap_or_else(|| {
                warn!("🪛️ Config value '{raw}' for '{key}' could not be parsed. Using the default.");
                default
            }),
            None => default,
        };
        Ok(result)
    }

    /// Writes every default that is not already present. Existing values are left alone, so this is safe to call on
    /// every start-up. Returns the number of keys written.
    pub async fn seed_defaults(&self) -> Result<usize, EscrowError> {
        let _guard = self.write_lock.lock().await;
        let mut count = 0;
        for (key, value) in DEFAULT_CONFIG {
            if self.db.insert_config_if_absent(key, value).await? {
                debug!("🪛️ Seeded config '{key}' with '{value}'");
                count += 1;
            }
        }
        info!("🪛️ {count} config defaults seeded");
        Ok(count)
    }

    pub async fn all(&self) -> Result<Vec<ConfigEntry>, EscrowError> {
        self.db.fetch_all_config().await
    }

    /// Snapshots every tunable. Missing or invalid values are logged and replaced with their defaults.
    pub async fn policy(&self) -> Result<EscrowPolicy, EscrowError> {
        let defaults = EscrowPolicy::default();
        let policy = EscrowPolicy {
            pending_duration: self.tunable(keys::PENDING_DURATION, defaults.pending_duration, parse_duration).await?,
            completed_duration: self
                .tunable(keys::COMPLETED_DURATION, defaults.completed_duration, parse_duration)
                .await?,
            stuck_duration: self.tunable(keys::STUCK_DURATION, defaults.stuck_duration, parse_duration).await?,
            completion_tolerance: self
                .tunable(keys::COMPLETION_TOLERANCE, defaults.completion_tolerance, parse_decimal)
                .await?,
            resolver_percent: self
                .tunable(keys::PARTIAL_REFUND_RESOLVER_PERCENT, defaults.resolver_percent, parse_decimal)
                .await?,
            gold_commission: self
                .tunable(keys::GOLD_ACCOUNT_COMMISSION, defaults.gold_commission, parse_decimal)
                .await?,
            silver_commission: self
                .tunable(keys::SILVER_ACCOUNT_COMMISSION, defaults.silver_commission, parse_decimal)
                .await?,
            bronze_commission: self
                .tunable(keys::BRONZE_ACCOUNT_COMMISSION, defaults.bronze_commission, parse_decimal)
                .await?,
            free_commission: self
                .tunable(keys::FREE_ACCOUNT_COMMISSION, defaults.free_commission, parse_decimal)
                .await?,
        };
        trace!("🪛️ Policy snapshot: {policy:?}");
        Ok(policy)
    }

    async fn tunable<T, E, F>(&self, key: &str, default: T, parse: F) -> Result<T, EscrowError>
    where
        F: Fn(&str) -> Result<T, E>,
        E: std::fmt::Display,
    {
        let fallback = default_value(key).unwrap_or_default();
        match self.get(key).await? {
            Some(raw) => match parse(&raw) {
                Ok(v) => Ok(v),
                Err(e) => {
                    warn!("🪛️ {} ({e}). Using the default of {fallback}.", EscrowError::ConfigMissing(key.to_string()));
                    Ok(default)
                },
            },
            None => {
                warn!("🪛️ {}. Using the default of {fallback}.", EscrowError::ConfigMissing(key.to_string()));
                Ok(default)
            },
        }
    }
}

fn parse_decimal(s: &str) -> Result<Decimal, rust_decimal::Error> {
    Decimal::from_str(s.trim())
}
