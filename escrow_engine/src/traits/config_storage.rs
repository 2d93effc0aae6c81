use crate::{db_types::ConfigEntry, traits::EscrowError};

/// Persistence for the key/value configuration table.
#[allow(async_fn_in_trait)]
pub trait ConfigStorage: Clone {
    async fn fetch_config_value(&self, key: &str) -> Result<Option<String>, EscrowError>;

    async fn fetch_all_config(&self) -> Result<Vec<ConfigEntry>, EscrowError>;

    /// Inserts or replaces the value.
    async fn upsert_config_value(&self, key: &str, value: &str) -> Result<(), EscrowError>;

    /// Inserts the value only if the key is absent. Returns `true` if a row was written.
    async fn insert_config_if_absent(&self, key: &str, value: &str) -> Result<bool, EscrowError>;
}
