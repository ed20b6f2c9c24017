use std::sync::Arc;

use crate::client::cache::ResponseCache;
use crate::client::storage::KeyValueStore;
use crate::config::Config;
use crate::db::LocalStorage;

pub async fn cmd_cache_clear(config: &Config) -> anyhow::Result<()> {
    let storage: Arc<dyn KeyValueStore> =
        Arc::new(LocalStorage::open(&config.general.storage_path).await?);

    let before = storage.keys().await?.len();

    ResponseCache::api(Arc::clone(&storage)).clear().await;
    ResponseCache::astro(Arc::clone(&storage), config.cache.ttl()?)
        .clear()
        .await;

    let after = storage.keys().await?.len();
    println!("✓ Removed {} cached responses", before.saturating_sub(after));
    Ok(())
}
