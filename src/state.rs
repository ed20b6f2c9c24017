use chrono::FixedOffset;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};

use crate::client::cache::{ResponseCache, SystemClock};
use crate::client::notifications::{
    CachedPanchang, MemoryNotificationPlatform, NotificationScheduler, PreferenceStore,
};
use crate::client::storage::KeyValueStore;
use crate::clients::{ComputeClient, DocumentIndexClient, GeminiClient, Oracle};
use crate::config::Config;
use crate::db::LocalStorage;
use crate::domain::PlatformEvent;

/// One pooled HTTP client shared by every downstream integration.
/// No global timeout: per-request timeouts are set where configured.
fn build_shared_http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("FutureBot/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build shared HTTP client: {e}"))
}

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub storage: LocalStorage,

    pub compute: ComputeClient,

    pub oracle: Oracle,

    pub index: DocumentIndexClient,

    pub event_bus: broadcast::Sender<PlatformEvent>,

    pub notification_platform: Arc<MemoryNotificationPlatform>,

    pub rescheduler: Arc<NotificationScheduler>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let (event_bus, _) = broadcast::channel(config.general.event_bus_buffer_size.max(1));
        Self::with_event_bus(config, event_bus).await
    }

    pub async fn with_event_bus(
        config: Config,
        event_bus: broadcast::Sender<PlatformEvent>,
    ) -> anyhow::Result<Self> {
        let storage = LocalStorage::open(&config.general.storage_path).await?;
        let kv: Arc<dyn KeyValueStore> = Arc::new(storage.clone());

        let http_client = build_shared_http_client()?;

        let compute = ComputeClient::with_shared_client(http_client.clone(), &config.compute);
        let index = DocumentIndexClient::with_shared_client(http_client.clone(), &config.index);
        let oracle = Oracle::new(
            Arc::new(GeminiClient::with_shared_client(http_client, &config.oracle)),
            &config.oracle,
        );

        let astro_cache = ResponseCache::astro(Arc::clone(&kv), config.cache.ttl()?);

        let utc_offset = FixedOffset::east_opt(config.notifications.utc_offset_minutes * 60)
            .ok_or_else(|| anyhow::anyhow!("Invalid UTC offset"))?;

        let notification_platform = Arc::new(MemoryNotificationPlatform::new());
        let rescheduler = Arc::new(NotificationScheduler::new(
            notification_platform.clone(),
            Arc::new(CachedPanchang::new(compute.clone(), astro_cache)),
            PreferenceStore::new(kv),
            Arc::new(SystemClock),
            utc_offset,
            (config.notifications.lat, config.notifications.lon),
        ));

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            storage,
            compute,
            oracle,
            index,
            event_bus,
            notification_platform,
            rescheduler,
        })
    }
}
