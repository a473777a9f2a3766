//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use folio_core::{Clock, FolioResult, SystemClock};
use folio_llm::{CachedProviders, ProviderRegistry, ProviderTtls};
use folio_storage::{
    CacheConfig, ComputeCache, InMemoryKeyValueStore, InMemoryRecordStore, KeyValueStore,
    VersionStore,
};

use crate::config::ApiConfig;
use crate::services::{
    AccountService, AccountStores, Argon2CredentialHasher, BatchOrchestrator, CredentialHasher,
    LockoutPolicy, Mailer, OutboxMailer, RateLimiter,
};

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub accounts: Arc<AccountService>,
    /// Per-action limiter, shared with the account service's counters.
    pub rate_limiter: RateLimiter,
    /// Backing store for cache entries, counters and unknown-address lockouts.
    pub kv: Arc<dyn KeyValueStore>,
    pub versions: Arc<VersionStore>,
    pub batch: BatchOrchestrator,
    pub providers: CachedProviders,
    pub start_time: Instant,
}

crate::impl_from_ref!(Arc<AccountService>, accounts);
crate::impl_from_ref!(RateLimiter, rate_limiter);
crate::impl_from_ref!(Arc<VersionStore>, versions);
crate::impl_from_ref!(BatchOrchestrator, batch);
crate::impl_from_ref!(CachedProviders, providers);
crate::impl_from_ref!(Instant, start_time);

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("accounts", &self.accounts)
            .field("rate_limiter", &self.rate_limiter)
            .field("versions", &self.versions)
            .field("batch", &self.batch)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn builder(config: ApiConfig) -> AppStateBuilder {
        AppStateBuilder::new(config)
    }

    /// Drop expired tokens and expired key-value entries.
    pub async fn purge_expired(&self) -> FolioResult<()> {
        self.accounts.purge_expired_tokens().await?;
        let purged = self.kv.purge_expired().await?;
        if purged > 0 {
            tracing::info!(purged, "Expired cache and counter entries purged");
        }
        Ok(())
    }
}

/// Wires services over shared backends. Anything not supplied falls back to
/// the in-memory implementation.
pub struct AppStateBuilder {
    config: ApiConfig,
    clock: Arc<dyn Clock>,
    kv: Option<Arc<dyn KeyValueStore>>,
    records: Option<Arc<InMemoryRecordStore>>,
    hasher: Arc<dyn CredentialHasher>,
    mailer: Arc<dyn Mailer>,
    registry: ProviderRegistry,
}

impl AppStateBuilder {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            kv: None,
            records: None,
            hasher: Arc::new(Argon2CredentialHasher::default()),
            mailer: Arc::new(OutboxMailer::new()),
            registry: ProviderRegistry::with_default_scorer(),
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn key_value_store(mut self, kv: Arc<dyn KeyValueStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    pub fn record_store(mut self, records: Arc<InMemoryRecordStore>) -> Self {
        self.records = Some(records);
        self
    }

    pub fn credential_hasher(mut self, hasher: Arc<dyn CredentialHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn providers(mut self, registry: ProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Validate the configuration and assemble the state.
    pub fn build(self) -> FolioResult<AppState> {
        self.config.validate()?;
        let folio = &self.config.folio;
        let clock = self.clock;

        let kv: Arc<dyn KeyValueStore> = match self.kv {
            Some(kv) => kv,
            None => Arc::new(InMemoryKeyValueStore::new(clock.clone())),
        };
        let records = self
            .records
            .unwrap_or_else(|| Arc::new(InMemoryRecordStore::new()));

        let cache = ComputeCache::new(kv.clone(), clock.clone(), CacheConfig::from(&folio.cache));
        let providers = CachedProviders::new(
            Arc::new(self.registry),
            cache,
            ProviderTtls::from(&folio.cache),
        );

        let rate_limiter = RateLimiter::new(kv.clone(), clock.clone(), folio.rate_limits.clone());
        let lockout = LockoutPolicy::new(
            records.clone(),
            kv.clone(),
            clock.clone(),
            folio.lockout.clone(),
        );
        let accounts = AccountService::new(
            AccountStores {
                subjects: records.clone(),
                tokens: records.clone(),
            },
            self.hasher,
            self.mailer,
            rate_limiter.clone(),
            lockout,
            clock.clone(),
            (&folio.tokens, &folio.accounts),
        );

        let versions = Arc::new(VersionStore::new(
            records,
            clock,
            folio.versions.clone(),
        ));
        let batch = BatchOrchestrator::new(providers.clone(), versions.clone(), folio.batch.clone());

        Ok(AppState {
            config: Arc::new(self.config),
            accounts: Arc::new(accounts),
            rate_limiter,
            kv,
            versions,
            batch,
            providers,
            start_time: Instant::now(),
        })
    }
}
