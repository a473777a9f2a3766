//! Shared wiring for folio-api integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use folio_api::services::{Argon2CredentialHasher, Argon2Policy, OutboxMailer};
use folio_api::{ApiConfig, AppState};
use folio_llm::ProviderRegistry;
use folio_storage::InMemoryRecordStore;
use folio_test_utils::fixtures::{fast_config, fixed_clock};
use folio_test_utils::ManualClock;

pub struct TestApp {
    pub state: AppState,
    pub clock: ManualClock,
    pub outbox: Arc<OutboxMailer>,
    pub records: Arc<InMemoryRecordStore>,
}

pub fn test_config() -> ApiConfig {
    ApiConfig {
        ip_rate_limit_enabled: false,
        folio: fast_config(),
        ..ApiConfig::default()
    }
}

pub fn test_app() -> TestApp {
    test_app_with(test_config(), ProviderRegistry::with_default_scorer())
}

pub fn test_app_with(config: ApiConfig, registry: ProviderRegistry) -> TestApp {
    let clock = fixed_clock();
    let outbox = Arc::new(OutboxMailer::new());
    let records = Arc::new(InMemoryRecordStore::new());
    let state = AppState::builder(config)
        .clock(Arc::new(clock.clone()))
        .record_store(records.clone())
        .credential_hasher(Arc::new(Argon2CredentialHasher::new(Argon2Policy::minimal())))
        .mailer(outbox.clone())
        .providers(registry)
        .build()
        .expect("Failed to build test state");
    TestApp {
        state,
        clock,
        outbox,
        records,
    }
}
