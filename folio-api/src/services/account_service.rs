//! Account flows: registration, email verification, password reset, login.
//!
//! Every flow that takes an email answers the same way whether or not the
//! address belongs to an account. Token consumption goes through the token
//! store's atomic `take_token`, so a token works at most once even when
//! requests race.

use std::sync::Arc;

use folio_core::{
    clock::add_duration, normalize_email, AccountSettings, AuthError, Clock, ConflictError,
    EntityIdType, ExpiredError, FolioError, FolioResult, LockoutState, NotFoundError,
    RateLimitAction, SecurityToken, Subject, SubjectId, TokenPurpose, TokenSettings,
    ValidationError,
};
use folio_storage::{SubjectStore, TokenRecordStore};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::constants::MAX_EMAIL_LENGTH;
use crate::services::credentials::CredentialHasher;
use crate::services::lockout::LockoutPolicy;
use crate::services::mailer::{Mailer, TokenMessage};
use crate::services::rate_limiter::RateLimiter;
use crate::services::token_service::TokenService;
use crate::telemetry::metrics;

static EMAIL_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Password compared against when the email is unknown, so both paths pay
/// for one hash verification.
const DUMMY_PASSWORD: &str = "folio-dummy-password";

/// Record stores used by the account flows.
#[derive(Clone)]
pub struct AccountStores {
    pub subjects: Arc<dyn SubjectStore>,
    pub tokens: Arc<dyn TokenRecordStore>,
}

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedSubject {
    pub subject_id: SubjectId,
    pub email_verified: bool,
}

pub struct AccountService {
    stores: AccountStores,
    hasher: Arc<dyn CredentialHasher>,
    mailer: Arc<dyn Mailer>,
    tokens: TokenService,
    rate_limiter: RateLimiter,
    lockout: LockoutPolicy,
    clock: Arc<dyn Clock>,
    token_settings: TokenSettings,
    account_settings: AccountSettings,
    dummy_hash: OnceCell<String>,
}

impl std::fmt::Debug for AccountService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountService")
            .field("token_settings", &self.token_settings)
            .field("account_settings", &self.account_settings)
            .finish_non_exhaustive()
    }
}

fn invalid_credentials() -> FolioError {
    AuthError::InvalidCredentials.into()
}

impl AccountService {
    pub fn new(
        stores: AccountStores,
        hasher: Arc<dyn CredentialHasher>,
        mailer: Arc<dyn Mailer>,
        rate_limiter: RateLimiter,
        lockout: LockoutPolicy,
        clock: Arc<dyn Clock>,
        settings: (&TokenSettings, &AccountSettings),
    ) -> Self {
        let (token_settings, account_settings) = settings;
        Self {
            stores,
            hasher,
            mailer,
            tokens: TokenService::new(),
            rate_limiter,
            lockout,
            clock,
            token_settings: token_settings.clone(),
            account_settings: account_settings.clone(),
            dummy_hash: OnceCell::new(),
        }
    }

    pub fn lockout(&self) -> &LockoutPolicy {
        &self.lockout
    }

    // ========================================================================
    // Registration and verification
    // ========================================================================

    /// Create an account and send a verification token.
    ///
    /// Registering an address that already has an account succeeds without
    /// sending anything.
    pub async fn register(&self, email: &str, password: &str) -> FolioResult<()> {
        let email = self.validate_email(email)?;
        self.rate_limiter
            .enforce(RateLimitAction::Register, &email)
            .await?;
        self.validate_password(password)?;

        // Hash before the existence check so both paths cost the same.
        let credential_hash = self.hash_password(password).await?;

        if self.stores.subjects.find_subject_by_email(&email).await?.is_some() {
            debug!("Registration for existing address ignored");
            return Ok(());
        }

        let subject = Subject {
            subject_id: SubjectId::now_v7(),
            email: email.clone(),
            credential_hash,
            email_verified_at: None,
            lockout: LockoutState::default(),
            created_at: self.clock.now(),
        };
        match self.stores.subjects.insert_subject(subject.clone()).await {
            Ok(()) => {}
            Err(FolioError::Conflict(ConflictError::DuplicateSubject)) => {
                debug!("Concurrent registration for the same address");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        info!(subject_id = %subject.subject_id, "Subject registered");

        self.issue_and_send(&subject, TokenPurpose::VerifyEmail).await
    }

    /// Send a fresh verification token to an unverified account.
    pub async fn request_email_verification(&self, email: &str) -> FolioResult<()> {
        let email = self.validate_email(email)?;
        self.rate_limiter
            .enforce(RateLimitAction::VerifyEmail, &email)
            .await?;

        match self.stores.subjects.find_subject_by_email(&email).await? {
            Some(subject) if !subject.is_email_verified() => {
                self.issue_and_send(&subject, TokenPurpose::VerifyEmail).await
            }
            _ => Ok(()),
        }
    }

    /// Consume a verification token and mark the owner's email verified.
    pub async fn verify_email(&self, raw_token: &str) -> FolioResult<SubjectId> {
        let token = self
            .consume_token(raw_token, TokenPurpose::VerifyEmail)
            .await?;
        self.stores
            .subjects
            .mark_email_verified(token.subject_id, self.clock.now())
            .await?;
        info!(subject_id = %token.subject_id, "Email verified");
        Ok(token.subject_id)
    }

    // ========================================================================
    // Password reset
    // ========================================================================

    /// Send a reset token if the address has an account.
    ///
    /// Earlier unused reset tokens for the account are revoked. The caller
    /// sees the same result either way.
    pub async fn request_password_reset(&self, email: &str) -> FolioResult<()> {
        let email = self.validate_email(email)?;
        self.rate_limiter
            .enforce(RateLimitAction::ForgotPassword, &email)
            .await?;

        match self.stores.subjects.find_subject_by_email(&email).await? {
            Some(subject) => {
                self.issue_and_send(&subject, TokenPurpose::ResetPassword)
                    .await
            }
            None => {
                debug!("Password reset requested for unknown address");
                Ok(())
            }
        }
    }

    /// Set a new password using a reset token.
    ///
    /// The password is validated before the token is consumed, so a rejected
    /// password leaves the token usable. Success clears any lockout.
    pub async fn reset_password(&self, raw_token: &str, new_password: &str) -> FolioResult<SubjectId> {
        self.validate_password(new_password)?;
        let token = self
            .consume_token(raw_token, TokenPurpose::ResetPassword)
            .await?;
        let credential_hash = self.hash_password(new_password).await?;

        self.stores
            .subjects
            .update_credential(token.subject_id, credential_hash)
            .await?;
        self.lockout.record_success(token.subject_id).await?;
        let revoked = self
            .stores
            .tokens
            .delete_tokens_for_subject(token.subject_id, TokenPurpose::ResetPassword)
            .await?;

        info!(subject_id = %token.subject_id, revoked, "Password reset");
        Ok(token.subject_id)
    }

    // ========================================================================
    // Login
    // ========================================================================

    /// Check credentials, applying the login rate limit and lockout.
    pub async fn authenticate(&self, email: &str, password: &str) -> FolioResult<AuthenticatedSubject> {
        let email = normalize_email(email);
        self.rate_limiter
            .enforce(RateLimitAction::Login, &email)
            .await?;

        let Some(subject) = self.stores.subjects.find_subject_by_email(&email).await? else {
            // Unknown addresses lock exactly like accounts do.
            self.lockout.ensure_unknown_unlocked(&email).await?;
            self.burn_verification(password).await;
            let state = self.lockout.record_unknown_failure(&email).await?;
            debug!(failed_attempts = state.failed_attempts, "Login failed");
            return Err(invalid_credentials());
        };

        self.lockout.ensure_unlocked(&subject)?;

        if !self.verify_password(password, &subject.credential_hash).await {
            let state = self.lockout.record_failure(subject.subject_id).await?;
            debug!(
                subject_id = %subject.subject_id,
                failed_attempts = state.failed_attempts,
                "Login failed"
            );
            return Err(invalid_credentials());
        }

        if subject.lockout.failed_attempts > 0 || subject.lockout.lock_until.is_some() {
            self.lockout.record_success(subject.subject_id).await?;
        }
        info!(subject_id = %subject.subject_id, "Login succeeded");
        Ok(AuthenticatedSubject {
            subject_id: subject.subject_id,
            email_verified: subject.is_email_verified(),
        })
    }

    // ========================================================================
    // Tokens
    // ========================================================================

    /// Atomically consume a token of `purpose`.
    ///
    /// Unknown, already-used and wrong-purpose tokens all fail with
    /// `NotFoundError::Token`. Of concurrent callers presenting the same
    /// secret, exactly one succeeds.
    pub async fn consume_token(&self, raw: &str, purpose: TokenPurpose) -> FolioResult<SecurityToken> {
        let hash = TokenService::hash_secret(raw.trim());
        let rejected = || {
            if let Some(metrics) = metrics() {
                metrics.record_token_event(purpose.as_str(), "rejected");
            }
        };

        // Peek first so a token presented to the wrong flow is not destroyed.
        match self.stores.tokens.find_token(&hash).await? {
            Some(found) if found.purpose == purpose => {}
            _ => {
                rejected();
                return Err(NotFoundError::Token.into());
            }
        }

        let Some(mut token) = self.stores.tokens.take_token(&hash).await? else {
            rejected();
            return Err(NotFoundError::Token.into());
        };
        if !self.tokens.verify(raw.trim(), &token.hashed_secret) {
            rejected();
            return Err(NotFoundError::Token.into());
        }

        let now = self.clock.now();
        if token.is_expired_at(now) {
            rejected();
            debug!(purpose = %purpose, "Expired token presented");
            return Err(ExpiredError::Token { purpose }.into());
        }

        token.consumed_at = Some(now);
        if let Some(metrics) = metrics() {
            metrics.record_token_event(purpose.as_str(), "consumed");
        }
        info!(subject_id = %token.subject_id, purpose = %purpose, "Token consumed");
        Ok(token)
    }

    /// Delete expired tokens. Returns how many were removed.
    pub async fn purge_expired_tokens(&self) -> FolioResult<u64> {
        let purged = self
            .stores
            .tokens
            .purge_expired_tokens(self.clock.now())
            .await?;
        if purged > 0 {
            info!(purged, "Expired tokens purged");
        }
        Ok(purged)
    }

    async fn issue_and_send(&self, subject: &Subject, purpose: TokenPurpose) -> FolioResult<()> {
        if purpose.is_exclusive() {
            self.stores
                .tokens
                .delete_tokens_for_subject(subject.subject_id, purpose)
                .await?;
        }

        let issued = self.tokens.issue();
        let now = self.clock.now();
        let ttl = match purpose {
            TokenPurpose::VerifyEmail => self.token_settings.verify_email_ttl,
            TokenPurpose::ResetPassword => self.token_settings.reset_password_ttl,
        };
        self.stores
            .tokens
            .insert_token(SecurityToken {
                hashed_secret: issued.hash,
                subject_id: subject.subject_id,
                purpose,
                created_at: now,
                expires_at: add_duration(now, ttl),
                consumed_at: None,
            })
            .await?;
        if let Some(metrics) = metrics() {
            metrics.record_token_event(purpose.as_str(), "issued");
        }
        info!(subject_id = %subject.subject_id, purpose = %purpose, "Token issued");

        let message = TokenMessage {
            to: subject.email.clone(),
            purpose,
            secret: issued.secret,
        };
        // A delivery failure must not change the response for a known address.
        if let Err(e) = self.mailer.send_token(message).await {
            warn!(subject_id = %subject.subject_id, error = %e, "Token delivery failed");
        }
        Ok(())
    }

    // ========================================================================
    // Validation and hashing
    // ========================================================================

    fn validate_email(&self, email: &str) -> FolioResult<String> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "email".to_string(),
            }
            .into());
        }
        if email.len() > MAX_EMAIL_LENGTH {
            return Err(ValidationError::TooLong {
                field: "email".to_string(),
                max: MAX_EMAIL_LENGTH,
                actual: email.len(),
            }
            .into());
        }
        let well_formed = EMAIL_PATTERN
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(&email));
        if !well_formed {
            return Err(ValidationError::InvalidValue {
                field: "email".to_string(),
                reason: "not a valid email address".to_string(),
            }
            .into());
        }
        Ok(email)
    }

    fn validate_password(&self, password: &str) -> FolioResult<()> {
        let length = password.chars().count();
        if length < self.account_settings.min_password_length {
            return Err(ValidationError::InvalidValue {
                field: "password".to_string(),
                reason: format!(
                    "must be at least {} characters",
                    self.account_settings.min_password_length
                ),
            }
            .into());
        }
        if length > self.account_settings.max_password_length {
            return Err(ValidationError::TooLong {
                field: "password".to_string(),
                max: self.account_settings.max_password_length,
                actual: length,
            }
            .into());
        }
        Ok(())
    }

    async fn hash_password(&self, password: &str) -> FolioResult<String> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::HashingFailed {
                reason: e.to_string(),
            })?
    }

    async fn verify_password(&self, password: &str, hash: &str) -> bool {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .unwrap_or(false)
    }

    /// Spend one verification on the dummy hash.
    ///
    /// The dummy hash is built once, on the blocking pool like every other
    /// hash.
    async fn burn_verification(&self, password: &str) {
        let dummy = self
            .dummy_hash
            .get_or_try_init(|| self.hash_password(DUMMY_PASSWORD))
            .await
            .ok()
            .cloned();
        if let Some(hash) = dummy {
            let _ = self.verify_password(password, &hash).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::credentials::{Argon2CredentialHasher, Argon2Policy};
    use crate::services::mailer::OutboxMailer;
    use folio_core::{FolioConfig, ManualClock, RateLimitPolicy, ThrottleError};
    use folio_storage::{InMemoryKeyValueStore, InMemoryRecordStore};
    use std::time::Duration;

    struct Harness {
        service: AccountService,
        records: Arc<InMemoryRecordStore>,
        outbox: Arc<OutboxMailer>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        harness_with(FolioConfig::default())
    }

    fn harness_with(config: FolioConfig) -> Harness {
        harness_with_hasher(
            config,
            Arc::new(Argon2CredentialHasher::new(Argon2Policy::minimal())),
        )
    }

    fn harness_with_hasher(config: FolioConfig, hasher: Arc<dyn CredentialHasher>) -> Harness {
        let clock = Arc::new(ManualClock::starting_now());
        let records = Arc::new(InMemoryRecordStore::new());
        let kv = Arc::new(InMemoryKeyValueStore::new(clock.clone()));
        let outbox = Arc::new(OutboxMailer::new());
        let service = AccountService::new(
            AccountStores {
                subjects: records.clone(),
                tokens: records.clone(),
            },
            hasher,
            outbox.clone(),
            RateLimiter::new(kv.clone(), clock.clone(), config.rate_limits.clone()),
            LockoutPolicy::new(records.clone(), kv.clone(), clock.clone(), config.lockout.clone()),
            clock.clone(),
            (&config.tokens, &config.accounts),
        );
        Harness {
            service,
            records,
            outbox,
            clock,
        }
    }

    const EMAIL: &str = "writer@example.com";
    const PASSWORD: &str = "a-long-password";

    #[tokio::test]
    async fn test_register_sends_verification() {
        let h = harness();
        h.service.register(EMAIL, PASSWORD).await.unwrap();
        assert_eq!(h.records.subject_count(), 1);
        let secret = h
            .outbox
            .latest_secret(EMAIL, TokenPurpose::VerifyEmail)
            .unwrap();

        let subject_id = h.service.verify_email(&secret).await.unwrap();
        let subject = h.records.get_subject(subject_id).await.unwrap().unwrap();
        assert!(subject.is_email_verified());
        assert!(h.service.verify_email(&secret).await.is_err());
    }

    #[tokio::test]
    async fn test_register_existing_address_is_silent() {
        let h = harness();
        h.service.register(EMAIL, PASSWORD).await.unwrap();
        h.service.register("  Writer@Example.com", PASSWORD).await.unwrap();
        assert_eq!(h.records.subject_count(), 1);
        assert_eq!(h.outbox.count_for(EMAIL), 1);
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let h = harness();
        assert!(matches!(
            h.service.register("not-an-email", PASSWORD).await,
            Err(FolioError::Validation(_))
        ));
        assert!(matches!(
            h.service.register(EMAIL, "short").await,
            Err(FolioError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_flow() {
        let h = harness();
        h.service.register(EMAIL, PASSWORD).await.unwrap();
        h.service.request_password_reset(EMAIL).await.unwrap();
        let secret = h
            .outbox
            .latest_secret(EMAIL, TokenPurpose::ResetPassword)
            .unwrap();

        h.service.reset_password(&secret, "a-new-password").await.unwrap();
        h.service.authenticate(EMAIL, "a-new-password").await.unwrap();
        assert!(h.service.authenticate(EMAIL, PASSWORD).await.is_err());

        let replay = h.service.reset_password(&secret, "another-password").await;
        assert_eq!(replay.unwrap_err(), FolioError::NotFound(NotFoundError::Token));
    }

    #[tokio::test]
    async fn test_unknown_address_reset_is_indistinguishable() {
        let h = harness();
        h.service.register(EMAIL, PASSWORD).await.unwrap();
        let known = h.service.request_password_reset(EMAIL).await;
        let unknown = h.service.request_password_reset("nobody@example.com").await;
        assert_eq!(known, unknown);
        assert!(h
            .outbox
            .latest_secret("nobody@example.com", TokenPurpose::ResetPassword)
            .is_none());
    }

    #[tokio::test]
    async fn test_new_reset_token_revokes_previous() {
        let h = harness();
        h.service.register(EMAIL, PASSWORD).await.unwrap();
        h.service.request_password_reset(EMAIL).await.unwrap();
        let first = h
            .outbox
            .latest_secret(EMAIL, TokenPurpose::ResetPassword)
            .unwrap();
        h.service.request_password_reset(EMAIL).await.unwrap();
        assert!(h.service.reset_password(&first, "a-new-password").await.is_err());
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let h = harness();
        h.service.register(EMAIL, PASSWORD).await.unwrap();
        h.service.request_password_reset(EMAIL).await.unwrap();
        let secret = h
            .outbox
            .latest_secret(EMAIL, TokenPurpose::ResetPassword)
            .unwrap();
        h.clock.advance(Duration::from_secs(3600));
        assert!(matches!(
            h.service.reset_password(&secret, "a-new-password").await,
            Err(FolioError::Expired(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_purpose_does_not_burn_token() {
        let h = harness();
        h.service.register(EMAIL, PASSWORD).await.unwrap();
        let secret = h
            .outbox
            .latest_secret(EMAIL, TokenPurpose::VerifyEmail)
            .unwrap();
        assert!(h.service.reset_password(&secret, "a-new-password").await.is_err());
        assert!(h.service.verify_email(&secret).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_password_keeps_token_usable() {
        let h = harness();
        h.service.register(EMAIL, PASSWORD).await.unwrap();
        h.service.request_password_reset(EMAIL).await.unwrap();
        let secret = h
            .outbox
            .latest_secret(EMAIL, TokenPurpose::ResetPassword)
            .unwrap();
        assert!(h.service.reset_password(&secret, "short").await.is_err());
        assert!(h.service.reset_password(&secret, "a-new-password").await.is_ok());
    }

    #[tokio::test]
    async fn test_lockout_after_failures_and_reset_clears_it() {
        let h = harness();
        h.service.register(EMAIL, PASSWORD).await.unwrap();
        for _ in 0..5 {
            assert!(matches!(
                h.service.authenticate(EMAIL, "wrong-password").await,
                Err(FolioError::Auth(AuthError::InvalidCredentials))
            ));
        }
        let subject = h.records.find_subject_by_email(EMAIL).await.unwrap().unwrap();
        assert!(h.service.lockout().is_locked(&subject));

        h.service.request_password_reset(EMAIL).await.unwrap();
        let secret = h
            .outbox
            .latest_secret(EMAIL, TokenPurpose::ResetPassword)
            .unwrap();
        h.service.reset_password(&secret, "a-new-password").await.unwrap();
        let subject = h.records.find_subject_by_email(EMAIL).await.unwrap().unwrap();
        assert!(!h.service.lockout().is_locked(&subject));
        assert_eq!(subject.lockout.failed_attempts, 0);
    }

    #[tokio::test]
    async fn test_locked_account_rejects_correct_password() {
        let mut config = FolioConfig::default();
        config.rate_limits.login = RateLimitPolicy::new(100, Duration::from_secs(60));
        let h = harness_with(config);
        h.service.register(EMAIL, PASSWORD).await.unwrap();
        for _ in 0..5 {
            let _ = h.service.authenticate(EMAIL, "wrong-password").await;
        }

        let err = h.service.authenticate(EMAIL, PASSWORD).await.unwrap_err();
        assert!(matches!(
            err,
            FolioError::Throttled(ThrottleError::AccountLocked { .. })
        ));
        assert_eq!(err.retry_after_secs(), Some(15 * 60));

        h.clock.advance(Duration::from_secs(15 * 60));
        let subject = h.service.authenticate(EMAIL, PASSWORD).await.unwrap();
        assert!(!subject.email_verified);
    }

    #[tokio::test]
    async fn test_unknown_email_login_fails_generically() {
        let h = harness();
        let err = h
            .service
            .authenticate("ghost@example.com", PASSWORD)
            .await
            .unwrap_err();
        assert_eq!(err, FolioError::Auth(AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_lockout_does_not_reveal_unknown_addresses() {
        let h = harness();
        h.service.register(EMAIL, PASSWORD).await.unwrap();
        let ghost = "ghost@example.com";

        // One failure, then four more late in the same rate-limit window, so
        // the window rolls over before the next attempt.
        for email in [EMAIL, ghost] {
            assert!(h.service.authenticate(email, "wrong-password").await.is_err());
        }
        h.clock.advance(Duration::from_secs(14 * 60));
        for _ in 0..4 {
            for email in [EMAIL, ghost] {
                assert!(h.service.authenticate(email, "wrong-password").await.is_err());
            }
        }
        h.clock.advance(Duration::from_secs(61));

        let known = h.service.authenticate(EMAIL, PASSWORD).await.unwrap_err();
        let unknown = h.service.authenticate(ghost, PASSWORD).await.unwrap_err();
        assert!(matches!(
            known,
            FolioError::Throttled(ThrottleError::AccountLocked { .. })
        ));
        assert_eq!(known, unknown);
    }

    /// Records the thread every hash runs on.
    struct ThreadRecordingHasher {
        inner: Argon2CredentialHasher,
        hash_threads: std::sync::Mutex<Vec<std::thread::ThreadId>>,
    }

    impl CredentialHasher for ThreadRecordingHasher {
        fn hash(&self, password: &str) -> FolioResult<String> {
            self.hash_threads
                .lock()
                .unwrap()
                .push(std::thread::current().id());
            self.inner.hash(password)
        }

        fn verify(&self, password: &str, hash: &str) -> bool {
            self.inner.verify(password, hash)
        }
    }

    #[tokio::test]
    async fn test_dummy_hash_built_off_the_runtime_thread() {
        let hasher = Arc::new(ThreadRecordingHasher {
            inner: Argon2CredentialHasher::new(Argon2Policy::minimal()),
            hash_threads: std::sync::Mutex::new(Vec::new()),
        });
        let h = harness_with_hasher(FolioConfig::default(), hasher.clone());

        for _ in 0..3 {
            let err = h
                .service
                .authenticate("nobody@example.com", PASSWORD)
                .await
                .unwrap_err();
            assert_eq!(err, FolioError::Auth(AuthError::InvalidCredentials));
        }

        // Built once, never on the test's runtime thread.
        let threads = hasher.hash_threads.lock().unwrap();
        assert_eq!(threads.len(), 1);
        assert_ne!(threads[0], std::thread::current().id());
        assert!(h.service.dummy_hash.initialized());
    }

    #[tokio::test]
    async fn test_purge_expired_tokens() {
        let h = harness();
        h.service.register(EMAIL, PASSWORD).await.unwrap();
        h.clock.advance(Duration::from_secs(25 * 3600));
        assert_eq!(h.service.purge_expired_tokens().await.unwrap(), 1);
        assert_eq!(h.records.token_count(), 0);
    }
}
