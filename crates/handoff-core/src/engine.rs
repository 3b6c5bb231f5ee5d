//! `HandoffCore`: the components wired together over one store.

use std::sync::Arc;

use chrono::Duration;
use handoff_store::TokenStore;
use handoff_types::{
    ActorId, HandoffConfig, HandoffError, Payload, Result, SettlementRule, TokenId, TokenView,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::{
    AuditTrail, ClaimProcessor, ClaimReceipt, Clock, Closure, EscrowSettlement, ExpiryReaper,
    FailedClaimMonitor, IdSource, MintOptions, MintReceipt, Minter, OsIdSource, StatusCache,
    SweepReport, SystemClock,
};

pub struct HandoffCoreBuilder {
    store: Arc<dyn TokenStore>,
    config: HandoffConfig,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
    audit: AuditTrail,
}

impl HandoffCoreBuilder {
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn id_source(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.ids = ids;
        self
    }

    #[must_use]
    pub fn audit(mut self, audit: AuditTrail) -> Self {
        self.audit = audit;
        self
    }

    pub fn build(self) -> Result<HandoffCore> {
        self.config.validate()?;
        let Self {
            store,
            config,
            clock,
            ids,
            audit,
        } = self;

        Ok(HandoffCore {
            minter: Minter::new(
                Arc::clone(&store),
                ids,
                Arc::clone(&clock),
                audit.clone(),
                config.mint.clone(),
            ),
            claims: ClaimProcessor::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                audit.clone(),
                FailedClaimMonitor::from_config(&config.claim),
            ),
            escrow: EscrowSettlement::new(Arc::clone(&store), Arc::clone(&clock), audit.clone()),
            reaper: ExpiryReaper::new(Arc::clone(&store), clock, audit, &config.reaper),
            cache: Mutex::new(StatusCache::new(config.cache.status_capacity)),
            store,
            config,
        })
    }
}

/// Synchronous entry point to every token operation.
pub struct HandoffCore {
    store: Arc<dyn TokenStore>,
    config: HandoffConfig,
    minter: Minter,
    claims: ClaimProcessor,
    escrow: EscrowSettlement,
    reaper: ExpiryReaper,
    cache: Mutex<StatusCache>,
}

impl HandoffCore {
    /// Builder with the system clock, OS entropy, and no audit sinks.
    #[must_use]
    pub fn builder(store: Arc<dyn TokenStore>, config: HandoffConfig) -> HandoffCoreBuilder {
        HandoffCoreBuilder {
            store,
            config,
            clock: Arc::new(SystemClock),
            ids: Arc::new(OsIdSource),
            audit: AuditTrail::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &HandoffConfig {
        &self.config
    }

    /// Mint with an explicit TTL, or the configured default when `None`.
    pub fn mint(
        &self,
        issuer: ActorId,
        payload: Payload,
        ttl: Option<Duration>,
        options: MintOptions,
    ) -> Result<MintReceipt> {
        let ttl = ttl.unwrap_or_else(|| self.minter.default_ttl());
        self.minter.mint(issuer, payload, ttl, options)
    }

    pub fn claim(
        &self,
        token_id: &TokenId,
        claimant: ActorId,
        rule: Option<SettlementRule>,
    ) -> Result<ClaimReceipt> {
        let receipt = self.claims.claim(token_id, claimant, rule)?;
        self.cache.lock().remember(&receipt.token);
        Ok(receipt)
    }

    pub fn contribute_stake(
        &self,
        token_id: &TokenId,
        participant: ActorId,
        amount: Decimal,
        currency: impl Into<String>,
    ) -> Result<TokenView> {
        self.escrow.contribute(token_id, participant, amount, currency)
    }

    pub fn cancel(&self, token_id: &TokenId, operator: ActorId) -> Result<Closure> {
        let closure = self.claims.cancel(token_id, operator)?;
        self.cache.lock().remember(&closure.token);
        Ok(closure)
    }

    /// Read-only status. Terminal views may come from the cache; pending
    /// ones always come from the store.
    pub fn status(&self, token_id: &TokenId) -> Result<TokenView> {
        if let Some(view) = self.cache.lock().get(token_id) {
            return Ok(view.clone());
        }
        let view = self
            .store
            .get(token_id)?
            .map(|t| t.view())
            .ok_or(HandoffError::NotFound(*token_id))?;
        self.cache.lock().remember(&view);
        Ok(view)
    }

    pub fn find_by_idempotency_key(&self, issuer: &ActorId, key: &str) -> Result<Option<TokenView>> {
        self.minter.find_by_idempotency_key(issuer, key)
    }

    /// One reaper sweep. Also prunes idle failed-claim windows.
    pub fn sweep(&self) -> Result<SweepReport> {
        let report = self.reaper.sweep()?;
        self.claims.prune_monitor();
        Ok(report)
    }

    pub fn recent_failed_claims(&self, token_id: &TokenId) -> usize {
        self.claims.recent_failures(token_id)
    }
}

#[cfg(test)]
mod tests {
    use handoff_store::MemoryTokenStore;
    use handoff_types::TokenStatus;

    use super::*;

    #[test]
    fn invalid_config_refused() {
        let mut config = HandoffConfig::default();
        config.store.timeout_ms = 0;
        let result = HandoffCore::builder(Arc::new(MemoryTokenStore::new()), config).build();
        assert!(matches!(result, Err(HandoffError::Configuration(_))));
    }

    #[test]
    fn status_served_from_store_then_cache() {
        let store = Arc::new(MemoryTokenStore::new());
        let core = HandoffCore::builder(store.clone(), HandoffConfig::default())
            .build()
            .unwrap();
        let receipt = core
            .mint(ActorId::new("ServerA"), Payload::new(b"p".to_vec()), None, MintOptions::default())
            .unwrap();
        assert_eq!(core.status(&receipt.token_id).unwrap().status, TokenStatus::Pending);

        core.claim(&receipt.token_id, ActorId::new("ServerB"), None).unwrap();
        // Terminal views survive a store outage.
        store.set_unavailable(true);
        assert_eq!(core.status(&receipt.token_id).unwrap().status, TokenStatus::Claimed);
        // Claims never use the cache.
        assert!(core.claim(&receipt.token_id, ActorId::new("ServerC"), None).unwrap_err().is_transient());
    }

    #[test]
    fn default_ttl_applied() {
        let core = HandoffCore::builder(Arc::new(MemoryTokenStore::new()), HandoffConfig::default())
            .build()
            .unwrap();
        let receipt = core
            .mint(ActorId::new("ServerA"), Payload::new(b"p".to_vec()), None, MintOptions::default())
            .unwrap();
        let view = core.status(&receipt.token_id).unwrap();
        assert_eq!(view.expires_at - view.created_at, Duration::minutes(60));
    }

    #[test]
    fn status_of_unknown_token() {
        let core = HandoffCore::builder(Arc::new(MemoryTokenStore::new()), HandoffConfig::default())
            .build()
            .unwrap();
        assert!(matches!(
            core.status(&TokenId::from_bytes([0u8; 32])),
            Err(HandoffError::NotFound(_))
        ));
    }
}
