//! Async facade over [`HandoffCore`].
//!
//! Core calls are synchronous and may block on the store, so each one runs
//! on the blocking pool under `store.timeout_ms`. A call that outlives the
//! bound reports `StoreUnavailable`; the blocking work itself is not
//! aborted, so the outcome of a timed-out claim is unknown and the caller
//! should query status before retrying.

use std::sync::Arc;
use std::time::Duration;

use handoff_core::{
    AuditTrail, ClaimReceipt, Closure, HandoffCore, MintReceipt, SweepReport, TracingAuditSink,
};
use handoff_store::TokenStore;
use handoff_types::{
    ActorId, AuditEvent, AuditSinkKind, HandoffConfig, HandoffError, Result, TokenId, TokenView,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::audit_channel::ChannelAuditSink;
use crate::requests::{CancelRequest, ClaimRequest, MintRequest, StakeRequest};
use crate::reaper_task;
use crate::shutdown::ShutdownController;

#[derive(Clone)]
pub struct TokenService {
    core: Arc<HandoffCore>,
    timeout: Duration,
}

impl TokenService {
    #[must_use]
    pub fn new(core: Arc<HandoffCore>) -> Self {
        let timeout = core.config().store.timeout();
        Self { core, timeout }
    }

    /// Build the core from configuration with the configured audit sink.
    ///
    /// Returns the audit receiver when `audit.sink = "channel"`.
    pub fn from_config(
        store: Arc<dyn TokenStore>,
        config: HandoffConfig,
    ) -> Result<(Self, Option<mpsc::Receiver<AuditEvent>>)> {
        let (audit, receiver) = match config.audit.sink {
            AuditSinkKind::Tracing => (
                AuditTrail::new().with_sink(Arc::new(TracingAuditSink)),
                None,
            ),
            AuditSinkKind::Channel => {
                let (sink, rx) = ChannelAuditSink::new(config.audit.channel_capacity);
                (AuditTrail::new().with_sink(Arc::new(sink)), Some(rx))
            }
            AuditSinkKind::Off => (AuditTrail::new(), None),
        };
        let core = HandoffCore::builder(store, config).audit(audit).build()?;
        Ok((Self::new(Arc::new(core)), receiver))
    }

    #[must_use]
    pub fn core(&self) -> &Arc<HandoffCore> {
        &self.core
    }

    async fn run<T, F>(&self, op: &'static str, bounded: bool, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&HandoffCore) -> Result<T> + Send + 'static,
    {
        let core = Arc::clone(&self.core);
        let task = tokio::task::spawn_blocking(move || f(&core));
        let joined = if bounded {
            match tokio::time::timeout(self.timeout, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!(op, timeout = ?self.timeout, "store call timed out");
                    return Err(HandoffError::StoreUnavailable {
                        reason: format!("{op} timed out after {}ms", self.timeout.as_millis()),
                    });
                }
            }
        } else {
            task.await
        };
        joined.map_err(|e| HandoffError::Internal(format!("{op} task failed: {e}")))?
    }

    pub async fn mint(&self, request: MintRequest) -> Result<MintReceipt> {
        let MintRequest {
            issuer,
            payload,
            ttl_secs,
            options,
        } = request;
        let ttl = ttl_secs
            .map(|secs| {
                chrono::Duration::try_seconds(secs).ok_or(HandoffError::InvalidTtl {
                    ttl_secs: secs,
                    max_secs: self.core.config().mint.max_ttl_secs,
                })
            })
            .transpose()?;
        self.run("mint", true, move |core| core.mint(issuer, payload, ttl, options))
            .await
    }

    pub async fn claim(&self, request: ClaimRequest) -> Result<ClaimReceipt> {
        let ClaimRequest {
            token_id,
            claimant,
            rule,
        } = request;
        self.run("claim", true, move |core| core.claim(&token_id, claimant, rule))
            .await
    }

    pub async fn contribute_stake(&self, request: StakeRequest) -> Result<TokenView> {
        let StakeRequest {
            token_id,
            participant,
            amount,
            currency,
        } = request;
        self.run("contribute_stake", true, move |core| {
            core.contribute_stake(&token_id, participant, amount, currency)
        })
        .await
    }

    pub async fn cancel(&self, request: CancelRequest) -> Result<Closure> {
        let CancelRequest { token_id, operator } = request;
        self.run("cancel", true, move |core| core.cancel(&token_id, operator))
            .await
    }

    pub async fn status(&self, token_id: TokenId) -> Result<TokenView> {
        self.run("status", true, move |core| core.status(&token_id)).await
    }

    pub async fn find_by_idempotency_key(
        &self,
        issuer: ActorId,
        key: String,
    ) -> Result<Option<TokenView>> {
        self.run("find_by_idempotency_key", true, move |core| {
            core.find_by_idempotency_key(&issuer, &key)
        })
        .await
    }

    /// One sweep. Not bounded by the store timeout: a sweep is many store
    /// calls and is safe to let finish.
    pub async fn sweep(&self) -> Result<SweepReport> {
        self.run("sweep", false, HandoffCore::sweep).await
    }

    /// Start the periodic reaper if enabled in configuration.
    pub fn spawn_reaper(&self, shutdown: &ShutdownController) -> Option<JoinHandle<()>> {
        let reaper = &self.core.config().reaper;
        if !reaper.enabled {
            tracing::info!("expiry reaper disabled");
            return None;
        }
        Some(reaper_task::spawn_reaper(
            Arc::clone(&self.core),
            reaper.interval(),
            shutdown.subscribe(),
        ))
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
