//! End-to-end tests across mint, stake, claim, cancel, and expiry.
//!
//! These drive `HandoffCore` over the memory store with a manual clock, in
//! the scenarios a game backend actually runs: cross-server item transfer,
//! two-party wagers, concurrent redemption, and the reaper racing claims.

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, Utc};
use handoff_core::{AuditTrail, HandoffCore, ManualClock, MemoryAuditSink, MintOptions};
use handoff_store::{MemoryTokenStore, TokenStore};
use handoff_types::{
    ActorId, AuditKind, EscrowPhase, HandoffConfig, HandoffError, Payload, SettlementRule,
    StakeRequirement, TokenId, TokenStatus,
};
use rust_decimal::Decimal;

/// Helper: one core over a memory store, a manual clock, and a memory sink.
struct Harness {
    store: Arc<MemoryTokenStore>,
    clock: Arc<ManualClock>,
    audit: Arc<MemoryAuditSink>,
    core: Arc<HandoffCore>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(HandoffConfig::default())
    }

    fn with_config(config: HandoffConfig) -> Self {
        let store = Arc::new(MemoryTokenStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let audit = Arc::new(MemoryAuditSink::new());
        let core = HandoffCore::builder(store.clone(), config)
            .clock(clock.clone())
            .audit(AuditTrail::new().with_sink(audit.clone()))
            .build()
            .expect("default config is valid");
        Self {
            store,
            clock,
            audit,
            core: Arc::new(core),
        }
    }

    fn mint(&self, payload: &[u8], ttl: Duration) -> TokenId {
        self.core
            .mint(
                ActorId::new("ServerA"),
                Payload::new(payload.to_vec()),
                Some(ttl),
                MintOptions::default(),
            )
            .expect("mint should succeed")
            .token_id
    }

    fn mint_wager(&self, ttl: Duration) -> TokenId {
        self.core
            .mint(
                ActorId::new("MatchServer"),
                Payload::new(b"{\"match\":\"m-1\"}".to_vec()),
                Some(ttl),
                MintOptions::default().with_escrow(vec![
                    StakeRequirement::new("A", Decimal::new(50, 0), "GOLD"),
                    StakeRequirement::new("B", Decimal::new(50, 0), "GOLD"),
                ]),
            )
            .expect("wager mint should succeed")
            .token_id
    }

    fn stake(&self, id: &TokenId, who: &str) -> Result<EscrowPhase, HandoffError> {
        self.core
            .contribute_stake(id, ActorId::new(who), Decimal::new(50, 0), "GOLD")
            .map(|v| v.escrow_phase.expect("escrow token"))
    }
}

// =========================================================================
// Plain tokens
// =========================================================================

#[test]
fn goalie_mask_transfer_between_servers() {
    let h = Harness::new();
    let payload = br#"{"item":"GoalieMask_Gold"}"#;
    let id = h.mint(payload, Duration::minutes(60));

    let receipt = h
        .core
        .claim(&id, ActorId::new("ServerB"), None)
        .expect("ServerB claims");
    assert_eq!(receipt.payload().unwrap().as_bytes(), payload);
    assert_eq!(receipt.token.status, TokenStatus::Claimed);
    assert_eq!(receipt.token.claimed_by, Some(ActorId::new("ServerB")));

    let err = h.core.claim(&id, ActorId::new("ServerC"), None).unwrap_err();
    assert!(matches!(err, HandoffError::AlreadyClaimed(_)));
    assert!(err.is_final());

    assert_eq!(h.audit.count(&id, AuditKind::Minted), 1);
    assert_eq!(h.audit.count(&id, AuditKind::ClaimSucceeded), 1);
    assert_eq!(h.audit.count(&id, AuditKind::ClaimRejected), 1);
}

#[test]
fn payload_roundtrip_is_byte_exact() {
    let h = Harness::new();
    let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    let id = h.mint(&payload, Duration::minutes(5));
    let receipt = h.core.claim(&id, ActorId::new("s"), None).unwrap();
    assert_eq!(receipt.payload().unwrap().as_bytes(), payload.as_slice());
}

#[test]
fn reclaim_after_success_is_already_claimed() {
    let h = Harness::new();
    let id = h.mint(b"once", Duration::minutes(5));
    h.core.claim(&id, ActorId::new("ServerB"), None).unwrap();
    // The same caller retrying after a timeout reads this as "probably mine".
    let err = h.core.claim(&id, ActorId::new("ServerB"), None).unwrap_err();
    assert!(matches!(err, HandoffError::AlreadyClaimed(_)));
}

#[test]
fn expired_then_claim() {
    let h = Harness::new();
    let id = h.mint(b"stale", Duration::seconds(90));
    h.clock.advance(Duration::seconds(91));

    let report = h.core.sweep().unwrap();
    assert_eq!(report.expired, vec![id]);
    assert_eq!(h.audit.count(&id, AuditKind::Expired), 1);

    let err = h.core.claim(&id, ActorId::new("s"), None).unwrap_err();
    assert!(matches!(err, HandoffError::Expired(_)));
    assert_eq!(h.core.status(&id).unwrap().status, TokenStatus::Expired);
}

#[test]
fn cancelled_token_cannot_be_claimed() {
    let h = Harness::new();
    let id = h.mint(b"oops", Duration::minutes(5));
    let closure = h.core.cancel(&id, ActorId::new("ops")).unwrap();
    assert_eq!(closure.token.closed_by, Some(ActorId::new("ops")));
    assert!(closure.refunds.is_empty());

    let err = h.core.claim(&id, ActorId::new("s"), None).unwrap_err();
    assert!(matches!(err, HandoffError::Cancelled(_)));
    assert_eq!(h.audit.count(&id, AuditKind::Cancelled), 1);
}

#[test]
fn concurrent_claims_exactly_one_winner() {
    const RACERS: usize = 16;
    let h = Harness::new();
    let id = h.mint(b"contested", Duration::minutes(5));

    let barrier = Arc::new(Barrier::new(RACERS));
    let handles: Vec<_> = (0..RACERS)
        .map(|i| {
            let core = Arc::clone(&h.core);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                core.claim(&id, ActorId::new(format!("server-{i}")), None)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, HandoffError::AlreadyClaimed(_))));
    assert_eq!(h.audit.count(&id, AuditKind::ClaimSucceeded), 1);
    assert_eq!(h.audit.count(&id, AuditKind::ClaimRejected), RACERS - 1);
}

#[test]
fn sweep_racing_claims_never_double_transitions() {
    let h = Harness::new();
    let ids: Vec<TokenId> = (0..40u8).map(|i| h.mint(&[i], Duration::seconds(30))).collect();
    h.clock.advance(Duration::seconds(30));

    let claimer = {
        let core = Arc::clone(&h.core);
        let ids = ids.clone();
        thread::spawn(move || {
            ids.iter()
                .filter(|id| core.claim(id, ActorId::new("late"), None).is_ok())
                .count()
        })
    };
    let report = h.core.sweep().unwrap();
    let claimed = claimer.join().unwrap();

    // Past the deadline nothing can be claimed, so the reaper takes all.
    assert_eq!(claimed, 0);
    assert_eq!(report.expired.len(), ids.len());
    for id in &ids {
        assert_eq!(h.store.get(id).unwrap().unwrap().status, TokenStatus::Expired);
    }
}

// =========================================================================
// Escrow
// =========================================================================

#[test]
fn wager_claim_before_all_stakes_is_incomplete() {
    let h = Harness::new();
    let id = h.mint_wager(Duration::minutes(10));
    assert_eq!(h.stake(&id, "A").unwrap(), EscrowPhase::Collecting);

    let rule = SettlementRule::WinnerTakesAll {
        winner: ActorId::new("A"),
    };
    let err = h
        .core
        .claim(&id, ActorId::new("referee"), Some(rule.clone()))
        .unwrap_err();
    assert!(matches!(err, HandoffError::StakesIncomplete { missing: 1, .. }));
    assert!(!err.is_final());

    assert_eq!(h.stake(&id, "B").unwrap(), EscrowPhase::Funded);
    let receipt = h.core.claim(&id, ActorId::new("referee"), Some(rule)).unwrap();
    let payout = receipt.payout().expect("escrow claims return a payout");
    assert_eq!(payout.total_for("GOLD"), Decimal::new(100, 0));
    assert_eq!(payout.paid_to(&ActorId::new("A"), "GOLD"), Decimal::new(100, 0));
}

#[test]
fn wager_even_split_sums_to_pool() {
    let h = Harness::new();
    let id = h.mint_wager(Duration::minutes(10));
    h.stake(&id, "A").unwrap();
    h.stake(&id, "B").unwrap();
    let rule = SettlementRule::EvenSplit {
        winners: vec![ActorId::new("A"), ActorId::new("B"), ActorId::new("C")],
    };
    let receipt = h.core.claim(&id, ActorId::new("referee"), Some(rule)).unwrap();
    let payout = receipt.payout().unwrap();
    assert_eq!(payout.total_for("GOLD"), Decimal::new(100, 0));
    // 100 GOLD at scale 0 over three: 33 each, remainder 1 to A.
    assert_eq!(payout.paid_to(&ActorId::new("A"), "GOLD"), Decimal::new(34, 0));
    assert_eq!(payout.paid_to(&ActorId::new("C"), "GOLD"), Decimal::new(33, 0));
}

#[test]
fn wager_deadline_refunds_only_contributors() {
    let h = Harness::new();
    let id = h.mint_wager(Duration::minutes(10));
    h.stake(&id, "A").unwrap();
    h.clock.advance(Duration::minutes(10));

    let err = h.stake(&id, "B").unwrap_err();
    assert!(matches!(err, HandoffError::Expired(_)));

    let report = h.core.sweep().unwrap();
    assert_eq!(report.expired, vec![id]);
    assert_eq!(report.refunds.len(), 1);
    assert_eq!(report.refunds[0].participant, ActorId::new("A"));

    let refunds: Vec<_> = h
        .audit
        .for_token(&id)
        .into_iter()
        .filter(|e| e.kind == AuditKind::StakeRefunded)
        .collect();
    assert_eq!(refunds.len(), 1);
    assert_eq!(
        refunds[0].refund.as_ref().unwrap().participant,
        ActorId::new("A")
    );
}

#[test]
fn wager_stake_rules() {
    let h = Harness::new();
    let id = h.mint_wager(Duration::minutes(10));

    let err = h.stake(&id, "mallory").unwrap_err();
    assert!(matches!(err, HandoffError::NotAParticipant { .. }));

    h.stake(&id, "A").unwrap();
    let err = h.stake(&id, "A").unwrap_err();
    assert!(matches!(err, HandoffError::AlreadyStaked { .. }));

    let err = h
        .core
        .contribute_stake(&id, ActorId::new("B"), Decimal::new(49, 0), "GOLD")
        .unwrap_err();
    assert!(matches!(err, HandoffError::InvalidStake { .. }));

    let err = h.core.claim(&id, ActorId::new("referee"), None).unwrap_err();
    assert!(matches!(err, HandoffError::InvalidSettlement { .. }));
}

// =========================================================================
// Idempotent mint
// =========================================================================

#[test]
fn mint_timeout_recovery_by_idempotency_key() {
    let h = Harness::new();
    let opts = MintOptions::default().with_idempotency_key("transfer-991");
    let first = h
        .core
        .mint(ActorId::new("ServerA"), Payload::new(b"x".to_vec()), None, opts.clone())
        .unwrap();

    // Caller lost the response; it can look the token up...
    let found = h
        .core
        .find_by_idempotency_key(&ActorId::new("ServerA"), "transfer-991")
        .unwrap()
        .unwrap();
    assert_eq!(found.id, first.token_id);

    // ...or simply retry the mint.
    let retry = h
        .core
        .mint(ActorId::new("ServerA"), Payload::new(b"x".to_vec()), None, opts)
        .unwrap();
    assert!(retry.replayed);
    assert_eq!(retry.token_id, first.token_id);
    assert_eq!(h.store.len(), 1);
}
