//! The Kernel: the single door through which effectful actions enter.
//!
//! Every action moves through three phases:
//!
//! 1. **Submit** checks the kernel is booted and the action is not older
//!    than anything already seen, then records a PENDING attempt.
//! 2. **Guard** checks identity, signature, authority and policy gates
//!    without touching state. Every decision is recorded: ACCEPT evidence
//!    names the authorizing grant, REJECT evidence the law broken. A quota
//!    breach also revokes the initiator.
//! 3. **Commit** charges the grant's quota against usage as it stands at
//!    commit, then the budget, then applies the action through the state
//!    model. Any refusal returns the quota charge, aborts the attempt with
//!    evidence and leaves state untouched.

use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use iron_kernel_authority::{
    AuthorityDescriptor, AuthorityEngine, AuthorityError, Authorization, Delegation,
    IdentityRegistry, METRIC_WRITE,
};
use iron_kernel_core::{
    validate_action_structure, Action, Budget, BudgetKind, EntityId, Jurisdiction, Keypair,
    LogicalTimestamp,
};
use iron_kernel_ledger::{
    AuditLog, EvidenceSink, LogStatus, MetricRegistry, StateModel, StateValue,
};
use iron_kernel_protocol::{ProtocolBundle, ProtocolEngine, ProtocolError};
use iron_kernel_store::{LedgerStore, StoreError, StoreExt};

use crate::attempt::{Attempt, AttemptId, AttemptPhase, GuardOutcome, RejectionKind};
use crate::config::KernelConfig;
use crate::error::{KernelError, Result};

/// The kernel's own lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelPhase {
    /// Constructed, not yet booted.
    Constituted,
    Active,
}

impl fmt::Display for KernelPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelPhase::Constituted => f.write_str("CONSTITUTED"),
            KernelPhase::Active => f.write_str("ACTIVE"),
        }
    }
}

/// Why guard turned an attempt away.
struct Rejection {
    kind: RejectionKind,
    reason: String,
    metadata: Option<Value>,
}

impl Rejection {
    fn new(kind: RejectionKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            metadata: None,
        }
    }
}

/// Orchestrates identity, authority, state, protocols and the audit log.
///
/// Registries are passed in at construction and shared by `Arc`; the
/// kernel exclusively owns attempt records.
pub struct GovernanceKernel {
    config: KernelConfig,
    phase: KernelPhase,
    identities: Arc<IdentityRegistry>,
    metrics: Arc<MetricRegistry>,
    audit: Arc<AuditLog>,
    authority: AuthorityEngine,
    state: StateModel,
    protocols: ProtocolEngine,
    attempts: BTreeMap<AttemptId, Attempt>,
    /// Terminal attempts, oldest first, for retention.
    retired: VecDeque<AttemptId>,
    next_attempt: u64,
    last_seen: LogicalTimestamp,
}

impl GovernanceKernel {
    /// Create a kernel in the CONSTITUTED phase.
    pub fn new(
        identities: Arc<IdentityRegistry>,
        metrics: Arc<MetricRegistry>,
        audit: Arc<AuditLog>,
        config: KernelConfig,
    ) -> Self {
        let sink: Arc<dyn EvidenceSink> = audit.clone();
        let state = StateModel::new(sink, Arc::clone(&metrics), Arc::clone(&identities));
        Self {
            config,
            phase: KernelPhase::Constituted,
            authority: AuthorityEngine::new(Arc::clone(&identities)),
            identities,
            metrics,
            audit,
            state,
            protocols: ProtocolEngine::new(),
            attempts: BTreeMap::new(),
            retired: VecDeque::new(),
            next_attempt: 1,
            last_seen: LogicalTimestamp::ZERO,
        }
    }

    /// Move to ACTIVE. Booting an active kernel is a no-op.
    pub fn boot(&mut self) {
        if self.phase == KernelPhase::Constituted {
            info!("kernel booted");
            self.phase = KernelPhase::Active;
        }
    }

    fn require_active(&self) -> Result<()> {
        match self.phase {
            KernelPhase::Active => Ok(()),
            phase => Err(KernelError::Lifecycle(phase)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Attempt lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a PENDING attempt. Fails if the kernel is not booted or the
    /// action is older than the newest one seen.
    pub fn submit_attempt(
        &mut self,
        initiator: impl Into<EntityId>,
        protocol_id: Option<&str>,
        action: Action,
        cost_estimate: Option<f64>,
    ) -> Result<AttemptId> {
        self.require_active()?;

        if action.timestamp < self.last_seen {
            warn!(
                action = %action.action_id,
                attempted = %action.timestamp,
                last_seen = %self.last_seen,
                "temporal integrity breach at submit"
            );
            return Err(KernelError::TemporalIntegrity {
                attempted: action.timestamp,
                last_seen: self.last_seen,
            });
        }
        self.last_seen = action.timestamp;

        let attempt_id = AttemptId(self.next_attempt);
        self.next_attempt += 1;

        let attempt = Attempt {
            attempt_id,
            initiator: initiator.into(),
            protocol_id: protocol_id.map(str::to_owned),
            cost_estimate: cost_estimate.unwrap_or(self.config.default_cost),
            action,
            phase: AttemptPhase::Pending,
            grant_id: None,
            reason: None,
        };
        debug!(
            attempt = %attempt_id,
            initiator = %attempt.initiator,
            metric = %attempt.action.metric_id(),
            "attempt submitted"
        );
        self.attempts.insert(attempt_id, attempt);
        Ok(attempt_id)
    }

    /// Decide whether a PENDING attempt may proceed. Never fails: expected
    /// rejections come back as a structured outcome. Either decision is
    /// recorded, ACCEPT naming the grant or REJECT naming the law.
    pub fn guard_attempt(&mut self, id: AttemptId) -> GuardOutcome {
        let Some(attempt) = self.attempts.get(&id) else {
            return GuardOutcome::rejected(RejectionKind::Lifecycle, format!("unknown attempt: {id}"));
        };
        if attempt.phase != AttemptPhase::Pending {
            return GuardOutcome::rejected(
                RejectionKind::Lifecycle,
                format!("{id} is {}, expected PENDING", attempt.phase),
            );
        }

        let verdict =
            self.evaluate_guard(&attempt.initiator, attempt.protocol_id.as_deref(), &attempt.action);

        match verdict {
            Ok(authorization) => {
                debug!(attempt = %id, grant = %authorization.grant_id, "attempt guarded");
                let metadata = json!({
                    "grantId": authorization.grant_id,
                    "coveringGrants": authorization.covering_grants,
                });
                if let Some(attempt) = self.attempts.get_mut(&id) {
                    self.audit
                        .append(&attempt.action, LogStatus::Accept, None, Some(metadata));
                    attempt.phase = AttemptPhase::Guarded;
                    attempt.grant_id = Some(authorization.grant_id);
                }
                GuardOutcome::accepted()
            }
            Err(rejection) => {
                let Rejection {
                    kind,
                    reason,
                    metadata,
                } = rejection;
                warn!(attempt = %id, kind = ?kind, reason = %reason, "attempt rejected");
                if let Some(attempt) = self.attempts.get_mut(&id) {
                    self.audit
                        .append(&attempt.action, LogStatus::Reject, Some(reason.clone()), metadata);
                    attempt.phase = AttemptPhase::Rejected;
                    attempt.reason = Some(reason.clone());
                }
                self.retire(id);
                GuardOutcome::rejected(kind, reason)
            }
        }
    }

    /// The guard checks, in order. Returns the authorizing grant.
    fn evaluate_guard(
        &self,
        initiator: &EntityId,
        protocol_id: Option<&str>,
        action: &Action,
    ) -> std::result::Result<Authorization, Rejection> {
        if action.initiator != *initiator {
            return Err(Rejection::new(
                RejectionKind::Signature,
                format!(
                    "Invalid Signature: action is signed for {}, submitted by {initiator}",
                    action.initiator
                ),
            ));
        }

        // 1. Identity
        let principal = self
            .identities
            .require_active(initiator.as_str())
            .map_err(|e| Rejection::new(RejectionKind::Identity, e.to_string()))?;

        // 2. Structure and signature
        validate_action_structure(action).map_err(|e| {
            Rejection::new(RejectionKind::Malformed, format!("Malformed action: {e}"))
        })?;
        action.verify_signature(&principal.public_key).map_err(|_| {
            Rejection::new(
                RejectionKind::Signature,
                format!("Invalid Signature from {initiator}"),
            )
        })?;

        // 3. Named protocol
        if let Some(pid) = protocol_id {
            match self.protocols.get(pid) {
                None => {
                    return Err(Rejection::new(
                        RejectionKind::Protocol,
                        format!("unknown protocol: {pid}"),
                    ))
                }
                Some(p) if !p.is_active() => {
                    return Err(Rejection::new(
                        RejectionKind::Protocol,
                        format!("protocol {pid} is {}, not ACTIVE", p.lifecycle),
                    ))
                }
                Some(_) => {}
            }
        }

        // 4. Authority
        let descriptor = AuthorityDescriptor::metric_write(action.metric_id());
        let amount = action.value().quota_amount();
        let authorization = match self.authority.authorize(
            initiator.as_str(),
            &descriptor,
            amount,
            action.timestamp,
        ) {
            Ok(authorization) => authorization,
            Err(err) => {
                let reason = authority_violation(initiator, &descriptor, &err);
                if !err.is_quota_breach() {
                    return Err(Rejection::new(RejectionKind::Authority, reason));
                }
                self.revoke_for_overscope(initiator, action.timestamp);
                return Err(Rejection {
                    kind: RejectionKind::Authority,
                    reason,
                    metadata: Some(overscope_metadata(action)),
                });
            }
        };

        // 5. Policy gates, against the state as it would be afterwards
        if self.config.enforce_policy_gates {
            self.protocols
                .check_gate(action, &self.state)
                .map_err(|err| {
                    let metadata = match &err {
                        ProtocolError::PolicyViolation { protocol, .. } => Some(json!({
                            "violationType": "POLICY_VIOLATION",
                            "protocol": protocol,
                            "target": action.metric_id().as_str(),
                            "context": { "value": action.value().to_json() },
                        })),
                        _ => None,
                    };
                    Rejection {
                        kind: RejectionKind::Policy,
                        reason: err.to_string(),
                        metadata,
                    }
                })?;
        }

        Ok(authorization)
    }

    fn revoke_for_overscope(&self, initiator: &EntityId, at: LogicalTimestamp) {
        if !self.config.auto_revoke_on_overscope {
            return;
        }
        match self.authority.revoke(initiator.as_str(), at) {
            Ok(()) => warn!(entity = %initiator, "initiator revoked for authority overscope"),
            Err(e) => warn!(entity = %initiator, error = %e, "automatic revocation failed"),
        }
    }

    /// Charge the grant and the budget, then apply a GUARDED attempt.
    ///
    /// All or nothing: if the grant's remaining quota or the budget cannot
    /// cover the attempt, or the state model refuses the value, nothing is
    /// applied, the quota charge is returned and the attempt is ABORTED.
    pub fn commit_attempt(&mut self, id: AttemptId, budget: &mut Budget) -> Result<StateValue> {
        let attempt = self
            .attempts
            .get(&id)
            .ok_or(KernelError::UnknownAttempt(id))?;
        if attempt.phase != AttemptPhase::Guarded {
            return Err(KernelError::InvalidPhase {
                id,
                phase: attempt.phase,
                expected: AttemptPhase::Guarded,
            });
        }
        let action = attempt.action.clone();
        let initiator = attempt.initiator.clone();
        let cost = attempt.cost_estimate;
        let grant_id = attempt.grant_id.clone();
        let charge = action.value().quota_amount();

        if let Err(err) = self.state.preflight(&action) {
            self.abort(id, &action, LogStatus::Failure, err.to_string(), None);
            return Err(err.into());
        }

        // Other attempts may have drawn on the grant since guard.
        if let Some(grant) = &grant_id {
            if let Err(err) = self.authority.record_usage(grant, METRIC_WRITE, charge) {
                return Err(self.refuse_charge(id, &initiator, &action, err));
            }
        }

        if let Err(err) = budget.consume(cost) {
            self.return_charge(grant_id.as_deref(), charge);
            let metadata = json!({
                "violationType": "BUDGET_EXHAUSTED",
                "budget": budget.kind.to_string(),
                "requested": cost,
                "remaining": budget.remaining(),
            });
            self.abort(id, &action, LogStatus::Aborted, err.to_string(), Some(metadata));
            return Err(err.into());
        }

        let value = match self.state.apply_trusted(&action) {
            Ok(value) => value,
            Err(err) => {
                self.return_charge(grant_id.as_deref(), charge);
                self.abort(id, &action, LogStatus::Failure, err.to_string(), None);
                return Err(err.into());
            }
        };

        if let Some(attempt) = self.attempts.get_mut(&id) {
            attempt.phase = AttemptPhase::Committed;
        }
        self.retire(id);
        info!(
            attempt = %id,
            metric = %action.metric_id(),
            value = %action.value(),
            at = %action.timestamp,
            "attempt committed"
        );
        Ok(value)
    }

    /// The grant refused the commit-time charge. A quota breach is an
    /// overscope, recorded and escalated exactly as at guard.
    fn refuse_charge(
        &mut self,
        id: AttemptId,
        initiator: &EntityId,
        action: &Action,
        err: AuthorityError,
    ) -> KernelError {
        if !err.is_quota_breach() {
            self.abort(id, action, LogStatus::Failure, err.to_string(), None);
            return err.into();
        }
        let descriptor = AuthorityDescriptor::metric_write(action.metric_id());
        let reason = authority_violation(initiator, &descriptor, &err);
        self.revoke_for_overscope(initiator, action.timestamp);
        self.abort(
            id,
            action,
            LogStatus::Reject,
            reason.clone(),
            Some(overscope_metadata(action)),
        );
        KernelError::AuthorityViolation(reason)
    }

    fn return_charge(&mut self, grant_id: Option<&str>, charge: f64) {
        let Some(grant) = grant_id else { return };
        if let Err(err) = self.authority.release_usage(grant, METRIC_WRITE, charge) {
            warn!(grant, error = %err, "quota charge could not be returned");
        }
    }

    /// Note a terminal attempt and drop the oldest beyond the retention bound.
    fn retire(&mut self, id: AttemptId) {
        self.retired.push_back(id);
        while self.retired.len() > self.config.attempt_retention {
            if let Some(oldest) = self.retired.pop_front() {
                self.attempts.remove(&oldest);
            }
        }
    }

    fn abort(
        &mut self,
        id: AttemptId,
        action: &Action,
        status: LogStatus,
        reason: String,
        metadata: Option<Value>,
    ) {
        warn!(attempt = %id, status = %status, reason = %reason, "attempt aborted");
        self.audit
            .append(action, status, Some(reason.clone()), metadata);
        if let Some(attempt) = self.attempts.get_mut(&id) {
            attempt.phase = AttemptPhase::Aborted;
            attempt.reason = Some(reason);
        }
        self.retire(id);
    }

    /// Submit, guard and commit in one call.
    ///
    /// Without a budget, a fresh ENERGY budget of the configured default
    /// limit is used.
    pub fn execute(&mut self, action: Action, budget: Option<&mut Budget>) -> Result<StateValue> {
        let initiator = action.initiator.clone();
        let id = self.submit_attempt(initiator, None, action, None)?;

        let outcome = self.guard_attempt(id);
        if !outcome.is_accepted() {
            return Err(KernelError::from_rejection(
                outcome.kind.unwrap_or(RejectionKind::Lifecycle),
                outcome.reason.unwrap_or_default(),
            ));
        }

        let mut fallback;
        let budget = match budget {
            Some(budget) => budget,
            None => {
                fallback = Budget::new(BudgetKind::Energy, self.config.default_budget_limit);
                &mut fallback
            }
        };
        self.commit_attempt(id, budget)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Administration
    // ─────────────────────────────────────────────────────────────────────────

    /// Roots may administer anything; others need `IDENTITY.ADMIN` over the scope.
    fn require_admin(&self, caller: &str, scope: &str) -> Result<()> {
        if self.identities.is_root(caller) {
            return Ok(());
        }
        let descriptor = AuthorityDescriptor::identity_admin(scope);
        if self.authority.authorized(caller, &descriptor, self.last_seen) {
            Ok(())
        } else {
            Err(KernelError::Unauthorized {
                caller: caller.to_owned(),
                descriptor: descriptor.to_string(),
            })
        }
    }

    /// Record a delegation issued by `caller`.
    pub fn grant_authority(&mut self, caller: &str, delegation: Delegation) -> Result<()> {
        if delegation.granter.as_str() != caller {
            return Err(KernelError::Unauthorized {
                caller: caller.to_owned(),
                descriptor: format!("grants issued by {}", delegation.granter),
            });
        }
        self.require_admin(caller, delegation.jurisdiction.as_str())?;

        info!(
            grant = %delegation.id,
            granter = caller,
            grantee = %delegation.grantee,
            jurisdiction = %delegation.jurisdiction,
            "authority granted"
        );
        self.authority.grant(delegation)?;
        Ok(())
    }

    /// Revoke `target` on behalf of `caller`.
    pub fn revoke_entity(&mut self, caller: &str, target: &str) -> Result<()> {
        self.require_admin(caller, target)?;
        info!(caller, target, "entity revoked by administrator");
        self.authority.revoke(target, self.last_seen)?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Protocols
    // ─────────────────────────────────────────────────────────────────────────

    /// Run triggered automation protocols, signing their actions as
    /// `authority`. Actions are stamped after the newest time seen.
    pub fn evaluate_protocols(
        &mut self,
        authority: &EntityId,
        keypair: &Keypair,
    ) -> Result<Vec<Action>> {
        self.require_active()?;
        let actions =
            self.protocols
                .evaluate_and_execute(&mut self.state, authority, keypair, self.last_seen)?;
        if let Some(last) = actions.last() {
            self.last_seen = self.last_seen.max(last.timestamp);
        }
        Ok(actions)
    }

    /// Verify and merge a protocol bundle.
    pub fn load_bundle(
        &mut self,
        bundle: &ProtocolBundle,
        trust_scope: &Jurisdiction,
    ) -> Result<Vec<String>> {
        Ok(self.protocols.load_bundle(bundle, trust_scope)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────────

    /// Write audit entries the store has not seen yet. Returns how many
    /// were written.
    pub async fn persist_audit<S: LedgerStore + ?Sized>(&self, store: &S) -> Result<usize> {
        let stored = store.count().await?;

        if let Some((seq, hash)) = store.head().await? {
            let local = self.audit.entry(seq as usize).map(|e| e.hash);
            if local != Some(hash) {
                return Err(StoreError::Discontinuity {
                    seq,
                    reason: "store holds a different chain".into(),
                }
                .into());
            }
        }

        let pending = self.audit.entries_since(stored as usize);
        let written = store.append_entries(stored, &pending).await?;
        info!(written, total = stored + written as u64, "audit persisted");
        Ok(written)
    }

    /// Restore an audit log from a store, verifying the chain.
    pub async fn load_audit<S: LedgerStore + ?Sized>(store: &S) -> Result<AuditLog> {
        let entries = store.all_entries().await?;
        let count = entries.len();
        let log = AuditLog::restore(entries)?;
        info!(entries = count, head = %log.head(), "audit restored");
        Ok(log)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn phase(&self) -> KernelPhase {
        self.phase
    }

    /// Newest action timestamp the kernel has accepted for submission.
    pub fn last_seen(&self) -> LogicalTimestamp {
        self.last_seen
    }

    pub fn identities(&self) -> &Arc<IdentityRegistry> {
        &self.identities
    }

    pub fn metrics(&self) -> &Arc<MetricRegistry> {
        &self.metrics
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn authority(&self) -> &AuthorityEngine {
        &self.authority
    }

    pub fn state(&self) -> &StateModel {
        &self.state
    }

    pub fn protocols(&self) -> &ProtocolEngine {
        &self.protocols
    }

    pub fn protocols_mut(&mut self) -> &mut ProtocolEngine {
        &mut self.protocols
    }

    /// An attempt record. Terminal attempts are kept until
    /// `attempt_retention` newer ones have finished.
    pub fn attempt(&self, id: AttemptId) -> Option<&Attempt> {
        self.attempts.get(&id)
    }

    pub fn attempts(&self) -> impl Iterator<Item = &Attempt> {
        self.attempts.values()
    }
}

fn authority_violation(
    initiator: &EntityId,
    descriptor: &AuthorityDescriptor,
    err: &AuthorityError,
) -> String {
    format!(
        "Authority Violation: {initiator} lacks Jurisdiction or exceeds limits for {descriptor} ({err})"
    )
}

fn overscope_metadata(action: &Action) -> Value {
    json!({
        "violationType": "AUTHORITY_OVERSCOPE",
        "target": action.metric_id().as_str(),
        "context": { "value": action.value().to_json() },
    })
}
