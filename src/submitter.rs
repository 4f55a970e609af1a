//! # Batch Submitter
//!
//! Executes a [`BatchPlan`] phase by phase. Each transaction moves through
//! `Built -> Signed -> Submitted -> Confirmed | Failed`; the first failure stops
//! the run and nothing is resubmitted.
//!
//! The blockhash epoch is an immutable value owned by one run. It is fetched
//! before the first phase and replaced after each phase completes. If the chain
//! has moved past the epoch's expiry height by the time a transaction is about
//! to be signed, a fresh epoch is fetched and that transaction's message is
//! rebuilt against it. Signing happens right before serialization.

use crate::batch::{BatchPlan, Phase, PlannedTransaction};
use crate::chain::{ConfirmationOutcome, DlmmChain};
use crate::error::{EngineError, Result};
use crate::metrics;
use crate::retry::{with_retry, RetryPolicy};
use crate::signer::{build_signed_transaction, serialize_transaction};
use crate::types::{CommitmentLevel, Hash, Pubkey, Signature};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockhashEpoch {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

impl BlockhashEpoch {
    pub fn new(blockhash: Hash, last_valid_block_height: u64) -> Self {
        Self {
            blockhash,
            last_valid_block_height,
        }
    }

    pub fn is_expired_at(&self, block_height: u64) -> bool {
        block_height > self.last_valid_block_height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxState {
    Built,
    Signed,
    Submitted,
    Confirmed,
    Failed,
}

impl TxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxState::Built => "built",
            TxState::Signed => "signed",
            TxState::Submitted => "submitted",
            TxState::Confirmed => "confirmed",
            TxState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxRecord {
    pub phase: Phase,
    pub label: String,
    pub state: TxState,
    pub signature: Option<Signature>,
    /// Number of times the message was rebuilt on a fresh epoch
    pub rebuilds: u32,
    pub error: Option<String>,
}

impl TxRecord {
    fn new(tx: &PlannedTransaction) -> Self {
        Self {
            phase: tx.phase,
            label: tx.label.clone(),
            state: TxState::Built,
            signature: None,
            rebuilds: 0,
            error: None,
        }
    }

    fn transition(&mut self, state: TxState) {
        debug!("{} [{}]: {} -> {}", self.label, self.phase, self.state.as_str(), state.as_str());
        metrics::increment_tx_transition(self.phase.as_str(), state.as_str());
        self.state = state;
    }
}

/// Outcome of a batch run. `failure` is set when the run was aborted.
#[derive(Debug)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub records: Vec<TxRecord>,
    pub failure: Option<EngineError>,
}

impl BatchReport {
    /// Signatures of confirmed transactions, in submission order.
    pub fn confirmed_signatures(&self) -> Vec<Signature> {
        self.records
            .iter()
            .filter(|r| r.state == TxState::Confirmed)
            .filter_map(|r| r.signature)
            .collect()
    }

    pub fn into_result(self) -> Result<Vec<Signature>> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self.confirmed_signatures()),
        }
    }
}

pub struct BatchSubmitter {
    chain: Arc<dyn DlmmChain>,
    commitment: CommitmentLevel,
    retry: RetryPolicy,
}

impl BatchSubmitter {
    pub fn new(chain: Arc<dyn DlmmChain>, commitment: CommitmentLevel, retry: RetryPolicy) -> Self {
        Self {
            chain,
            commitment,
            retry,
        }
    }

    async fn fetch_epoch(&self) -> Result<BlockhashEpoch> {
        with_retry(&self.retry, "get_latest_blockhash", || self.chain.get_latest_blockhash()).await
    }

    pub async fn submit(&self, plan: &BatchPlan, run_id: Uuid) -> BatchReport {
        let mut report = BatchReport {
            run_id,
            records: Vec::with_capacity(plan.transaction_count()),
            failure: None,
        };
        if plan.is_empty() {
            return report;
        }

        let fee_payer = match plan.fee_payer {
            Some(payer) => payer,
            None => {
                report.failure = Some(EngineError::validation("batch plan has no fee payer"));
                return report;
            }
        };

        let first_phase = plan.phases[0].phase;
        let mut epoch = match self.fetch_epoch().await {
            Ok(epoch) => epoch,
            Err(e) => {
                report.failure = Some(submission_error(first_phase, e, Vec::new()));
                return report;
            }
        };

        for (index, phase) in plan.phases.iter().enumerate() {
            info!(
                "▶️ Phase {} ({} transactions)",
                phase.phase,
                phase.transactions.len()
            );

            for tx in &phase.transactions {
                let mut record = TxRecord::new(tx);
                let outcome = self
                    .submit_one(tx, &fee_payer, &mut epoch, &mut record)
                    .await;
                report.records.push(record);

                if let Err(e) = outcome {
                    error!("❌ Phase {} aborted at {}: {}", phase.phase, tx.label, e);
                    report.failure = Some(attach_confirmed(e, report.confirmed_signatures()));
                    return report;
                }
            }

            if index + 1 < plan.phases.len() {
                epoch = match self.fetch_epoch().await {
                    Ok(next) => next,
                    Err(e) => {
                        let next_phase = plan.phases[index + 1].phase;
                        report.failure = Some(submission_error(next_phase, e, report.confirmed_signatures()));
                        return report;
                    }
                };
            }
        }

        info!("✅ Batch {} confirmed {} transactions", run_id, report.records.len());
        report
    }

    async fn submit_one(
        &self,
        tx: &PlannedTransaction,
        fee_payer: &Pubkey,
        epoch: &mut BlockhashEpoch,
        record: &mut TxRecord,
    ) -> Result<()> {
        let phase = tx.phase;

        let height = with_retry(&self.retry, "get_block_height", || self.chain.get_block_height())
            .await
            .map_err(|e| fail(record, phase, e))?;
        if epoch.is_expired_at(height) {
            warn!(
                "Blockhash {} expired at height {} (valid through {}), rebuilding {}",
                epoch.blockhash, height, epoch.last_valid_block_height, tx.label
            );
            *epoch = self.fetch_epoch().await.map_err(|e| fail(record, phase, e))?;
            record.rebuilds += 1;
        }

        let signed = build_signed_transaction(&tx.instructions, fee_payer, &tx.signers, epoch.blockhash)
            .map_err(|e| fail(record, phase, e))?;
        record.transition(TxState::Signed);
        let bytes = serialize_transaction(&signed).map_err(|e| fail(record, phase, e))?;

        let signature = self
            .chain
            .send_raw_transaction(bytes)
            .await
            .map_err(|e| fail(record, phase, e))?;
        record.signature = Some(signature);
        record.transition(TxState::Submitted);

        let outcome = self
            .chain
            .confirm_transaction(&signature, epoch, self.commitment)
            .await;
        let reason = match outcome {
            Ok(ConfirmationOutcome::Confirmed) => {
                record.transition(TxState::Confirmed);
                debug!("Confirmed {} ({})", tx.label, signature);
                return Ok(());
            }
            Ok(ConfirmationOutcome::Failed(reason)) => reason,
            Ok(ConfirmationOutcome::Expired) => "blockhash expired before confirmation".to_string(),
            Err(e) => e.to_string(),
        };

        record.error = Some(reason.clone());
        record.transition(TxState::Failed);
        Err(EngineError::Confirmation {
            signature,
            phase: phase.to_string(),
            reason,
            confirmed: Vec::new(),
        })
    }
}

// Marks a pre-confirmation failure on the record and turns it into a submission error
fn fail(record: &mut TxRecord, phase: Phase, err: EngineError) -> EngineError {
    record.error = Some(err.to_string());
    record.transition(TxState::Failed);
    submission_error(phase, err, Vec::new())
}

fn submission_error(phase: Phase, err: EngineError, confirmed: Vec<Signature>) -> EngineError {
    match err {
        EngineError::Validation(_) => err,
        other => EngineError::Submission {
            phase: phase.to_string(),
            reason: other.to_string(),
            confirmed,
        },
    }
}

fn attach_confirmed(err: EngineError, signatures: Vec<Signature>) -> EngineError {
    match err {
        EngineError::Confirmation {
            signature,
            phase,
            reason,
            ..
        } => EngineError::Confirmation {
            signature,
            phase,
            reason,
            confirmed: signatures,
        },
        EngineError::Submission { phase, reason, .. } => EngineError::Submission {
            phase,
            reason,
            confirmed: signatures,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_expiry_is_exclusive() {
        let epoch = BlockhashEpoch::new(Hash::new_from_array([1; 32]), 100);
        assert!(!epoch.is_expired_at(100));
        assert!(epoch.is_expired_at(101));
    }

    #[test]
    fn test_attach_confirmed_keeps_failing_signature() {
        let bad = Signature::from([2u8; 64]);
        let ok = Signature::from([3u8; 64]);
        let err = EngineError::Confirmation {
            signature: bad,
            phase: "add_liquidity".into(),
            reason: "custom program error".into(),
            confirmed: vec![],
        };
        let err = attach_confirmed(err, vec![ok]);
        assert_eq!(err.confirmed_signatures(), &[ok]);
        assert!(err.to_string().contains(&bad.to_string()));
    }
}
