// Transaction signing seam: key generation and signed wire bytes
use crate::error::{EngineError, Result};
use crate::types::{Hash, Instruction, Pubkey};
use std::sync::Arc;

pub use solana_sdk::signature::Keypair;
pub use solana_sdk::signer::Signer;
pub use solana_sdk::transaction::Transaction;

/// Signer handle that can cross task boundaries.
pub type SharedSigner = Arc<dyn Signer + Send + Sync>;

/// Source of fresh per-position keys.
pub trait KeyGenerator: Send + Sync {
    fn generate(&self) -> Result<SharedSigner>;
}

/// Random ed25519 keypairs.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeypairGenerator;

impl KeyGenerator for KeypairGenerator {
    fn generate(&self) -> Result<SharedSigner> {
        Ok(Arc::new(Keypair::new()))
    }
}

/// Builds a transaction paid by `fee_payer` and signs it against `blockhash`.
pub fn build_signed_transaction(
    instructions: &[Instruction],
    fee_payer: &Pubkey,
    signers: &[SharedSigner],
    blockhash: Hash,
) -> Result<Transaction> {
    if !signers.iter().any(|s| s.pubkey() == *fee_payer) {
        return Err(EngineError::validation(format!(
            "fee payer {} is not among the signers",
            fee_payer
        )));
    }

    let mut tx = Transaction::new_with_payer(instructions, Some(fee_payer));
    let refs: Vec<&dyn Signer> = signers.iter().map(|s| &**s as &dyn Signer).collect();
    tx.try_sign(&refs, blockhash)
        .map_err(|e| EngineError::validation(format!("signing failed: {}", e)))?;
    Ok(tx)
}

pub fn serialize_transaction(tx: &Transaction) -> Result<Vec<u8>> {
    Ok(bincode::serialize(tx)?)
}
