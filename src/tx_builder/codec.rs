//! Base64 wire encoding for versioned transactions

use base64::{engine::general_purpose::STANDARD, Engine as _};
use solana_sdk::transaction::VersionedTransaction;

use crate::errors::TransferError;

/// Serialize to wire bytes and base64-encode
pub fn encode_transaction(tx: &VersionedTransaction) -> Result<String, TransferError> {
    let bytes = bincode::serialize(tx)
        .map_err(|e| TransferError::network(format!("transaction serialization failed: {e}")))?;
    Ok(STANDARD.encode(bytes))
}

/// Decode base64 wire bytes back into a transaction
pub fn decode_transaction(encoded: &str) -> Result<VersionedTransaction, TransferError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| TransferError::signing_failed(format!("transaction is not base64: {e}")))?;
    bincode::deserialize(&bytes)
        .map_err(|e| TransferError::signing_failed(format!("malformed transaction bytes: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::unsigned_transfer;
    use solana_sdk::pubkey::Pubkey;

    #[test]
    fn test_decode_preserves_payer_instructions_and_blockhash() {
        let payer = Pubkey::new_unique();
        let tx = unsigned_transfer(&payer);

        let decoded = decode_transaction(&encode_transaction(&tx).unwrap()).unwrap();
        assert_eq!(decoded.message.static_account_keys()[0], payer);
        assert_eq!(
            decoded.message.instructions().len(),
            tx.message.instructions().len()
        );
        assert_eq!(
            decoded.message.recent_blockhash(),
            tx.message.recent_blockhash()
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(decode_transaction("%%%").is_err());
        assert!(decode_transaction(&STANDARD.encode([1u8, 2, 3])).is_err());
    }
}
