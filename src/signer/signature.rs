//! Detached signature decoding and splicing
//!
//! The signer returns a hex signature (with or without a `0x` prefix); the
//! ledger wants 64 raw bytes sitting in the signature slot that lines up with
//! the signer's key in the message's required-signer prefix.

use solana_sdk::{
    pubkey::Pubkey,
    signature::{Signature, SIGNATURE_BYTES},
    transaction::VersionedTransaction,
};

use crate::errors::TransferError;

/// Transaction whose single required signature slot is filled
///
/// Only [`bind_signature`] produces one, so the broadcaster never sees an
/// unsigned or partially signed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    tx: VersionedTransaction,
    signer: Pubkey,
}

impl SignedTransaction {
    pub fn transaction(&self) -> &VersionedTransaction {
        &self.tx
    }

    /// Key the signature is bound to (the fee payer)
    pub fn signer(&self) -> &Pubkey {
        &self.signer
    }

    /// Payer signature, which is also the transaction id
    pub fn signature(&self) -> Signature {
        self.tx.signatures[0]
    }

    pub fn into_transaction(self) -> VersionedTransaction {
        self.tx
    }
}

/// Decode a hex signature, ignoring an optional `0x`/`0X` prefix
pub fn decode_signature_hex(encoded: &str) -> Result<Vec<u8>, TransferError> {
    let trimmed = encoded.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    hex::decode(digits)
        .map_err(|e| TransferError::signing_failed(format!("signature is not valid hex: {e}")))
}

/// Decode a hex signature into a ledger signature of the fixed size
pub fn parse_signature(encoded: &str) -> Result<Signature, TransferError> {
    let bytes = decode_signature_hex(encoded)?;
    let raw: [u8; SIGNATURE_BYTES] = bytes.as_slice().try_into().map_err(|_| {
        TransferError::signing_failed(format!(
            "signature is {} bytes, expected {SIGNATURE_BYTES}",
            bytes.len()
        ))
    })?;
    Ok(Signature::from(raw))
}

/// Splice `signature` into the slot belonging to `signer`
///
/// The message must require exactly one signature and that signer must be
/// `signer`. With `verify` set the signature is checked against the
/// serialized message, so a signature made by some other key is rejected
/// here instead of at the ledger.
pub fn bind_signature(
    mut tx: VersionedTransaction,
    signer: &Pubkey,
    signature: Signature,
    verify: bool,
) -> Result<SignedTransaction, TransferError> {
    let required = tx.message.header().num_required_signatures as usize;
    if required != 1 {
        return Err(TransferError::signing_failed(format!(
            "expected a single-signer transaction, message requires {required} signatures"
        )));
    }

    let slot = tx
        .message
        .static_account_keys()
        .iter()
        .take(required)
        .position(|key| key == signer)
        .ok_or_else(|| {
            TransferError::signing_failed(format!("{signer} is not a required signer"))
        })?;

    if verify && !signature.verify(signer.as_ref(), &tx.message.serialize()) {
        return Err(TransferError::signing_failed(format!(
            "signature does not verify for {signer}"
        )));
    }

    tx.signatures.resize(required, Signature::default());
    tx.signatures[slot] = signature;

    Ok(SignedTransaction {
        tx,
        signer: *signer,
    })
}
