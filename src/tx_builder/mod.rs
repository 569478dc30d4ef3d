//! Transfer builder
//!
//! Turns `(from, to, amount)` into an unsigned, fee-payer-correct token
//! transfer. The module is split into focused parts:
//! - **amount**: exact decimal to smallest-unit conversion
//! - **instructions**: sub-account derivation and instruction planning
//! - **codec**: base64 wire encoding shared with the signing side
//! - **builder**: ledger queries and message compilation
//!
//! ## Build Steps
//!
//! 1. Parse sender and recipient addresses
//! 2. Parse the amount and floor it to smallest units (zero is rejected)
//! 3. Derive both sub-accounts under the configured mint
//! 4. Prepend a create instruction when the recipient sub-account is absent
//! 5. Compile a v0 message against a fresh finalized blockhash, sender pays
//! 6. Return base64 wire bytes plus "Transfer <amount> <symbol>"
//!
//! A built transaction carries a blockhash with a short validity window and
//! must be rebuilt, never replayed.

pub mod amount;
pub mod builder;
pub mod codec;
pub mod instructions;

pub use amount::parse_amount;
pub use builder::{BuiltTransfer, TokenSpec, TransferBuilder, UnsignedTransfer};
pub use codec::{decode_transaction, encode_transaction};
pub use instructions::{plan_transfer, InstructionPlan, TransferAccounts};
