//! Instruction planning and ordering validation
//!
//! A transfer is either:
//! 1. create recipient sub-account (payer = sender), then transfer
//! 2. transfer only, when the recipient sub-account already exists

use solana_sdk::{instruction::Instruction, pubkey::Pubkey};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account,
};

use crate::errors::TransferError;

/// Owners and their derived sub-accounts for one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferAccounts {
    pub sender: Pubkey,
    pub recipient: Pubkey,
    pub mint: Pubkey,
    pub sender_token_account: Pubkey,
    pub recipient_token_account: Pubkey,
}

impl TransferAccounts {
    /// Derive both sub-accounts; a pure function of owner and mint
    pub fn derive(sender: Pubkey, recipient: Pubkey, mint: Pubkey) -> Self {
        Self {
            sender,
            recipient,
            mint,
            sender_token_account: get_associated_token_address(&sender, &mint),
            recipient_token_account: get_associated_token_address(&recipient, &mint),
        }
    }
}

/// Ordered instructions for a transfer
#[derive(Debug, Clone)]
pub struct InstructionPlan {
    pub instructions: Vec<Instruction>,
    /// First instruction creates the recipient sub-account
    pub creates_recipient_account: bool,
}

/// Plan a checked transfer of `units`, creating the destination if needed
pub fn plan_transfer(
    accounts: &TransferAccounts,
    units: u64,
    decimals: u8,
    recipient_account_exists: bool,
) -> Result<InstructionPlan, TransferError> {
    let mut instructions = Vec::with_capacity(2);

    if !recipient_account_exists {
        instructions.push(create_associated_token_account(
            &accounts.sender,
            &accounts.recipient,
            &accounts.mint,
            &spl_token::id(),
        ));
    }

    let transfer = spl_token::instruction::transfer_checked(
        &spl_token::id(),
        &accounts.sender_token_account,
        &accounts.mint,
        &accounts.recipient_token_account,
        &accounts.sender,
        &[],
        units,
        decimals,
    )
    .map_err(|e| TransferError::validation(format!("transfer instruction: {e}")))?;
    instructions.push(transfer);

    let plan = InstructionPlan {
        instructions,
        creates_recipient_account: !recipient_account_exists,
    };

    #[cfg(any(debug_assertions, test))]
    validate_plan(&plan)?;

    Ok(plan)
}

/// Check the ordering rules (debug/test only)
#[cfg(any(debug_assertions, test))]
pub fn validate_plan(plan: &InstructionPlan) -> Result<(), TransferError> {
    let expected = if plan.creates_recipient_account { 2 } else { 1 };
    if plan.instructions.len() != expected {
        return Err(TransferError::validation(format!(
            "expected {expected} instructions, found {}",
            plan.instructions.len()
        )));
    }

    if plan.creates_recipient_account
        && plan.instructions[0].program_id != spl_associated_token_account::id()
    {
        return Err(TransferError::validation(
            "sub-account creation must precede the transfer",
        ));
    }

    let last = &plan.instructions[expected - 1];
    if last.program_id != spl_token::id() {
        return Err(TransferError::validation("final instruction must be the token transfer"));
    }
    Ok(())
}
