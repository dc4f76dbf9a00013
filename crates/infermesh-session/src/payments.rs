//! Escrow-backed payment orchestration.
//!
//! Two modes: direct (each session transfers tokens from the user) and
//! pre-funded (sessions debit a deposit held by the marketplace until
//! it is exhausted). Settlement is idempotent: the second caller sees
//! `AlreadyCompleted` and treats it as success.

use crate::error::{Result, SessionError};
use infermesh_chain::{ChainClient, ChainError, EthAddress, H256, U256};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// This call performed the settlement.
    Completed,
    /// The counterparty settled first; proven value is already paid.
    AlreadyCompleted,
}

pub struct PaymentManager {
    chain: Arc<ChainClient>,
}

impl PaymentManager {
    pub fn new(chain: Arc<ChainClient>) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &Arc<ChainClient> {
        &self.chain
    }

    /// Move `amount` of `token` into the marketplace escrow. Approves
    /// first when the allowance is short; returns the new balance.
    pub async fn deposit(&self, token: EthAddress, amount: U256) -> Result<U256> {
        self.chain.ensure_allowance(token, amount).await?;
        self.chain.deposit_token(token, amount).await?;
        let balance = self.chain.get_deposit_balance(self.chain.address(), token).await?;
        info!("deposited {amount} of {token:#x}; escrow balance now {balance}");
        Ok(balance)
    }

    /// Return unused escrow balance to the wallet.
    pub async fn withdraw(&self, token: EthAddress, amount: U256) -> Result<()> {
        let available = self.chain.get_deposit_balance(self.chain.address(), token).await?;
        if available < amount {
            return Err(SessionError::InsufficientDeposit {
                needed: amount.to_string(),
                available: available.to_string(),
            });
        }
        self.chain.withdraw_token(token, amount).await?;
        Ok(())
    }

    pub async fn deposit_balance(&self, token: EthAddress) -> Result<U256> {
        Ok(self.chain.get_deposit_balance(self.chain.address(), token).await?)
    }

    /// Direct mode: approve then post the job in one flow.
    pub async fn create_session_direct(
        &self,
        host: EthAddress,
        token: EthAddress,
        deposit: U256,
        price_per_token: U256,
        max_duration_secs: u64,
        proof_interval_tokens: u64,
    ) -> Result<u64> {
        self.chain.ensure_allowance(token, deposit).await?;
        let session_id = self
            .chain
            .create_session_with_token(
                host,
                token,
                deposit,
                price_per_token,
                max_duration_secs,
                proof_interval_tokens,
            )
            .await
            .map_err(map_deposit_revert)?;
        info!("session {session_id} posted (direct, deposit {deposit})");
        Ok(session_id)
    }

    /// Pre-funded mode: debit the escrow balance. Fails with
    /// `InsufficientDeposit` before spending gas when the balance is
    /// visibly short.
    pub async fn create_session_from_deposit(
        &self,
        host: EthAddress,
        model_id: H256,
        token: EthAddress,
        deposit: U256,
        price_per_token: U256,
        max_duration_secs: u64,
        proof_interval_tokens: u64,
    ) -> Result<u64> {
        let available = self.chain.get_deposit_balance(self.chain.address(), token).await?;
        if available < deposit {
            return Err(SessionError::InsufficientDeposit {
                needed: deposit.to_string(),
                available: available.to_string(),
            });
        }
        let session_id = self
            .chain
            .create_session_from_deposit(
                host,
                model_id,
                token,
                deposit,
                price_per_token,
                max_duration_secs,
                proof_interval_tokens,
            )
            .await
            .map_err(map_deposit_revert)?;
        info!("session {session_id} posted (from deposit, {deposit} debited)");
        Ok(session_id)
    }

    /// Settle a session. Both parties race here by design; losing the
    /// race is success.
    pub async fn settle(&self, session_id: u64) -> Result<Settlement> {
        match self.chain.complete_session(session_id).await {
            Ok(()) => Ok(Settlement::Completed),
            Err(ChainError::AlreadyCompleted(_)) => Ok(Settlement::AlreadyCompleted),
            Err(e) => Err(e.into()),
        }
    }
}

/// The contract signals a short balance with a named revert.
fn map_deposit_revert(e: ChainError) -> SessionError {
    match e {
        ChainError::Reverted(msg) if msg.contains("InsufficientDeposit") => {
            SessionError::InsufficientDeposit { needed: String::new(), available: msg }
        }
        other => other.into(),
    }
}
