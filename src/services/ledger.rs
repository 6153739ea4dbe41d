use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::ledger as ledger_queries;

/// Per-user credit balance.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Current balance. Fails with `ProfileNotFound` when the user has no entry.
    async fn balance(&self, user_id: &str) -> Result<i32, LedgerError>;

    async fn has_sufficient_credit(&self, user_id: &str) -> Result<bool, LedgerError> {
        Ok(self.balance(user_id).await? >= 1)
    }

    /// Conditionally take one credit (only while the balance is at least 1).
    /// Returns the new balance.
    async fn decrement(&self, user_id: &str) -> Result<i32, LedgerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("profile not found for user {0}")]
    ProfileNotFound(String),

    #[error("no credit left to deduct for user {0}")]
    InsufficientCredit(String),

    #[error("credit ledger unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Unavailable(e.to_string())
    }
}

/// Ledger stored in the `profiles` table.
pub struct PgCreditLedger {
    pool: PgPool,
}

impl PgCreditLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreditLedger for PgCreditLedger {
    async fn balance(&self, user_id: &str) -> Result<i32, LedgerError> {
        ledger_queries::get_credits(&self.pool, user_id)
            .await?
            .ok_or_else(|| LedgerError::ProfileNotFound(user_id.to_string()))
    }

    async fn decrement(&self, user_id: &str) -> Result<i32, LedgerError> {
        match ledger_queries::decrement_credit(&self.pool, user_id).await? {
            Some(remaining) => Ok(remaining),
            // Distinguish a missing profile from an exhausted one
            None => match ledger_queries::get_credits(&self.pool, user_id).await? {
                Some(_) => Err(LedgerError::InsufficientCredit(user_id.to_string())),
                None => Err(LedgerError::ProfileNotFound(user_id.to_string())),
            },
        }
    }
}
