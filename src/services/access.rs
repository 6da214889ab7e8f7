//! Submission authorization: caller, client ownership and credit checks.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::job::{ClientId, UserId};

/// Resolves client sub-accounts to their owning user.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    async fn owner_of(&self, client_id: ClientId) -> Result<Option<UserId>, AccessError>;
}

/// Pass/fail credit check plus the deduction hook run after a job is enqueued.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn has_credit(&self, owner: UserId) -> Result<bool, AccessError>;

    async fn consume(&self, owner: UserId, job_id: Uuid) -> Result<(), AccessError>;
}

/// Reason a submission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Denial {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Client not found")]
    ClientNotFound,

    #[error("Client does not belong to the authenticated user")]
    ClientNotOwned,

    #[error("No credits remaining for content generation")]
    CreditExhausted,
}

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("Access check failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// Decision returned by [`AccessGate::authorize`].
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error(transparent)]
    Denied(#[from] Denial),

    #[error(transparent)]
    Lookup(#[from] AccessError),
}

/// Evaluated before any job record exists; performs no writes.
pub struct AccessGate {
    clients: Arc<dyn ClientDirectory>,
    credits: Arc<dyn CreditLedger>,
}

impl AccessGate {
    pub fn new(clients: Arc<dyn ClientDirectory>, credits: Arc<dyn CreditLedger>) -> Self {
        Self { clients, credits }
    }

    pub fn credits(&self) -> Arc<dyn CreditLedger> {
        Arc::clone(&self.credits)
    }

    /// Returns the owner the job will be created for, or the denial reason.
    pub async fn authorize(
        &self,
        caller: Option<UserId>,
        client_id: Option<ClientId>,
    ) -> Result<UserId, GateError> {
        let owner = caller.ok_or(Denial::Unauthenticated)?;

        if let Some(client_id) = client_id {
            check_client_owner(self.clients.as_ref(), owner, client_id).await?;
        }

        if !self.credits.has_credit(owner).await? {
            return Err(Denial::CreditExhausted.into());
        }

        Ok(owner)
    }
}

/// Shared client ownership rule, also used by job listing.
pub async fn check_client_owner(
    clients: &dyn ClientDirectory,
    owner: UserId,
    client_id: ClientId,
) -> Result<(), GateError> {
    match clients.owner_of(client_id).await? {
        None => Err(Denial::ClientNotFound.into()),
        Some(client_owner) if client_owner != owner => Err(Denial::ClientNotOwned.into()),
        Some(_) => Ok(()),
    }
}

/// Client lookup backed by the `clients` table.
pub struct PgClientDirectory {
    pool: PgPool,
}

impl PgClientDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClientDirectory for PgClientDirectory {
    async fn owner_of(&self, client_id: ClientId) -> Result<Option<UserId>, AccessError> {
        let row = sqlx::query("SELECT user_id FROM clients WHERE id = $1")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(r) => Some(r.try_get("user_id")?),
            None => None,
        })
    }
}

/// Credit balances kept in `user_credits`. Users without a row have no credit.
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
    async fn has_credit(&self, owner: UserId) -> Result<bool, AccessError> {
        let row = sqlx::query("SELECT remaining FROM user_credits WHERE user_id = $1")
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(r) => r.try_get::<i32, _>("remaining")? > 0,
            None => false,
        })
    }

    async fn consume(&self, owner: UserId, job_id: Uuid) -> Result<(), AccessError> {
        sqlx::query(
            r#"
            UPDATE user_credits
            SET remaining = GREATEST(remaining - 1, 0),
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(owner)
        .execute(&self.pool)
        .await?;

        tracing::debug!(user_id = owner, job_id = %job_id, "Consumed one generation credit");
        Ok(())
    }
}

/// Credit accounting disabled: every caller passes and nothing is deducted.
pub struct UnmeteredCredits;

#[async_trait]
impl CreditLedger for UnmeteredCredits {
    async fn has_credit(&self, _owner: UserId) -> Result<bool, AccessError> {
        Ok(true)
    }

    async fn consume(&self, _owner: UserId, _job_id: Uuid) -> Result<(), AccessError> {
        Ok(())
    }
}

/// Fixed client ownership table, for local runs and tests.
#[derive(Default)]
pub struct StaticClientDirectory {
    owners: HashMap<ClientId, UserId>,
}

impl StaticClientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, client_id: ClientId, owner: UserId) -> Self {
        self.owners.insert(client_id, owner);
        self
    }
}

#[async_trait]
impl ClientDirectory for StaticClientDirectory {
    async fn owner_of(&self, client_id: ClientId) -> Result<Option<UserId>, AccessError> {
        Ok(self.owners.get(&client_id).copied())
    }
}

/// In-memory balances; users without an entry have no credit.
#[derive(Default)]
pub struct FixedCredits {
    balances: Mutex<HashMap<UserId, u32>>,
}

impl FixedCredits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(mut self, owner: UserId, credits: u32) -> Self {
        self.balances.get_mut().insert(owner, credits);
        self
    }

    pub async fn balance(&self, owner: UserId) -> u32 {
        self.balances.lock().await.get(&owner).copied().unwrap_or(0)
    }
}

#[async_trait]
impl CreditLedger for FixedCredits {
    async fn has_credit(&self, owner: UserId) -> Result<bool, AccessError> {
        Ok(self.balance(owner).await > 0)
    }

    async fn consume(&self, owner: UserId, _job_id: Uuid) -> Result<(), AccessError> {
        if let Some(balance) = self.balances.lock().await.get_mut(&owner) {
            *balance = balance.saturating_sub(1);
        }
        Ok(())
    }
}
