//! Wallet command port (spec §6): the only collaborator the orchestrator
//! calls that can move real money. A concrete payments integration plugs in
//! behind this trait; this crate specifies the contract only.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::amount::{Amount, Currency};
use crate::error::CoreResult;

#[async_trait]
pub trait WalletCommand: Send + Sync {
    async fn deduct_entry_fee(&self, user: Uuid, currency: Currency, amount: Amount) -> CoreResult<()>;

    async fn refund(
        &self,
        user: Uuid,
        currency: Currency,
        amount: Amount,
        reason: &str,
    ) -> CoreResult<()>;
}
