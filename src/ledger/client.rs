use thiserror::Error;

use crate::ledger::{Address, SignedTransaction};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger unreachable: {0}")]
    Unreachable(String),

    #[error("transaction rejected: {0}")]
    Rejected(String),
}

/// Remote service that orders, executes and stores signed transactions.
///
/// Both calls may block for a long time; callers bound them with a deadline.
pub trait Ledger: Send + Sync + 'static {
    /// Next nonce the ledger expects from `address`, at the latest known round.
    fn fetch_sequence_number(
        &self,
        address: &Address,
    ) -> impl Future<Output = Result<u64, LedgerError>> + Send;

    /// Submits `transaction` and waits for it to be included, returning the
    /// raw contract reply.
    fn commit(
        &self,
        transaction: &SignedTransaction,
    ) -> impl Future<Output = Result<Vec<u8>, LedgerError>> + Send;
}
