use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

use crate::ledger::{
    AccountSigner, ContractCall, Fee, Ledger, LedgerError, Request, Response, SignedTransaction,
    SignerError, Transaction,
};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("failed to fetch sequence number: {0}")]
    SequenceFetch(#[source] LedgerError),

    #[error("failed to encode transaction: {0}")]
    Encode(#[from] serde_cbor::Error),

    #[error("failed to sign transaction: {0}")]
    Signing(#[source] SignerError),

    #[error("submission rejected: {0}")]
    Rejected(#[source] LedgerError),

    #[error("submission timed out after {0:?}")]
    Timeout(Duration),

    #[error("transaction committed but its reply could not be decoded: {0}")]
    ResponseDecode(String),

    #[error("submission queue closed")]
    QueueClosed,
}

impl SubmitError {
    /// Worth trying again with a fresh sequence number.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubmitError::SequenceFetch(_)
                | SubmitError::Rejected(_)
                | SubmitError::Timeout(_)
                | SubmitError::QueueClosed
        )
    }

    /// The transaction landed even though the call reported an error.
    pub fn is_committed(&self) -> bool {
        matches!(self, SubmitError::ResponseDecode(_))
    }
}

/// Signs requests for one account and commits them to one contract instance.
///
/// Fetching the nonce, signing and committing happen back to back inside
/// [`submit_and_await`](Self::submit_and_await); callers must not run two of
/// these concurrently for the same account.
#[derive(Debug)]
pub struct TransactionSubmitter<L> {
    ledger: L,
    signer: AccountSigner,
    instance_id: u64,
    deadline: Duration,
}

impl<L: Ledger> TransactionSubmitter<L> {
    pub fn new(ledger: L, signer: AccountSigner, instance_id: u64, deadline: Duration) -> Self {
        Self {
            ledger,
            signer,
            instance_id,
            deadline,
        }
    }

    pub fn signer(&self) -> &AccountSigner {
        &self.signer
    }

    pub async fn submit_and_await(&self, request: &Request) -> Result<Response, SubmitError> {
        match timeout(self.deadline, self.sign_and_commit(request)).await {
            Ok(result) => result,
            Err(_) => Err(SubmitError::Timeout(self.deadline)),
        }
    }

    async fn sign_and_commit(&self, request: &Request) -> Result<Response, SubmitError> {
        let address = self.signer.address();
        let nonce = self
            .ledger
            .fetch_sequence_number(&address)
            .await
            .map_err(SubmitError::SequenceFetch)?;

        let data = request.to_cbor()?;
        let fee = Fee::for_encoded_len(data.len());

        let transaction = Transaction {
            call: ContractCall {
                instance_id: self.instance_id,
                data,
            },
            fee,
            nonce,
            signer: self.signer.public_key(),
        };
        let body = transaction.to_cbor()?;
        let signature = self.signer.sign(&body).map_err(SubmitError::Signing)?;

        debug!(
            kind = request.kind(),
            %address,
            nonce,
            gas = fee.gas,
            "committing transaction"
        );

        let raw = self
            .ledger
            .commit(&SignedTransaction {
                body,
                signature: signature.to_vec(),
            })
            .await
            .map_err(SubmitError::Rejected)?;

        decode_response(request, &raw)
    }
}

/// Interprets a raw contract reply to `request`.
pub fn decode_response(request: &Request, raw: &[u8]) -> Result<Response, SubmitError> {
    let response = Response::decode(raw).map_err(|e| SubmitError::ResponseDecode(e.to_string()))?;

    if !request.expects(&response) {
        return Err(SubmitError::ResponseDecode(format!(
            "unexpected reply to {}: {response:?}",
            request.kind()
        )));
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ledger::{EMPTY_RESPONSE_RAW, MemoryLedger},
        sensor::{MeasurementKind, SensorDescriptor, SensorId},
    };

    fn submitter(ledger: &MemoryLedger) -> TransactionSubmitter<MemoryLedger> {
        TransactionSubmitter::new(
            ledger.clone(),
            AccountSigner::from_seed(&[1u8; 32]),
            0,
            Duration::from_secs(5),
        )
    }

    fn register(name: &str) -> Request {
        Request::RegisterSensor {
            sensor: SensorDescriptor {
                name: name.to_string(),
                measurement_kinds: vec![MeasurementKind::Temperature],
                storage_granularity: 600,
                query_granularity: 14_400,
            },
        }
    }

    #[tokio::test]
    async fn test_nonce_follows_ledger() {
        let ledger = MemoryLedger::new();
        let submitter = submitter(&ledger);

        let first = submitter.submit_and_await(&register("bedroom")).await.unwrap();
        assert!(matches!(first, Response::RegisterSensor { .. }));
        submitter.submit_and_await(&register("kitchen")).await.unwrap();

        let committed = ledger.committed();
        let nonces: Vec<_> = committed.iter().map(|tx| tx.nonce).collect();
        assert_eq!(nonces, vec![0, 1]);

        for tx in committed {
            assert_eq!(tx.fee, Fee::for_encoded_len(tx.call.data.len()));
            assert_eq!(tx.signer, submitter.signer().public_key());
        }
    }

    #[tokio::test]
    async fn test_unreachable_ledger_is_retryable() {
        let ledger = MemoryLedger::new();
        ledger.set_unreachable(true);

        let err = submitter(&ledger)
            .submit_and_await(&register("bedroom"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::SequenceFetch(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_contract_rejection_is_retryable() {
        let ledger = MemoryLedger::new();
        let request = Request::SubmitMeasurements {
            sensor_id: SensorId::from(404),
            measurements: Default::default(),
        };

        let err = submitter(&ledger).submit_and_await(&request).await.unwrap_err();
        assert!(matches!(err, SubmitError::Rejected(_)));
        assert!(err.is_retryable());
        assert!(ledger.committed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline() {
        let ledger = MemoryLedger::new();
        ledger.set_commit_delay(Some(Duration::from_secs(60)));

        let err = submitter(&ledger)
            .submit_and_await(&register("bedroom"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Timeout(d) if d == Duration::from_secs(5)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_decode_response() {
        let query = Request::Query {
            sensor_id: SensorId::from(1),
            measurement_kind: MeasurementKind::Temperature,
            aggregate: crate::ledger::Aggregate::Max,
            start: 0,
            end: 1,
        };

        assert_eq!(
            decode_response(&query, EMPTY_RESPONSE_RAW).unwrap(),
            Response::Empty
        );

        let err = decode_response(&query, b"\xffnot cbor").unwrap_err();
        assert!(err.is_committed());
        assert!(!err.is_retryable());

        let wrong_kind = Response::RegisterSensor {
            sensor_id: SensorId::from(1),
        }
        .to_cbor()
        .unwrap();
        assert!(matches!(
            decode_response(&query, &wrong_kind),
            Err(SubmitError::ResponseDecode(_))
        ));
    }
}
