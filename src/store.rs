//! sled-backed tables and the gap-free sequence claim shared by every append
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::inquiry::Inquiry;
use crate::utils::{sequence_of, sequence_prefix};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionError};
use backon::BlockingRetryable;
use sled::{Db, Tree};
use std::sync::Arc;
use tracing::warn;

/// Why a write transaction gave up.
#[derive(Debug)]
pub(crate) enum TxAbort {
    /// Another writer claimed the proposed sequence number first.
    SequenceTaken,
    Rejected(LedgerError),
}

/// Outcome of one sequence claim attempt.
enum Claim {
    Taken(u32),
    Failed(LedgerError),
}

impl From<LedgerError> for TxAbort {
    fn from(value: LedgerError) -> Self {
        TxAbort::Rejected(value)
    }
}

pub(crate) type TxResult<T> = ConflictableTransactionResult<T, TxAbort>;

pub(crate) fn reject<T>(err: LedgerError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(TxAbort::Rejected(err)))
}

pub(crate) fn sequence_taken<T>() -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(TxAbort::SequenceTaken))
}

/// Maps a finished transaction: `Ok(None)` means retry with a fresh sequence number.
pub(crate) fn settle<T>(result: Result<T, TransactionError<TxAbort>>) -> LedgerResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(TransactionError::Abort(TxAbort::SequenceTaken)) => Ok(None),
        Err(TransactionError::Abort(TxAbort::Rejected(err))) => Err(err),
        Err(TransactionError::Storage(err)) => Err(err.into()),
    }
}

pub(crate) fn encode<T: minicbor::Encode<()>>(value: &T) -> LedgerResult<Vec<u8>> {
    Ok(minicbor::to_vec(value)?)
}

pub(crate) fn decode<T>(bytes: &[u8]) -> LedgerResult<T>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    Ok(minicbor::decode(bytes)?)
}

/// Decodes inside a transaction, aborting on malformed records.
pub(crate) fn tx_decode<T>(bytes: &[u8]) -> TxResult<T>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match decode(bytes) {
        Ok(value) => Ok(value),
        Err(err) => reject(err),
    }
}

pub(crate) fn tx_encode<T: minicbor::Encode<()>>(value: &T) -> TxResult<Vec<u8>> {
    match encode(value) {
        Ok(bytes) => Ok(bytes),
        Err(err) => reject(err),
    }
}

/// One tree per logical table.
pub struct Store {
    instance: Arc<Db>,
    config: LedgerConfig,
    pub(crate) inquiries: Tree,
    pub(crate) sku_index: Tree,
    pub(crate) versions: Tree,
    pub(crate) version_index: Tree,
    pub(crate) version_items: Tree,
    pub(crate) customer_responses: Tree,
    pub(crate) quotation_responses: Tree,
    pub(crate) quotation_response_items: Tree,
    pub(crate) sku_history: Tree,
}

impl Store {
    pub fn open(instance: Arc<Db>, config: LedgerConfig) -> LedgerResult<Self> {
        Ok(Self {
            inquiries: instance.open_tree("inquiries")?,
            sku_index: instance.open_tree("sku_index")?,
            versions: instance.open_tree("versions")?,
            version_index: instance.open_tree("version_index")?,
            version_items: instance.open_tree("version_items")?,
            customer_responses: instance.open_tree("customer_responses")?,
            quotation_responses: instance.open_tree("quotation_responses")?,
            quotation_response_items: instance.open_tree("quotation_response_items")?,
            sku_history: instance.open_tree("sku_negotiation_history")?,
            instance,
            config,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn flush(&self) -> LedgerResult<usize> {
        Ok(self.instance.flush()?)
    }

    pub(crate) fn get<T>(&self, tree: &Tree, key: impl AsRef<[u8]>) -> LedgerResult<Option<T>>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        tree.get(key)?.map(|bytes| decode(&bytes)).transpose()
    }

    /// Every record under `<parent>/`, in key order.
    pub(crate) fn scan<T>(&self, tree: &Tree, parent: &str) -> LedgerResult<Vec<T>>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        tree.scan_prefix(sequence_prefix(parent))
            .map(|entry| {
                let (_, bytes) = entry?;
                decode(&bytes)
            })
            .collect()
    }

    pub(crate) fn count(&self, tree: &Tree, parent: &str) -> LedgerResult<usize> {
        let mut count = 0;
        for entry in tree.scan_prefix(sequence_prefix(parent)) {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    /// Highest sequence number under `parent`, 0 when empty.
    pub(crate) fn last_sequence(&self, tree: &Tree, parent: &str) -> LedgerResult<u32> {
        match tree.scan_prefix(sequence_prefix(parent)).next_back() {
            Some(entry) => {
                let (key, _) = entry?;
                sequence_of(&key).ok_or_else(|| {
                    LedgerError::Integrity(format!("malformed sequence key under '{parent}'"))
                })
            }
            None => Ok(0),
        }
    }

    /// Claims `last + 1` under `parent` and hands it to `write`.
    ///
    /// `write` runs a transaction that must abort with [`TxAbort::SequenceTaken`] when the
    /// proposed key already exists, which surfaces here as `Ok(None)`. Taken claims are
    /// retried with backoff up to `max_sequence_retries` attempts, after which a conflict is
    /// returned.
    pub(crate) fn append_sequenced<T>(
        &self,
        tree: &Tree,
        parent: &str,
        mut write: impl FnMut(u32) -> LedgerResult<Option<T>>,
    ) -> LedgerResult<T> {
        let claim = || -> Result<T, Claim> {
            let next = self
                .last_sequence(tree, parent)
                .map_err(Claim::Failed)?
                .checked_add(1)
                .ok_or_else(|| {
                    Claim::Failed(LedgerError::Conflict(format!(
                        "sequence under '{parent}' exhausted"
                    )))
                })?;
            match write(next) {
                Ok(Some(written)) => Ok(written),
                Ok(None) => Err(Claim::Taken(next)),
                Err(err) => Err(Claim::Failed(err)),
            }
        };

        claim
            .retry(self.config.retry_backoff())
            .sleep(std::thread::sleep)
            .when(|claim| matches!(claim, Claim::Taken(_)))
            .notify(|claim, delay| {
                if let Claim::Taken(sequence) = claim {
                    warn!(parent, sequence, ?delay, "sequence number already taken, retrying");
                }
            })
            .call()
            .map_err(|claim| match claim {
                Claim::Taken(sequence) => LedgerError::Conflict(format!(
                    "could not claim sequence {sequence} under '{parent}' after {} attempts",
                    self.config.max_sequence_retries.max(1)
                )),
                Claim::Failed(err) => err,
            })
    }

    pub fn load_inquiry(&self, inquiry_id: &str) -> LedgerResult<Inquiry> {
        self.get(&self.inquiries, inquiry_id)?
            .ok_or_else(|| LedgerError::not_found("inquiry", inquiry_id))
    }

    /// Inquiry that owns the SKU line `sku_id`.
    pub(crate) fn inquiry_of_sku(&self, sku_id: &str) -> LedgerResult<Inquiry> {
        let inquiry_id = self
            .sku_index
            .get(sku_id)?
            .ok_or_else(|| LedgerError::not_found("sku", sku_id))?;
        let inquiry_id = String::from_utf8(inquiry_id.to_vec())
            .map_err(|e| LedgerError::Integrity(e.to_string()))?;
        self.load_inquiry(&inquiry_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::sequence_key;

    fn store() -> Store {
        let db = LedgerConfig::temporary().unwrap();
        Store::open(Arc::new(db), LedgerConfig::default()).unwrap()
    }

    #[test]
    fn last_sequence_reads_the_highest_key() {
        let store = store();
        assert_eq!(store.last_sequence(&store.versions, "rfq1a").unwrap(), 0);

        store.versions.insert(sequence_key("rfq1a", 1), vec![]).unwrap();
        store.versions.insert(sequence_key("rfq1a", 300), vec![]).unwrap();
        store.versions.insert(sequence_key("rfq1b", 900), vec![]).unwrap();

        assert_eq!(store.last_sequence(&store.versions, "rfq1a").unwrap(), 300);
        assert_eq!(store.count(&store.versions, "rfq1a").unwrap(), 2);
    }

    #[test]
    fn append_sequenced_gives_up_after_the_bound() {
        let store = store();
        let mut calls = 0;

        let result: LedgerResult<()> = store.append_sequenced(&store.versions, "rfq1a", |_| {
            calls += 1;
            Ok(None)
        });

        assert!(matches!(result, Err(LedgerError::Conflict(_))));
        assert_eq!(calls, store.config().max_sequence_retries);
    }

    #[test]
    fn taken_sequence_is_retried_with_a_fresh_claim() {
        let store = store();
        let mut proposed = vec![];

        let written = store
            .append_sequenced(&store.versions, "rfq1a", |sequence| {
                proposed.push(sequence);
                if proposed.len() == 1 {
                    // a concurrent writer lands first
                    store.versions.insert(sequence_key("rfq1a", sequence), vec![])?;
                    return Ok(None);
                }
                Ok(Some(sequence))
            })
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(proposed, vec![1, 2]);
    }

    #[test]
    fn write_errors_are_not_retried() {
        let store = store();
        let mut calls = 0;

        let result: LedgerResult<()> = store.append_sequenced(&store.versions, "rfq1a", |_| {
            calls += 1;
            Err(LedgerError::Validation("bad".into()))
        });

        assert!(matches!(result, Err(LedgerError::Validation(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn missing_inquiry_is_not_found() {
        let store = store();
        assert!(matches!(
            store.load_inquiry("rfq1missing"),
            Err(LedgerError::NotFound { .. })
        ));
    }
}
