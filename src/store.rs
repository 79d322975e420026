//! sled-backed persistence: keyed CBOR records and transactional read-modify-write
use super::error::{WorkflowError, WorkflowResult};
use super::utils::document_number;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use std::sync::Arc;
use tracing::debug;

pub(crate) type TxResult<T> = Result<T, ConflictableTransactionError<WorkflowError>>;

/// Abort the surrounding transaction with a business failure
pub(crate) fn fail<T>(err: WorkflowError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

pub(crate) trait OrAbort<T> {
    fn or_abort(self) -> TxResult<T>;
}

impl<T> OrAbort<T> for WorkflowResult<T> {
    fn or_abort(self) -> TxResult<T> {
        self.map_err(ConflictableTransactionError::Abort)
    }
}

pub(crate) mod keys {
    pub fn asset(id: &str) -> String {
        format!("asset/{id}")
    }
    pub fn assignment(id: &str) -> String {
        format!("assignment/{id}")
    }
    // the one active assignment a user may hold
    pub fn assignment_user(user: &str) -> String {
        format!("assignment_user/{user}")
    }
    pub fn borrow_tx(id: &str) -> String {
        format!("borrow_tx/{id}")
    }
    pub fn sig_token(digest: &str) -> String {
        format!("sig_token/{digest}")
    }
    pub fn requisition(no: &str) -> String {
        format!("requisition/{no}")
    }
    pub fn purchase_order(no: &str) -> String {
        format!("po/{no}")
    }
    pub fn ticket(no: &str) -> String {
        format!("ticket/{no}")
    }
    pub fn stock(item: &str, location: &str) -> String {
        format!("stock/{item}/{location}")
    }

    pub const TICKETS: &str = "ticket/";
}

pub struct Store {
    instance: Arc<sled::Db>,
    retries: u32,
}

impl Store {
    pub fn new(instance: Arc<sled::Db>, retries: u32) -> Self {
        Self { instance, retries }
    }

    /// Run `f` as one serializable transaction. sled re-runs it on write conflicts;
    /// I/O failures get a bounded number of extra attempts here.
    pub(crate) fn transact<T, F>(&self, f: F) -> WorkflowResult<T>
    where
        F: Fn(&TransactionalTree) -> TxResult<T>,
    {
        let mut attempt = 0;
        loop {
            match self.instance.transaction(&f) {
                Ok(value) => return Ok(value),
                Err(TransactionError::Abort(err)) => return Err(err),
                Err(TransactionError::Storage(err)) => {
                    if attempt < self.retries && matches!(err, sled::Error::Io(_)) {
                        attempt += 1;
                        debug!(attempt, error = %err, "retrying transaction after storage failure");
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }
    }

    pub(crate) fn get<T>(&self, key: &str) -> WorkflowResult<Option<T>>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        match self.instance.get(key.as_bytes())? {
            Some(bytes) => decode_record(&bytes).map(Some),
            None => Ok(None),
        }
    }

    pub(crate) fn scan<T>(&self, prefix: &str) -> WorkflowResult<Vec<T>>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        self.instance
            .scan_prefix(prefix.as_bytes())
            .map(|entry| {
                let (_, bytes) = entry?;
                decode_record(&bytes)
            })
            .collect()
    }

    /// Next document number for `prefix`, e.g. `PO-2026-00012`
    pub(crate) fn next_number(&self, prefix: &str, year: i32) -> WorkflowResult<String> {
        let seq = self.instance.generate_id()? + 1;
        Ok(document_number(prefix, year, seq))
    }
}

fn decode_record<T>(bytes: &[u8]) -> WorkflowResult<T>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    minicbor::decode(bytes).map_err(|e| WorkflowError::Encoding(e.to_string()))
}

pub(crate) fn load<T>(tx: &TransactionalTree, key: &str) -> TxResult<Option<T>>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tx.get(key.as_bytes())? {
        Some(bytes) => decode_record(&bytes).map(Some).or_abort(),
        None => Ok(None),
    }
}

pub(crate) fn require<T>(tx: &TransactionalTree, kind: &'static str, key: &str, id: &str) -> TxResult<T>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match load(tx, key)? {
        Some(record) => Ok(record),
        None => fail(WorkflowError::not_found(kind, id)),
    }
}

pub(crate) fn save<T>(tx: &TransactionalTree, key: &str, record: &T) -> TxResult<()>
where
    T: minicbor::Encode<()>,
{
    let bytes = minicbor::to_vec(record)
        .map_err(|e| ConflictableTransactionError::Abort(WorkflowError::Encoding(e.to_string())))?;
    tx.insert(key.as_bytes(), bytes)?;
    Ok(())
}

pub(crate) fn delete(tx: &TransactionalTree, key: &str) -> TxResult<()> {
    tx.remove(key.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, minicbor::Encode, minicbor::Decode)]
    struct Counter {
        #[n(0)]
        value: u32,
    }

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let db = sled::open(dir.path().join("store.db")).unwrap();
        (dir, Store::new(Arc::new(db), 3))
    }

    #[test]
    fn aborted_transaction_leaves_no_writes() {
        let (_dir, store) = store();

        let res: WorkflowResult<()> = store.transact(|tx| {
            save(tx, "counter/a", &Counter { value: 1 })?;
            fail(WorkflowError::MissingRequiredField("reason"))
        });

        assert!(matches!(res, Err(WorkflowError::MissingRequiredField("reason"))));
        assert_eq!(store.get::<Counter>("counter/a").unwrap(), None);
    }

    #[test]
    fn committed_records_scan_by_prefix() {
        let (_dir, store) = store();

        store
            .transact(|tx| {
                save(tx, "counter/a", &Counter { value: 1 })?;
                save(tx, "counter/b", &Counter { value: 2 })?;
                save(tx, "other/c", &Counter { value: 3 })
            })
            .unwrap();

        let all: Vec<Counter> = store.scan("counter/").unwrap();
        assert_eq!(all, vec![Counter { value: 1 }, Counter { value: 2 }]);
    }

    #[test]
    fn document_numbers_increase() {
        let (_dir, store) = store();
        let a = store.next_number("REQ", 2026).unwrap();
        let b = store.next_number("REQ", 2026).unwrap();
        assert!(a.starts_with("REQ-2026-"));
        assert_ne!(a, b);
    }
}
