mod blob_store;
mod compensation_log;
mod quota_accountant;
mod reference_ledger;

pub use blob_store::{BlobReader, BlobStore, StagedBlob, StorageError};
pub use compensation_log::{CompensationLog, CompensationLogError, IngestIntent, IntentId};
pub use quota_accountant::{QuotaAccountant, QuotaError};
pub use reference_ledger::{DetachOutcome, LedgerError, ReferenceLedger};

#[cfg(test)]
pub use blob_store::MockBlobStore;
#[cfg(test)]
pub use compensation_log::MockCompensationLog;
#[cfg(test)]
pub use quota_accountant::MockQuotaAccountant;
#[cfg(test)]
pub use reference_ledger::MockReferenceLedger;
