mod blob;
mod quota;
mod reference;

pub use blob::ContentBlob;
pub use quota::QuotaLedgerEntry;
pub use reference::Reference;
