pub mod ingest_content;
pub mod inspect;
pub mod release_owner;

pub use ingest_content::{IngestError, IngestPolicy, IngestUseCase};
pub use inspect::{BlobInfo, InspectError, InspectUseCase};
pub use release_owner::{ReleaseError, ReleaseOutcome, ReleaseUseCase};
