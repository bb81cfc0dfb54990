mod fingerprint;
mod owner_id;
mod tenant_id;

pub use fingerprint::Fingerprint;
pub use owner_id::OwnerId;
pub use tenant_id::TenantId;
