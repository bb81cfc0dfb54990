//! # DedupStore - Deduplicating Content Store
//!
//! A content-addressable blob store with reference counting, per-tenant
//! quota accounting, and transactional ingestion, built on Clean
//! Architecture principles.
//!
//! ## Architecture Layers
//!
//! - **Domain**: Core business logic (entities, value objects, domain errors)
//! - **Application**: Use cases and ports (interfaces)
//! - **Infrastructure**: Adapters for blob storage and the SQLite ledger
//!
//! ## Key Features
//!
//! - SHA-256 content fingerprinting with automatic deduplication
//! - Two-phase writes (stage + atomic publish) for crash safety
//! - Atomic reference attach/detach with inline last-reference cleanup
//! - Reserve/commit/release quota accounting per tenant
//! - Write-ahead compensation log with a background reaper
//!
//! ## Example Usage
//!
//! ```no_run
//! use dedupstore::{Config, application::builder::ApplicationBuilder};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env();
//! config.validate()?;
//!
//! let app = ApplicationBuilder::new(config)
//!     .with_database()
//!     .await?
//!     .with_infrastructure()
//!     .await?
//!     .build()?;
//!
//! tokio::spawn(app.reaper.clone().run());
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod telemetry;

// Re-export key types explicitly to avoid ambiguity
pub use application::builder::{Application, ApplicationBuilder};
pub use application::{dto, ports, use_cases};
pub use config::Config;
pub use domain::errors as domain_errors;
pub use domain::{entities, value_objects};
