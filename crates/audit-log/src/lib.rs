//! Append-only audit trail.
//!
//! Mutations in the engine emit [`AuditEntry`] values into an [`AuditOutbox`]
//! once their primary write has committed. An [`AuditRecorder`] drains the
//! outbox into an [`AuditLogStore`]. Recording is best-effort: nothing in this
//! crate can fail the operation that produced an entry.

pub mod entry;
pub mod error;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod query;
pub mod store;

pub use entry::{AuditEntry, AuditEntryBuilder, AuditEntryId, AuditLogType, TargetType};
pub use error::{AuditLogError, Result};
pub use memory::InMemoryAuditLogStore;
pub use outbox::{AuditInbox, AuditOutbox, AuditRecorder, outbox};
pub use postgres::PostgresAuditLogStore;
pub use query::AuditQuery;
pub use store::{AuditLogStore, AuditLogStoreExt, EntryStream};
