//! Single-process library catalog and circulation tracker.
//!
//! The [`ledger::Ledger`] owns the whole in-memory document (books,
//! members, loans, payments, reservations) and exposes operations that
//! mutate it consistently: every operation either fully commits or leaves
//! the document untouched. Persistence is a full-document JSON overwrite
//! with rotating backups, handled by [`store::DocumentStore`].

pub mod config;
pub mod csv;
pub mod error;
pub mod events;
pub mod ledger;
pub mod menu;
pub mod model;
pub mod observers;
pub mod report;
pub mod store;

pub use config::Settings;
pub use error::LedgerError;
pub use events::LedgerEvent;
pub use ledger::Ledger;
pub use model::Document;
pub use store::DocumentStore;
