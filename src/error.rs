use std::fmt;

use thiserror::Error;

/// The kind of record a lookup was after
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// A catalogued book
    Book,
    /// A registered member
    Member,
    /// A loan record
    Loan,
    /// A category name
    Category,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Book => "book",
            Self::Member => "member",
            Self::Loan => "loan",
            Self::Category => "category",
        };
        write!(f, "{label}")
    }
}

/// Everything that can go wrong inside a ledger operation.
///
/// Every variant is recovered at the menu boundary: the condition is shown
/// to the user and control returns to the loop with the in-memory document
/// untouched.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No record matched the query
    #[error("no {kind} matches `{query}`")]
    NotFound {
        /// What was looked up
        kind: EntityKind,
        /// The query as typed
        query: String,
    },

    /// More than one record matched a substring query
    #[error("`{query}` matches {count} {kind}s; narrow the query or use an id")]
    Ambiguous {
        /// What was looked up
        kind: EntityKind,
        /// The query as typed
        query: String,
        /// How many records matched
        count: usize,
    },

    /// Malformed or out-of-range user-supplied value
    #[error("{0}")]
    Validation(String),

    /// The member already has the maximum number of books out
    #[error("{name} already has {count} books out (limit {limit})")]
    LimitExceeded {
        /// Member name
        name: String,
        /// Books currently out
        count: usize,
        /// Configured cap
        limit: usize,
    },

    /// No free copies of the requested book
    #[error("no copies of `{title}` are available")]
    Unavailable {
        /// Book title
        title: String,
    },

    /// The operation would contradict existing records
    #[error("{0}")]
    Conflict(String),

    /// Soft gate: the member owes fines and the caller has not confirmed.
    ///
    /// Not a hard block; retry with the acknowledgement flag set after the
    /// user confirms.
    #[error("{name} owes {amount} in fines; confirm before borrowing")]
    FinesOutstanding {
        /// Member name
        name: String,
        /// Outstanding amount
        amount: i64,
    },
}

/// Result alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;
