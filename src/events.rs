/// A mutation the ledger has just committed.
///
/// Fired to registered observers after the document and its aggregate stats
/// have been updated, never before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    /// A book was catalogued
    BookAdded {
        /// New book id
        book_id: String,
        /// Book title
        title: String,
    },
    /// A book record was edited
    BookEdited {
        /// Book id
        book_id: String,
    },
    /// A book was removed from the catalog
    BookRemoved {
        /// Removed book id
        book_id: String,
        /// Book title
        title: String,
    },
    /// A member joined
    MemberJoined {
        /// New member id
        member_id: String,
        /// Member name
        name: String,
    },
    /// A member record was edited
    MemberEdited {
        /// Member id
        member_id: String,
    },
    /// A loan was opened
    LoanOpened {
        /// New loan id
        loan_id: String,
        /// Borrowing member id
        member_id: String,
        /// Borrowed book id
        book_id: String,
    },
    /// A loan was closed by a return
    LoanClosed {
        /// Loan id
        loan_id: String,
        /// Days past due, 0 when on time
        days_late: i64,
        /// Fine assessed at return
        fine: i64,
    },
    /// A fine payment was recorded
    FinePaid {
        /// Paying member id
        member_id: String,
        /// Amount paid
        amount: i64,
        /// Fines still outstanding afterwards
        remaining: i64,
    },
    /// A reservation was placed
    ReservationPlaced {
        /// New reservation id
        reservation_id: String,
        /// Reserved book id
        book_id: String,
    },
    /// The category list changed
    CategoriesChanged,
}
