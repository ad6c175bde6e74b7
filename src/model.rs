use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Settings;

/// A catalogued book and its copy counters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Book {
    /// Short opaque code, e.g. `B-0001`
    pub id: String,
    /// Book title
    pub title: String,
    /// Author name
    pub author: String,
    /// Optional ISBN; malformed values are accepted with a warning
    pub isbn: Option<String>,
    /// Category name from the document's category list
    pub category: String,
    /// Publisher name
    pub publisher: String,
    /// Publication year
    pub year: i32,
    /// Page count
    pub pages: u32,
    /// Total copies owned by the library
    pub copies: u32,
    /// Copies currently on the shelf; `0 <= available_copies <= copies`
    pub available_copies: u32,
    /// Free-text shelf location
    pub location: String,
    /// Free-text description
    pub description: String,
    /// When the record was created
    pub added_at: DateTime<Utc>,
}

impl Book {
    /// Whether at least one copy is on the shelf.
    ///
    /// Always derived from `available_copies`, never stored.
    #[must_use]
    pub fn available(&self) -> bool {
        self.available_copies > 0
    }
}

/// Membership standing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum MemberStatus {
    /// Member in good standing
    #[default]
    Active,
    /// Member barred from borrowing
    Suspended,
}

/// A registered library member
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Member {
    /// Short opaque code, e.g. `M-0001`
    pub id: String,
    /// Member name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Contact phone number
    pub phone: String,
    /// When the member joined
    pub joined_at: DateTime<Utc>,
    /// Membership standing
    pub status: MemberStatus,
    /// Ids of books currently out on loan to this member
    pub borrowed_books: Vec<String>,
    /// Outstanding fines in integer currency units, never negative
    pub fines: i64,
    /// Ids of this member's closed loans, oldest first
    pub history: Vec<String>,
}

/// Lifecycle of a loan: `Borrowed -> Returned`, no other transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum LoanStatus {
    /// The book is out with the member
    Borrowed,
    /// The book came back; terminal
    Returned,
}

/// A single borrow-through-return record
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Loan {
    /// Short opaque code, e.g. `T-0001`
    pub id: String,
    /// Borrowing member id
    pub member_id: String,
    /// Borrowed book id
    pub book_id: String,
    /// When the loan was opened
    pub borrowed_at: DateTime<Utc>,
    /// When the book is due back
    pub due_at: DateTime<Utc>,
    /// When the book came back, if it has
    pub returned_at: Option<DateTime<Utc>>,
    /// Current lifecycle state
    pub status: LoanStatus,
    /// Fine assessed at return time, 0 if on time or still open
    pub fine: i64,
}

impl Loan {
    /// Whether the loan is still open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Borrowed
    }

    /// Whether the loan is open and past its due date at `now`.
    ///
    /// Pure derivation from loan data; never cached anywhere else.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.due_at < now
    }
}

/// A fine payment made by a member
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Payment {
    /// Short opaque code, e.g. `P-0001`
    pub id: String,
    /// Paying member id
    pub member_id: String,
    /// Amount paid in integer currency units, always positive
    pub amount: i64,
    /// When the payment was recorded
    pub paid_at: DateTime<Utc>,
}

/// Lifecycle of a reservation; only `Active` is ever produced here
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ReservationStatus {
    /// Reservation is waiting on the book
    Active,
    /// Reservation was satisfied by a borrow
    Fulfilled,
    /// Reservation was withdrawn
    Cancelled,
}

/// A member's standing request for a book
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Reservation {
    /// Short opaque code, e.g. `R-0001`
    pub id: String,
    /// Reserving member id
    pub member_id: String,
    /// Reserved book id
    pub book_id: String,
    /// When the reservation was placed
    pub reserved_at: DateTime<Utc>,
    /// Current lifecycle state
    pub status: ReservationStatus,
}

/// Aggregate counts recomputed from full scans after every mutation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Stats {
    /// Number of book records
    pub total_books: usize,
    /// Number of member records
    pub total_members: usize,
    /// Number of loan records, open or closed
    pub total_loans: usize,
    /// Books with no copy on the shelf
    pub books_on_loan: usize,
    /// Open loans past their due date
    pub overdue_loans: usize,
}

/// Per-kind id counters for assigning fresh identifiers
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct Counters {
    /// Last issued book number
    pub book: u32,
    /// Last issued member number
    pub member: u32,
    /// Last issued loan number
    pub loan: u32,
    /// Last issued payment number
    pub payment: u32,
    /// Last issued reservation number
    pub reservation: u32,
}

/// The whole persisted document: every record the ledger owns.
///
/// Entities cross-reference each other by id only; there is no embedded
/// aliasing to go stale.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Document {
    /// Book catalog, insertion order
    pub books: Vec<Book>,
    /// Registered members
    pub members: Vec<Member>,
    /// All loans ever opened
    pub loans: Vec<Loan>,
    /// All fine payments
    pub payments: Vec<Payment>,
    /// All reservations
    pub reservations: Vec<Reservation>,
    /// Mutable category list offered when cataloguing
    pub categories: Vec<String>,
    /// Runtime-mutable settings
    pub settings: Settings,
    /// Aggregate counts, refreshed after each mutation
    pub stats: Stats,
    /// Id counters
    pub counters: Counters,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            books: Vec::new(),
            members: Vec::new(),
            loans: Vec::new(),
            payments: Vec::new(),
            reservations: Vec::new(),
            categories: default_categories(),
            settings: Settings::default(),
            stats: Stats::default(),
            counters: Counters::default(),
        }
    }
}

impl Document {
    /// Issue a fresh book id.
    pub fn next_book_id(&mut self) -> String {
        self.counters.book = self.counters.book.saturating_add(1);
        format!("B-{:04}", self.counters.book)
    }

    /// Issue a fresh member id.
    pub fn next_member_id(&mut self) -> String {
        self.counters.member = self.counters.member.saturating_add(1);
        format!("M-{:04}", self.counters.member)
    }

    /// Issue a fresh loan id.
    pub fn next_loan_id(&mut self) -> String {
        self.counters.loan = self.counters.loan.saturating_add(1);
        format!("T-{:04}", self.counters.loan)
    }

    /// Issue a fresh payment id.
    pub fn next_payment_id(&mut self) -> String {
        self.counters.payment = self.counters.payment.saturating_add(1);
        format!("P-{:04}", self.counters.payment)
    }

    /// Issue a fresh reservation id.
    pub fn next_reservation_id(&mut self) -> String {
        self.counters.reservation = self.counters.reservation.saturating_add(1);
        format!("R-{:04}", self.counters.reservation)
    }
}

/// Categories seeded into a brand-new document.
fn default_categories() -> Vec<String> {
    ["Fiction", "Non-fiction", "Science", "History", "Children", "Reference"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Check an ISBN-10 or ISBN-13 checksum, ignoring hyphens and spaces.
///
/// A failed check never blocks cataloguing; callers only warn.
#[must_use]
pub fn valid_isbn(raw: &str) -> bool {
    let digits: Vec<char> = raw.chars().filter(|c| *c != '-' && *c != ' ').collect();
    match digits.len() {
        10 => isbn10_checksum(&digits),
        13 => isbn13_checksum(&digits),
        _ => false,
    }
}

/// ISBN-10 weighted checksum; the final position may be `X` for 10.
#[allow(clippy::arithmetic_side_effects)]
fn isbn10_checksum(digits: &[char]) -> bool {
    let mut sum: u32 = 0;
    for (i, c) in digits.iter().enumerate() {
        let value = if i == 9 && (*c == 'X' || *c == 'x') {
            10
        } else if let Some(d) = c.to_digit(10) {
            d
        } else {
            return false;
        };
        let weight = 10 - u32::try_from(i).unwrap_or(0);
        sum += value * weight;
    }
    sum % 11 == 0
}

/// ISBN-13 alternating 1/3 weighted checksum.
#[allow(clippy::arithmetic_side_effects)]
fn isbn13_checksum(digits: &[char]) -> bool {
    let mut sum: u32 = 0;
    for (i, c) in digits.iter().enumerate() {
        let Some(d) = c.to_digit(10) else {
            return false;
        };
        let weight = if i % 2 == 0 { 1 } else { 3 };
        sum += d * weight;
    }
    sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::valid_isbn;

    #[test]
    fn isbn10_accepts_valid_checksum() {
        assert!(valid_isbn("0-306-40615-2"));
        assert!(valid_isbn("080442957X"));
    }

    #[test]
    fn isbn13_accepts_valid_checksum() {
        assert!(valid_isbn("978-0-306-40615-7"));
    }

    #[test]
    fn rejects_bad_checksums_and_lengths() {
        assert!(!valid_isbn("0306406152X"));
        assert!(!valid_isbn("9780306406158"));
        assert!(!valid_isbn("12345"));
        assert!(!valid_isbn("not-an-isbn"));
    }
}
