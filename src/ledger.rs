use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::{
    config::Settings,
    error::{EntityKind, LedgerError, Result},
    events::LedgerEvent,
    model::{
        Book, Document, Loan, LoanStatus, Member, MemberStatus, Payment, Reservation,
        ReservationStatus, Stats, valid_isbn,
    },
    observers::LedgerObserver,
};

/// Seconds per day, used for ceiling division when computing days late
const SECS_PER_DAY: i64 = 86_400;

/// Fields supplied when cataloguing a new book
#[derive(Debug, Clone, Default)]
pub struct BookDraft {
    /// Book title; must be non-empty
    pub title: String,
    /// Author name
    pub author: String,
    /// Optional ISBN; a failed checksum only warns
    pub isbn: Option<String>,
    /// Category name
    pub category: String,
    /// Publisher name
    pub publisher: String,
    /// Publication year
    pub year: i32,
    /// Page count
    pub pages: u32,
    /// Total copies; defaults to 1 when unspecified
    pub copies: Option<u32>,
    /// Free-text shelf location
    pub location: String,
    /// Free-text description
    pub description: String,
}

/// Partial update for a book; `None` fields are left unchanged
#[derive(Debug, Clone, Default)]
pub struct BookPatch {
    /// New title
    pub title: Option<String>,
    /// New author
    pub author: Option<String>,
    /// New ISBN
    pub isbn: Option<String>,
    /// New category
    pub category: Option<String>,
    /// New publisher
    pub publisher: Option<String>,
    /// New publication year
    pub year: Option<i32>,
    /// New page count
    pub pages: Option<u32>,
    /// New total copy count; shelf copies are adjusted to keep the
    /// number currently on loan intact
    pub copies: Option<u32>,
    /// New shelf location
    pub location: Option<String>,
    /// New description
    pub description: Option<String>,
}

/// Fields supplied when registering a new member
#[derive(Debug, Clone, Default)]
pub struct MemberDraft {
    /// Member name; must be non-empty
    pub name: String,
    /// Contact email
    pub email: String,
    /// Contact phone number
    pub phone: String,
}

/// Partial update for a member; `None` fields are left unchanged
#[derive(Debug, Clone, Default)]
pub struct MemberPatch {
    /// New name
    pub name: Option<String>,
    /// New email
    pub email: Option<String>,
    /// New phone number
    pub phone: Option<String>,
    /// New standing
    pub status: Option<MemberStatus>,
}

/// Availability filter for advanced search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Availability {
    /// Match regardless of shelf state
    #[default]
    All,
    /// Only books with a free copy
    Available,
    /// Only books with every copy out
    Borrowed,
}

/// Conjunctive filter set for advanced search
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Title substring, case-insensitive
    pub title: Option<String>,
    /// Author substring, case-insensitive
    pub author: Option<String>,
    /// Category substring, case-insensitive
    pub category: Option<String>,
    /// Inclusive lower bound on publication year
    pub year_from: Option<i32>,
    /// Inclusive upper bound on publication year
    pub year_to: Option<i32>,
    /// Shelf-state filter
    pub availability: Availability,
}

/// The Circulation Ledger: exclusive owner of the in-memory document.
///
/// Every mutating operation validates fully before touching the document,
/// so a returned error always leaves the previous state intact. After a
/// successful mutation the aggregate stats are recomputed from full scans
/// and registered observers are notified.
pub struct Ledger {
    /// The owned document
    doc: Document,
    /// Registered mutation observers
    observers: Vec<Box<dyn LedgerObserver>>,
}

// Manual Debug: observers are trait objects
impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("doc", &self.doc)
            .field("observers_count", &self.observers.len())
            .finish()
    }
}

impl Ledger {
    /// Wrap a loaded (or freshly defaulted) document.
    ///
    /// Stats are refreshed immediately so overdue counts are current even
    /// before the first mutation of the session.
    #[must_use]
    pub fn new(doc: Document) -> Self {
        let mut ledger = Self { doc, observers: Vec::new() };
        ledger.refresh_stats(Utc::now());
        ledger
    }

    /// Register an observer to be notified after each committed mutation.
    pub fn register_observer(&mut self, observer: Box<dyn LedgerObserver>) {
        self.observers.push(observer);
    }

    /// Borrow the whole document, e.g. for persistence.
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Replace the live document wholesale.
    ///
    /// Used by backup restore: the restored document's categories and
    /// settings win outright, nothing from the abandoned session survives.
    pub fn replace_document(&mut self, doc: Document) {
        self.doc = doc;
        self.refresh_stats(Utc::now());
    }

    /// Current settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.doc.settings
    }

    /// Swap in new settings; they apply to subsequent operations only.
    pub fn set_settings(&mut self, settings: Settings) {
        self.doc.settings = settings;
    }

    /// Aggregate stats as of the last mutation.
    #[must_use]
    pub fn stats(&self) -> &Stats {
        &self.doc.stats
    }

    /// All books in catalog insertion order.
    #[must_use]
    pub fn books(&self) -> &[Book] {
        &self.doc.books
    }

    /// All registered members.
    #[must_use]
    pub fn members(&self) -> &[Member] {
        &self.doc.members
    }

    /// All loans ever opened.
    #[must_use]
    pub fn loans(&self) -> &[Loan] {
        &self.doc.loans
    }

    /// All recorded payments.
    #[must_use]
    pub fn payments(&self) -> &[Payment] {
        &self.doc.payments
    }

    /// All reservations.
    #[must_use]
    pub fn reservations(&self) -> &[Reservation] {
        &self.doc.reservations
    }

    /// Category names offered when cataloguing.
    #[must_use]
    pub fn categories(&self) -> &[String] {
        &self.doc.categories
    }

    /// Title of a book by id, if the book exists.
    #[must_use]
    pub fn book_title(&self, book_id: &str) -> Option<&str> {
        self.doc.books.iter().find(|b| b.id == book_id).map(|b| b.title.as_str())
    }

    /// Name of a member by id, if the member exists.
    #[must_use]
    pub fn member_name(&self, member_id: &str) -> Option<&str> {
        self.doc.members.iter().find(|m| m.id == member_id).map(|m| m.name.as_str())
    }

    // === Book catalog ===

    /// Catalogue a new book and return the created record.
    ///
    /// Copies default to 1 when unspecified; a malformed ISBN only logs a
    /// warning, the record is still created.
    ///
    /// # Errors
    ///
    /// Returns `Validation` when the title is empty.
    pub fn add_book(&mut self, draft: BookDraft) -> Result<Book> {
        self.add_book_at(draft, Utc::now())
    }

    /// Catalogue a new book with an explicit creation time.
    ///
    /// # Errors
    ///
    /// Returns `Validation` when the title is empty.
    pub fn add_book_at(&mut self, draft: BookDraft, now: DateTime<Utc>) -> Result<Book> {
        if draft.title.trim().is_empty() {
            return Err(LedgerError::Validation("book title cannot be empty".to_string()));
        }
        if let Some(isbn) = &draft.isbn {
            if !valid_isbn(isbn) {
                tracing::warn!(%isbn, "ISBN failed its checksum; record created anyway");
            }
        }
        let copies = draft.copies.unwrap_or(1);
        let id = self.doc.next_book_id();
        let book = Book {
            id: id.clone(),
            title: draft.title.trim().to_string(),
            author: draft.author,
            isbn: draft.isbn,
            category: draft.category,
            publisher: draft.publisher,
            year: draft.year,
            pages: draft.pages,
            copies,
            available_copies: copies,
            location: draft.location,
            description: draft.description,
            added_at: now,
        };
        self.doc.books.push(book.clone());
        self.commit(now, &LedgerEvent::BookAdded { book_id: id, title: book.title.clone() });
        Ok(book)
    }

    /// Edit a book resolved by exact id or title substring, applying only
    /// the patch fields that are set.
    ///
    /// # Errors
    ///
    /// `NotFound`/`Ambiguous` from the resolver, or `Validation` when the
    /// copy count would drop below the number currently on loan.
    pub fn edit_book(&mut self, query: &str, patch: BookPatch) -> Result<Book> {
        let idx = self.resolve_book_idx(query)?;
        if let Some(new_copies) = patch.copies {
            let out = self.book_at(idx).copies.saturating_sub(self.book_at(idx).available_copies);
            if new_copies < out {
                return Err(LedgerError::Validation(format!(
                    "cannot reduce copies to {new_copies}; {out} are out on loan"
                )));
            }
        }
        let book = {
            let book = self.book_at_mut(idx);
            if let Some(title) = patch.title {
                book.title = title;
            }
            if let Some(author) = patch.author {
                book.author = author;
            }
            if let Some(isbn) = patch.isbn {
                if !valid_isbn(&isbn) {
                    tracing::warn!(%isbn, "ISBN failed its checksum; applied anyway");
                }
                book.isbn = Some(isbn);
            }
            if let Some(category) = patch.category {
                book.category = category;
            }
            if let Some(publisher) = patch.publisher {
                book.publisher = publisher;
            }
            if let Some(year) = patch.year {
                book.year = year;
            }
            if let Some(pages) = patch.pages {
                book.pages = pages;
            }
            if let Some(new_copies) = patch.copies {
                let out = book.copies.saturating_sub(book.available_copies);
                book.copies = new_copies;
                book.available_copies = new_copies.saturating_sub(out);
            }
            if let Some(location) = patch.location {
                book.location = location;
            }
            if let Some(description) = patch.description {
                book.description = description;
            }
            book.clone()
        };
        self.commit(Utc::now(), &LedgerEvent::BookEdited { book_id: book.id.clone() });
        Ok(book)
    }

    /// Delete a book that has no copy out on loan and return the removed
    /// record. The interactive confirmation lives at the menu boundary.
    ///
    /// # Errors
    ///
    /// `NotFound`/`Ambiguous` from the resolver, or `Conflict` while any
    /// active loan still references the book.
    pub fn delete_book(&mut self, query: &str) -> Result<Book> {
        let idx = self.resolve_book_idx(query)?;
        let book_id = self.book_at(idx).id.clone();
        if self.doc.loans.iter().any(|l| l.is_active() && l.book_id == book_id) {
            return Err(LedgerError::Conflict(
                "cannot delete a book currently on loan".to_string(),
            ));
        }
        let book = self.doc.books.remove(idx);
        self.commit(
            Utc::now(),
            &LedgerEvent::BookRemoved { book_id: book.id.clone(), title: book.title.clone() },
        );
        Ok(book)
    }

    /// Case-insensitive substring search across title, author, category
    /// and ISBN, in catalog insertion order.
    #[must_use]
    pub fn search_books(&self, query: &str) -> Vec<&Book> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return Vec::new();
        }
        self.doc
            .books
            .iter()
            .filter(|b| {
                b.title.to_lowercase().contains(&q)
                    || b.author.to_lowercase().contains(&q)
                    || b.category.to_lowercase().contains(&q)
                    || b.isbn.as_deref().is_some_and(|i| i.to_lowercase().contains(&q))
            })
            .collect()
    }

    /// Conjunctive filter over title/author/category substrings, an
    /// inclusive year range, and shelf state.
    #[must_use]
    pub fn advanced_search(&self, filters: &SearchFilters) -> Vec<&Book> {
        /// Case-insensitive substring test against an optional filter.
        fn matches(filter: Option<&String>, value: &str) -> bool {
            filter.is_none_or(|f| value.to_lowercase().contains(&f.to_lowercase()))
        }
        self.doc
            .books
            .iter()
            .filter(|b| matches(filters.title.as_ref(), &b.title))
            .filter(|b| matches(filters.author.as_ref(), &b.author))
            .filter(|b| matches(filters.category.as_ref(), &b.category))
            .filter(|b| filters.year_from.is_none_or(|y| b.year >= y))
            .filter(|b| filters.year_to.is_none_or(|y| b.year <= y))
            .filter(|b| match filters.availability {
                Availability::All => true,
                Availability::Available => b.available(),
                Availability::Borrowed => !b.available(),
            })
            .collect()
    }

    /// Resolve a single book by exact id or title substring.
    ///
    /// # Errors
    ///
    /// `NotFound` when nothing matches, `Ambiguous` when several do.
    pub fn book(&self, query: &str) -> Result<&Book> {
        let idx = self.resolve_book_idx(query)?;
        Ok(self.book_at(idx))
    }

    // === Membership ===

    /// Register a new member and return the created record.
    ///
    /// # Errors
    ///
    /// Returns `Validation` when the name is empty.
    pub fn add_member(&mut self, draft: MemberDraft) -> Result<Member> {
        self.add_member_at(draft, Utc::now())
    }

    /// Register a new member with an explicit join time.
    ///
    /// # Errors
    ///
    /// Returns `Validation` when the name is empty.
    pub fn add_member_at(&mut self, draft: MemberDraft, now: DateTime<Utc>) -> Result<Member> {
        if draft.name.trim().is_empty() {
            return Err(LedgerError::Validation("member name cannot be empty".to_string()));
        }
        let id = self.doc.next_member_id();
        let member = Member {
            id: id.clone(),
            name: draft.name.trim().to_string(),
            email: draft.email,
            phone: draft.phone,
            joined_at: now,
            status: MemberStatus::Active,
            borrowed_books: Vec::new(),
            fines: 0,
            history: Vec::new(),
        };
        self.doc.members.push(member.clone());
        self.commit(now, &LedgerEvent::MemberJoined { member_id: id, name: member.name.clone() });
        Ok(member)
    }

    /// Edit a member resolved by exact id or name substring, applying only
    /// the patch fields that are set.
    ///
    /// # Errors
    ///
    /// `NotFound`/`Ambiguous` from the resolver.
    pub fn edit_member(&mut self, query: &str, patch: MemberPatch) -> Result<Member> {
        let idx = self.resolve_member_idx(query)?;
        let member = {
            let member = self.member_at_mut(idx);
            if let Some(name) = patch.name {
                member.name = name;
            }
            if let Some(email) = patch.email {
                member.email = email;
            }
            if let Some(phone) = patch.phone {
                member.phone = phone;
            }
            if let Some(status) = patch.status {
                member.status = status;
            }
            member.clone()
        };
        self.commit(Utc::now(), &LedgerEvent::MemberEdited { member_id: member.id.clone() });
        Ok(member)
    }

    /// Resolve a single member by exact id or name substring.
    ///
    /// # Errors
    ///
    /// `NotFound` when nothing matches, `Ambiguous` when several do.
    pub fn member(&self, query: &str) -> Result<&Member> {
        let idx = self.resolve_member_idx(query)?;
        Ok(self.member_at(idx))
    }

    /// Closed-loan history of a member, oldest first.
    ///
    /// # Errors
    ///
    /// `NotFound`/`Ambiguous` from the resolver.
    pub fn member_history(&self, query: &str) -> Result<Vec<&Loan>> {
        let idx = self.resolve_member_idx(query)?;
        let member = self.member_at(idx);
        Ok(member
            .history
            .iter()
            .filter_map(|loan_id| self.doc.loans.iter().find(|l| &l.id == loan_id))
            .collect())
    }

    // === Categories ===

    /// Add a category name.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty name, `Conflict` for a duplicate
    /// (case-insensitive).
    pub fn add_category(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::Validation("category name cannot be empty".to_string()));
        }
        if self.doc.categories.iter().any(|c| c.eq_ignore_ascii_case(name)) {
            return Err(LedgerError::Conflict(format!("category `{name}` already exists")));
        }
        self.doc.categories.push(name.to_string());
        self.commit(Utc::now(), &LedgerEvent::CategoriesChanged);
        Ok(())
    }

    /// Remove a category by name.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown name, `Conflict` while any book still
    /// uses the category.
    pub fn remove_category(&mut self, name: &str) -> Result<()> {
        let Some(idx) = self.doc.categories.iter().position(|c| c.eq_ignore_ascii_case(name))
        else {
            return Err(LedgerError::NotFound {
                kind: EntityKind::Category,
                query: name.to_string(),
            });
        };
        if self.doc.books.iter().any(|b| b.category.eq_ignore_ascii_case(name)) {
            return Err(LedgerError::Conflict(format!("category `{name}` is still in use")));
        }
        self.doc.categories.remove(idx);
        self.commit(Utc::now(), &LedgerEvent::CategoriesChanged);
        Ok(())
    }

    // === Circulation ===

    /// Open a loan for a member on a book.
    ///
    /// See [`Self::borrow_book_at`] for the checks performed.
    ///
    /// # Errors
    ///
    /// As [`Self::borrow_book_at`].
    pub fn borrow_book(
        &mut self,
        member_query: &str,
        book_query: &str,
        acknowledge_fines: bool,
    ) -> Result<Loan> {
        self.borrow_book_at(member_query, book_query, acknowledge_fines, Utc::now())
    }

    /// Open a loan at an explicit time.
    ///
    /// Checks run in order: member resolution, suspension, loan cap,
    /// outstanding-fines gate, book resolution, availability. Nothing is
    /// mutated until all of them pass.
    ///
    /// # Errors
    ///
    /// `NotFound`/`Ambiguous` from the resolvers, `Validation` for a
    /// suspended member, `LimitExceeded` at the loan cap,
    /// `FinesOutstanding` when fines are owed and `acknowledge_fines` is
    /// unset, `Unavailable` when no copy is free.
    pub fn borrow_book_at(
        &mut self,
        member_query: &str,
        book_query: &str,
        acknowledge_fines: bool,
        now: DateTime<Utc>,
    ) -> Result<Loan> {
        let member_idx = self.resolve_member_idx(member_query)?;
        {
            let member = self.member_at(member_idx);
            if member.status == MemberStatus::Suspended {
                return Err(LedgerError::Validation(format!(
                    "membership of {} is suspended",
                    member.name
                )));
            }
            let limit = self.doc.settings.max_books_per_user;
            if member.borrowed_books.len() >= limit {
                return Err(LedgerError::LimitExceeded {
                    name: member.name.clone(),
                    count: member.borrowed_books.len(),
                    limit,
                });
            }
            if member.fines > 0 && !acknowledge_fines {
                return Err(LedgerError::FinesOutstanding {
                    name: member.name.clone(),
                    amount: member.fines,
                });
            }
        }
        let book_idx = self.resolve_book_idx(book_query)?;
        {
            let book = self.book_at(book_idx);
            if book.available_copies == 0 {
                return Err(LedgerError::Unavailable { title: book.title.clone() });
            }
        }

        // All checks passed; commit the whole state change.
        let loan_id = self.doc.next_loan_id();
        let member_id = self.member_at(member_idx).id.clone();
        let book_id = self.book_at(book_idx).id.clone();
        let due_at = now + Duration::days(i64::from(self.doc.settings.max_borrow_days));
        let loan = Loan {
            id: loan_id.clone(),
            member_id: member_id.clone(),
            book_id: book_id.clone(),
            borrowed_at: now,
            due_at,
            returned_at: None,
            status: LoanStatus::Borrowed,
            fine: 0,
        };
        self.doc.loans.push(loan.clone());
        {
            let book = self.book_at_mut(book_idx);
            book.available_copies = book.available_copies.saturating_sub(1);
        }
        self.member_at_mut(member_idx).borrowed_books.push(book_id.clone());
        self.commit(now, &LedgerEvent::LoanOpened { loan_id, member_id, book_id });
        Ok(loan)
    }

    /// Close a loan by its id.
    ///
    /// # Errors
    ///
    /// As [`Self::return_book_at`].
    pub fn return_book(&mut self, loan_id: &str) -> Result<Loan> {
        self.return_book_at(loan_id, Utc::now())
    }

    /// Close a loan at an explicit return time.
    ///
    /// Days late are the ceiling of the time past due in whole days;
    /// `fine = days_late * fine_per_day` with the rate read at return
    /// time. Copy counters are paired 1:1 with the borrow, so
    /// `available_copies` can never exceed `copies`.
    ///
    /// # Errors
    ///
    /// `NotFound` when no active loan has the given id, or when the
    /// loan's member or book record is missing from the document.
    pub fn return_book_at(&mut self, loan_id: &str, now: DateTime<Utc>) -> Result<Loan> {
        let Some(loan_idx) = self
            .doc
            .loans
            .iter()
            .position(|l| l.is_active() && l.id.eq_ignore_ascii_case(loan_id.trim()))
        else {
            return Err(LedgerError::NotFound {
                kind: EntityKind::Loan,
                query: loan_id.to_string(),
            });
        };
        let (member_id, book_id, due_at) = {
            let loan = self.loan_at(loan_idx);
            (loan.member_id.clone(), loan.book_id.clone(), loan.due_at)
        };
        // Resolve both referenced records before mutating anything.
        let Some(member_idx) = self.doc.members.iter().position(|m| m.id == member_id) else {
            return Err(LedgerError::NotFound { kind: EntityKind::Member, query: member_id });
        };
        let Some(book_idx) = self.doc.books.iter().position(|b| b.id == book_id) else {
            return Err(LedgerError::NotFound { kind: EntityKind::Book, query: book_id });
        };

        let days_late = days_overdue(due_at, now);
        let fine = days_late.saturating_mul(self.doc.settings.fine_per_day);

        let closed = {
            let loan = self.loan_at_mut(loan_idx);
            loan.status = LoanStatus::Returned;
            loan.returned_at = Some(now);
            loan.fine = fine;
            loan.clone()
        };
        {
            let member = self.member_at_mut(member_idx);
            if let Some(pos) = member.borrowed_books.iter().position(|b| *b == book_id) {
                member.borrowed_books.remove(pos);
            }
            member.history.push(closed.id.clone());
            member.fines = member.fines.saturating_add(fine);
        }
        {
            let book = self.book_at_mut(book_idx);
            book.available_copies = book.available_copies.saturating_add(1).min(book.copies);
        }
        self.commit(
            now,
            &LedgerEvent::LoanClosed { loan_id: closed.id.clone(), days_late, fine },
        );
        Ok(closed)
    }

    /// All open loans, oldest first.
    #[must_use]
    pub fn active_loans(&self) -> Vec<&Loan> {
        self.doc.loans.iter().filter(|l| l.is_active()).collect()
    }

    /// Open loans matching a loan id or a member-name substring.
    ///
    /// Several loans can match one member; disambiguation between them is
    /// the menu's job.
    #[must_use]
    pub fn active_loans_matching(&self, query: &str) -> Vec<&Loan> {
        let trimmed = query.trim();
        let q = trimmed.to_lowercase();
        if q.is_empty() {
            return Vec::new();
        }
        self.doc
            .loans
            .iter()
            .filter(|l| l.is_active())
            .filter(|l| {
                l.id.eq_ignore_ascii_case(trimmed)
                    || self
                        .member_name(&l.member_id)
                        .is_some_and(|n| n.to_lowercase().contains(&q))
            })
            .collect()
    }

    /// Open loans past their due date at `now`.
    ///
    /// Pure query over loan data: idempotent, no side effects, never
    /// cached as a separate source of truth.
    #[must_use]
    pub fn overdue_loans(&self, now: DateTime<Utc>) -> Vec<&Loan> {
        self.doc.loans.iter().filter(|l| l.is_overdue(now)).collect()
    }

    /// Record a fine payment.
    ///
    /// # Errors
    ///
    /// As [`Self::pay_fine_at`].
    pub fn pay_fine(&mut self, member_query: &str, amount: i64) -> Result<Payment> {
        self.pay_fine_at(member_query, amount, Utc::now())
    }

    /// Record a fine payment at an explicit time.
    ///
    /// Payments never overdraw: the amount must be positive and at most
    /// the member's outstanding fines at the time of payment.
    ///
    /// # Errors
    ///
    /// `NotFound`/`Ambiguous` from the resolver, `Validation` for a
    /// non-positive amount or an overpayment.
    pub fn pay_fine_at(
        &mut self,
        member_query: &str,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<Payment> {
        let idx = self.resolve_member_idx(member_query)?;
        if amount <= 0 {
            return Err(LedgerError::Validation("payment amount must be positive".to_string()));
        }
        let outstanding = self.member_at(idx).fines;
        if amount > outstanding {
            return Err(LedgerError::Validation(format!(
                "payment of {amount} exceeds outstanding fines of {outstanding}"
            )));
        }
        let id = self.doc.next_payment_id();
        let member_id = self.member_at(idx).id.clone();
        let payment = Payment { id, member_id: member_id.clone(), amount, paid_at: now };
        let remaining = {
            let member = self.member_at_mut(idx);
            member.fines = member.fines.saturating_sub(amount);
            member.fines
        };
        self.doc.payments.push(payment.clone());
        self.commit(now, &LedgerEvent::FinePaid { member_id, amount, remaining });
        Ok(payment)
    }

    /// Place a reservation for a member on a book.
    ///
    /// # Errors
    ///
    /// As [`Self::reserve_book_at`].
    pub fn reserve_book(&mut self, member_query: &str, book_query: &str) -> Result<Reservation> {
        self.reserve_book_at(member_query, book_query, Utc::now())
    }

    /// Place a reservation at an explicit time.
    ///
    /// # Errors
    ///
    /// `NotFound`/`Ambiguous` from the resolvers, `Conflict` when the
    /// member already holds an active reservation on the book.
    pub fn reserve_book_at(
        &mut self,
        member_query: &str,
        book_query: &str,
        now: DateTime<Utc>,
    ) -> Result<Reservation> {
        let member_idx = self.resolve_member_idx(member_query)?;
        let book_idx = self.resolve_book_idx(book_query)?;
        let member_id = self.member_at(member_idx).id.clone();
        let book_id = self.book_at(book_idx).id.clone();
        if self.doc.reservations.iter().any(|r| {
            r.status == ReservationStatus::Active
                && r.member_id == member_id
                && r.book_id == book_id
        }) {
            return Err(LedgerError::Conflict(format!(
                "{} already has an active reservation on `{}`",
                self.member_at(member_idx).name,
                self.book_at(book_idx).title
            )));
        }
        let id = self.doc.next_reservation_id();
        let reservation = Reservation {
            id: id.clone(),
            member_id,
            book_id: book_id.clone(),
            reserved_at: now,
            status: ReservationStatus::Active,
        };
        self.doc.reservations.push(reservation.clone());
        self.commit(now, &LedgerEvent::ReservationPlaced { reservation_id: id, book_id });
        Ok(reservation)
    }

    // === Internals ===

    /// Refresh stats from full scans, then notify observers.
    fn commit(&mut self, now: DateTime<Utc>, event: &LedgerEvent) {
        self.refresh_stats(now);
        for observer in &self.observers {
            observer.on_event(event);
        }
    }

    /// Recompute aggregate stats from full scans.
    ///
    /// O(n) per mutation by design; observable values must match what
    /// incremental maintenance would produce.
    fn refresh_stats(&mut self, now: DateTime<Utc>) {
        self.doc.stats = Stats {
            total_books: self.doc.books.len(),
            total_members: self.doc.members.len(),
            total_loans: self.doc.loans.len(),
            books_on_loan: self.doc.books.iter().filter(|b| !b.available()).count(),
            overdue_loans: self.doc.loans.iter().filter(|l| l.is_overdue(now)).count(),
        };
    }

    /// Resolve a book index by exact id or title substring.
    fn resolve_book_idx(&self, query: &str) -> Result<usize> {
        resolve_idx(&self.doc.books, query, EntityKind::Book, |b| &b.id, |b| &b.title)
    }

    /// Resolve a member index by exact id or name substring.
    fn resolve_member_idx(&self, query: &str) -> Result<usize> {
        resolve_idx(&self.doc.members, query, EntityKind::Member, |m| &m.id, |m| &m.name)
    }

    /// Book at a resolved index.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of range, which would indicate a bug in
    /// the resolver.
    #[allow(clippy::expect_used)]
    fn book_at(&self, idx: usize) -> &Book {
        self.doc.books.get(idx).expect("resolved book index in range")
    }

    /// Mutable book at a resolved index.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of range, which would indicate a bug in
    /// the resolver.
    #[allow(clippy::expect_used)]
    fn book_at_mut(&mut self, idx: usize) -> &mut Book {
        self.doc.books.get_mut(idx).expect("resolved book index in range")
    }

    /// Member at a resolved index.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of range, which would indicate a bug in
    /// the resolver.
    #[allow(clippy::expect_used)]
    fn member_at(&self, idx: usize) -> &Member {
        self.doc.members.get(idx).expect("resolved member index in range")
    }

    /// Mutable member at a resolved index.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of range, which would indicate a bug in
    /// the resolver.
    #[allow(clippy::expect_used)]
    fn member_at_mut(&mut self, idx: usize) -> &mut Member {
        self.doc.members.get_mut(idx).expect("resolved member index in range")
    }

    /// Loan at a resolved index.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of range, which would indicate a bug in
    /// the resolver.
    #[allow(clippy::expect_used)]
    fn loan_at(&self, idx: usize) -> &Loan {
        self.doc.loans.get(idx).expect("resolved loan index in range")
    }

    /// Mutable loan at a resolved index.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of range, which would indicate a bug in
    /// the resolver.
    #[allow(clippy::expect_used)]
    fn loan_at_mut(&mut self, idx: usize) -> &mut Loan {
        self.doc.loans.get_mut(idx).expect("resolved loan index in range")
    }
}

/// Shared lookup policy for books and members.
///
/// An exact id match (case-insensitive) wins immediately; otherwise a
/// case-insensitive substring match over the name field applies. Zero hits
/// resolve to `NotFound`, more than one to `Ambiguous`.
fn resolve_idx<T>(
    items: &[T],
    query: &str,
    kind: EntityKind,
    id_of: impl Fn(&T) -> &str,
    text_of: impl Fn(&T) -> &str,
) -> Result<usize> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::NotFound { kind, query: query.to_string() });
    }
    if let Some(idx) = items.iter().position(|t| id_of(t).eq_ignore_ascii_case(trimmed)) {
        return Ok(idx);
    }
    let q = trimmed.to_lowercase();
    let hits: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, t)| text_of(t).to_lowercase().contains(&q))
        .map(|(idx, _)| idx)
        .collect();
    match hits.as_slice() {
        [] => Err(LedgerError::NotFound { kind, query: trimmed.to_string() }),
        [idx] => Ok(*idx),
        _ => Err(LedgerError::Ambiguous { kind, query: trimmed.to_string(), count: hits.len() }),
    }
}

/// Ceiling of the time past due in whole days; 0 when not late.
fn days_overdue(due_at: DateTime<Utc>, returned_at: DateTime<Utc>) -> i64 {
    let secs = returned_at.signed_duration_since(due_at).num_seconds();
    if secs <= 0 { 0 } else { ((secs - 1) / SECS_PER_DAY) + 1 }
}

// Include tests module
#[cfg(test)]
mod tests;
