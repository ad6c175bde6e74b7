use std::io::{self, BufRead, Write};

use chrono::Utc;
use colored::Colorize;

use crate::{
    config::Settings,
    csv,
    error::LedgerError,
    ledger::{Availability, BookDraft, BookPatch, Ledger, MemberDraft, MemberPatch, SearchFilters},
    model::{MemberStatus, valid_isbn},
    report::Report,
    store::DocumentStore,
};

/// The interactive menu loop: one command is fully processed, prompts
/// included, before the next begins.
///
/// Every ledger and store error is reported here and control returns to
/// the loop; only an I/O failure on the terminal itself ends the session,
/// after a best-effort save.
#[derive(Debug)]
pub struct Menu {
    /// The ledger driven by this session
    ledger: Ledger,
    /// Persistence collaborator
    store: DocumentStore,
}

impl Menu {
    /// Build a menu over a loaded ledger and its store.
    #[must_use]
    pub fn new(ledger: Ledger, store: DocumentStore) -> Self {
        Self { ledger, store }
    }

    /// Run the loop until the user exits (or stdin ends).
    ///
    /// # Errors
    ///
    /// Propagates terminal I/O failures, after attempting a final save.
    pub fn run(&mut self) -> io::Result<()> {
        loop {
            print_commands();
            let choice = match prompt("> ") {
                Ok(choice) => choice,
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                    // End of piped input behaves like a clean exit.
                    self.exit_save();
                    return Ok(());
                }
                Err(err) => {
                    self.save_now();
                    return Err(err);
                }
            };
            let Ok(number) = choice.parse::<u32>() else {
                report_error(&format!("`{choice}` is not a menu number"));
                continue;
            };
            if number == 0 {
                self.exit_save();
                return Ok(());
            }
            if let Err(err) = self.dispatch(number) {
                self.save_now();
                return Err(err);
            }
        }
    }

    /// Route one menu number to its handler.
    fn dispatch(&mut self, number: u32) -> io::Result<()> {
        match number {
            1 => self.add_book()?,
            2 => self.edit_book()?,
            3 => self.delete_book()?,
            4 => Report::print_books(&self.ledger.books().iter().collect::<Vec<_>>()),
            5 => self.search_books()?,
            6 => self.advanced_search()?,
            7 => self.add_member()?,
            8 => self.edit_member()?,
            9 => Report::print_members(self.ledger.members()),
            10 => self.member_detail()?,
            11 => self.borrow_book()?,
            12 => self.return_book()?,
            13 => Report::print_loans(&self.ledger, &self.ledger.active_loans(), Utc::now()),
            14 => self.overdue_loans(),
            15 => self.member_history()?,
            16 => self.pay_fine()?,
            17 => Report::print_payments(&self.ledger, self.ledger.payments()),
            18 => self.reserve_book()?,
            19 => Report::print_reservations(&self.ledger, self.ledger.reservations()),
            20 => self.list_categories(),
            21 => self.add_category()?,
            22 => self.remove_category()?,
            23 => Report::print_stats(self.ledger.stats()),
            24 => self.import_csv()?,
            25 => self.export_csv()?,
            26 => self.restore_backup()?,
            27 => self.edit_settings()?,
            _ => report_error(&format!("no command {number}")),
        }
        Ok(())
    }

    // === Book catalog ===

    /// Interactive flow for cataloguing a book.
    fn add_book(&mut self) -> io::Result<()> {
        let title = prompt("Title: ")?;
        let author = prompt("Author: ")?;
        let isbn = prompt_opt("ISBN (optional): ")?;
        if let Some(isbn) = &isbn {
            if !valid_isbn(isbn) {
                println!(
                    "{} `{isbn}` does not look like a valid ISBN; keeping it anyway",
                    "WARNING:".yellow().bold()
                );
            }
        }
        self.list_categories();
        let category = prompt("Category: ")?;
        let publisher = prompt("Publisher: ")?;
        let year = prompt_parse::<i32>("Year: ")?.unwrap_or_else(current_year);
        let pages = prompt_parse::<u32>("Pages: ")?.unwrap_or(0);
        let copies = prompt_parse::<u32>("Copies [1]: ")?;
        let location = prompt("Location: ")?;
        let description = prompt("Description: ")?;

        let draft = BookDraft {
            title,
            author,
            isbn,
            category,
            publisher,
            year,
            pages,
            copies,
            location,
            description,
        };
        match self.ledger.add_book(draft) {
            Ok(book) => {
                Report::print_book_detail(&book);
                self.persist_if_auto();
            }
            Err(err) => report_error(&err),
        }
        Ok(())
    }

    /// Interactive flow for editing a book; empty answers keep the
    /// current value.
    fn edit_book(&mut self) -> io::Result<()> {
        let query = prompt("Book (id or title): ")?;
        let patch = BookPatch {
            title: prompt_opt("New title (empty to keep): ")?,
            author: prompt_opt("New author (empty to keep): ")?,
            isbn: prompt_opt("New ISBN (empty to keep): ")?,
            category: prompt_opt("New category (empty to keep): ")?,
            publisher: prompt_opt("New publisher (empty to keep): ")?,
            year: prompt_parse("New year (empty to keep): ")?,
            pages: prompt_parse("New pages (empty to keep): ")?,
            copies: prompt_parse("New copies (empty to keep): ")?,
            location: prompt_opt("New location (empty to keep): ")?,
            description: prompt_opt("New description (empty to keep): ")?,
        };
        match self.ledger.edit_book(&query, patch) {
            Ok(book) => {
                Report::print_book_detail(&book);
                self.persist_if_auto();
            }
            Err(err) => report_error(&err),
        }
        Ok(())
    }

    /// Interactive flow for deleting a book, with confirmation.
    fn delete_book(&mut self) -> io::Result<()> {
        let query = prompt("Book (id or title): ")?;
        let title = match self.ledger.book(&query) {
            Ok(book) => book.title.clone(),
            Err(err) => {
                report_error(&err);
                return Ok(());
            }
        };
        if !prompt_confirm(&format!("Really delete `{title}`? [y/N] "))? {
            println!("(kept)");
            return Ok(());
        }
        match self.ledger.delete_book(&query) {
            Ok(book) => {
                println!("Deleted {} `{}`", book.id, book.title);
                self.persist_if_auto();
            }
            Err(err) => report_error(&err),
        }
        Ok(())
    }

    /// Simple substring search.
    fn search_books(&self) -> io::Result<()> {
        let query = prompt("Search: ")?;
        Report::print_books(&self.ledger.search_books(&query));
        Ok(())
    }

    /// Conjunctive filter search.
    fn advanced_search(&self) -> io::Result<()> {
        let filters = SearchFilters {
            title: prompt_opt("Title contains (empty for any): ")?,
            author: prompt_opt("Author contains (empty for any): ")?,
            category: prompt_opt("Category contains (empty for any): ")?,
            year_from: prompt_parse("Year from (empty for any): ")?,
            year_to: prompt_parse("Year to (empty for any): ")?,
            availability: match prompt("Availability [a]ll / a[v]ailable / [b]orrowed: ")?
                .to_lowercase()
                .as_str()
            {
                "v" | "available" => Availability::Available,
                "b" | "borrowed" => Availability::Borrowed,
                _ => Availability::All,
            },
        };
        Report::print_books(&self.ledger.advanced_search(&filters));
        Ok(())
    }

    // === Membership ===

    /// Interactive flow for registering a member.
    fn add_member(&mut self) -> io::Result<()> {
        let draft = MemberDraft {
            name: prompt("Name: ")?,
            email: prompt("Email: ")?,
            phone: prompt("Phone: ")?,
        };
        match self.ledger.add_member(draft) {
            Ok(member) => {
                Report::print_member_detail(&member);
                self.persist_if_auto();
            }
            Err(err) => report_error(&err),
        }
        Ok(())
    }

    /// Interactive flow for editing a member.
    fn edit_member(&mut self) -> io::Result<()> {
        let query = prompt("Member (id or name): ")?;
        let status = match prompt("Status [a]ctive / [s]uspended (empty to keep): ")?
            .to_lowercase()
            .as_str()
        {
            "a" | "active" => Some(MemberStatus::Active),
            "s" | "suspended" => Some(MemberStatus::Suspended),
            _ => None,
        };
        let patch = MemberPatch {
            name: prompt_opt("New name (empty to keep): ")?,
            email: prompt_opt("New email (empty to keep): ")?,
            phone: prompt_opt("New phone (empty to keep): ")?,
            status,
        };
        match self.ledger.edit_member(&query, patch) {
            Ok(member) => {
                Report::print_member_detail(&member);
                self.persist_if_auto();
            }
            Err(err) => report_error(&err),
        }
        Ok(())
    }

    /// Show one member's full record.
    fn member_detail(&self) -> io::Result<()> {
        let query = prompt("Member (id or name): ")?;
        match self.ledger.member(&query) {
            Ok(member) => Report::print_member_detail(member),
            Err(err) => report_error(&err),
        }
        Ok(())
    }

    // === Circulation ===

    /// Borrow flow, including the soft outstanding-fines gate.
    fn borrow_book(&mut self) -> io::Result<()> {
        let member = prompt("Member (id or name): ")?;
        let book = prompt("Book (id or title): ")?;
        match self.ledger.borrow_book(&member, &book, false) {
            Ok(loan) => {
                println!("Loan {} opened, due {}", loan.id, loan.due_at.format("%Y-%m-%d"));
                self.persist_if_auto();
            }
            Err(LedgerError::FinesOutstanding { name, amount }) => {
                println!("{} {name} owes {amount} in fines", "WARNING:".yellow().bold());
                if prompt_confirm("Lend anyway? [y/N] ")? {
                    match self.ledger.borrow_book(&member, &book, true) {
                        Ok(loan) => {
                            println!(
                                "Loan {} opened, due {}",
                                loan.id,
                                loan.due_at.format("%Y-%m-%d")
                            );
                            self.persist_if_auto();
                        }
                        Err(err) => report_error(&err),
                    }
                } else {
                    println!("(not lent)");
                }
            }
            Err(err) => report_error(&err),
        }
        Ok(())
    }

    /// Return flow with disambiguation when several loans match.
    fn return_book(&mut self) -> io::Result<()> {
        let query = prompt("Loan id or member name: ")?;
        let candidates: Vec<(String, String)> = self
            .ledger
            .active_loans_matching(&query)
            .into_iter()
            .map(|loan| {
                let member =
                    self.ledger.member_name(&loan.member_id).unwrap_or("<missing member>");
                let title = self.ledger.book_title(&loan.book_id).unwrap_or("<missing book>");
                (loan.id.clone(), format!("`{title}` / {member}"))
            })
            .collect();

        let loan_id = match candidates.as_slice() {
            [] => {
                report_error(&format!("no active loan matches `{query}`"));
                return Ok(());
            }
            [(id, _)] => id.clone(),
            several => {
                for (number, (id, label)) in several.iter().enumerate() {
                    println!("{}. {id}  {label}", number.saturating_add(1));
                }
                let Some(pick) = prompt_parse::<usize>("Which one: ")? else {
                    println!("(cancelled)");
                    return Ok(());
                };
                match pick.checked_sub(1).and_then(|i| several.get(i)) {
                    Some((id, _)) => id.clone(),
                    None => {
                        report_error(&"that was not one of the choices");
                        return Ok(());
                    }
                }
            }
        };

        match self.ledger.return_book(&loan_id) {
            Ok(loan) => {
                if loan.fine > 0 {
                    println!("Loan {} closed with a fine of {}", loan.id, loan.fine);
                } else {
                    println!("Loan {} closed, no fine", loan.id);
                }
                self.persist_if_auto();
            }
            Err(err) => report_error(&err),
        }
        Ok(())
    }

    /// Show loans past their due date right now.
    fn overdue_loans(&self) {
        let now = Utc::now();
        Report::print_loans(&self.ledger, &self.ledger.overdue_loans(now), now);
    }

    /// Show one member's closed-loan history.
    fn member_history(&self) -> io::Result<()> {
        let query = prompt("Member (id or name): ")?;
        match self.ledger.member_history(&query) {
            Ok(history) => Report::print_loans(&self.ledger, &history, Utc::now()),
            Err(err) => report_error(&err),
        }
        Ok(())
    }

    /// Fine payment flow.
    fn pay_fine(&mut self) -> io::Result<()> {
        let query = prompt("Member (id or name): ")?;
        match self.ledger.member(&query) {
            Ok(member) => println!("{} owes {}", member.name, member.fines),
            Err(err) => {
                report_error(&err);
                return Ok(());
            }
        }
        let Some(amount) = prompt_parse::<i64>("Amount: ")? else {
            println!("(cancelled)");
            return Ok(());
        };
        match self.ledger.pay_fine(&query, amount) {
            Ok(payment) => {
                println!("Payment {} of {} recorded", payment.id, payment.amount);
                self.persist_if_auto();
            }
            Err(err) => report_error(&err),
        }
        Ok(())
    }

    /// Reservation flow.
    fn reserve_book(&mut self) -> io::Result<()> {
        let member = prompt("Member (id or name): ")?;
        let book = prompt("Book (id or title): ")?;
        match self.ledger.reserve_book(&member, &book) {
            Ok(reservation) => {
                println!("Reservation {} placed", reservation.id);
                self.persist_if_auto();
            }
            Err(err) => report_error(&err),
        }
        Ok(())
    }

    // === Categories ===

    /// Print the category list.
    fn list_categories(&self) {
        println!("Categories: {}", self.ledger.categories().join(", "));
    }

    /// Add a category by name.
    fn add_category(&mut self) -> io::Result<()> {
        let name = prompt("Category name: ")?;
        match self.ledger.add_category(&name) {
            Ok(()) => {
                self.list_categories();
                self.persist_if_auto();
            }
            Err(err) => report_error(&err),
        }
        Ok(())
    }

    /// Remove a category by name.
    fn remove_category(&mut self) -> io::Result<()> {
        let name = prompt("Category name: ")?;
        match self.ledger.remove_category(&name) {
            Ok(()) => {
                self.list_categories();
                self.persist_if_auto();
            }
            Err(err) => report_error(&err),
        }
        Ok(())
    }

    // === Bulk and persistence ===

    /// CSV import flow.
    fn import_csv(&mut self) -> io::Result<()> {
        let path = prompt("CSV file to import: ")?;
        if path.is_empty() {
            println!("(cancelled)");
            return Ok(());
        }
        match csv::import_books(&mut self.ledger, path.as_ref()) {
            Ok(outcome) => {
                println!("Imported {} book(s), skipped {} row(s)", outcome.imported, outcome.skipped);
                if outcome.imported > 0 {
                    self.persist_if_auto();
                }
            }
            Err(err) => report_error(&err),
        }
        Ok(())
    }

    /// CSV export flow.
    fn export_csv(&self) -> io::Result<()> {
        let path = prompt("CSV file to write: ")?;
        if path.is_empty() {
            println!("(cancelled)");
            return Ok(());
        }
        match csv::export_books(&self.ledger, path.as_ref()) {
            Ok(count) => println!("Exported {count} book(s)"),
            Err(err) => report_error(&err),
        }
        Ok(())
    }

    /// List backups and optionally restore one, replacing the live
    /// document wholesale.
    fn restore_backup(&mut self) -> io::Result<()> {
        let backups = match self.store.list_backups() {
            Ok(backups) => backups,
            Err(err) => {
                report_error(&err);
                return Ok(());
            }
        };
        if backups.is_empty() {
            println!("(no backups yet)");
            return Ok(());
        }
        for (number, path) in backups.iter().enumerate() {
            println!("{}. {}", number.saturating_add(1), path.display());
        }
        let Some(pick) = prompt_parse::<usize>("Restore which (empty to cancel): ")? else {
            println!("(cancelled)");
            return Ok(());
        };
        let Some(path) = pick.checked_sub(1).and_then(|i| backups.get(i)) else {
            report_error(&"that was not one of the choices");
            return Ok(());
        };
        if !prompt_confirm("This replaces the current document wholesale. Continue? [y/N] ")? {
            println!("(cancelled)");
            return Ok(());
        }
        match self.store.load_backup(path) {
            Ok(doc) => {
                self.ledger.replace_document(doc);
                println!("Restored {}", path.display());
                self.persist_if_auto();
            }
            Err(err) => report_error(&err),
        }
        Ok(())
    }

    /// Settings flow; empty answers keep the current value. Changes take
    /// effect for subsequent operations immediately.
    fn edit_settings(&mut self) -> io::Result<()> {
        let current = self.ledger.settings().clone();
        println!("Current settings:");
        println!("  loan period (days):    {}", current.max_borrow_days);
        println!("  books per member:      {}", current.max_books_per_user);
        println!("  fine per day:          {}", current.fine_per_day);
        println!("  auto-save:             {}", current.auto_save);
        println!("  backups kept:          {}", current.max_backup_files);

        let settings = Settings {
            max_borrow_days: prompt_parse("Loan period (empty to keep): ")?
                .unwrap_or(current.max_borrow_days),
            max_books_per_user: prompt_parse("Books per member (empty to keep): ")?
                .unwrap_or(current.max_books_per_user),
            fine_per_day: prompt_parse("Fine per day (empty to keep): ")?
                .unwrap_or(current.fine_per_day),
            auto_save: match prompt("Auto-save on/off (empty to keep): ")?
                .to_lowercase()
                .as_str()
            {
                "on" | "yes" | "y" => true,
                "off" | "no" | "n" => false,
                _ => current.auto_save,
            },
            max_backup_files: prompt_parse("Backups kept (empty to keep): ")?
                .unwrap_or(current.max_backup_files),
        };
        self.ledger.set_settings(settings);
        self.persist_if_auto();
        Ok(())
    }

    // === Persistence helpers ===

    /// Save after a mutation when auto-save is on.
    fn persist_if_auto(&self) {
        if self.ledger.settings().auto_save {
            self.save_now();
        }
    }

    /// Final save on the way out, honoring the auto-save setting.
    fn exit_save(&self) {
        if self.ledger.settings().auto_save {
            self.save_now();
        }
        println!("Bye.");
    }

    /// Write the document, reporting failure without ending the session.
    fn save_now(&self) {
        let max_backups = self.ledger.settings().max_backup_files;
        if let Err(err) = self.store.save(self.ledger.document(), max_backups) {
            println!("{} could not save: {err}", "WARNING:".yellow().bold());
        }
    }
}

/// Print the command list.
fn print_commands() {
    println!();
    println!("{}", "=== Library circulation ===".bold());
    println!(" 1 add book        2 edit book       3 delete book");
    println!(" 4 list books      5 search          6 advanced search");
    println!(" 7 add member      8 edit member     9 list members");
    println!("10 member detail  11 borrow         12 return");
    println!("13 active loans   14 overdue loans  15 member history");
    println!("16 pay fine       17 payments       18 reserve");
    println!("19 reservations   20 categories     21 add category");
    println!("22 del category   23 statistics     24 import CSV");
    println!("25 export CSV     26 backups        27 settings");
    println!(" 0 exit");
}

/// Report a recovered error at the command boundary.
fn report_error(err: &impl std::fmt::Display) {
    println!("{} {err}", "ERROR:".red().bold());
}

/// Read one trimmed line, erroring with `UnexpectedEof` when stdin ends.
fn prompt(label: &str) -> io::Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    let read = io::stdin().lock().read_line(&mut line)?;
    if read == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed"));
    }
    Ok(line.trim().to_string())
}

/// Read one line, mapping empty input to `None`.
fn prompt_opt(label: &str) -> io::Result<Option<String>> {
    let raw = prompt(label)?;
    Ok(if raw.is_empty() { None } else { Some(raw) })
}

/// Read a yes/no answer; anything but y/yes is a no.
fn prompt_confirm(label: &str) -> io::Result<bool> {
    let raw = prompt(label)?.to_lowercase();
    Ok(raw == "y" || raw == "yes")
}

/// Read a value, mapping empty or unparsable input to `None`.
fn prompt_parse<T: std::str::FromStr>(label: &str) -> io::Result<Option<T>> {
    let raw = prompt(label)?;
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse() {
        Ok(value) => Ok(Some(value)),
        Err(_) => {
            println!("  (not a number, ignored)");
            Ok(None)
        }
    }
}

/// Current calendar year, for defaulting the publication year.
fn current_year() -> i32 {
    use chrono::Datelike;
    Utc::now().year()
}
