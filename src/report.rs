use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::{
    ledger::Ledger,
    model::{Book, Loan, Member, MemberStatus, Payment, Reservation, Stats},
};

/// Display formatting for the terminal surface.
///
/// Pure rendering over borrowed ledger state; nothing in here mutates.
#[derive(Debug)]
pub struct Report;

impl Report {
    /// Print a one-line-per-book listing.
    pub fn print_books(books: &[&Book]) {
        if books.is_empty() {
            println!("(no books)");
            return;
        }
        for book in books {
            let shelf = if book.available() {
                format!("{}/{} available", book.available_copies, book.copies).green()
            } else {
                "all copies out".red()
            };
            println!(
                "{}  {} by {} [{}] ({})",
                book.id.bold(),
                book.title,
                book.author,
                book.category,
                shelf
            );
        }
    }

    /// Print the full record of one book.
    pub fn print_book_detail(book: &Book) {
        println!("{}  {}", book.id.bold(), book.title.bold());
        println!("  author:      {}", book.author);
        println!("  isbn:        {}", book.isbn.as_deref().unwrap_or("-"));
        println!("  category:    {}", book.category);
        println!("  publisher:   {}", book.publisher);
        println!("  year/pages:  {} / {}", book.year, book.pages);
        println!("  copies:      {} total, {} available", book.copies, book.available_copies);
        println!("  location:    {}", book.location);
        println!("  description: {}", book.description);
        println!("  added:       {}", format_date(book.added_at));
    }

    /// Print a one-line-per-member listing.
    pub fn print_members(members: &[Member]) {
        if members.is_empty() {
            println!("(no members)");
            return;
        }
        for member in members {
            let standing = match member.status {
                MemberStatus::Active => "active".green(),
                MemberStatus::Suspended => "suspended".red(),
            };
            let fines = if member.fines > 0 {
                format!(", owes {}", member.fines).yellow().to_string()
            } else {
                String::new()
            };
            println!(
                "{}  {} ({standing}, {} out{fines})",
                member.id.bold(),
                member.name,
                member.borrowed_books.len()
            );
        }
    }

    /// Print the full record of one member.
    pub fn print_member_detail(member: &Member) {
        println!("{}  {}", member.id.bold(), member.name.bold());
        println!("  email:  {}", member.email);
        println!("  phone:  {}", member.phone);
        println!("  joined: {}", format_date(member.joined_at));
        println!("  books out: {}", member.borrowed_books.join(", "));
        println!("  outstanding fines: {}", member.fines);
        println!("  past loans: {}", member.history.len());
    }

    /// Print loans with member/book names resolved, flagging overdue ones.
    pub fn print_loans(ledger: &Ledger, loans: &[&Loan], now: DateTime<Utc>) {
        if loans.is_empty() {
            println!("(no loans)");
            return;
        }
        for loan in loans {
            let member = ledger.member_name(&loan.member_id).unwrap_or("<missing member>");
            let title = ledger.book_title(&loan.book_id).unwrap_or("<missing book>");
            let due = if loan.is_overdue(now) {
                format!("due {} (OVERDUE)", format_date(loan.due_at)).red().to_string()
            } else {
                format!("due {}", format_date(loan.due_at))
            };
            match loan.returned_at {
                Some(returned) => println!(
                    "{}  `{title}` / {member}, returned {} (fine {})",
                    loan.id.bold(),
                    format_date(returned),
                    loan.fine
                ),
                None => println!("{}  `{title}` / {member}, {due}", loan.id.bold()),
            }
        }
    }

    /// Print the payment log.
    pub fn print_payments(ledger: &Ledger, payments: &[Payment]) {
        if payments.is_empty() {
            println!("(no payments)");
            return;
        }
        for payment in payments {
            let member = ledger.member_name(&payment.member_id).unwrap_or("<missing member>");
            println!(
                "{}  {member} paid {} on {}",
                payment.id.bold(),
                payment.amount,
                format_date(payment.paid_at)
            );
        }
    }

    /// Print the reservation list.
    pub fn print_reservations(ledger: &Ledger, reservations: &[Reservation]) {
        if reservations.is_empty() {
            println!("(no reservations)");
            return;
        }
        for reservation in reservations {
            let member =
                ledger.member_name(&reservation.member_id).unwrap_or("<missing member>");
            let title = ledger.book_title(&reservation.book_id).unwrap_or("<missing book>");
            println!(
                "{}  `{title}` for {member} since {} ({:?})",
                reservation.id.bold(),
                format_date(reservation.reserved_at),
                reservation.status
            );
        }
    }

    /// Print the aggregate counters.
    pub fn print_stats(stats: &Stats) {
        println!("{}", "=== Library statistics ===".bold());
        println!("  books:           {}", stats.total_books);
        println!("  members:         {}", stats.total_members);
        println!("  loans (all):     {}", stats.total_loans);
        println!("  books on loan:   {}", stats.books_on_loan);
        if stats.overdue_loans > 0 {
            println!("  overdue loans:   {}", stats.overdue_loans.to_string().red());
        } else {
            println!("  overdue loans:   0");
        }
    }
}

/// Render a timestamp as a calendar date.
fn format_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}
