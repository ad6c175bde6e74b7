use colored::Colorize;

use crate::events::LedgerEvent;

/// Trait for ledger mutation observation
pub trait LedgerObserver {
    /// Called once per committed mutation, after stats are refreshed
    fn on_event(&self, event: &LedgerEvent);
}

/// Logs every committed mutation through `tracing`
#[derive(Debug)]
pub struct EventLogger;

impl LedgerObserver for EventLogger {
    fn on_event(&self, event: &LedgerEvent) {
        match event {
            LedgerEvent::BookAdded { book_id, title } => {
                tracing::info!(%book_id, %title, "book catalogued");
            }
            LedgerEvent::BookEdited { book_id } => {
                tracing::info!(%book_id, "book edited");
            }
            LedgerEvent::BookRemoved { book_id, title } => {
                tracing::info!(%book_id, %title, "book removed");
            }
            LedgerEvent::MemberJoined { member_id, name } => {
                tracing::info!(%member_id, %name, "member joined");
            }
            LedgerEvent::MemberEdited { member_id } => {
                tracing::info!(%member_id, "member edited");
            }
            LedgerEvent::LoanOpened { loan_id, member_id, book_id } => {
                tracing::info!(%loan_id, %member_id, %book_id, "loan opened");
            }
            LedgerEvent::LoanClosed { loan_id, days_late, fine } => {
                tracing::info!(%loan_id, days_late, fine, "loan closed");
            }
            LedgerEvent::FinePaid { member_id, amount, remaining } => {
                tracing::info!(%member_id, amount, remaining, "fine paid");
            }
            LedgerEvent::ReservationPlaced { reservation_id, book_id } => {
                tracing::info!(%reservation_id, %book_id, "reservation placed");
            }
            LedgerEvent::CategoriesChanged => {
                tracing::info!("category list changed");
            }
        }
    }
}

/// Prints user-facing notices for the circulation moments people care about
#[derive(Debug)]
pub struct CirculationNotifier;

impl LedgerObserver for CirculationNotifier {
    fn on_event(&self, event: &LedgerEvent) {
        match event {
            LedgerEvent::LoanClosed { days_late, fine, .. } if *fine > 0 => {
                println!(
                    "{} returned {days_late} day(s) late; fine assessed: {fine}",
                    "NOTICE:".yellow().bold()
                );
            }
            LedgerEvent::LoanClosed { .. } => {
                println!("{} book returned on time", "NOTICE:".green());
            }
            LedgerEvent::FinePaid { remaining, .. } if *remaining == 0 => {
                println!("{} all fines cleared", "NOTICE:".green());
            }
            _ => {}
        }
    }
}
