use serde::{Deserialize, Serialize};

/// Runtime-mutable circulation policy.
///
/// Lives inside the persisted document and is editable from the settings
/// menu; a change applies to subsequent operations only and never rewrites
/// already-recorded due dates or fines.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Loan period in days
    pub max_borrow_days: u32,
    /// Most books a member may have out at once
    pub max_books_per_user: usize,
    /// Fine per overdue day in integer currency units
    pub fine_per_day: i64,
    /// Persist the document after every mutating command
    pub auto_save: bool,
    /// Most timestamped backup snapshots kept on disk
    pub max_backup_files: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_borrow_days: 14,
            max_books_per_user: 5,
            fine_per_day: 2000,
            auto_save: true,
            max_backup_files: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Settings;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn missing_fields_fall_back_to_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"fine_per_day": 500}"#).unwrap();
        assert_eq!(settings.fine_per_day, 500);
        assert_eq!(settings.max_borrow_days, 14);
        assert_eq!(settings.max_books_per_user, 5);
        assert!(settings.auto_save);
        assert_eq!(settings.max_backup_files, 10);
    }
}
