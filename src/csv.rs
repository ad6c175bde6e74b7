use std::{
    fs, io,
    path::{Path, PathBuf},
};

use chrono::{Datelike, Utc};
use thiserror::Error;

use crate::ledger::{BookDraft, Ledger};

/// What can go wrong during bulk import/export
#[derive(Debug, Error)]
pub enum CsvError {
    /// The import file could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        /// File involved
        path: PathBuf,
        /// Underlying io error
        source: io::Error,
    },

    /// The export file could not be written
    #[error("failed to write {path}: {source}")]
    Write {
        /// File involved
        path: PathBuf,
        /// Underlying io error
        source: io::Error,
    },

    /// The import file has no header row
    #[error("{path} has no header row")]
    MissingHeader {
        /// File involved
        path: PathBuf,
    },
}

/// Counts reported after an import run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    /// Rows catalogued as new books
    pub imported: usize,
    /// Rows skipped (column-count mismatch or rejected draft)
    pub skipped: usize,
}

/// A recognized import column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    /// Book title
    Title,
    /// Author name
    Author,
    /// ISBN
    Isbn,
    /// Category name
    Category,
    /// Publisher name
    Publisher,
    /// Publication year
    Year,
    /// Page count
    Pages,
    /// Total copies
    Copies,
    /// Free-text description
    Description,
    /// Shelf location
    Location,
}

impl Field {
    /// Map a header cell to a recognized column; unknown names are
    /// ignored rather than rejected.
    fn from_header(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "title" => Some(Self::Title),
            "author" => Some(Self::Author),
            "isbn" => Some(Self::Isbn),
            "category" => Some(Self::Category),
            "publisher" => Some(Self::Publisher),
            "year" => Some(Self::Year),
            "pages" => Some(Self::Pages),
            "copies" => Some(Self::Copies),
            "description" => Some(Self::Description),
            "location" => Some(Self::Location),
            _ => None,
        }
    }
}

/// Import books from a CSV file, one fresh record per well-formed row.
///
/// The header row defines column order; field names are case-insensitive
/// and may appear in any order. Rows whose column count does not match the
/// header are skipped and counted. Copies default to 1 and the year to the
/// current year when absent or non-numeric.
///
/// # Errors
///
/// `Read` when the file cannot be read, `MissingHeader` when it has no
/// header row.
pub fn import_books(ledger: &mut Ledger, path: &Path) -> Result<ImportOutcome, CsvError> {
    let contents = fs::read_to_string(path)
        .map_err(|err| CsvError::Read { path: path.to_path_buf(), source: err })?;
    let mut lines = contents.lines().filter(|l| !l.trim().is_empty());
    let Some(header_line) = lines.next() else {
        return Err(CsvError::MissingHeader { path: path.to_path_buf() });
    };
    let header: Vec<Option<Field>> =
        parse_row(header_line).iter().map(|cell| Field::from_header(cell)).collect();

    let current_year = Utc::now().year();
    let mut outcome = ImportOutcome::default();
    for line in lines {
        let cells = parse_row(line);
        if cells.len() != header.len() {
            tracing::warn!(row = line, "skipping row: column count mismatch");
            outcome.skipped = outcome.skipped.saturating_add(1);
            continue;
        }
        let draft = draft_from_row(&header, &cells, current_year);
        match ledger.add_book(draft) {
            Ok(_) => outcome.imported = outcome.imported.saturating_add(1),
            Err(err) => {
                tracing::warn!(row = line, %err, "skipping row");
                outcome.skipped = outcome.skipped.saturating_add(1);
            }
        }
    }
    Ok(outcome)
}

/// Export the whole catalog, returning the number of rows written.
///
/// Title, author, publisher, location and description are quoted; the
/// remaining fields are written bare.
///
/// # Errors
///
/// `Write` when the file cannot be written.
pub fn export_books(ledger: &Ledger, path: &Path) -> Result<usize, CsvError> {
    let mut out = String::from(
        "title,author,isbn,category,publisher,year,pages,copies,description,location\n",
    );
    for book in ledger.books() {
        let row = format!(
            "{},{},{},{},{},{},{},{},{},{}\n",
            quote(&book.title),
            quote(&book.author),
            book.isbn.as_deref().unwrap_or(""),
            book.category,
            quote(&book.publisher),
            book.year,
            book.pages,
            book.copies,
            quote(&book.description),
            quote(&book.location),
        );
        out.push_str(&row);
    }
    fs::write(path, out)
        .map_err(|err| CsvError::Write { path: path.to_path_buf(), source: err })?;
    Ok(ledger.books().len())
}

/// Build a draft from one row using the header's column mapping.
fn draft_from_row(header: &[Option<Field>], cells: &[String], current_year: i32) -> BookDraft {
    let mut draft = BookDraft { year: current_year, ..BookDraft::default() };
    for (field, cell) in header.iter().zip(cells) {
        let value = cell.trim();
        match field {
            Some(Field::Title) => draft.title = value.to_string(),
            Some(Field::Author) => draft.author = value.to_string(),
            Some(Field::Isbn) => {
                draft.isbn = if value.is_empty() { None } else { Some(value.to_string()) };
            }
            Some(Field::Category) => draft.category = value.to_string(),
            Some(Field::Publisher) => draft.publisher = value.to_string(),
            Some(Field::Year) => {
                draft.year = value.parse().unwrap_or(current_year);
            }
            Some(Field::Pages) => draft.pages = value.parse().unwrap_or(0),
            Some(Field::Copies) => draft.copies = value.parse().ok(),
            Some(Field::Description) => draft.description = value.to_string(),
            Some(Field::Location) => draft.location = value.to_string(),
            None => {}
        }
    }
    draft
}

/// Split one CSV line into cells, honoring quotes and `""` escapes.
fn parse_row(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else {
            match c {
                '"' => in_quotes = true,
                ',' => {
                    cells.push(current.clone());
                    current.clear();
                }
                _ => current.push(c),
            }
        }
    }
    cells.push(current);
    cells
}

/// Quote a cell, doubling any embedded quotes.
fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use chrono::Datelike;

    use super::{ImportOutcome, export_books, import_books, parse_row};
    use crate::{ledger::Ledger, model::Document};

    #[test]
    fn rows_split_on_commas_respecting_quotes() {
        assert_eq!(parse_row("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(parse_row(r#""a, b",c"#), vec!["a, b", "c"]);
        assert_eq!(parse_row(r#""say ""hi""",x"#), vec![r#"say "hi""#, "x"]);
        assert_eq!(parse_row("one"), vec!["one"]);
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn import_maps_headers_case_insensitively_and_skips_bad_rows() {
        let dir = tempfile::tempdir().expect("scratch dir");
        let path = dir.path().join("books.csv");
        std::fs::write(
            &path,
            "Author,TITLE,copies,Year\n\
             Frank Herbert,Dune,2,1965\n\
             too,few,columns\n\
             Ursula K. Le Guin,The Dispossessed,not-a-number,also-not\n",
        )
        .expect("write csv");

        let mut ledger = Ledger::new(Document::default());
        let outcome = import_books(&mut ledger, &path).expect("import");
        assert_eq!(outcome, ImportOutcome { imported: 2, skipped: 1 });

        let dune = ledger.book("Dune").expect("imported");
        assert_eq!(dune.author, "Frank Herbert");
        assert_eq!(dune.copies, 2);
        assert_eq!(dune.year, 1965);

        // Non-numeric copies and year fall back to defaults.
        let dispossessed = ledger.book("Dispossessed").expect("imported");
        assert_eq!(dispossessed.copies, 1);
        assert_eq!(dispossessed.available_copies, 1);
        assert_eq!(dispossessed.year, chrono::Utc::now().year());
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn import_without_header_is_an_error() {
        let dir = tempfile::tempdir().expect("scratch dir");
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "").expect("write csv");

        let mut ledger = Ledger::new(Document::default());
        assert!(import_books(&mut ledger, &path).is_err());
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn export_quotes_the_free_text_fields() {
        let mut ledger = Ledger::new(Document::default());
        ledger
            .add_book(crate::ledger::BookDraft {
                title: "Dune, Messiah".to_string(),
                author: "Frank Herbert".to_string(),
                year: 1969,
                ..crate::ledger::BookDraft::default()
            })
            .expect("added");

        let dir = tempfile::tempdir().expect("scratch dir");
        let path = dir.path().join("out.csv");
        let written = export_books(&ledger, &path).expect("export");
        assert_eq!(written, 1);

        let contents = std::fs::read_to_string(&path).expect("read back");
        let mut lines = contents.lines();
        assert_eq!(
            lines.next(),
            Some("title,author,isbn,category,publisher,year,pages,copies,description,location")
        );
        let row = lines.next().expect("one row");
        assert!(row.starts_with(r#""Dune, Messiah","Frank Herbert","#));
    }
}
