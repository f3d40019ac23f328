use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::RowError;
use crate::models::RawRow;
use crate::normalize::Normalizer;
use crate::resolver::{DimensionTally, Resolver};
use crate::writer;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub line: u64,
    pub title: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub inserted: usize,
    pub skipped: usize,
    pub dimensions_created: DimensionTally,
    pub failures: Vec<RowFailure>,
}

impl BatchSummary {
    pub fn processed(&self) -> usize {
        self.inserted + self.skipped
    }
}

/// Normalizes and writes each row in order. A failing row is logged and
/// counted as skipped; it never stops the batch.
pub fn run<I>(db: &Database, normalizer: &Normalizer, rows: I) -> BatchSummary
where
    I: IntoIterator<Item = Result<RawRow, RowError>>,
{
    let mut resolver = Resolver::new(db);
    let mut summary = BatchSummary::default();

    for item in rows {
        let (line, title, result) = match item {
            Ok(row) => {
                let title = normalizer.title(&row).map(str::to_string);
                let result = normalizer
                    .normalize(&mut resolver, &row)
                    .and_then(|posting| writer::write(db, &posting));
                (row.line, title, result)
            }
            Err(err) => {
                let line = match &err {
                    RowError::Record { line, .. } => *line,
                    _ => 0,
                };
                (line, None, Err(err))
            }
        };

        match result {
            Ok(posting_id) => {
                summary.inserted += 1;
                debug!(line, posting_id, "inserted posting");
            }
            Err(err) => {
                summary.skipped += 1;
                warn!(
                    line,
                    title = title.as_deref().unwrap_or("-"),
                    error = %err,
                    "skipped row"
                );
                summary.failures.push(RowFailure {
                    line,
                    title,
                    reason: err.to_string(),
                });
            }
        }
    }

    summary.dimensions_created = resolver.created();
    info!(
        inserted = summary.inserted,
        skipped = summary.skipped,
        dimensions_created = summary.dimensions_created.total(),
        "processing completed"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldAliases;
    use crate::models::TableCounts;
    use crate::source::RowSource;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        db
    }

    fn row(line: u64, fields: &[(&str, &str)]) -> Result<RawRow, RowError> {
        Ok(RawRow::new(line, fields.iter().copied()))
    }

    fn acme_row() -> Result<RawRow, RowError> {
        row(
            2,
            &[
                ("company", "Acme"),
                ("title", "Backend Engineer"),
                ("tech_stack", "Go, Go, Postgres"),
                ("category", "경력"),
                ("location", "Seoul Gangnam"),
            ],
        )
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(FieldAliases::default())
    }

    #[test]
    fn test_end_to_end_acme_row() {
        let db = test_db();

        let summary = run(&db, &normalizer(), vec![acme_row()]);

        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.skipped, 0);
        assert_eq!(
            db.table_counts().unwrap(),
            TableCounts {
                companies: 1,
                locations: 1,
                tech_stacks: 2,
                categories: 1,
                postings: 1,
                posting_tech_stacks: 2,
                posting_categories: 1,
            }
        );

        let posting = &db.list_postings(&Default::default()).unwrap()[0];
        assert_eq!(posting.company_name, "Acme");
        assert_eq!(posting.city.as_deref(), Some("Seoul"));
        assert_eq!(posting.district.as_deref(), Some("Gangnam"));
        assert_eq!(posting.tech_stacks, vec!["go", "postgres"]);
        assert_eq!(posting.categories, vec!["경력"]);
    }

    #[test]
    fn test_rerun_reuses_dimensions_but_adds_postings() {
        let db = test_db();

        let first = run(&db, &normalizer(), vec![acme_row()]);
        let second = run(&db, &normalizer(), vec![acme_row()]);

        assert_eq!(first.dimensions_created.total(), 5);
        assert_eq!(second.dimensions_created, DimensionTally::default());
        let counts = db.table_counts().unwrap();
        assert_eq!(counts.companies, 1);
        assert_eq!(counts.tech_stacks, 2);
        assert_eq!(counts.categories, 1);
        assert_eq!(counts.locations, 1);
        assert_eq!(counts.postings, 2);
        assert_eq!(counts.posting_tech_stacks, 4);
    }

    #[test]
    fn test_missing_company_is_skipped() {
        let db = test_db();

        let summary = run(
            &db,
            &normalizer(),
            vec![row(2, &[("title", "Orphan"), ("tech_stack", "Go")])],
        );

        assert_eq!(summary.inserted, 0);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failures[0].title.as_deref(), Some("Orphan"));
        assert_eq!(summary.failures[0].reason, "missing required field: company");
        assert_eq!(db.table_counts().unwrap(), TableCounts::default());
    }

    #[test]
    fn test_write_failure_does_not_stop_batch() {
        let db = test_db();
        db.conn()
            .execute_batch(
                "CREATE TRIGGER reject_title BEFORE INSERT ON job_postings
                 WHEN NEW.title = 'explode'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let rows = vec![
            row(2, &[("company", "A"), ("title", "one")]),
            row(3, &[("company", "B"), ("title", "explode"), ("tech_stack", "Rust")]),
            row(4, &[("company", "C"), ("title", "three")]),
            row(5, &[("company", "D"), ("title", "four")]),
        ];
        let summary = run(&db, &normalizer(), rows);

        assert_eq!(summary.inserted, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.processed(), 4);
        assert_eq!(summary.failures[0].line, 3);
        assert!(summary.failures[0].reason.contains("rolled back"));
        let counts = db.table_counts().unwrap();
        assert_eq!(counts.postings, 3);
        assert_eq!(counts.posting_tech_stacks, 0);
    }

    #[test]
    fn test_unreadable_records_are_counted_as_skipped() {
        let db = test_db();
        let data: &[u8] = b"company_name,title\nAcme,Dev\n\xff\xfe,Bad\nBeta,Ops\n";
        let source = RowSource::from_reader(data, b',').unwrap();

        let summary = run(&db, &normalizer(), source);

        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.skipped, 1);
        assert!(summary.failures[0].reason.starts_with("unreadable record"));
    }
}
