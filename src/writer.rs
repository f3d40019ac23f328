use rusqlite::{params, Transaction};
use tracing::warn;

use crate::db::Database;
use crate::error::RowError;
use crate::models::NormalizedPosting;

/// Persists a posting and its junction rows as one transaction. On any
/// failure nothing of the posting remains.
pub fn write(db: &Database, posting: &NormalizedPosting) -> Result<i64, RowError> {
    let tx = db.transaction().map_err(RowError::write)?;

    match insert_posting(&tx, posting) {
        Ok(posting_id) => {
            tx.commit().map_err(RowError::write)?;
            Ok(posting_id)
        }
        Err(source) => {
            if let Err(err) = tx.rollback() {
                warn!(error = %err, "rollback failed");
            }
            Err(RowError::write(source))
        }
    }
}

fn insert_posting(tx: &Transaction<'_>, posting: &NormalizedPosting) -> rusqlite::Result<i64> {
    tx.execute(
        "INSERT INTO job_postings (
            company_id, title, job_link, experience_level, education_level,
            employment_type, salary_info, location_id, deadline_date
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            posting.company_id,
            posting.title,
            posting.job_link,
            posting.experience_level,
            posting.education_level,
            posting.employment_type,
            posting.salary_info,
            posting.location_id,
            posting.deadline_date.map(|d| d.format("%Y-%m-%d").to_string()),
        ],
    )?;
    let posting_id = tx.last_insert_rowid();

    // OR IGNORE only swallows duplicate pairs; foreign key failures still abort.
    let mut stmt = tx.prepare_cached(
        "INSERT OR IGNORE INTO posting_tech_stacks (posting_id, stack_id) VALUES (?1, ?2)",
    )?;
    for stack_id in &posting.tech_stack_ids {
        stmt.execute(params![posting_id, stack_id])?;
    }

    let mut stmt = tx.prepare_cached(
        "INSERT OR IGNORE INTO posting_categories (posting_id, category_id) VALUES (?1, ?2)",
    )?;
    for category_id in &posting.category_ids {
        stmt.execute(params![posting_id, category_id])?;
    }

    Ok(posting_id)
}
