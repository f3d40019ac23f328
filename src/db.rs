use anyhow::{anyhow, Context, Result};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Params, Transaction};
use std::path::{Path, PathBuf};

use crate::models::{JobPosting, TableCounts};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS companies (
    company_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS locations (
    location_id INTEGER PRIMARY KEY AUTOINCREMENT,
    city TEXT NOT NULL,
    district TEXT
);

CREATE TABLE IF NOT EXISTS tech_stacks (
    stack_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    category TEXT NOT NULL DEFAULT 'Other'
);

CREATE TABLE IF NOT EXISTS job_categories (
    category_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS job_postings (
    posting_id INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id INTEGER NOT NULL REFERENCES companies(company_id),
    title TEXT,
    job_link TEXT,
    experience_level TEXT,
    education_level TEXT,
    employment_type TEXT,
    salary_info TEXT,
    location_id INTEGER REFERENCES locations(location_id),
    deadline_date TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS posting_tech_stacks (
    posting_id INTEGER NOT NULL REFERENCES job_postings(posting_id),
    stack_id INTEGER NOT NULL REFERENCES tech_stacks(stack_id),
    PRIMARY KEY (posting_id, stack_id)
);

CREATE TABLE IF NOT EXISTS posting_categories (
    posting_id INTEGER NOT NULL REFERENCES job_postings(posting_id),
    category_id INTEGER NOT NULL REFERENCES job_categories(category_id),
    PRIMARY KEY (posting_id, category_id)
);

-- A NULL district would otherwise never collide in a plain UNIQUE constraint.
CREATE UNIQUE INDEX IF NOT EXISTS idx_locations_key ON locations(city, IFNULL(district, ''));
CREATE INDEX IF NOT EXISTS idx_postings_company ON job_postings(company_id);
CREATE INDEX IF NOT EXISTS idx_posting_tech_stacks_stack ON posting_tech_stacks(stack_id);
CREATE INDEX IF NOT EXISTS idx_posting_categories_category ON posting_categories(category_id);
"#;

const POSTING_COLUMNS: &str = "SELECT j.posting_id, j.company_id, c.name, j.title, j.job_link,
        j.experience_level, j.education_level, j.employment_type, j.salary_info,
        l.city, l.district, j.deadline_date, j.created_at
     FROM job_postings j
     JOIN companies c ON j.company_id = c.company_id
     LEFT JOIN locations l ON j.location_id = l.location_id";

#[derive(Debug, Clone, Default)]
pub struct PostingFilter {
    pub company: Option<String>,
    pub stack: Option<String>,
    pub limit: Option<usize>,
}

/// The storage session. Owned by `main` and passed by reference to every
/// pipeline stage.
pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        Self::configure(conn, path)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(conn, PathBuf::from(":memory:"))
    }

    fn configure(conn: Connection, path: PathBuf) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn default_path() -> PathBuf {
        match directories::ProjectDirs::from("", "", "jobload") {
            Some(proj_dirs) => proj_dirs.data_dir().join("jobload.db"),
            None => PathBuf::from("jobload.db"),
        }
    }

    pub fn init(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .context("Failed to create schema")
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='job_postings'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!(
                "Database not initialized. Run 'jobload init' first."
            ));
        }
        Ok(())
    }

    // --- Primitives used by the pipeline ---

    /// Runs a single-column id lookup; `None` when no row matches.
    pub fn find_id<P: Params>(&self, sql: &str, params: P) -> rusqlite::Result<Option<i64>> {
        self.conn
            .query_row(sql, params, |row| row.get(0))
            .optional()
    }

    /// Executes an auto-committed insert and returns the generated id.
    pub fn insert<P: Params>(&self, sql: &str, params: P) -> rusqlite::Result<i64> {
        self.conn.execute(sql, params)?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Starts a transaction. Dropping it without `commit` rolls back.
    pub fn transaction(&self) -> rusqlite::Result<Transaction<'_>> {
        self.conn.unchecked_transaction()
    }

    #[cfg(test)]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Read side ---

    pub fn table_counts(&self) -> Result<TableCounts> {
        let count = |table: &str| -> Result<i64> {
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                .with_context(|| format!("Failed to count {}", table))
        };
        Ok(TableCounts {
            companies: count("companies")?,
            locations: count("locations")?,
            tech_stacks: count("tech_stacks")?,
            categories: count("job_categories")?,
            postings: count("job_postings")?,
            posting_tech_stacks: count("posting_tech_stacks")?,
            posting_categories: count("posting_categories")?,
        })
    }

    pub fn list_postings(&self, filter: &PostingFilter) -> Result<Vec<JobPosting>> {
        let mut sql = format!("{} WHERE 1=1", POSTING_COLUMNS);
        let mut params: Vec<Value> = vec![];

        if let Some(company) = &filter.company {
            params.push(Value::Text(company.clone()));
            sql.push_str(&format!(" AND c.name = ?{}", params.len()));
        }

        if let Some(stack) = &filter.stack {
            params.push(Value::Text(stack.trim().to_lowercase()));
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM posting_tech_stacks pt
                   JOIN tech_stacks t ON pt.stack_id = t.stack_id
                   WHERE pt.posting_id = j.posting_id AND t.name = ?{})",
                params.len()
            ));
        }

        sql.push_str(" ORDER BY j.posting_id DESC");

        if let Some(limit) = filter.limit {
            params.push(Value::Integer(limit as i64));
            sql.push_str(&format!(" LIMIT ?{}", params.len()));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), Self::row_to_posting)?;
        let mut postings = rows
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list postings")?;

        for posting in &mut postings {
            self.attach_labels(posting)?;
        }
        Ok(postings)
    }

    pub fn get_posting(&self, id: i64) -> Result<Option<JobPosting>> {
        let posting = self
            .conn
            .query_row(
                &format!("{} WHERE j.posting_id = ?1", POSTING_COLUMNS),
                [id],
                Self::row_to_posting,
            )
            .optional()?;

        match posting {
            Some(mut posting) => {
                self.attach_labels(&mut posting)?;
                Ok(Some(posting))
            }
            None => Ok(None),
        }
    }

    fn attach_labels(&self, posting: &mut JobPosting) -> Result<()> {
        posting.tech_stacks = self.labels(
            "SELECT t.name FROM posting_tech_stacks pt
             JOIN tech_stacks t ON pt.stack_id = t.stack_id
             WHERE pt.posting_id = ?1 ORDER BY t.name",
            posting.id,
        )?;
        posting.categories = self.labels(
            "SELECT g.name FROM posting_categories pc
             JOIN job_categories g ON pc.category_id = g.category_id
             WHERE pc.posting_id = ?1 ORDER BY g.name",
            posting.id,
        )?;
        Ok(())
    }

    fn labels(&self, sql: &str, posting_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([posting_id], |row| row.get(0))?;
        rows.collect::<Result<Vec<String>, _>>()
            .context("Failed to load posting labels")
    }

    fn row_to_posting(row: &rusqlite::Row) -> rusqlite::Result<JobPosting> {
        Ok(JobPosting {
            id: row.get(0)?,
            company_id: row.get(1)?,
            company_name: row.get(2)?,
            title: row.get(3)?,
            job_link: row.get(4)?,
            experience_level: row.get(5)?,
            education_level: row.get(6)?,
            employment_type: row.get(7)?,
            salary_info: row.get(8)?,
            city: row.get(9)?,
            district: row.get(10)?,
            deadline_date: row.get(11)?,
            created_at: row.get(12)?,
            tech_stacks: vec![],
            categories: vec![],
        })
    }
}
