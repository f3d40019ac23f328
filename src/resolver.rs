use rusqlite::{params, ErrorCode};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::db::Database;
use crate::error::RowError;
use crate::models::{DimensionKey, DimensionKind, LocationKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub id: i64,
    pub created: bool,
}

/// Dimension rows created by one resolver, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DimensionTally {
    pub companies: usize,
    pub locations: usize,
    pub tech_stacks: usize,
    pub categories: usize,
}

impl DimensionTally {
    fn record(&mut self, kind: DimensionKind) {
        match kind {
            DimensionKind::Company => self.companies += 1,
            DimensionKind::Location => self.locations += 1,
            DimensionKind::TechStack => self.tech_stacks += 1,
            DimensionKind::Category => self.categories += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.companies + self.locations + self.tech_stacks + self.categories
    }
}

/// Insert-or-reuse lookups for companies, locations, tech stacks and
/// categories. New rows are auto-committed as soon as they are created, so
/// postings written later can reference them.
pub struct Resolver<'a> {
    db: &'a Database,
    cache: HashMap<DimensionKey, i64>,
    created: DimensionTally,
}

impl<'a> Resolver<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            cache: HashMap::new(),
            created: DimensionTally::default(),
        }
    }

    pub fn resolve(&mut self, key: &DimensionKey) -> Result<Resolved, RowError> {
        if let Some(&id) = self.cache.get(key) {
            return Ok(Resolved { id, created: false });
        }

        let resolved = self
            .lookup_or_create(key)
            .map_err(|source| RowError::Resolution {
                kind: key.kind(),
                key: key.to_string(),
                source,
            })?;

        if resolved.created {
            self.created.record(key.kind());
            debug!(kind = %key.kind(), key = %key, id = resolved.id, "created dimension row");
        }
        self.cache.insert(key.clone(), resolved.id);
        Ok(resolved)
    }

    pub fn created(&self) -> DimensionTally {
        self.created
    }

    fn lookup_or_create(&self, key: &DimensionKey) -> rusqlite::Result<Resolved> {
        if let Some(id) = self.lookup(key)? {
            return Ok(Resolved { id, created: false });
        }

        match self.create(key) {
            Ok(id) => Ok(Resolved { id, created: true }),
            // Someone else created the row between our lookup and insert.
            Err(err) if is_constraint_violation(&err) => match self.lookup(key)? {
                Some(id) => Ok(Resolved { id, created: false }),
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    fn lookup(&self, key: &DimensionKey) -> rusqlite::Result<Option<i64>> {
        match key {
            DimensionKey::Company(name) => self
                .db
                .find_id("SELECT company_id FROM companies WHERE name = ?1", [name]),
            DimensionKey::TechStack(name) => self.db.find_id(
                "SELECT stack_id FROM tech_stacks WHERE LOWER(name) = LOWER(?1)",
                [name],
            ),
            DimensionKey::Category(name) => self.db.find_id(
                "SELECT category_id FROM job_categories WHERE name = ?1",
                [name],
            ),
            DimensionKey::Location(LocationKey { city, district }) => self.db.find_id(
                "SELECT location_id FROM locations WHERE city = ?1 AND district IS ?2",
                params![city, district],
            ),
        }
    }

    fn create(&self, key: &DimensionKey) -> rusqlite::Result<i64> {
        match key {
            DimensionKey::Company(name) => self
                .db
                .insert("INSERT INTO companies (name) VALUES (?1)", [name]),
            DimensionKey::TechStack(name) => self.db.insert(
                "INSERT INTO tech_stacks (name, category) VALUES (?1, 'Other')",
                [name],
            ),
            DimensionKey::Category(name) => self
                .db
                .insert("INSERT INTO job_categories (name) VALUES (?1)", [name]),
            DimensionKey::Location(LocationKey { city, district }) => self.db.insert(
                "INSERT INTO locations (city, district) VALUES (?1, ?2)",
                params![city, district],
            ),
        }
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation)
}
