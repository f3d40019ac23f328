use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

use crate::config::FieldAliases;
use crate::error::RowError;
use crate::models::{clean, DimensionKey, LocationKey, NormalizedPosting, RawRow};
use crate::resolver::Resolver;

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})\s*[-./]\s*(\d{1,2})\s*[-./]\s*(\d{1,2})").expect("date pattern is valid")
});

/// Maps raw rows onto resolved postings.
pub struct Normalizer {
    aliases: FieldAliases,
}

impl Normalizer {
    pub fn new(aliases: FieldAliases) -> Self {
        Self { aliases }
    }

    pub fn title<'r>(&self, row: &'r RawRow) -> Option<&'r str> {
        row.get(&self.aliases.title)
    }

    /// Resolves every foreign key of `row`. Company is the only required
    /// field; a row without one is rejected before anything is created.
    pub fn normalize(
        &self,
        resolver: &mut Resolver<'_>,
        row: &RawRow,
    ) -> Result<NormalizedPosting, RowError> {
        let company = row
            .get(&self.aliases.company)
            .ok_or(RowError::MissingField("company"))?;
        let company_id = resolver
            .resolve(&DimensionKey::Company(company.to_string()))?
            .id;

        let location_id = match row.get(&self.aliases.location).and_then(parse_location) {
            Some(key) => Some(resolver.resolve(&DimensionKey::Location(key))?.id),
            None => None,
        };

        let tech_stack_ids = resolve_list(
            resolver,
            row.get(&self.aliases.tech_stack),
            DimensionKey::tech_stack,
        )?;
        let category_ids = resolve_list(resolver, row.get(&self.aliases.category), |name| {
            DimensionKey::Category(name.to_string())
        })?;

        Ok(NormalizedPosting {
            company_id,
            title: text(row, &self.aliases.title),
            job_link: text(row, &self.aliases.link),
            experience_level: text(row, &self.aliases.experience),
            education_level: text(row, &self.aliases.education),
            employment_type: text(row, &self.aliases.employment_type),
            salary_info: text(row, &self.aliases.salary),
            location_id,
            deadline_date: row.get(&self.aliases.deadline).and_then(parse_deadline),
            tech_stack_ids,
            category_ids,
        })
    }
}

fn text(row: &RawRow, aliases: &[String]) -> Option<String> {
    row.get(aliases).map(str::to_string)
}

/// Resolves each token of a comma-separated field; ids keep first-seen order
/// and appear once.
fn resolve_list(
    resolver: &mut Resolver<'_>,
    field: Option<&str>,
    key: impl Fn(&str) -> DimensionKey,
) -> Result<Vec<i64>, RowError> {
    let mut ids = Vec::new();
    for token in field.map(split_list).unwrap_or_default() {
        let id = resolver.resolve(&key(token))?.id;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Splits on commas, trims, and drops empty or missing-marker tokens.
pub fn split_list(text: &str) -> Vec<&str> {
    text.split(',').filter_map(clean).collect()
}

/// "city district [ignored...]". A single token yields a city with no
/// district; tokens past the second are ignored.
pub fn parse_location(text: &str) -> Option<LocationKey> {
    let mut parts = text.split_whitespace().filter_map(clean);
    let city = parts.next()?;
    Some(LocationKey {
        city: city.to_string(),
        district: parts.next().map(str::to_string),
    })
}

/// First valid `YYYY-MM-DD` (or `.`/`/` separated) date in the text.
pub fn parse_deadline(text: &str) -> Option<NaiveDate> {
    DATE_RE.captures_iter(text).find_map(|caps| {
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        db
    }

    fn row(fields: &[(&str, &str)]) -> RawRow {
        RawRow::new(2, fields.iter().copied())
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("Go, Postgres ,Redis"), vec!["Go", "Postgres", "Redis"]);
        assert_eq!(split_list("Go,, ,NA,Rust,"), vec!["Go", "Rust"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_parse_location_edge_cases() {
        assert_eq!(parse_location("   "), None);
        assert_eq!(
            parse_location("Seoul"),
            Some(LocationKey { city: "Seoul".into(), district: None })
        );
        assert_eq!(
            parse_location("  Seoul   Gangnam "),
            Some(LocationKey { city: "Seoul".into(), district: Some("Gangnam".into()) })
        );
    }

    #[test]
    fn test_parse_location_ignores_extra_tokens() {
        assert_eq!(
            parse_location("서울 강남구 역삼동"),
            Some(LocationKey { city: "서울".into(), district: Some("강남구".into()) })
        );
    }

    #[test]
    fn test_parse_deadline() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        assert_eq!(parse_deadline("2024-12-31"), Some(date));
        assert_eq!(parse_deadline("~ 2024.12.31(화)"), Some(date));
        assert_eq!(parse_deadline("2024/12/31 23:59"), Some(date));
        assert_eq!(parse_deadline("상시채용"), None);
        assert_eq!(parse_deadline("2024-13-01"), None);
    }

    #[test]
    fn test_missing_company_is_skipped_without_writes() {
        let db = test_db();
        let mut resolver = Resolver::new(&db);
        let normalizer = Normalizer::new(FieldAliases::default());

        let result = normalizer.normalize(
            &mut resolver,
            &row(&[("company_name", "NA"), ("title", "Dev"), ("tech_stack", "Go")]),
        );

        assert!(matches!(result, Err(RowError::MissingField("company"))));
        assert_eq!(db.table_counts().unwrap().tech_stacks, 0);
    }

    #[test]
    fn test_blank_scalars_become_null() {
        let db = test_db();
        let mut resolver = Resolver::new(&db);
        let normalizer = Normalizer::new(FieldAliases::default());

        let posting = normalizer
            .normalize(
                &mut resolver,
                &row(&[
                    ("company", "Acme"),
                    ("title", "  "),
                    ("education", "NaN"),
                    ("salary", "N/A"),
                    ("deadline", "상시채용"),
                    ("location", ""),
                ]),
            )
            .unwrap();

        assert_eq!(posting.title, None);
        assert_eq!(posting.education_level, None);
        assert_eq!(posting.salary_info, None);
        assert_eq!(posting.deadline_date, None);
        assert_eq!(posting.location_id, None);
        assert!(posting.tech_stack_ids.is_empty());
        assert!(posting.category_ids.is_empty());
    }

    #[test]
    fn test_normalize_resolves_all_keys() {
        let db = test_db();
        let mut resolver = Resolver::new(&db);
        let normalizer = Normalizer::new(FieldAliases::default());

        let posting = normalizer
            .normalize(
                &mut resolver,
                &row(&[
                    ("company_name", "Acme"),
                    ("title", "Backend Engineer"),
                    ("link", "https://example.com/1"),
                    ("tech_stack", "Go, go, GO, Postgres"),
                    ("experience", "신입, 경력"),
                    ("location", "Seoul Gangnam"),
                    ("deadline", "2025-01-15"),
                ]),
            )
            .unwrap();

        assert_eq!(posting.title.as_deref(), Some("Backend Engineer"));
        assert_eq!(posting.job_link.as_deref(), Some("https://example.com/1"));
        assert_eq!(posting.experience_level.as_deref(), Some("신입, 경력"));
        assert_eq!(posting.tech_stack_ids.len(), 2);
        assert_eq!(posting.category_ids.len(), 2);
        assert!(posting.location_id.is_some());
        assert_eq!(posting.deadline_date, NaiveDate::from_ymd_opt(2025, 1, 15));

        let created = resolver.created();
        assert_eq!(created.companies, 1);
        assert_eq!(created.tech_stacks, 2);
        assert_eq!(created.categories, 2);
        assert_eq!(created.locations, 1);
    }

    #[test]
    fn test_custom_aliases() {
        let db = test_db();
        let mut resolver = Resolver::new(&db);
        let aliases = FieldAliases {
            company: vec!["회사명".into()],
            ..FieldAliases::default()
        };
        let normalizer = Normalizer::new(aliases);

        let r = row(&[("회사명", "토스"), ("company_name", "ignored"), ("job_title", "iOS")]);
        let posting = normalizer.normalize(&mut resolver, &r).unwrap();

        let name: String = db
            .conn()
            .query_row(
                "SELECT name FROM companies WHERE company_id = ?1",
                [posting.company_id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(name, "토스");
        assert_eq!(normalizer.title(&r), Some("iOS"));
    }
}
