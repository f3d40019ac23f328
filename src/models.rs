use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Markers that mean "no value" in exported spreadsheets and dataframes.
const MISSING_MARKERS: &[&str] = &[
    "NA", "N/A", "n/a", "NaN", "nan", "-nan", "-NaN", "NULL", "null", "None", "<NA>", "#N/A",
    "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "1.#IND", "1.#QNAN",
];

pub fn is_missing(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || MISSING_MARKERS.contains(&value)
}

/// Trims the value and maps blanks and missing markers to `None`.
pub fn clean(value: &str) -> Option<&str> {
    if is_missing(value) {
        None
    } else {
        Some(value.trim())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionKind {
    Company,
    Location,
    TechStack,
    Category,
}

impl fmt::Display for DimensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DimensionKind::Company => "company",
            DimensionKind::Location => "location",
            DimensionKind::TechStack => "tech stack",
            DimensionKind::Category => "category",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocationKey {
    pub city: String,
    pub district: Option<String>,
}

/// Natural key of a dimension row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DimensionKey {
    Company(String),
    TechStack(String),
    Category(String),
    Location(LocationKey),
}

impl DimensionKey {
    /// Tech stacks match case-insensitively, so their key is stored lowercased.
    pub fn tech_stack(name: &str) -> Self {
        DimensionKey::TechStack(name.trim().to_lowercase())
    }

    pub fn kind(&self) -> DimensionKind {
        match self {
            DimensionKey::Company(_) => DimensionKind::Company,
            DimensionKey::TechStack(_) => DimensionKind::TechStack,
            DimensionKey::Category(_) => DimensionKind::Category,
            DimensionKey::Location(_) => DimensionKind::Location,
        }
    }
}

impl fmt::Display for DimensionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimensionKey::Company(name)
            | DimensionKey::TechStack(name)
            | DimensionKey::Category(name) => f.write_str(name),
            DimensionKey::Location(LocationKey { city, district: Some(d) }) => {
                write!(f, "{} {}", city, d)
            }
            DimensionKey::Location(LocationKey { city, district: None }) => f.write_str(city),
        }
    }
}

/// One record as produced by the row source: header name to raw text.
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    pub line: u64,
    fields: HashMap<String, String>,
}

impl RawRow {
    pub fn new<K, V>(line: u64, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(|(k, v)| (header_key(k.as_ref()), v.into()))
            .collect();
        Self { line, fields }
    }

    /// First non-missing value among `aliases`, trimmed.
    pub fn get(&self, aliases: &[String]) -> Option<&str> {
        aliases
            .iter()
            .filter_map(|alias| self.fields.get(&header_key(alias)))
            .find_map(|value| clean(value))
    }
}

fn header_key(name: &str) -> String {
    name.trim_start_matches('\u{feff}').trim().to_lowercase()
}

/// A fully resolved row, ready for the posting writer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedPosting {
    pub company_id: i64,
    pub title: Option<String>,
    pub job_link: Option<String>,
    pub experience_level: Option<String>,
    pub education_level: Option<String>,
    pub employment_type: Option<String>,
    pub salary_info: Option<String>,
    pub location_id: Option<i64>,
    pub deadline_date: Option<NaiveDate>,
    pub tech_stack_ids: Vec<i64>,
    pub category_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobPosting {
    pub id: i64,
    pub company_id: i64,
    pub company_name: String, // denormalized for display
    pub title: Option<String>,
    pub job_link: Option<String>,
    pub experience_level: Option<String>,
    pub education_level: Option<String>,
    pub employment_type: Option<String>,
    pub salary_info: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub deadline_date: Option<String>,
    pub created_at: String,
    pub tech_stacks: Vec<String>,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub companies: i64,
    pub locations: i64,
    pub tech_stacks: i64,
    pub categories: i64,
    pub postings: i64,
    pub posting_tech_stacks: i64,
    pub posting_categories: i64,
}
