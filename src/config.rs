use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Header names accepted for each logical field, tried in order.
///
/// Exports from different job boards disagree on column names, so the
/// defaults cover the common spellings. A JSON file can override any subset:
///
/// ```json
/// { "company": ["회사명", "company_name"], "deadline": ["마감일"] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldAliases {
    pub company: Vec<String>,
    pub title: Vec<String>,
    pub link: Vec<String>,
    pub tech_stack: Vec<String>,
    pub category: Vec<String>,
    pub experience: Vec<String>,
    pub education: Vec<String>,
    pub employment_type: Vec<String>,
    pub salary: Vec<String>,
    pub location: Vec<String>,
    pub deadline: Vec<String>,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for FieldAliases {
    fn default() -> Self {
        Self {
            company: names(&["company_name", "company"]),
            title: names(&["title", "job_title"]),
            link: names(&["link", "job_link", "url"]),
            tech_stack: names(&["tech_stack", "tech_stacks", "stack", "skills"]),
            // Categories are seniority buckets, which most exports only carry
            // in the experience column.
            category: names(&["category", "categories", "experience"]),
            experience: names(&["experience", "experience_level", "career"]),
            education: names(&["education", "education_level"]),
            employment_type: names(&["employment_type", "job_type"]),
            salary: names(&["salary", "salary_info", "salary_range"]),
            location: names(&["location", "region"]),
            deadline: names(&["deadline", "deadline_date"]),
        }
    }
}

impl FieldAliases {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read field alias file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid field alias file: {}", path.display()))
    }
}
