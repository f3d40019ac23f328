mod batch;
mod config;
mod db;
mod error;
mod models;
mod normalize;
mod resolver;
mod source;
mod writer;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::FieldAliases;
use db::{Database, PostingFilter};
use models::JobPosting;
use normalize::Normalizer;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jobload")]
#[command(about = "Load recruitment listings into a normalized job database")]
struct Cli {
    /// Database file (defaults to the user data directory)
    #[arg(long, global = true, env = "JOBLOAD_DB")]
    db: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, env = "JOBLOAD_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Load a CSV/TSV export of job listings
    Load {
        /// Path to the delimited file
        file: PathBuf,

        /// Field delimiter (defaults to tab for .tsv, comma otherwise)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// JSON file overriding the accepted column names
        #[arg(short, long, env = "JOBLOAD_FIELDS")]
        fields: Option<PathBuf>,
    },

    /// Show row counts per table
    Stats,

    /// List postings
    List {
        /// Filter by company name
        #[arg(short, long)]
        company: Option<String>,

        /// Filter by tech stack
        #[arg(short, long)]
        stack: Option<String>,

        /// Maximum number of postings
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show posting details
    Show {
        /// Posting ID
        id: i64,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let db_path = cli.db.unwrap_or_else(Database::default_path);
    let db = Database::open(db_path)?;

    match cli.command {
        Commands::Init => {
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Load {
            file,
            delimiter,
            fields,
        } => {
            db.init()?;

            let aliases = match &fields {
                Some(path) => FieldAliases::from_json_file(path)?,
                None => FieldAliases::default(),
            };
            let delimiter = source::delimiter_for(&file, delimiter)?;
            let rows = source::read_rows(&file, delimiter)?;
            info!(
                file = %file.display(),
                columns = ?rows.headers().collect::<Vec<_>>(),
                "reading input"
            );

            let summary = batch::run(&db, &Normalizer::new(aliases), rows);

            println!(
                "Processing completed. Rows: {}, Inserted: {}, Skipped: {}",
                summary.processed(),
                summary.inserted,
                summary.skipped
            );
            let created = summary.dimensions_created;
            println!(
                "New rows: {} companies, {} locations, {} tech stacks, {} categories",
                created.companies, created.locations, created.tech_stacks, created.categories
            );
            if !summary.failures.is_empty() {
                println!("\nSkipped rows:");
                for failure in &summary.failures {
                    println!(
                        "  line {:<6} {:<30} {}",
                        failure.line,
                        truncate(failure.title.as_deref().unwrap_or("-"), 28),
                        failure.reason
                    );
                }
            }
        }

        Commands::Stats => {
            db.ensure_initialized()?;
            let counts = db.table_counts()?;
            println!("{:<22} {:>8}", "TABLE", "ROWS");
            println!("{}", "-".repeat(31));
            for (table, rows) in [
                ("companies", counts.companies),
                ("locations", counts.locations),
                ("tech_stacks", counts.tech_stacks),
                ("job_categories", counts.categories),
                ("job_postings", counts.postings),
                ("posting_tech_stacks", counts.posting_tech_stacks),
                ("posting_categories", counts.posting_categories),
            ] {
                println!("{:<22} {:>8}", table, rows);
            }
        }

        Commands::List {
            company,
            stack,
            limit,
            json,
        } => {
            db.ensure_initialized()?;
            let filter = PostingFilter {
                company,
                stack,
                limit: Some(limit),
            };
            let postings = db.list_postings(&filter)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&postings)?);
            } else if postings.is_empty() {
                println!("No postings found.");
            } else {
                println!("{:<6} {:<30} {:<20} {:<16} {:>10}", "ID", "TITLE", "COMPANY", "LOCATION", "DEADLINE");
                println!("{}", "-".repeat(86));
                for posting in &postings {
                    println!(
                        "{:<6} {:<30} {:<20} {:<16} {:>10}",
                        posting.id,
                        truncate(posting.title.as_deref().unwrap_or("-"), 28),
                        truncate(&posting.company_name, 18),
                        truncate(&location_label(posting), 14),
                        posting.deadline_date.as_deref().unwrap_or("-")
                    );
                }
            }
        }

        Commands::Show { id, json } => {
            db.ensure_initialized()?;
            match db.get_posting(id)? {
                Some(posting) if json => {
                    println!("{}", serde_json::to_string_pretty(&posting)?);
                }
                Some(posting) => print_posting(&posting),
                None => {
                    println!("Posting #{} not found.", id);
                }
            }
        }
    }

    Ok(())
}

fn print_posting(posting: &JobPosting) {
    println!("Posting #{}", posting.id);
    println!("Company: {}", posting.company_name);
    if let Some(title) = &posting.title {
        println!("Title: {}", title);
    }
    if let Some(link) = &posting.job_link {
        println!("Link: {}", link);
    }
    let location = location_label(posting);
    if location != "-" {
        println!("Location: {}", location);
    }
    for (label, value) in [
        ("Experience", &posting.experience_level),
        ("Education", &posting.education_level),
        ("Employment", &posting.employment_type),
        ("Salary", &posting.salary_info),
        ("Deadline", &posting.deadline_date),
    ] {
        if let Some(value) = value {
            println!("{}: {}", label, value);
        }
    }
    if !posting.tech_stacks.is_empty() {
        println!("Tech stack: {}", posting.tech_stacks.join(", "));
    }
    if !posting.categories.is_empty() {
        println!("Categories: {}", posting.categories.join(", "));
    }
    println!("Created: {}", posting.created_at);
}

fn location_label(posting: &JobPosting) -> String {
    match (&posting.city, &posting.district) {
        (Some(city), Some(district)) => format!("{} {}", city, district),
        (Some(city), None) => city.clone(),
        _ => "-".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
