pub mod cache;
pub mod config;
pub mod indexer;
pub mod model;
pub mod search;
pub mod storage;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use cache::{CacheManager, memory::InMemoryStore};
use config::EngineConfig;
use indexer::BulkIndexOptions;
use model::types::{Lead, SearchFilters, SearchQuery, SortBy};
use search::SearchEngine;
use storage::LeadStore;

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "leadscout",
    version,
    about = "Lead search and indexing engine with cache-first retrieval"
)]
pub struct Cli {
    /// Path to the SQLite database (defaults to platform data dir)
    #[arg(long)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortArg {
    Relevance,
    CreatedAt,
}

impl From<SortArg> for SortBy {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Relevance => SortBy::Relevance,
            SortArg::CreatedAt => SortBy::CreatedAt,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search leads by free text and filters
    Search {
        /// Free-text query; quoted substrings are matched as phrases
        query: Option<String>,

        #[arg(long)]
        industry: Option<String>,

        #[arg(long)]
        location: Option<String>,

        /// Employee-count band, e.g. "11-50"
        #[arg(long)]
        company_size: Option<String>,

        #[arg(long)]
        revenue: Option<String>,

        /// Required keyword; may be repeated
        #[arg(long = "keyword")]
        keywords: Vec<String>,

        #[arg(long, value_enum, default_value = "relevance")]
        sort: SortArg,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Autosuggest completions for a query prefix
    Suggest {
        prefix: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Index specific leads, or the whole corpus when no ids are given
    Index {
        /// Lead ids to (re)index
        ids: Vec<i64>,

        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Clear the token index and rebuild it over the entire corpus
    Reindex,
    /// Retract a lead from the index (call before deleting the record)
    Remove { id: i64 },
    /// Import leads from a JSON file and index them immediately
    Import { file: PathBuf },
    /// Show index coverage
    Status,
    /// Show engine statistics (coverage, popular queries, cache health)
    Stats,
    /// Drop all cached search result sets
    InvalidateCache,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    let db_path = cli.db.unwrap_or_else(default_db_path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let store = Arc::new(LeadStore::open(&db_path)?);
    let cache = CacheManager::new(Arc::new(InMemoryStore::new()), config.clone());
    let engine = SearchEngine::new(store.clone(), cache, config);

    match cli.command {
        Commands::Search {
            query,
            industry,
            location,
            company_size,
            revenue,
            keywords,
            sort,
            limit,
            offset,
        } => {
            let query = SearchQuery {
                text: query,
                filters: SearchFilters {
                    industry,
                    location,
                    company_size,
                    revenue_range: revenue,
                    keywords,
                },
                sort_by: sort.into(),
                limit,
                offset,
            };
            let results = engine.search(&query, None);
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Suggest { prefix, limit } => {
            for suggestion in engine.suggestions(&prefix, limit) {
                println!("{suggestion}");
            }
        }
        Commands::Index { ids, batch_size } => {
            let opts = BulkIndexOptions {
                lead_ids: (!ids.is_empty()).then_some(ids),
                batch_size,
                ..BulkIndexOptions::default()
            };
            let stats = engine.indexer().bulk_index(&opts)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Reindex => {
            let stats = engine.indexer().reindex_all(&BulkIndexOptions::default())?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Remove { id } => {
            let removed = engine.indexer().remove_from_index(id);
            println!("{}", if removed { "removed" } else { "not indexed" });
        }
        Commands::Import { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let leads: Vec<Lead> =
                serde_json::from_str(&raw).context("import file must be a JSON array of leads")?;
            // Newly persisted leads become searchable by being indexed
            // immediately after the insert.
            let mut ids = Vec::with_capacity(leads.len());
            for lead in &leads {
                ids.push(store.insert_lead(lead)?);
            }
            let opts = BulkIndexOptions {
                lead_ids: Some(ids),
                ..BulkIndexOptions::default()
            };
            let stats = engine.indexer().bulk_index(&opts)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Status => {
            let status = engine.indexer().indexing_status()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&engine.stats())?);
        }
        Commands::InvalidateCache => {
            let removed = engine.invalidate_search_cache();
            println!("invalidated {removed} cached result sets");
        }
    }
    Ok(())
}

pub fn default_db_path() -> PathBuf {
    default_data_dir().join("leads.db")
}

pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "leadscout", "leadscout")
        .map_or_else(|| PathBuf::from("."), |dirs| dirs.data_dir().to_path_buf())
}
