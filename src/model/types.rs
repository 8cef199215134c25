//! Domain entity structs shared across storage, indexing, and search.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pipeline state of a lead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Qualified,
    Discarded,
}

impl LeadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Discarded => "discarded",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "contacted" => LeadStatus::Contacted,
            "qualified" => LeadStatus::Qualified,
            "discarded" => LeadStatus::Discarded,
            _ => LeadStatus::New,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LeadPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl LeadPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            LeadPriority::Low => "low",
            LeadPriority::Medium => "medium",
            LeadPriority::High => "high",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "low" => LeadPriority::Low,
            "high" => LeadPriority::High,
            _ => LeadPriority::Medium,
        }
    }
}

/// A prospective business contact record as stored in the record store.
///
/// `indexed_at` is non-null exactly when the lead has entries in the index
/// store; the indexer is the only writer of that field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Option<i64>,
    pub company: String,
    pub contact: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub revenue: Option<String>,
    pub employees: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default)]
    pub priority: LeadPriority,
    pub indexed_at: Option<DateTime<Utc>>,
    pub last_contact: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Lead {
    /// Minimal lead with only the required company name set.
    pub fn named(company: impl Into<String>) -> Self {
        Lead {
            id: None,
            company: company.into(),
            contact: None,
            email: None,
            phone: None,
            website: None,
            industry: None,
            location: None,
            revenue: None,
            employees: None,
            description: None,
            keywords: Vec::new(),
            score: 0,
            status: LeadStatus::default(),
            priority: LeadPriority::default(),
            indexed_at: None,
            last_contact: None,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Read-optimized projection of a lead plus derived search metadata.
///
/// Rebuilt on every (re)index and cached alongside other lead entries; the
/// record store stays authoritative, so a missing cache entry is regenerated
/// on demand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedLead {
    pub id: i64,
    pub company: String,
    pub contact: String,
    pub email: String,
    pub phone: String,
    pub website: String,
    pub industry: String,
    pub location: String,
    pub revenue: String,
    pub employees: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub searchable_text: String,
    pub indexed_at: Option<DateTime<Utc>>,
    pub company_tokens: Vec<String>,
    pub industry_tokens: Vec<String>,
    pub location_tokens: Vec<String>,
}

/// Structured filters supplied by the caller. Explicit values always win over
/// filters inferred from the query text; implicit values fill unset fields
/// only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchFilters {
    pub industry: Option<String>,
    pub location: Option<String>,
    pub company_size: Option<String>,
    pub revenue_range: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.industry.is_none()
            && self.location.is_none()
            && self.company_size.is_none()
            && self.revenue_range.is_none()
            && self.keywords.is_empty()
    }
}

/// Result ordering requested by the caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Relevance,
    CreatedAt,
}

/// A single search invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: Option<String>,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

impl Default for SearchQuery {
    fn default() -> Self {
        SearchQuery {
            text: None,
            filters: SearchFilters::default(),
            sort_by: SortBy::default(),
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl SearchQuery {
    pub fn text(text: impl Into<String>) -> Self {
        SearchQuery {
            text: Some(text.into()),
            ..SearchQuery::default()
        }
    }
}

/// Per-user ranking preferences consumed by the scoring pass.
///
/// `scoring_weights` entries are validated by the owning collaborator; this
/// core reads individual keys and falls back to built-in defaults for any
/// missing entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserPreferences {
    #[serde(default)]
    pub preferred_industries: Vec<String>,
    #[serde(default)]
    pub preferred_locations: Vec<String>,
    pub company_size_range: Option<String>,
    pub revenue_range: Option<String>,
    #[serde(default)]
    pub scoring_weights: BTreeMap<String, f64>,
}

/// One ranked hit. Produced fresh per query; transiently cached as part of a
/// cached result set, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub lead: IndexedLead,
    pub relevance_score: f64,
    #[serde(default)]
    pub match_reasons: Vec<String>,
    #[serde(default)]
    pub highlighted_fields: BTreeMap<String, String>,
}

/// Outcome report of a bulk or whole-corpus indexing run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexingStats {
    pub total_leads: usize,
    pub indexed_leads: usize,
    pub failed_leads: usize,
    /// Wall-clock seconds spent in the run.
    pub processing_time: f64,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Corpus-level index coverage snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingStatus {
    pub total_leads: u64,
    pub indexed_leads: u64,
    pub unindexed_leads: u64,
    pub coverage_percent: f64,
}
