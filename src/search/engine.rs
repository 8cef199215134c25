//! Cache-first retrieval orchestrator.
//!
//! One `search` call runs: cache lookup → [hit: slice and return] / [miss:
//! parse → merge filters → retrieve candidates (index-first, relational
//! fallback) → score → sort → cache the ranked superset → slice and return].
//! The superset is cached keyed on the query shape without pagination fields,
//! so every page of one logical query is served from a single entry.
//!
//! `search` never hard-fails the caller: store errors and cancellations are
//! logged and surfaced as an empty result list. Use [`SearchEngine::search_with_cancel`]
//! when the error itself matters.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{CacheHealth, CacheManager};
use crate::config::EngineConfig;
use crate::indexer::{CancelFlag, LeadIndexer};
use crate::model::types::{
    IndexedLead, IndexingStatus, Lead, SearchFilters, SearchQuery, SearchResult, SortBy,
    UserPreferences,
};
use crate::storage::{DistinctField, LeadStore, StoreError};

use super::query::{ParsedQuery, QueryProcessor};
use super::ranking::RankingAlgorithm;

/// Error from the cancellable search path.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search cancelled")]
    Cancelled,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Aggregate report for operators: coverage, query leaderboard, cache health.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub indexing: IndexingStatus,
    pub popular_searches: Vec<String>,
    pub cache: CacheHealth,
    pub generated_at: DateTime<Utc>,
}

/// How many leaderboard entries the suggestion path considers for prefix
/// matching.
const POPULAR_CANDIDATES: usize = 50;

pub struct SearchEngine {
    store: Arc<LeadStore>,
    cache: CacheManager,
    indexer: LeadIndexer,
    processor: QueryProcessor,
    config: EngineConfig,
}

impl SearchEngine {
    pub fn new(store: Arc<LeadStore>, cache: CacheManager, config: EngineConfig) -> Self {
        let indexer = LeadIndexer::new(store.clone(), cache.clone(), config.indexing_batch_size);
        SearchEngine {
            store,
            cache,
            indexer,
            processor: QueryProcessor::new(),
            config,
        }
    }

    /// The indexer sharing this engine's stores, for ingestion callers.
    pub fn indexer(&self) -> &LeadIndexer {
        &self.indexer
    }

    /// Infallible search: any retrieval error or cancellation becomes an
    /// empty result list with a logged diagnostic.
    pub fn search(
        &self,
        query: &SearchQuery,
        preferences: Option<&UserPreferences>,
    ) -> Vec<SearchResult> {
        match self.search_with_cancel(query, preferences, &CancelFlag::new()) {
            Ok(results) => results,
            Err(err) => {
                warn!(%err, "search_failed");
                Vec::new()
            }
        }
    }

    /// Search, aborting with [`SearchError::Cancelled`] if `cancel` is set
    /// before retrieval or before scoring begins. A cancelled search never
    /// returns a partial result.
    pub fn search_with_cancel(
        &self,
        query: &SearchQuery,
        preferences: Option<&UserPreferences>,
        cancel: &CancelFlag,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let text = query.text.as_deref().unwrap_or("").trim();
        let key =
            CacheManager::search_key(query.text.as_deref(), &query.filters, query.sort_by, preferences);

        if let Some(cached) = self.cache.cached_search_results(&key) {
            debug!(key = %key, results = cached.count, "search_cache_hit");
            return Ok(paginate(cached.results, query.offset, query.limit));
        }

        let parsed = self.processor.parse(text);
        let filters = merge_filters(&query.filters, &parsed);
        debug!(
            terms = parsed.terms.len(),
            phrases = parsed.phrases.len(),
            "search_cache_miss"
        );

        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        let candidates = self.retrieve_candidates(&parsed, &filters)?;

        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        let mut ranked = self.score_candidates(&candidates, &parsed, &filters, preferences);
        sort_results(&mut ranked, query.sort_by);
        ranked.truncate(self.config.max_search_results);

        self.cache.cache_search_results(&key, &ranked);
        if !text.is_empty() {
            self.cache.add_popular_search(text);
        }
        info!(
            candidates = candidates.len(),
            ranked = ranked.len(),
            "search_complete"
        );
        Ok(paginate(ranked, query.offset, query.limit))
    }

    /// Index-first candidate retrieval. When the token intersection yields
    /// any IDs those records (post-filter) are the candidate set; only an
    /// empty intersection or a term-less query falls back to the record
    /// store's OR-semantics substring search.
    fn retrieve_candidates(
        &self,
        parsed: &ParsedQuery,
        filters: &SearchFilters,
    ) -> Result<Vec<Lead>, StoreError> {
        if !parsed.terms.is_empty() {
            let ids = self
                .indexer
                .search_by_tokens(&parsed.terms, self.config.max_search_results);
            if !ids.is_empty() {
                let leads = self.store.find_by_ids(&ids)?;
                let filtered: Vec<Lead> = leads
                    .into_iter()
                    .filter(|lead| lead_matches_filters(lead, filters))
                    .collect();
                debug!(path = "index", candidates = filtered.len(), "candidates_retrieved");
                return Ok(filtered);
            }
        }
        let leads = self.store.search_text(
            &parsed.terms,
            &parsed.phrases,
            filters,
            self.config.max_search_results,
        )?;
        debug!(path = "fallback", candidates = leads.len(), "candidates_retrieved");
        Ok(leads)
    }

    /// Score every candidate, dropping non-positive scores, attaching the
    /// cached (or regenerated) projection and highlights.
    fn score_candidates(
        &self,
        candidates: &[Lead],
        parsed: &ParsedQuery,
        filters: &SearchFilters,
        preferences: Option<&UserPreferences>,
    ) -> Vec<SearchResult> {
        let ranker = RankingAlgorithm::new(preferences);
        let mut results = Vec::new();
        for lead in candidates {
            let (score, reasons) = ranker.score(lead, parsed, filters);
            if score <= 0.0 {
                continue;
            }
            let Some(projection) = self.projection_for(lead) else {
                continue;
            };
            let highlighted_fields = highlight_fields(lead, parsed);
            results.push(SearchResult {
                lead: projection,
                relevance_score: score,
                match_reasons: reasons,
                highlighted_fields,
            });
        }
        results
    }

    /// Cached projection, or one rebuilt from the record (and re-cached).
    /// The index store is advisory: a missing entry is regenerated, never an
    /// error.
    fn projection_for(&self, lead: &Lead) -> Option<IndexedLead> {
        if let Some(id) = lead.id
            && let Some(cached) = self.cache.cached_lead(id)
        {
            return Some(cached);
        }
        match self.indexer.extract_metadata(lead) {
            Ok(projection) => {
                self.cache.cache_lead(&projection);
                Some(projection)
            }
            Err(err) => {
                warn!(lead_id = ?lead.id, %err, "projection_rebuild_failed");
                None
            }
        }
    }

    /// Autosuggest: popularity-leaderboard prefix matches, then distinct
    /// company names, then distinct industries. Cache-first on the lowercased
    /// prefix; store errors degrade that source to empty.
    pub fn suggestions(&self, partial: &str, limit: usize) -> Vec<String> {
        let prefix = partial.trim().to_lowercase();
        if prefix.chars().count() < 2 || limit == 0 {
            return Vec::new();
        }
        if let Some(cached) = self.cache.cached_suggestions(&prefix) {
            debug!(prefix = %prefix, "suggestions_cache_hit");
            return cached.into_iter().take(limit).collect();
        }

        let popular = self
            .cache
            .popular_searches(POPULAR_CANDIDATES)
            .into_iter()
            .filter(|q| q.to_lowercase().starts_with(&prefix));
        let companies = self.distinct_values(DistinctField::Company, &prefix, limit);
        let industries = self.distinct_values(DistinctField::Industry, &prefix, limit);

        let combined: Vec<String> = popular
            .chain(companies)
            .chain(industries)
            .unique()
            .collect();
        self.cache.cache_suggestions(&prefix, &combined);
        combined.into_iter().take(limit).collect()
    }

    fn distinct_values(
        &self,
        field: DistinctField,
        prefix: &str,
        limit: usize,
    ) -> impl Iterator<Item = String> {
        self.store
            .distinct_starting_with(field, prefix, limit)
            .unwrap_or_else(|err| {
                warn!(%err, ?field, "suggestion_source_failed");
                Vec::new()
            })
            .into_iter()
    }

    /// One report for operators: index coverage, popular queries, cache
    /// health.
    pub fn stats(&self) -> EngineStats {
        let indexing = self.indexer.indexing_status().unwrap_or_else(|err| {
            warn!(%err, "indexing_status_failed");
            IndexingStatus {
                total_leads: 0,
                indexed_leads: 0,
                unindexed_leads: 0,
                coverage_percent: 0.0,
            }
        });
        EngineStats {
            indexing,
            popular_searches: self.cache.popular_searches(10),
            cache: self.cache.health(),
            generated_at: Utc::now(),
        }
    }

    /// Drop every cached result set; returns how many entries were removed.
    pub fn invalidate_search_cache(&self) -> usize {
        let removed = self.cache.invalidate_search_cache();
        info!(removed, "search_cache_invalidated");
        removed
    }
}

/// Explicit filters win per field; implicit filters extracted from the query
/// text fill unset fields only.
fn merge_filters(explicit: &SearchFilters, parsed: &ParsedQuery) -> SearchFilters {
    SearchFilters {
        industry: explicit.industry.clone().or_else(|| parsed.industry.clone()),
        location: explicit.location.clone().or_else(|| parsed.location.clone()),
        company_size: explicit
            .company_size
            .clone()
            .or_else(|| parsed.company_size.clone()),
        revenue_range: explicit.revenue_range.clone(),
        keywords: explicit.keywords.clone(),
    }
}

/// In-engine filter predicates for index-path candidates, matching the
/// relational semantics: case-insensitive substring per field, AND across
/// fields, and each filter keyword required somewhere in
/// company/description/industry.
fn lead_matches_filters(lead: &Lead, filters: &SearchFilters) -> bool {
    let contains = |field: Option<&str>, wanted: &str| {
        field.is_some_and(|v| v.to_lowercase().contains(&wanted.to_lowercase()))
    };

    if let Some(industry) = &filters.industry
        && !contains(lead.industry.as_deref(), industry)
    {
        return false;
    }
    if let Some(location) = &filters.location
        && !contains(lead.location.as_deref(), location)
    {
        return false;
    }
    if let Some(size) = &filters.company_size
        && !contains(lead.employees.as_deref(), size)
    {
        return false;
    }
    if let Some(revenue) = &filters.revenue_range
        && !contains(lead.revenue.as_deref(), revenue)
    {
        return false;
    }
    filters.keywords.iter().all(|keyword| {
        contains(Some(lead.company.as_str()), keyword)
            || contains(lead.description.as_deref(), keyword)
            || contains(lead.industry.as_deref(), keyword)
    })
}

/// Deterministic ordering: relevance descending (or `indexed_at` descending
/// for `CreatedAt`, missing timestamps last), ties broken by lead id
/// ascending.
fn sort_results(results: &mut [SearchResult], sort_by: SortBy) {
    match sort_by {
        SortBy::Relevance => results.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.lead.id.cmp(&b.lead.id))
        }),
        SortBy::CreatedAt => results.sort_by(|a, b| {
            b.lead
                .indexed_at
                .cmp(&a.lead.indexed_at)
                .then_with(|| a.lead.id.cmp(&b.lead.id))
        }),
    }
}

fn paginate(results: Vec<SearchResult>, offset: usize, limit: usize) -> Vec<SearchResult> {
    results.into_iter().skip(offset).take(limit).collect()
}

/// Wrap the first occurrence of every term and phrase in `<mark>` tags,
/// preserving the field's original casing. Only fields with at least one
/// match appear in the map.
fn highlight_fields(lead: &Lead, parsed: &ParsedQuery) -> BTreeMap<String, String> {
    let fields = [
        ("company", Some(lead.company.as_str())),
        ("description", lead.description.as_deref()),
        ("industry", lead.industry.as_deref()),
    ];
    let mut highlighted = BTreeMap::new();
    for (name, value) in fields {
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            continue;
        };
        if let Some(marked) = highlight_value(value, parsed) {
            highlighted.insert(name.to_string(), marked);
        }
    }
    highlighted
}

fn highlight_value(value: &str, parsed: &ParsedQuery) -> Option<String> {
    let mut marked = value.to_string();
    let mut any = false;
    for needle in parsed.terms.iter().chain(&parsed.phrases) {
        let lowered = marked.to_lowercase();
        let Some(pos) = lowered.find(needle.as_str()) else {
            continue;
        };
        let end = pos + needle.len();
        // Lowercasing can shift byte offsets for a handful of code points;
        // skip the wrap unless the span maps cleanly onto the original.
        if !marked.is_char_boundary(pos) || !marked.is_char_boundary(end) {
            continue;
        }
        if marked[pos..end].to_lowercase() != *needle {
            continue;
        }
        marked = format!(
            "{}<mark>{}</mark>{}",
            &marked[..pos],
            &marked[pos..end],
            &marked[end..]
        );
        any = true;
    }
    any.then_some(marked)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed_with(
        industry: Option<&str>,
        location: Option<&str>,
        company_size: Option<&str>,
    ) -> ParsedQuery {
        ParsedQuery {
            industry: industry.map(str::to_string),
            location: location.map(str::to_string),
            company_size: company_size.map(str::to_string),
            ..ParsedQuery::default()
        }
    }

    #[test]
    fn explicit_filters_beat_implicit() {
        let explicit = SearchFilters {
            industry: Some("Finance".into()),
            ..SearchFilters::default()
        };
        let merged = merge_filters(&explicit, &parsed_with(Some("Technology"), Some("Salvador"), None));
        assert_eq!(merged.industry.as_deref(), Some("Finance"));
        // Unset explicit fields are filled by implicit ones.
        assert_eq!(merged.location.as_deref(), Some("Salvador"));
        assert!(merged.company_size.is_none());
    }

    #[test]
    fn filter_matching_is_case_insensitive_substring() {
        let lead = Lead {
            industry: Some("Information Technology".into()),
            location: Some("São Paulo".into()),
            employees: Some("11-50".into()),
            description: Some("SaaS tools".into()),
            ..Lead::named("TechInova")
        };
        let filters = SearchFilters {
            industry: Some("technology".into()),
            location: Some("são paulo".into()),
            ..SearchFilters::default()
        };
        assert!(lead_matches_filters(&lead, &filters));

        let miss = SearchFilters {
            industry: Some("Finance".into()),
            ..SearchFilters::default()
        };
        assert!(!lead_matches_filters(&lead, &miss));

        let keyword_hit = SearchFilters {
            keywords: vec!["saas".into()],
            ..SearchFilters::default()
        };
        assert!(lead_matches_filters(&lead, &keyword_hit));
        let keyword_miss = SearchFilters {
            keywords: vec!["saas".into(), "fintech".into()],
            ..SearchFilters::default()
        };
        assert!(!lead_matches_filters(&lead, &keyword_miss));
    }

    #[test]
    fn missing_field_fails_its_filter() {
        let lead = Lead::named("Bare");
        let filters = SearchFilters {
            industry: Some("Technology".into()),
            ..SearchFilters::default()
        };
        assert!(!lead_matches_filters(&lead, &filters));
    }

    #[test]
    fn highlight_preserves_original_casing() {
        let lead = Lead {
            description: Some("Enterprise SaaS Solutions".into()),
            ..Lead::named("TechInova")
        };
        let parsed = ParsedQuery {
            terms: vec!["saas".into()],
            ..ParsedQuery::default()
        };
        let marked = highlight_fields(&lead, &parsed);
        assert_eq!(
            marked.get("description").map(String::as_str),
            Some("Enterprise <mark>SaaS</mark> Solutions")
        );
        assert!(!marked.contains_key("company"));
    }

    #[test]
    fn paginate_slices_and_handles_out_of_range() {
        let results: Vec<SearchResult> = Vec::new();
        assert!(paginate(results, 100, 10).is_empty());
    }
}
