//! Lead indexer: metadata extraction, inverted-index maintenance, and bulk
//! runs.
//!
//! The indexer is the only writer of `indexed_at` and of the `index:` token
//! namespace. Index entries are derived data; losing them degrades search to
//! the relational fallback but never loses leads. Bulk runs are long-running
//! and cancellable between batches, with per-lead failures recorded rather
//! than aborting the run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use chrono::Utc;
use fxhash::FxHashSet;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::CacheManager;
use crate::model::types::{IndexedLead, IndexingStats, IndexingStatus, Lead};
use crate::search::text::{is_stop_word, normalize, tokenize};
use crate::storage::{LeadStore, StoreError};

/// Error from indexing a single lead or enumerating the corpus.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("lead has no id; persist it before indexing")]
    MissingId,
    #[error("lead {0} not found in the record store")]
    NotFound(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Cooperative cancellation handle shared between a bulk run and its caller.
///
/// Checked between batches (and at the search checkpoints), so cancellation
/// granularity is one batch, never mid-lead.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Live progress of a bulk indexing run, readable from other threads.
#[derive(Debug, Default)]
pub struct IndexingProgress {
    pub total: AtomicUsize,
    pub current: AtomicUsize,
    pub failed: AtomicUsize,
    pub last_error: Mutex<Option<String>>,
}

impl IndexingProgress {
    fn record_failure(&self, error: &str) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(error.to_string());
    }
}

/// Options for [`LeadIndexer::bulk_index`].
#[derive(Clone, Default)]
pub struct BulkIndexOptions {
    /// Restrict the run to these leads; `None` means the whole corpus.
    pub lead_ids: Option<Vec<i64>>,
    /// Batch size override; `None` uses the configured default.
    pub batch_size: Option<usize>,
    pub cancel: Option<CancelFlag>,
    pub progress: Option<Arc<IndexingProgress>>,
}

// Auto-keyword heuristics run over the raw description so capitalization is
// still observable; extracted words are normalized afterwards.
static CAPITALIZED_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-z]+\b").expect("valid regex"));
static TECHNICAL_TERM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\w*[0-9]\w*|[A-Z]{2,})\b").expect("valid regex"));

const MAX_AUTO_KEYWORDS: usize = 10;
const MIN_KEYWORD_LEN: usize = 3;
const MIN_TOKEN_LEN: usize = 2;

/// Explicit keywords first, then auto-extracted candidates from the raw
/// description, normalized, stop-word-filtered, capped.
fn derive_keywords(explicit: &[String], description: Option<&str>) -> Vec<String> {
    let mut seen = FxHashSet::default();
    let mut keywords: Vec<String> = explicit
        .iter()
        .map(|k| normalize(k))
        .filter(|k| !k.is_empty() && seen.insert(k.clone()))
        .collect();

    if let Some(raw) = description {
        let candidates = CAPITALIZED_WORD
            .find_iter(raw)
            .chain(TECHNICAL_TERM.find_iter(raw))
            .map(|m| m.as_str().to_lowercase());
        for word in candidates {
            if keywords.len() >= MAX_AUTO_KEYWORDS {
                break;
            }
            if word.chars().count() >= MIN_KEYWORD_LEN
                && !is_stop_word(&word)
                && seen.insert(word.clone())
            {
                keywords.push(word);
            }
        }
    }
    keywords
}

/// Maintains the inverted index and the lead projections.
pub struct LeadIndexer {
    store: Arc<LeadStore>,
    cache: CacheManager,
    batch_size: usize,
}

impl LeadIndexer {
    pub fn new(store: Arc<LeadStore>, cache: CacheManager, batch_size: usize) -> Self {
        LeadIndexer {
            store,
            cache,
            batch_size,
        }
    }

    /// Build the read-optimized projection for a lead. Fails only when the
    /// lead has never been persisted.
    pub fn extract_metadata(&self, lead: &Lead) -> Result<IndexedLead> {
        let id = lead.id.ok_or(IndexError::MissingId)?;

        let keywords = derive_keywords(&lead.keywords, lead.description.as_deref());
        let company_tokens = tokenize(&normalize(&lead.company));
        let industry_tokens = tokenize(&normalize(lead.industry.as_deref().unwrap_or_default()));
        let location_tokens = tokenize(&normalize(lead.location.as_deref().unwrap_or_default()));

        let searchable_text = normalize(
            &[
                lead.company.as_str(),
                lead.description.as_deref().unwrap_or_default(),
                lead.industry.as_deref().unwrap_or_default(),
                lead.location.as_deref().unwrap_or_default(),
                &keywords.join(" "),
                lead.contact.as_deref().unwrap_or_default(),
                lead.email.as_deref().unwrap_or_default(),
                lead.website.as_deref().unwrap_or_default(),
            ]
            .join(" "),
        );

        Ok(IndexedLead {
            id,
            company: lead.company.clone(),
            contact: lead.contact.clone().unwrap_or_default(),
            email: lead.email.clone().unwrap_or_default(),
            phone: lead.phone.clone().unwrap_or_default(),
            website: lead.website.clone().unwrap_or_default(),
            industry: lead.industry.clone().unwrap_or_default(),
            location: lead.location.clone().unwrap_or_default(),
            revenue: lead.revenue.clone().unwrap_or_default(),
            employees: lead.employees.clone().unwrap_or_default(),
            description: lead.description.clone().unwrap_or_default(),
            keywords,
            searchable_text,
            indexed_at: lead.indexed_at,
            company_tokens,
            industry_tokens,
            location_tokens,
        })
    }

    /// All distinct tokens a lead is filed under, including the compound
    /// category keys.
    fn index_tokens(projection: &IndexedLead) -> Vec<String> {
        let mut seen = FxHashSet::default();
        let mut tokens = Vec::new();
        let mut push = |token: String| {
            if token.chars().count() >= MIN_TOKEN_LEN && seen.insert(token.clone()) {
                tokens.push(token);
            }
        };

        for token in tokenize(&projection.searchable_text) {
            push(token);
        }
        for token in projection
            .company_tokens
            .iter()
            .chain(&projection.industry_tokens)
            .chain(&projection.location_tokens)
            .chain(&projection.keywords)
        {
            push(token.clone());
        }
        // Compound keys for exact-category lookups.
        if let Some(first) = projection.industry_tokens.first() {
            push(format!("industry:{first}"));
        }
        if let Some(first) = projection.location_tokens.first() {
            push(format!("location:{first}"));
        }
        tokens
    }

    /// Index one lead: stamp `indexed_at`, write every token entry, cache the
    /// projection. On error the lead is reported failed; already-written
    /// token entries are not rolled back.
    pub fn index_lead(&self, lead: &Lead) -> Result<IndexedLead> {
        let mut projection = self.extract_metadata(lead)?;
        let now = Utc::now();
        self.store.mark_indexed(projection.id, now)?;
        projection.indexed_at = Some(now);

        let tokens = Self::index_tokens(&projection);
        for token in &tokens {
            self.cache.index_add(token, projection.id);
        }
        self.cache.cache_lead(&projection);
        debug!(lead_id = projection.id, tokens = tokens.len(), "lead_indexed");
        Ok(projection)
    }

    /// Retract a lead from the index. The cached projection supplies the
    /// token universe; without it retraction is a no-op and stale entries may
    /// persist until the next full reindex.
    pub fn remove_from_index(&self, lead_id: i64) -> bool {
        let Some(projection) = self.cache.cached_lead(lead_id) else {
            debug!(lead_id, "remove_skipped_no_projection");
            return false;
        };
        for token in Self::index_tokens(&projection) {
            self.cache.index_remove(&token, lead_id);
        }
        self.cache.invalidate_lead(lead_id);
        if let Err(err) = self.store.clear_indexed(lead_id) {
            warn!(lead_id, %err, "clear_indexed_failed");
        }
        debug!(lead_id, "lead_removed_from_index");
        true
    }

    /// Index a set of leads (or the whole corpus) in batches. A single
    /// lead's failure is recorded and the run continues; only a corpus that
    /// cannot be enumerated at all is a terminal error.
    pub fn bulk_index(&self, opts: &BulkIndexOptions) -> Result<IndexingStats> {
        let started = Instant::now();
        let batch_size = opts.batch_size.unwrap_or(self.batch_size).max(1);
        let mut stats = IndexingStats::default();

        let total = match &opts.lead_ids {
            Some(ids) => ids.len(),
            None => self.store.count_leads()? as usize,
        };
        if let Some(progress) = &opts.progress {
            progress.total.store(total, Ordering::Relaxed);
            progress.current.store(0, Ordering::Relaxed);
            progress.failed.store(0, Ordering::Relaxed);
        }
        info!(total, batch_size, "bulk_index_start");

        let mut offset = 0;
        loop {
            if opts.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
                info!(processed = stats.total_leads, "bulk_index_cancelled");
                break;
            }

            let batch = match &opts.lead_ids {
                Some(ids) => {
                    let Some(chunk) = ids.get(offset..(offset + batch_size).min(ids.len()))
                    else {
                        break;
                    };
                    if chunk.is_empty() {
                        break;
                    }
                    self.fetch_requested(chunk, &mut stats, opts.progress.as_deref())?
                }
                None => self.store.page(offset, batch_size)?,
            };
            if batch.is_empty() && stats.total_leads >= total {
                break;
            }

            for lead in &batch {
                stats.total_leads += 1;
                match self.index_lead(lead) {
                    Ok(_) => stats.indexed_leads += 1,
                    Err(err) => {
                        let id = lead.id.map_or_else(|| "?".to_string(), |i| i.to_string());
                        let message = format!("lead {id}: {err}");
                        warn!(lead_id = ?lead.id, %err, "index_lead_failed");
                        if let Some(progress) = &opts.progress {
                            progress.record_failure(&message);
                        }
                        stats.failed_leads += 1;
                        stats.errors.push(message);
                    }
                }
                if let Some(progress) = &opts.progress {
                    progress.current.fetch_add(1, Ordering::Relaxed);
                }
            }

            offset += batch_size;
            if offset >= total {
                break;
            }
        }

        stats.processing_time = started.elapsed().as_secs_f64();
        info!(
            total = stats.total_leads,
            indexed = stats.indexed_leads,
            failed = stats.failed_leads,
            seconds = stats.processing_time,
            "bulk_index_complete"
        );
        Ok(stats)
    }

    /// Resolve one requested-ID chunk, recording ids that no longer exist as
    /// failures instead of aborting the run.
    fn fetch_requested(
        &self,
        chunk: &[i64],
        stats: &mut IndexingStats,
        progress: Option<&IndexingProgress>,
    ) -> Result<Vec<Lead>> {
        let found = self.store.find_by_ids(chunk)?;
        if found.len() < chunk.len() {
            let present: FxHashSet<i64> = found.iter().filter_map(|l| l.id).collect();
            for id in chunk.iter().filter(|id| !present.contains(id)) {
                let message = format!("lead {id}: {}", IndexError::NotFound(*id));
                warn!(lead_id = id, "index_lead_missing");
                stats.total_leads += 1;
                stats.failed_leads += 1;
                stats.errors.push(message.clone());
                if let Some(progress) = progress {
                    progress.current.fetch_add(1, Ordering::Relaxed);
                    progress.record_failure(&message);
                }
            }
        }
        Ok(found)
    }

    /// Drop every token set, then rebuild the index over the whole corpus.
    pub fn reindex_all(&self, opts: &BulkIndexOptions) -> Result<IndexingStats> {
        let cleared = self.cache.clear_index();
        info!(cleared, "reindex_cleared_tokens");
        let opts = BulkIndexOptions {
            lead_ids: None,
            ..opts.clone()
        };
        self.bulk_index(&opts)
    }

    /// AND-semantics lookup: leads filed under every given token. A single
    /// token degenerates to plain set membership. Compound category keys
    /// (`industry:…`, `location:…`) carry a colon and skip word
    /// normalization, which would split them.
    pub fn search_by_tokens(&self, tokens: &[String], limit: usize) -> Vec<i64> {
        let normalized: Vec<String> = tokens
            .iter()
            .map(|t| {
                if t.contains(':') {
                    t.trim().to_lowercase()
                } else {
                    normalize(t)
                }
            })
            .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
            .collect();
        if normalized.is_empty() {
            return Vec::new();
        }
        let mut ids = self.cache.index_intersect(&normalized);
        ids.truncate(limit);
        ids
    }

    /// Corpus coverage: how much of the record store is searchable via the
    /// index path.
    pub fn indexing_status(&self) -> Result<IndexingStatus> {
        let total = self.store.count_leads()?;
        let indexed = self.store.count_indexed()?;
        let coverage = if total == 0 {
            0.0
        } else {
            indexed as f64 / total as f64 * 100.0
        };
        Ok(IndexingStatus {
            total_leads: total,
            indexed_leads: indexed,
            unindexed_leads: total - indexed,
            coverage_percent: coverage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::InMemoryStore;
    use crate::config::EngineConfig;

    fn fixture() -> (Arc<LeadStore>, CacheManager, LeadIndexer) {
        let store = Arc::new(LeadStore::open_in_memory().expect("open"));
        let cache = CacheManager::new(Arc::new(InMemoryStore::new()), EngineConfig::default());
        let indexer = LeadIndexer::new(store.clone(), cache.clone(), 100);
        (store, cache, indexer)
    }

    fn sample_lead() -> Lead {
        Lead {
            industry: Some("Technology".into()),
            location: Some("São Paulo".into()),
            description: Some("Software development and SaaS solutions".into()),
            keywords: vec!["cloud".into()],
            ..Lead::named("TechInova Solutions")
        }
    }

    fn persisted(store: &LeadStore, mut lead: Lead) -> Lead {
        let id = store.insert_lead(&lead).expect("insert");
        lead.id = Some(id);
        lead
    }

    #[test]
    fn derive_keywords_prefers_explicit_then_heuristics() {
        let keywords = derive_keywords(
            &["CRM".into()],
            Some("Enterprise ERP platform with SQL2019 support"),
        );
        assert_eq!(keywords[0], "crm");
        assert!(keywords.contains(&"enterprise".to_string()));
        assert!(keywords.contains(&"erp".to_string()));
        assert!(keywords.contains(&"sql2019".to_string()));
        assert!(keywords.len() <= MAX_AUTO_KEYWORDS);
    }

    #[test]
    fn derive_keywords_skips_stop_words_and_short_words() {
        let keywords = derive_keywords(&[], Some("The Best AI and IT teams"));
        // "the"/"and" are stop words, "AI"/"IT" too short.
        assert_eq!(keywords, vec!["best".to_string()]);
    }

    #[test]
    fn extract_metadata_requires_persisted_lead() {
        let (_, _, indexer) = fixture();
        assert!(matches!(
            indexer.extract_metadata(&sample_lead()),
            Err(IndexError::MissingId)
        ));
    }

    #[test]
    fn extract_metadata_builds_searchable_text_and_tokens() {
        let (store, _, indexer) = fixture();
        let lead = persisted(&store, sample_lead());
        let projection = indexer.extract_metadata(&lead).unwrap();

        assert_eq!(projection.company_tokens, vec!["techinova", "solutions"]);
        assert_eq!(projection.industry_tokens, vec!["technology"]);
        assert_eq!(projection.location_tokens, vec!["são", "paulo"]);
        assert!(projection.searchable_text.contains("saas"));
        assert!(projection.searchable_text.contains("techinova"));
        // Explicit keyword survives into the derived list.
        assert!(projection.keywords.contains(&"cloud".to_string()));
    }

    #[test]
    fn index_lead_writes_tokens_marker_and_projection() {
        let (store, cache, indexer) = fixture();
        let lead = persisted(&store, sample_lead());
        let projection = indexer.index_lead(&lead).unwrap();
        let id = projection.id;

        assert!(projection.indexed_at.is_some());
        assert_eq!(store.count_indexed().unwrap(), 1);
        assert_eq!(cache.index_members("saas"), vec![id]);
        assert_eq!(cache.index_members("industry:technology"), vec![id]);
        assert_eq!(cache.index_members("location:são"), vec![id]);
        assert_eq!(cache.cached_lead(id).map(|p| p.id), Some(id));
    }

    #[test]
    fn reindexing_same_lead_is_idempotent() {
        let (store, cache, indexer) = fixture();
        let lead = persisted(&store, sample_lead());

        let first = indexer.index_lead(&lead).unwrap();
        let members_first = cache.index_members("techinova");
        let second = indexer.index_lead(&lead).unwrap();

        assert_eq!(first.searchable_text, second.searchable_text);
        assert_eq!(first.keywords, second.keywords);
        assert_eq!(cache.index_members("techinova"), members_first);
    }

    #[test]
    fn remove_retracts_every_token() {
        let (store, cache, indexer) = fixture();
        let lead = persisted(&store, sample_lead());
        let id = indexer.index_lead(&lead).unwrap().id;

        assert!(indexer.remove_from_index(id));
        assert!(cache.index_members("saas").is_empty());
        assert!(cache.index_members("industry:technology").is_empty());
        assert!(cache.cached_lead(id).is_none());
        assert_eq!(store.count_indexed().unwrap(), 0);
        assert!(indexer.search_by_tokens(&["techinova".into()], 10).is_empty());
    }

    #[test]
    fn remove_without_projection_is_noop() {
        let (_, _, indexer) = fixture();
        assert!(!indexer.remove_from_index(999));
    }

    #[test]
    fn search_by_tokens_intersects() {
        let (store, _, indexer) = fixture();
        let tech = persisted(&store, sample_lead());
        let other = persisted(
            &store,
            Lead {
                industry: Some("Technology".into()),
                description: Some("Hardware retail".into()),
                ..Lead::named("ChipMart")
            },
        );
        let tech_id = indexer.index_lead(&tech).unwrap().id;
        let other_id = indexer.index_lead(&other).unwrap().id;

        let mut both = indexer.search_by_tokens(&["technology".into()], 10);
        both.sort_unstable();
        assert_eq!(both, vec![tech_id, other_id]);

        assert_eq!(
            indexer.search_by_tokens(&["technology".into(), "saas".into()], 10),
            vec![tech_id]
        );
        // Normalization applies to the lookup side too.
        assert_eq!(
            indexer.search_by_tokens(&["SaaS!".into()], 10),
            vec![tech_id]
        );
        assert!(indexer.search_by_tokens(&[], 10).is_empty());
        assert!(indexer.search_by_tokens(&["a".into()], 10).is_empty());
    }

    #[test]
    fn bulk_index_records_failures_and_continues() {
        let (store, _, indexer) = fixture();
        let a = persisted(&store, sample_lead());
        let b = persisted(&store, Lead::named("Beta Corp"));

        let opts = BulkIndexOptions {
            lead_ids: Some(vec![a.id.unwrap(), b.id.unwrap(), 999]),
            ..BulkIndexOptions::default()
        };
        let stats = indexer.bulk_index(&opts).unwrap();
        assert_eq!(stats.total_leads, 3);
        assert_eq!(stats.indexed_leads, 2);
        assert_eq!(stats.failed_leads, 1);
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].contains("999"));
    }

    #[test]
    fn bulk_index_whole_corpus_in_small_batches() {
        let (store, _, indexer) = fixture();
        for i in 0..7 {
            persisted(&store, Lead::named(format!("Company {i}")));
        }
        let progress = Arc::new(IndexingProgress::default());
        let opts = BulkIndexOptions {
            batch_size: Some(2),
            progress: Some(progress.clone()),
            ..BulkIndexOptions::default()
        };
        let stats = indexer.bulk_index(&opts).unwrap();
        assert_eq!(stats.total_leads, 7);
        assert_eq!(stats.indexed_leads, 7);
        assert_eq!(stats.failed_leads, 0);
        assert_eq!(progress.current.load(Ordering::Relaxed), 7);
        assert_eq!(progress.total.load(Ordering::Relaxed), 7);
    }

    #[test]
    fn cancelled_run_stops_between_batches() {
        let (store, _, indexer) = fixture();
        for i in 0..6 {
            persisted(&store, Lead::named(format!("Company {i}")));
        }
        let cancel = CancelFlag::new();
        cancel.cancel();
        let opts = BulkIndexOptions {
            batch_size: Some(2),
            cancel: Some(cancel),
            ..BulkIndexOptions::default()
        };
        let stats = indexer.bulk_index(&opts).unwrap();
        assert_eq!(stats.total_leads, 0);
    }

    #[test]
    fn reindex_all_clears_stale_tokens() {
        let (store, cache, indexer) = fixture();
        let lead = persisted(&store, sample_lead());
        let id = indexer.index_lead(&lead).unwrap().id;

        // Poison the index with a token no lead carries anymore.
        cache.index_add("stale-token", id);
        let stats = indexer.reindex_all(&BulkIndexOptions::default()).unwrap();
        assert_eq!(stats.indexed_leads, 1);
        assert!(cache.index_members("stale-token").is_empty());
        assert_eq!(cache.index_members("saas"), vec![id]);
    }

    #[test]
    fn indexing_status_reports_coverage() {
        let (store, _, indexer) = fixture();
        let a = persisted(&store, sample_lead());
        persisted(&store, Lead::named("Unindexed Co"));
        indexer.index_lead(&a).unwrap();

        let status = indexer.indexing_status().unwrap();
        assert_eq!(status.total_leads, 2);
        assert_eq!(status.indexed_leads, 1);
        assert_eq!(status.unindexed_leads, 1);
        assert!((status.coverage_percent - 50.0).abs() < 1e-9);
    }
}
