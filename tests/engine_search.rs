use std::sync::Arc;
use std::time::Duration;

use leadscout::cache::memory::InMemoryStore;
use leadscout::cache::CacheManager;
use leadscout::config::EngineConfig;
use leadscout::indexer::{BulkIndexOptions, CancelFlag};
use leadscout::model::types::{Lead, SearchFilters, SearchQuery, SortBy, UserPreferences};
use leadscout::search::{SearchEngine, SearchError};
use leadscout::storage::LeadStore;

fn engine_fixture() -> (Arc<LeadStore>, SearchEngine) {
    let store = Arc::new(LeadStore::open_in_memory().expect("open"));
    let cache = CacheManager::new(Arc::new(InMemoryStore::new()), EngineConfig::default());
    let engine = SearchEngine::new(store.clone(), cache, EngineConfig::default());
    (store, engine)
}

fn persisted(store: &LeadStore, mut lead: Lead) -> Lead {
    let id = store.insert_lead(&lead).expect("insert");
    lead.id = Some(id);
    lead
}

fn techinova() -> Lead {
    Lead {
        contact: Some("Maria Silva".into()),
        email: Some("maria@techinova.com.br".into()),
        industry: Some("Technology".into()),
        location: Some("São Paulo".into()),
        description: Some("Software development and SaaS solutions".into()),
        ..Lead::named("TechInova Solutions")
    }
}

#[test]
fn techinova_scenario_ranks_and_explains() {
    let (store, engine) = engine_fixture();
    let lead = persisted(&store, techinova());
    engine.indexer().index_lead(&lead).expect("index");

    let query = SearchQuery {
        filters: SearchFilters {
            industry: Some("Technology".into()),
            ..SearchFilters::default()
        },
        ..SearchQuery::text("saas technology")
    };
    let results = engine.search(&query, None);

    assert_eq!(results.len(), 1);
    let hit = &results[0];
    assert_eq!(hit.lead.company, "TechInova Solutions");
    assert!(hit.relevance_score > 0.0 && hit.relevance_score <= 1.0);
    assert!(
        hit.match_reasons
            .iter()
            .any(|r| r.contains("'saas'") && r.contains("description"))
    );
    assert!(
        hit.match_reasons
            .iter()
            .any(|r| r.contains("Exact industry match"))
    );
    assert!(
        hit.highlighted_fields
            .get("description")
            .is_some_and(|d| d.contains("<mark>SaaS</mark>"))
    );
}

#[test]
fn explicit_filter_beats_implicit_extraction() {
    let (store, engine) = engine_fixture();
    let tech = persisted(
        &store,
        Lead {
            industry: Some("Technology".into()),
            description: Some("Software platform".into()),
            ..Lead::named("TechWorks")
        },
    );
    let fin = persisted(
        &store,
        Lead {
            industry: Some("Finance".into()),
            description: Some("Software for banks".into()),
            ..Lead::named("FinWorks")
        },
    );
    engine.indexer().index_lead(&tech).unwrap();
    engine.indexer().index_lead(&fin).unwrap();

    // "software" implies industry=Technology; the explicit Finance filter
    // must win.
    let query = SearchQuery {
        filters: SearchFilters {
            industry: Some("Finance".into()),
            ..SearchFilters::default()
        },
        ..SearchQuery::text("software")
    };
    let results = engine.search(&query, None);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].lead.company, "FinWorks");

    // Without an explicit filter the implicit one takes effect.
    let results = engine.search(&SearchQuery::text("software companies"), None);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].lead.company, "TechWorks");
}

#[test]
fn pagination_slices_the_ranked_superset() {
    let (store, engine) = engine_fixture();
    for i in 0..5 {
        let lead = persisted(
            &store,
            Lead {
                description: Some("Logistics software".into()),
                ..Lead::named(format!("Cargo {i}"))
            },
        );
        engine.indexer().index_lead(&lead).unwrap();
    }

    let full = engine.search(
        &SearchQuery {
            limit: 100,
            ..SearchQuery::text("logistics")
        },
        None,
    );
    assert_eq!(full.len(), 5);

    let page = |offset| {
        engine.search(
            &SearchQuery {
                limit: 2,
                offset,
                ..SearchQuery::text("logistics")
            },
            None,
        )
    };
    assert_eq!(page(0), full[0..2].to_vec());
    assert_eq!(page(2), full[2..4].to_vec());
    assert_eq!(page(4), full[4..5].to_vec());
    assert!(page(99).is_empty());
}

#[test]
fn cache_hit_returns_identical_ranking() {
    let (store, engine) = engine_fixture();
    for i in 0..3 {
        let lead = persisted(
            &store,
            Lead {
                industry: Some("Technology".into()),
                description: Some(format!("SaaS product suite {i}")),
                ..Lead::named(format!("Vendor {i}"))
            },
        );
        engine.indexer().index_lead(&lead).unwrap();
    }

    let query = SearchQuery::text("saas");
    let miss = engine.search(&query, None);
    let hit = engine.search(&query, None);
    assert_eq!(miss, hit);

    // After invalidation the recomputed ranking still agrees.
    assert!(engine.invalidate_search_cache() > 0);
    let recomputed = engine.search(&query, None);
    assert_eq!(miss, recomputed);
}

#[test]
fn created_at_sort_orders_recently_indexed_first() {
    let (store, engine) = engine_fixture();
    let alpha = persisted(
        &store,
        Lead {
            description: Some("Fleet telemetry".into()),
            ..Lead::named("Telemetry Alpha")
        },
    );
    let beta = persisted(
        &store,
        Lead {
            description: Some("Fleet telemetry".into()),
            ..Lead::named("Telemetry Beta")
        },
    );
    engine.indexer().index_lead(&alpha).unwrap();
    // Distinct indexed_at stamps at millisecond resolution.
    std::thread::sleep(Duration::from_millis(5));
    engine.indexer().index_lead(&beta).unwrap();

    let by_relevance = engine.search(&SearchQuery::text("telemetry"), None);
    assert_eq!(by_relevance.len(), 2);
    // Identical scores: the id tie-break keeps the older lead first.
    assert_eq!(
        by_relevance[0].relevance_score,
        by_relevance[1].relevance_score
    );
    assert_eq!(by_relevance[0].lead.company, "Telemetry Alpha");

    let by_recency = engine.search(
        &SearchQuery {
            sort_by: SortBy::CreatedAt,
            ..SearchQuery::text("telemetry")
        },
        None,
    );
    assert_eq!(by_recency[0].lead.company, "Telemetry Beta");
    assert_eq!(by_recency[1].lead.company, "Telemetry Alpha");
}

#[test]
fn filters_only_query_selects_candidates() {
    let (store, engine) = engine_fixture();
    persisted(
        &store,
        Lead {
            industry: Some("Healthcare".into()),
            ..Lead::named("MediCare Plus")
        },
    );
    persisted(
        &store,
        Lead {
            industry: Some("Education".into()),
            ..Lead::named("EduSmart")
        },
    );

    let query = SearchQuery {
        filters: SearchFilters {
            industry: Some("Healthcare".into()),
            ..SearchFilters::default()
        },
        ..SearchQuery::default()
    };
    let results = engine.search(&query, None);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].lead.company, "MediCare Plus");
}

#[test]
fn unindexed_corpus_falls_back_to_record_store() {
    let (store, engine) = engine_fixture();
    // Never indexed: the token path yields nothing.
    persisted(
        &store,
        Lead {
            description: Some("Solar panel installation".into()),
            ..Lead::named("SunPower Co")
        },
    );

    let results = engine.search(&SearchQuery::text("solar"), None);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].lead.company, "SunPower Co");
}

#[test]
fn disabled_cache_keeps_search_correct() {
    let store = Arc::new(LeadStore::open_in_memory().expect("open"));
    let cache = CacheManager::disabled(EngineConfig::default());
    let engine = SearchEngine::new(store.clone(), cache, EngineConfig::default());

    let lead = persisted(&store, techinova());
    engine.indexer().index_lead(&lead).expect("index still succeeds");

    let results = engine.search(&SearchQuery::text("saas"), None);
    assert_eq!(results.len(), 1);
    // Same answer on the second, equally uncached, call.
    let again = engine.search(&SearchQuery::text("saas"), None);
    assert_eq!(results, again);
    assert!(!engine.stats().cache.available);
}

#[test]
fn cancelled_search_aborts_without_partial_results() {
    let (store, engine) = engine_fixture();
    persisted(&store, techinova());

    let cancel = CancelFlag::new();
    cancel.cancel();
    let err = engine
        .search_with_cancel(&SearchQuery::text("saas"), None, &cancel)
        .expect_err("must cancel");
    assert!(matches!(err, SearchError::Cancelled));

    // The infallible wrapper swallows nothing silently relevant: a fresh
    // flag searches normally.
    let results = engine.search(&SearchQuery::text("saas"), None);
    assert_eq!(results.len(), 1);
}

#[test]
fn preferences_shape_ranking() {
    let (store, engine) = engine_fixture();
    let plain = persisted(
        &store,
        Lead {
            industry: Some("Agriculture".into()),
            description: Some("Crop analytics".into()),
            ..Lead::named("AgroData")
        },
    );
    let preferred = persisted(
        &store,
        Lead {
            industry: Some("Technology".into()),
            description: Some("Crop analytics".into()),
            ..Lead::named("AgriTech")
        },
    );
    engine.indexer().index_lead(&plain).unwrap();
    engine.indexer().index_lead(&preferred).unwrap();

    let prefs = UserPreferences {
        preferred_industries: vec!["Technology".into()],
        ..UserPreferences::default()
    };
    let results = engine.search(&SearchQuery::text("crop analytics"), Some(&prefs));
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].lead.company, "AgriTech");
    assert!(
        results[0]
            .match_reasons
            .iter()
            .any(|r| r.contains("preferred industry"))
    );
}

#[test]
fn suggestions_combine_popularity_and_store_values() {
    let (store, engine) = engine_fixture();
    let lead = persisted(
        &store,
        Lead {
            industry: Some("Technology".into()),
            description: Some("SaaS billing".into()),
            ..Lead::named("SaaSify")
        },
    );
    engine.indexer().index_lead(&lead).unwrap();

    // Two searches make "saas billing" the top popular query.
    engine.search(&SearchQuery::text("saas billing"), None);
    engine.search(&SearchQuery::text("saas billing"), None);

    let suggestions = engine.suggestions("sa", 10);
    assert_eq!(suggestions[0], "saas billing");
    assert!(suggestions.contains(&"SaaSify".to_string()));

    // Cached on the lowercased prefix: same list for a different casing.
    assert_eq!(engine.suggestions("SA", 10), suggestions);
    // Too-short prefixes never suggest.
    assert!(engine.suggestions("s", 10).is_empty());
}

#[test]
fn stats_reports_coverage_and_popularity() {
    let (store, engine) = engine_fixture();
    let lead = persisted(&store, techinova());
    engine.indexer().index_lead(&lead).unwrap();
    persisted(&store, Lead::named("Unindexed Co"));

    engine.search(&SearchQuery::text("saas"), None);

    let stats = engine.stats();
    assert_eq!(stats.indexing.total_leads, 2);
    assert_eq!(stats.indexing.indexed_leads, 1);
    assert!(stats.cache.available);
    assert!(stats.popular_searches.contains(&"saas".to_string()));
}

#[test]
fn bulk_index_makes_corpus_searchable() {
    let (store, engine) = engine_fixture();
    for i in 0..4 {
        persisted(
            &store,
            Lead {
                description: Some("Warehouse robotics".into()),
                ..Lead::named(format!("Robo {i}"))
            },
        );
    }
    let stats = engine
        .indexer()
        .bulk_index(&BulkIndexOptions::default())
        .unwrap();
    assert_eq!(stats.indexed_leads, 4);

    let results = engine.search(&SearchQuery::text("robotics"), None);
    assert_eq!(results.len(), 4);
}
