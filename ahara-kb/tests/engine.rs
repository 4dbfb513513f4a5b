use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ahara_core::knowledge::KnowledgeEntry;
use ahara_core::model::{Dosha, FoodCategory};
use ahara_core::profile::{ClientProfile, DietType};
use ahara_core::resilience::RetryPolicy;
use ahara_core::retriever::CategoryRequest;
use ahara_core::Error;
use ahara_kb::{
    DietPlanRequest, EngineConfig, KbError, KnowledgeData, KnowledgeDb, MatchSource,
    NutritionEngine, SemanticConfig, SemanticQuery, SnapshotSource, SourceData, StaticSource,
};
use async_trait::async_trait;
use tempfile::tempdir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("ahara_kb=debug,ahara_core=debug")
        .with_test_writer()
        .try_init();
}

fn fixture() -> KnowledgeData {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/knowledge.json");
    KnowledgeData::from_json_file(path).unwrap()
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
    }
}

async fn engine() -> NutritionEngine {
    init_tracing();
    NutritionEngine::from_data(EngineConfig::default(), fixture())
        .await
        .unwrap()
}

#[tokio::test]
async fn diabetes_diet_query_returns_diabetes_entry() {
    let engine = engine().await;
    let hits = engine
        .semantic_search(SemanticQuery::new("diabetes diet").with_top_k(1))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entry.disorder_name, "Diabetes Mellitus (Type 1 & 2)");
    assert_eq!(hits[0].match_source, MatchSource::Semantic);
}

#[tokio::test]
async fn entry_text_query_ranks_that_entry_first() {
    let engine = engine().await;
    let snapshot = engine.snapshot().unwrap();
    for entry in snapshot.entries() {
        let hits = engine
            .semantic_search(SemanticQuery::new(entry.indexed_text()).with_top_k(3))
            .await
            .unwrap();
        assert_eq!(hits[0].entry.entry_id, entry.entry_id, "query: {}", entry.disorder_name);
    }
}

#[tokio::test]
async fn bad_rows_are_skipped_not_fatal() {
    let engine = engine().await;
    let stats = engine.stats().unwrap();
    // dosha intensity 9, unknown food 99, duplicate disorder, blank category
    assert_eq!(stats.skipped_rows, 4);
    assert_eq!(stats.total_entries, 7);
    assert_eq!(stats.vector_embeddings, 7);
    assert_eq!(stats.foods_by_category.values().sum::<usize>(), 8);
    assert_eq!(stats.category_distribution["Renal"], 2);
    assert!(stats.doshas.contains(&"Pitta-Vata".to_string()));
}

#[tokio::test]
async fn category_retrieval_applies_filters_and_scores() {
    let engine = engine().await;
    let profile = ClientProfile {
        primary_goal: Some("weight_loss".to_string()),
        dominant_dosha: Some(Dosha::Kapha),
        diet_type: DietType::Veg,
        allergies: vec!["nuts".to_string()],
        conditions: vec!["type_2_diabetes".to_string()],
        daily_sodium_limit_mg: None,
    };
    let response = engine
        .foods_by_category(&CategoryRequest::new(profile))
        .await
        .unwrap();

    let names = |category: FoodCategory| -> Vec<String> {
        response.foods_by_category[&category]
            .iter()
            .map(|f| f.name.clone())
            .collect()
    };
    // White Rice is marked unsafe for diabetics
    assert_eq!(names(FoodCategory::Grains), vec!["Oats"]);
    // Potato Chips are fried
    assert_eq!(names(FoodCategory::Vegetables), vec!["Bitter Gourd"]);
    // Almonds carry a tree nut allergen
    assert!(response.foods_by_category[&FoodCategory::NutsSeeds].is_empty());
    assert!(response.foods_by_category[&FoodCategory::Fruits].is_empty());

    assert_eq!(response.foods_by_category.len(), FoodCategory::ALL.len());
    assert_eq!(response.total_foods, 5);
    assert_eq!(response.total_categories, 5);
    assert_eq!(response.excluded_by_category[&FoodCategory::Grains], 1);

    let gourd = &response.foods_by_category[&FoodCategory::Vegetables][0];
    // 0.40*85 + 0.25*(4*20) + 0.20*90 + 0.15*80
    assert!((gourd.score - 84.0).abs() < 1e-9);
    let oats = &response.foods_by_category[&FoodCategory::Grains][0];
    assert!((oats.score - 56.0).abs() < 1e-9);
}

#[tokio::test]
async fn invalid_top_k_is_rejected() {
    let engine = engine().await;
    let err = engine
        .foods_by_category(&CategoryRequest::new(ClientProfile::default()).with_top_k(0))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
}

#[tokio::test]
async fn empty_and_non_positive_queries_return_nothing() {
    let engine = engine().await;
    assert!(engine
        .semantic_search(SemanticQuery::new(""))
        .await
        .unwrap()
        .is_empty());
    assert!(engine
        .semantic_search(SemanticQuery::new("kidney").with_top_k(0))
        .await
        .unwrap()
        .is_empty());
    assert!(engine
        .semantic_search(SemanticQuery::new("kidney").with_top_k(-1))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn fulltext_fallback_when_nothing_clears_floor() {
    init_tracing();
    let config = EngineConfig {
        semantic: SemanticConfig {
            min_similarity: 0.99,
            ..Default::default()
        },
        ..Default::default()
    };
    let engine = NutritionEngine::from_data(config, fixture()).await.unwrap();
    let hits = engine
        .semantic_search(SemanticQuery::new("heartburn esophagus").with_top_k(3))
        .await
        .unwrap();
    assert_eq!(hits[0].entry.entry_id, 6);
    assert_eq!(hits[0].match_source, MatchSource::FullText);
}

#[tokio::test]
async fn multi_condition_search_covers_each_condition() {
    let engine = engine().await;
    let hits = engine
        .semantic_search(
            SemanticQuery::new("nutrition plan")
                .with_top_k(5)
                .with_conditions(["hypertension", "chronic_kidney_disease"]),
        )
        .await
        .unwrap();
    let ids: BTreeSet<i64> = hits.iter().map(|h| h.entry.entry_id).collect();
    assert!(ids.contains(&3));
    assert!(ids.contains(&4));
    assert!(hits.windows(2).all(|w| w[0].relevance_score >= w[1].relevance_score));
}

#[tokio::test]
async fn lookups_and_diet_plan() {
    let engine = engine().await;
    let entry = engine.get_by_disorder("hypertension").unwrap().unwrap();
    assert_eq!(entry.entry_id, 3);
    assert_eq!(engine.search_by_disorder_name("kidney", 10).unwrap().len(), 2);
    assert_eq!(engine.filter_by_category("Renal", 1).unwrap().len(), 1);
    assert_eq!(engine.filter_by_dosha("pitta", 10).unwrap().len(), 3);

    let keyword = engine.fulltext_search("oxalate", None, 5).await.unwrap();
    assert_eq!(keyword[0].entry.entry_id, 5);

    let ctx = engine
        .retrieve_for_diet_plan(DietPlanRequest {
            query: "weekly meal plan".to_string(),
            health_conditions: vec!["obesity".to_string()],
            dietary_preferences: vec!["vegetarian".to_string()],
            dosha: Some("Kapha".to_string()),
            category: None,
            top_k: 3,
        })
        .await
        .unwrap();
    assert!(ctx.results.iter().any(|h| h.entry.entry_id == 2));
    assert!(ctx.results.len() <= 3);
    assert!(ctx.enhanced_query.starts_with("weekly meal plan | Health conditions: obesity"));
}

#[tokio::test]
async fn reload_with_same_data_is_a_no_op() {
    let engine = engine().await;
    let before = engine.snapshot().unwrap();
    let report = engine.reload().await.unwrap();
    assert!(!report.changed);
    assert_eq!(report.fingerprint, before.fingerprint());
    assert!(Arc::ptr_eq(&before, &engine.snapshot().unwrap()));
}

/// Alternates between two datasets on every load
struct AlternatingSource {
    loads: AtomicUsize,
    even: KnowledgeData,
    odd: KnowledgeData,
}

#[async_trait]
impl SnapshotSource for AlternatingSource {
    async fn load(&self) -> ahara_kb::Result<SourceData> {
        let n = self.loads.fetch_add(1, Ordering::SeqCst);
        let data = if n % 2 == 0 { &self.even } else { &self.odd };
        Ok(SourceData {
            data: data.clone(),
            skipped: Vec::new(),
        })
    }

    fn describe(&self) -> String {
        "alternating".to_string()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_see_partial_snapshots() {
    init_tracing();
    let even = fixture();
    let mut odd = fixture();
    odd.knowledge.push(KnowledgeEntry {
        entry_id: 10,
        category: "Respiratory".to_string(),
        disorder_name: "Asthma".to_string(),
        definition_etiology: "Reversible airway narrowing".to_string(),
        dosha_dominance: "Kapha-Vata".to_string(),
        ..Default::default()
    });
    let source = Arc::new(AlternatingSource {
        loads: AtomicUsize::new(0),
        even,
        odd,
    });
    let engine = Arc::new(NutritionEngine::new(EngineConfig::default(), source).unwrap());
    engine.reload().await.unwrap();

    let readers: Vec<_> = (0..6)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                for _ in 0..30 {
                    let snapshot = engine.snapshot().unwrap();
                    let n = snapshot.entries().len();
                    assert!(n == 7 || n == 8);
                    assert_eq!(snapshot.vectors().len(), n);
                    assert_eq!(snapshot.stats().total_entries, n);

                    let hits = engine
                        .semantic_search(SemanticQuery::new("kidney stones").with_top_k(2))
                        .await
                        .unwrap();
                    assert_eq!(hits[0].entry.entry_id, 5);
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for _ in 0..5 {
        let report = engine.reload().await.unwrap();
        assert!(report.changed);
    }
    for reader in readers {
        reader.await.unwrap();
    }
}

/// Fails with an unavailable store a fixed number of times
struct FlakySource {
    failures: usize,
    calls: AtomicUsize,
    data: KnowledgeData,
}

#[async_trait]
impl SnapshotSource for FlakySource {
    async fn load(&self) -> ahara_kb::Result<SourceData> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(KbError::Unavailable("database is locked".to_string()));
        }
        StaticSource::new(self.data.clone()).load().await
    }

    fn describe(&self) -> String {
        "flaky".to_string()
    }
}

#[tokio::test]
async fn reload_retries_unavailable_store() {
    init_tracing();
    let source = Arc::new(FlakySource {
        failures: 2,
        calls: AtomicUsize::new(0),
        data: fixture(),
    });
    let config = EngineConfig {
        retry: fast_retry(),
        ..Default::default()
    };
    let engine = NutritionEngine::new(config, source.clone()).unwrap();
    engine.reload().await.unwrap();
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    assert!(engine.snapshot().is_ok());
}

#[tokio::test]
async fn reload_gives_up_after_retry_budget() {
    init_tracing();
    let source = Arc::new(FlakySource {
        failures: 10,
        calls: AtomicUsize::new(0),
        data: fixture(),
    });
    let config = EngineConfig {
        retry: RetryPolicy {
            max_retries: 1,
            ..fast_retry()
        },
        ..Default::default()
    };
    let engine = NutritionEngine::new(config, source.clone()).unwrap();
    let err = engine.reload().await.unwrap_err();
    assert!(matches!(err, Error::StoreUnavailable(_)));
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn search_times_out_when_pool_is_saturated() {
    init_tracing();
    let config = EngineConfig {
        worker_threads: 1,
        search_timeout_ms: 50,
        ..Default::default()
    };
    let engine = NutritionEngine::from_data(config, fixture()).await.unwrap();

    let pool = engine.pool().clone();
    let holder = tokio::spawn(async move {
        pool.run("hold", || {
            std::thread::sleep(Duration::from_millis(400));
            Ok(())
        })
        .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = engine
        .semantic_search(SemanticQuery::new("diabetes"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
    holder.await.unwrap().unwrap();
}

#[tokio::test]
async fn category_timeout_fails_the_whole_request() {
    init_tracing();
    let config = EngineConfig {
        worker_threads: 1,
        category_timeout_ms: 50,
        ..Default::default()
    };
    let engine = NutritionEngine::from_data(config, fixture()).await.unwrap();

    let pool = engine.pool().clone();
    let holder = tokio::spawn(async move {
        pool.run("hold", || {
            std::thread::sleep(Duration::from_millis(400));
            Ok(())
        })
        .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = engine
        .foods_by_category(&CategoryRequest::new(ClientProfile::default()))
        .await;
    match result {
        Err(Error::Timeout { operation, timeout_ms }) => {
            assert_eq!(operation, "category_filter");
            assert_eq!(timeout_ms, 50);
        }
        other => panic!("expected a timeout, got {:?}", other),
    }
    holder.await.unwrap().unwrap();

    // the pool is free again, so the same request now succeeds
    let response = engine
        .foods_by_category(&CategoryRequest::new(ClientProfile::default()))
        .await
        .unwrap();
    assert_eq!(response.foods_by_category.len(), FoodCategory::ALL.len());
}

#[tokio::test]
async fn policy_top_k_limits_categories() {
    init_tracing();
    let config = EngineConfig::from_yaml("policy:\n  category:\n    top_k_per_category: 1\n")
        .unwrap();
    let engine = NutritionEngine::from_data(config, fixture()).await.unwrap();
    let response = engine
        .foods_by_category(&CategoryRequest::new(ClientProfile::default()))
        .await
        .unwrap();
    assert!(response.foods_by_category.values().all(|foods| foods.len() <= 1));
    assert_eq!(response.foods_by_category[&FoodCategory::Grains].len(), 1);

    let wider = engine
        .foods_by_category(&CategoryRequest::new(ClientProfile::default()).with_top_k(5))
        .await
        .unwrap();
    assert_eq!(wider.foods_by_category[&FoodCategory::Grains].len(), 2);
}

#[tokio::test]
async fn dosha_balancing_and_disease_safe_foods() {
    let engine = engine().await;

    let kapha = engine
        .dosha_balancing_foods(Dosha::Kapha, None, 10)
        .unwrap();
    let names: Vec<(&str, u8)> = kapha
        .iter()
        .map(|b| (b.food.item.name.as_str(), b.intensity))
        .collect();
    assert_eq!(names, vec![("Bitter Gourd", 4), ("Oats", 2)]);
    assert!(engine
        .dosha_balancing_foods(Dosha::Kapha, Some(FoodCategory::Dairy), 10)
        .unwrap()
        .is_empty());

    let safe = engine.disease_safe_foods("Diabetes", None).unwrap();
    let names: Vec<&str> = safe.iter().map(|r| r.item.name.as_str()).collect();
    // White Rice only carries a caution row
    assert_eq!(names, vec!["Bitter Gourd"]);
}

#[tokio::test]
async fn serves_the_bulk_sqlite_database() {
    init_tracing();
    let dir = tempdir().unwrap();
    let path = dir.path().join("ahara.db");
    KnowledgeDb::open(&path).unwrap().import(&fixture()).unwrap();

    let engine = NutritionEngine::open_sqlite(EngineConfig::default(), &path)
        .await
        .unwrap();
    let stats = engine.stats().unwrap();
    assert_eq!(stats.total_entries, 7);
    assert_eq!(stats.skipped_rows, 4);

    let hits = engine
        .semantic_search(SemanticQuery::new("diabetes diet").with_top_k(1))
        .await
        .unwrap();
    assert_eq!(hits[0].entry.entry_id, 1);
}

#[tokio::test]
async fn missing_database_is_store_unavailable() {
    init_tracing();
    let dir = tempdir().unwrap();
    let config = EngineConfig {
        retry: RetryPolicy::none(),
        ..Default::default()
    };
    let err = NutritionEngine::open_sqlite(config, dir.path().join("absent.db"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StoreUnavailable(_)));
}
