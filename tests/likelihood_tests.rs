//! Frequency model tests against stored historical samples.

mod common;

use std::sync::Arc;

use common::{registry, start};
use ferrywatch::models::prediction::{ConfidenceTier, HistoricalSample, LikelihoodBasis, WindBin, WindRelation};
use ferrywatch::models::weather::AdvisoryLevel;
use ferrywatch::models::{CorridorId, OperatorId, SailingStatus};
use ferrywatch::repository::{HistoryStore, MemoryStore};
use ferrywatch::services::risk::{FrequencyModel, LikelihoodQuery};

async fn seed(store: &MemoryStore, operator: &str, corridor: &str, wind: f64, total: usize, canceled: usize) {
    for i in 0..total {
        let status = if i < canceled {
            SailingStatus::Canceled
        } else {
            SailingStatus::OnTime
        };
        let sample = HistoricalSample {
            sailing_id: format!("{operator}-{corridor}-{wind}-{i}"),
            operator_id: OperatorId::new(operator),
            corridor_id: CorridorId::new(corridor),
            wind_speed_mph: wind,
            status,
            recorded_at: start(),
        };
        assert!(store.record_sample(&sample).await.unwrap());
    }
}

fn query(operator: &str, corridor: &str, wind: f64) -> LikelihoodQuery {
    LikelihoodQuery {
        operator_id: OperatorId::new(operator),
        corridor_id: CorridorId::new(corridor),
        wind_speed_mph: wind,
        advisory: AdvisoryLevel::None,
        relation: None,
    }
}

#[tokio::test]
async fn test_operator_history_combines_weather_and_baseline() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "ssa", "hy-nan", 28.0, 100, 20).await;
    seed(&store, "ssa", "hy-nan", 8.0, 200, 2).await;
    let model = FrequencyModel::new(store, registry());

    let estimate = model.estimate(&query("ssa", "hy-nan", 30.0)).await.unwrap();

    assert!((estimate.p_cancel_total - 0.208).abs() < 1e-9, "got {}", estimate.p_cancel_total);
    assert_eq!(estimate.likelihood_to_run_pct, 79);
    assert_eq!(estimate.wind_bin, WindBin::From25To35);
    assert_eq!(estimate.basis, LikelihoodBasis::OperatorHistory);
    assert_eq!(estimate.confidence, ConfidenceTier::High);
    assert_eq!(estimate.sample_size, 300);
}

#[tokio::test]
async fn test_peer_history_is_borrowed_and_demoted() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "ssa", "hy-nan", 28.0, 100, 20).await;
    seed(&store, "ssa", "hy-nan", 8.0, 200, 2).await;
    let model = FrequencyModel::new(store, registry());

    let estimate = model.estimate(&query("hlc", "hy-nan", 30.0)).await.unwrap();

    assert_eq!(
        estimate.basis,
        LikelihoodBasis::CrossOperatorHistory {
            borrowed_from: OperatorId::new("ssa")
        }
    );
    assert_eq!(estimate.likelihood_to_run_pct, 79);
    assert_eq!(estimate.confidence, ConfidenceTier::Medium, "Borrowed history loses one tier");
}

#[tokio::test]
async fn test_thin_own_history_defers_to_well_sampled_peer() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "hlc", "hy-nan", 28.0, 1, 1).await;
    seed(&store, "ssa", "hy-nan", 28.0, 100, 10).await;
    seed(&store, "ssa", "hy-nan", 8.0, 20, 0).await;
    let model = FrequencyModel::new(store, registry());

    let estimate = model.estimate(&query("hlc", "hy-nan", 30.0)).await.unwrap();

    assert_eq!(
        estimate.basis,
        LikelihoodBasis::CrossOperatorHistory {
            borrowed_from: OperatorId::new("ssa")
        },
        "One sample must not outweigh a peer's 120"
    );
    assert_eq!(estimate.sample_size, 120);
    assert_eq!(estimate.likelihood_to_run_pct, 90);
    assert_eq!(estimate.confidence, ConfidenceTier::Medium);
}

#[tokio::test]
async fn test_thin_own_history_kept_without_better_peer() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "hlc", "hy-nan", 28.0, 10, 1).await;
    let model = FrequencyModel::new(store, registry());

    let estimate = model.estimate(&query("hlc", "hy-nan", 30.0)).await.unwrap();

    assert_eq!(estimate.basis, LikelihoodBasis::OperatorHistory);
    assert_eq!(estimate.sample_size, 10);
    assert_eq!(estimate.confidence, ConfidenceTier::Low);
}

#[tokio::test]
async fn test_no_history_uses_default_bands() {
    let store = Arc::new(MemoryStore::new());
    let model = FrequencyModel::new(store, registry());

    let calm = model.estimate(&query("ssa", "wh-vh", 9.0)).await.unwrap();
    assert_eq!(calm.likelihood_to_run_pct, 98);
    assert_eq!(calm.basis, LikelihoodBasis::DefaultBands);
    assert_eq!(calm.confidence, ConfidenceTier::Low);

    let mut rough = query("ssa", "wh-vh", 38.0);
    rough.advisory = AdvisoryLevel::Gale;
    rough.relation = Some(WindRelation::Crosswind);
    let estimate = model.estimate(&rough).await.unwrap();
    assert_eq!(estimate.likelihood_to_run_pct, 15);
    assert_eq!(estimate.american_odds, 567);
}

#[tokio::test]
async fn test_benign_bin_uses_baseline_only() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "ssa", "wh-vh", 6.0, 50, 1).await;
    let model = FrequencyModel::new(store, registry());

    let estimate = model.estimate(&query("ssa", "wh-vh", 7.0)).await.unwrap();

    assert_eq!(estimate.p_cancel_weather, 0.0);
    assert!((estimate.p_cancel_mech - 0.02).abs() < 1e-9);
    assert_eq!(estimate.likelihood_to_run_pct, 98);
    assert_eq!(estimate.sample_size, 50);
    assert_eq!(estimate.confidence, ConfidenceTier::Medium);
}

#[tokio::test]
async fn test_likelihood_never_reaches_zero_or_hundred() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "ssa", "wh-vh", 50.0, 40, 40).await;
    seed(&store, "ssa", "wh-ob", 10.0, 40, 0).await;
    let model = FrequencyModel::new(store, registry());

    let storm = model.estimate(&query("ssa", "wh-vh", 50.0)).await.unwrap();
    assert_eq!(storm.likelihood_to_run_pct, 1);

    let calm = model.estimate(&query("ssa", "wh-ob", 10.0)).await.unwrap();
    assert_eq!(calm.likelihood_to_run_pct, 99);
}
