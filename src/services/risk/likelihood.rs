//! Historical-frequency run likelihood.
//!
//! `p_total = 1 − (1 − p_weather)(1 − p_mech)`, where `p_weather` is the
//! operator's cancellation rate in the matching wind bin and `p_mech` its
//! rate in benign weather. When the operator's own history is thin (fewer
//! samples than the medium-confidence floor), the best-sampled peer
//! operator on the same corridor is borrowed at one confidence tier lower;
//! without any history, fixed bands are used.

use std::sync::Arc;

use crate::config::CorridorRegistry;
use crate::models::prediction::{BinCounts, ConfidenceTier, LikelihoodBasis, LikelihoodEstimate, WindBin, WindRelation};
use crate::models::weather::AdvisoryLevel;
use crate::models::{CorridorId, OperatorId};
use crate::repository::{HistoryStore, RepoError};

/// Below this many samples an operator's own history is considered thin.
pub const THIN_HISTORY_SAMPLES: u32 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct LikelihoodQuery {
    pub operator_id: OperatorId,
    pub corridor_id: CorridorId,
    pub wind_speed_mph: f64,
    pub advisory: AdvisoryLevel,
    pub relation: Option<WindRelation>,
}

pub fn combine(p_weather: f64, p_mech: f64) -> f64 {
    1.0 - (1.0 - p_weather.clamp(0.0, 1.0)) * (1.0 - p_mech.clamp(0.0, 1.0))
}

/// Run likelihood in whole percent, never 0 or 100.
pub fn likelihood_pct(p_total: f64) -> u8 {
    ((1.0 - p_total) * 100.0).round().clamp(1.0, 99.0) as u8
}

pub fn default_band(bin: WindBin) -> i32 {
    match bin {
        WindBin::Under15 => 98,
        WindBin::From15To25 => 90,
        WindBin::From25To35 => 70,
        WindBin::From35To45 => 40,
        WindBin::Over45 => 20,
    }
}

pub fn band_adjustment(advisory: AdvisoryLevel, relation: Option<WindRelation>) -> i32 {
    let advisory_adj = match advisory {
        AdvisoryLevel::None => 0,
        AdvisoryLevel::SmallCraft => -10,
        _ => -15,
    };
    let relation_adj = match relation {
        Some(WindRelation::Crosswind) => -10,
        Some(WindRelation::Headwind) => -5,
        Some(WindRelation::Tailwind) => 5,
        None => 0,
    };
    advisory_adj + relation_adj
}

/// Converts a run likelihood to American moneyline odds.
pub fn likelihood_to_american_odds(pct: f64) -> i32 {
    let p = pct.clamp(1.0, 99.0);
    if p >= 50.0 {
        -(p / (100.0 - p) * 100.0).round() as i32
    } else {
        ((100.0 - p) / p * 100.0).round() as i32
    }
}

/// Estimate from bin counts. The benign bin has no weather component.
pub fn estimate_from_counts(
    bin: WindBin,
    weather: BinCounts,
    benign: BinCounts,
    basis: LikelihoodBasis,
) -> Option<LikelihoodEstimate> {
    weather.rate()?;

    let (p_weather, p_mech, sample_size) = if bin.is_benign() {
        (0.0, weather.rate().unwrap_or(0.0), weather.total)
    } else {
        (
            weather.rate().unwrap_or(0.0),
            benign.rate().unwrap_or(0.0),
            weather.total.saturating_add(benign.total),
        )
    };
    let p_total = combine(p_weather, p_mech);
    let pct = likelihood_pct(p_total);

    let mut confidence = ConfidenceTier::from_sample_size(sample_size);
    if matches!(basis, LikelihoodBasis::CrossOperatorHistory { .. }) {
        confidence = confidence.demote();
    }

    Some(LikelihoodEstimate {
        likelihood_to_run_pct: pct,
        p_cancel_weather: p_weather,
        p_cancel_mech: p_mech,
        p_cancel_total: p_total,
        sample_size,
        confidence,
        wind_bin: bin,
        basis,
        american_odds: likelihood_to_american_odds(f64::from(pct)),
    })
}

pub fn default_estimate(bin: WindBin, advisory: AdvisoryLevel, relation: Option<WindRelation>) -> LikelihoodEstimate {
    let pct = (default_band(bin) + band_adjustment(advisory, relation)).clamp(1, 99) as u8;
    let p_total = 1.0 - f64::from(pct) / 100.0;
    LikelihoodEstimate {
        likelihood_to_run_pct: pct,
        p_cancel_weather: p_total,
        p_cancel_mech: 0.0,
        p_cancel_total: p_total,
        sample_size: 0,
        confidence: ConfidenceTier::Low,
        wind_bin: bin,
        basis: LikelihoodBasis::DefaultBands,
        american_odds: likelihood_to_american_odds(f64::from(pct)),
    }
}

pub struct FrequencyModel {
    history: Arc<dyn HistoryStore>,
    registry: Arc<CorridorRegistry>,
}

impl FrequencyModel {
    pub fn new(history: Arc<dyn HistoryStore>, registry: Arc<CorridorRegistry>) -> Self {
        Self { history, registry }
    }

    async fn counts(&self, operator: &OperatorId, corridor: &CorridorId, bin: WindBin) -> Result<(BinCounts, BinCounts), RepoError> {
        let weather = self.history.bin_counts(operator, corridor, bin).await?;
        let benign = if bin.is_benign() {
            weather
        } else {
            self.history.bin_counts(operator, corridor, WindBin::Under15).await?
        };
        Ok((weather, benign))
    }

    pub async fn estimate(&self, query: &LikelihoodQuery) -> Result<LikelihoodEstimate, RepoError> {
        let bin = WindBin::from_mph(query.wind_speed_mph);

        let (weather, benign) = self.counts(&query.operator_id, &query.corridor_id, bin).await?;
        let own = estimate_from_counts(bin, weather, benign, LikelihoodBasis::OperatorHistory);
        if let Some(estimate) = own.as_ref().filter(|e| e.sample_size >= THIN_HISTORY_SAMPLES) {
            return Ok(estimate.clone());
        }

        let mut borrowed: Option<LikelihoodEstimate> = None;
        for peer in self.registry.peers(&query.operator_id) {
            let (weather, benign) = self.counts(peer, &query.corridor_id, bin).await?;
            let basis = LikelihoodBasis::CrossOperatorHistory {
                borrowed_from: peer.clone(),
            };
            let Some(candidate) = estimate_from_counts(bin, weather, benign, basis) else {
                continue;
            };
            if borrowed.as_ref().map_or(true, |b| candidate.sample_size > b.sample_size) {
                borrowed = Some(candidate);
            }
        }

        let own_samples = own.as_ref().map_or(0, |e| e.sample_size);
        match (own, borrowed) {
            (_, Some(peer)) if peer.sample_size > own_samples => {
                tracing::debug!(
                    operator_id = %query.operator_id,
                    own_samples,
                    peer_samples = peer.sample_size,
                    corridor_id = %query.corridor_id,
                    wind_bin = bin.as_str(),
                    "Borrowed peer operator history"
                );
                Ok(peer)
            }
            (Some(own), _) => Ok(own),
            (None, _) => Ok(default_estimate(bin, query.advisory, query.relation)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combines_weather_and_mechanical() {
        let estimate = estimate_from_counts(
            WindBin::From25To35,
            BinCounts { total: 100, canceled: 20 },
            BinCounts { total: 200, canceled: 2 },
            LikelihoodBasis::OperatorHistory,
        )
        .unwrap();
        assert!((estimate.p_cancel_total - 0.208).abs() < 1e-9);
        assert_eq!(estimate.likelihood_to_run_pct, 79);
        assert_eq!(estimate.sample_size, 300);
        assert_eq!(estimate.confidence, ConfidenceTier::High);
    }

    #[test]
    fn peer_history_is_demoted() {
        let estimate = estimate_from_counts(
            WindBin::From15To25,
            BinCounts { total: 120, canceled: 6 },
            BinCounts { total: 0, canceled: 0 },
            LikelihoodBasis::CrossOperatorHistory {
                borrowed_from: OperatorId::new("hlc"),
            },
        )
        .unwrap();
        assert_eq!(estimate.confidence, ConfidenceTier::Medium);
    }

    #[test]
    fn empty_bin_gives_no_estimate() {
        assert!(estimate_from_counts(
            WindBin::Over45,
            BinCounts::default(),
            BinCounts { total: 50, canceled: 1 },
            LikelihoodBasis::OperatorHistory
        )
        .is_none());
    }

    #[test]
    fn likelihood_is_clamped() {
        assert_eq!(likelihood_pct(0.0), 99);
        assert_eq!(likelihood_pct(1.0), 1);
    }

    #[test]
    fn default_bands_and_adjustments() {
        assert_eq!(default_estimate(WindBin::Under15, AdvisoryLevel::None, None).likelihood_to_run_pct, 98);
        assert_eq!(default_estimate(WindBin::From15To25, AdvisoryLevel::None, None).likelihood_to_run_pct, 90);
        assert_eq!(
            default_estimate(WindBin::From25To35, AdvisoryLevel::SmallCraft, Some(WindRelation::Crosswind))
                .likelihood_to_run_pct,
            50
        );
        assert_eq!(
            default_estimate(WindBin::Over45, AdvisoryLevel::Storm, Some(WindRelation::Crosswind)).likelihood_to_run_pct,
            1
        );
        assert_eq!(
            default_estimate(WindBin::Under15, AdvisoryLevel::None, Some(WindRelation::Tailwind)).likelihood_to_run_pct,
            99
        );
    }

    #[test]
    fn american_odds() {
        assert_eq!(likelihood_to_american_odds(50.0), -100);
        assert_eq!(likelihood_to_american_odds(75.0), -300);
        assert_eq!(likelihood_to_american_odds(25.0), 300);
        assert_eq!(likelihood_to_american_odds(100.0), -9900);
        assert_eq!(likelihood_to_american_odds(0.0), 9900);
    }
}
