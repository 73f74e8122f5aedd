// src/service.rs
//
// Prediction service: append -> check -> (retrain -> flush) as one critical
// section behind a single mutex.
//
// Every request appends exactly one row. Below the batch threshold the caller
// gets `pending`; at the threshold the cache's finite rows go through a
// retrain pass and the cache is cleared whatever the outcome.

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::cache::SampleCache;
use crate::ops::ServiceMetrics;
use crate::rl::trainer::{RetrainOutcome, RetrainReport, TrainingController};
use crate::types::{ActionVector, Snapshot};

/// Request body. Field names are part of the public interface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub total_supply: f64,
    pub circ_supply: f64,
    pub balance: f64,
    pub votes: f64,
    pub height: f64,
    pub tx_volume: f64,
}

impl From<PredictionRequest> for Snapshot {
    fn from(r: PredictionRequest) -> Self {
        Snapshot {
            total_supply: r.total_supply,
            circulating_supply: r.circ_supply,
            delegate_balance: r.balance,
            votes_per_period: r.votes,
            block_height: r.height,
            tx_volume: r.tx_volume,
        }
    }
}

impl From<Snapshot> for PredictionRequest {
    fn from(s: Snapshot) -> Self {
        PredictionRequest {
            total_supply: s.total_supply,
            circ_supply: s.circulating_supply,
            balance: s.delegate_balance,
            votes: s.votes_per_period,
            height: s.block_height,
            tx_volume: s.tx_volume,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PredictionOutcome {
    /// Not enough rows yet (or the row could not be recorded).
    Pending,
    /// A retrain ran but the model was not competent.
    Rejected { mean_reward: f64 },
    Accepted {
        action: ActionVector,
        mean_reward: f64,
    },
}

impl PredictionOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            PredictionOutcome::Pending => "pending",
            PredictionOutcome::Rejected { .. } => "rejected",
            PredictionOutcome::Accepted { .. } => "accepted",
        }
    }

    pub fn prediction(&self) -> Vec<f64> {
        match self {
            PredictionOutcome::Accepted { action, .. } => action.to_array().to_vec(),
            _ => Vec::new(),
        }
    }

    pub fn to_response(&self) -> PredictionResponse {
        PredictionResponse {
            prediction: self.prediction(),
            status: self.status().to_string(),
        }
    }
}

impl From<&RetrainOutcome> for PredictionOutcome {
    fn from(o: &RetrainOutcome) -> Self {
        match o {
            RetrainOutcome::Rejected { mean_reward, .. } => PredictionOutcome::Rejected {
                mean_reward: *mean_reward,
            },
            RetrainOutcome::Accepted {
                action,
                mean_reward,
                ..
            } => PredictionOutcome::Accepted {
                action: *action,
                mean_reward: *mean_reward,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: Vec<f64>,
    pub status: String,
}

struct Inner {
    cache: SampleCache,
    controller: TrainingController,
    last_report: Option<RetrainReport>,
}

pub struct PredictionService {
    inner: Mutex<Inner>,
    metrics: ServiceMetrics,
}

impl PredictionService {
    pub fn new(cache: SampleCache, controller: TrainingController) -> Self {
        Self::with_metrics(cache, controller, ServiceMetrics::new())
    }

    pub fn with_metrics(
        cache: SampleCache,
        controller: TrainingController,
        metrics: ServiceMetrics,
    ) -> Self {
        metrics.set_cache_rows(cache.len());
        Self {
            inner: Mutex::new(Inner {
                cache,
                controller,
                last_report: None,
            }),
            metrics,
        }
    }

    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Rows are only ever appended or cleared, so a poisoned lock still
        // guards a consistent cache.
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Rows currently buffered.
    pub fn cached_rows(&self) -> usize {
        self.lock().cache.len()
    }

    /// Report of the most recent retrain pass, if any.
    pub fn last_report(&self) -> Option<RetrainReport> {
        self.lock().last_report.clone()
    }

    pub fn predict(&self, request: PredictionRequest) -> PredictionOutcome {
        self.metrics.inc_requests();
        let snapshot = Snapshot::from(request);
        let mut inner = self.lock();

        let appended = match inner.cache.append_and_check(snapshot) {
            Ok(a) => a,
            Err(e) => {
                eprintln!("govtune | ERROR cache append failed | err={e:#}");
                self.metrics.inc_errors();
                self.metrics.inc_pending();
                return PredictionOutcome::Pending;
            }
        };
        self.metrics.set_cache_rows(appended.row_count);

        if !appended.should_retrain {
            self.metrics.inc_pending();
            return PredictionOutcome::Pending;
        }

        let Inner {
            cache,
            controller,
            last_report,
        } = &mut *inner;

        let report = controller.retrain(&cache.valid_rows());
        self.metrics.inc_retrains();
        self.metrics.set_last_mean_reward(report.outcome.mean_reward());

        if let Err(e) = cache.flush() {
            eprintln!("govtune | ERROR cache flush failed | err={e:#}");
            self.metrics.inc_errors();
        }
        self.metrics.set_cache_rows(cache.len());

        let outcome = PredictionOutcome::from(&report.outcome);
        match outcome {
            PredictionOutcome::Accepted { .. } => self.metrics.inc_accepted(),
            _ => self.metrics.inc_rejected(),
        }
        *last_report = Some(report);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_field_mapping() {
        let req: PredictionRequest = serde_json::from_str(
            r#"{"total_supply":1,"circ_supply":2,"balance":3,"votes":4,"height":5,"tx_volume":6}"#,
        )
        .unwrap();
        let s = Snapshot::from(req);
        assert_eq!(s.to_array(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(PredictionRequest::from(s), req);
    }

    #[test]
    fn missing_field_is_an_error() {
        let res: Result<PredictionRequest, _> =
            serde_json::from_str(r#"{"total_supply":1,"circ_supply":2}"#);
        assert!(res.is_err());
    }

    #[test]
    fn outcome_response_shapes() {
        assert_eq!(
            PredictionOutcome::Pending.to_response(),
            PredictionResponse {
                prediction: vec![],
                status: "pending".to_string()
            }
        );
        let action = ActionVector::from_raw(&[7.0, 2.0, 600.0, 0.5, 10.0, 30.0]);
        let resp = PredictionOutcome::Accepted {
            action,
            mean_reward: 12.0,
        }
        .to_response();
        assert_eq!(resp.status, "accepted");
        assert_eq!(resp.prediction, vec![7.0, 2.0, 600.0, 0.5, 10.0, 30.0]);
    }
}
