//! HTTP front end and operational metrics.

use anyhow::{anyhow, Result};
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use serde_json::json;
use tiny_http::{Header, Method, Request, Response, Server};

use crate::service::{PredictionRequest, PredictionService};

pub const DEFAULT_ADDR: &str = "127.0.0.1:8000";

#[derive(Clone)]
pub struct ServiceMetrics {
    registry: Registry,
    requests: IntCounter,
    retrains: IntCounter,
    accepted: IntCounter,
    rejected: IntCounter,
    pending: IntCounter,
    errors: IntCounter,
    cache_rows: IntGauge,
    last_mean_reward: Gauge,
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let requests =
            IntCounter::with_opts(Opts::new("govtune_requests", "Prediction requests"))
                .expect("requests counter");
        let retrains = IntCounter::with_opts(Opts::new("govtune_retrains", "Retrain passes"))
            .expect("retrains counter");
        let accepted =
            IntCounter::with_opts(Opts::new("govtune_accepted", "Accepted retrain outcomes"))
                .expect("accepted counter");
        let rejected =
            IntCounter::with_opts(Opts::new("govtune_rejected", "Rejected retrain outcomes"))
                .expect("rejected counter");
        let pending = IntCounter::with_opts(Opts::new("govtune_pending", "Pending responses"))
            .expect("pending counter");
        let errors = IntCounter::with_opts(Opts::new("govtune_errors", "Cache I/O errors"))
            .expect("errors counter");
        let cache_rows = IntGauge::with_opts(Opts::new("govtune_cache_rows", "Buffered rows"))
            .expect("cache rows gauge");
        let last_mean_reward = Gauge::with_opts(Opts::new(
            "govtune_last_mean_reward",
            "Mean evaluation return of the last retrain",
        ))
        .expect("mean reward gauge");

        registry
            .register(Box::new(requests.clone()))
            .expect("reg requests");
        registry
            .register(Box::new(retrains.clone()))
            .expect("reg retrains");
        registry
            .register(Box::new(accepted.clone()))
            .expect("reg accepted");
        registry
            .register(Box::new(rejected.clone()))
            .expect("reg rejected");
        registry
            .register(Box::new(pending.clone()))
            .expect("reg pending");
        registry
            .register(Box::new(errors.clone()))
            .expect("reg errors");
        registry
            .register(Box::new(cache_rows.clone()))
            .expect("reg cache rows");
        registry
            .register(Box::new(last_mean_reward.clone()))
            .expect("reg mean reward");

        Self {
            registry,
            requests,
            retrains,
            accepted,
            rejected,
            pending,
            errors,
            cache_rows,
            last_mean_reward,
        }
    }

    pub fn inc_requests(&self) {
        self.requests.inc();
    }

    pub fn inc_retrains(&self) {
        self.retrains.inc();
    }

    pub fn inc_accepted(&self) {
        self.accepted.inc();
    }

    pub fn inc_rejected(&self) {
        self.rejected.inc();
    }

    pub fn inc_pending(&self) {
        self.pending.inc();
    }

    pub fn inc_errors(&self) {
        self.errors.inc();
    }

    pub fn set_cache_rows(&self, rows: usize) {
        self.cache_rows.set(rows as i64);
    }

    pub fn set_last_mean_reward(&self, v: f64) {
        if v.is_finite() {
            self.last_mean_reward.set(v);
        }
    }

    pub fn requests(&self) -> u64 {
        self.requests.get()
    }

    pub fn retrains(&self) -> u64 {
        self.retrains.get()
    }

    pub fn gather(&self) -> String {
        let mf = self.registry.gather();
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let _ = encoder.encode(&mf, &mut buf);
        String::from_utf8(buf).unwrap_or_default()
    }
}

/// Routed response before it is handed to tiny_http.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl HttpReply {
    fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string(),
        }
    }
}

/// Route one request.
pub fn route(
    service: &PredictionService,
    method: &Method,
    url: &str,
    body: &str,
) -> HttpReply {
    let path = url.split('?').next().unwrap_or(url);
    match (method, path) {
        (Method::Post, "/predict/") | (Method::Post, "/predict") => {
            match serde_json::from_str::<PredictionRequest>(body) {
                Ok(req) => {
                    let resp = service.predict(req).to_response();
                    HttpReply::json(200, json!(resp))
                }
                Err(e) => HttpReply::json(422, json!({ "detail": e.to_string() })),
            }
        }
        (Method::Get, "/health") => HttpReply::json(200, json!({ "status": "ok" })),
        (Method::Get, "/metrics") => HttpReply {
            status: 200,
            content_type: "text/plain; version=0.0.4",
            body: service.metrics().gather(),
        },
        (_, "/predict/") | (_, "/predict") | (_, "/health") | (_, "/metrics") => {
            HttpReply::json(405, json!({ "detail": "Method Not Allowed" }))
        }
        _ => HttpReply::json(404, json!({ "detail": "Not Found" })),
    }
}

fn respond(mut request: Request, service: &PredictionService) {
    let mut body = String::new();
    let reply = match request.as_reader().read_to_string(&mut body) {
        Ok(_) => route(service, request.method(), request.url(), &body),
        Err(e) => HttpReply::json(400, json!({ "detail": format!("unreadable body: {e}") })),
    };

    let mut response = Response::from_string(reply.body).with_status_code(reply.status);
    if let Ok(h) = Header::from_bytes(&b"Content-Type"[..], reply.content_type.as_bytes()) {
        response = response.with_header(h);
    }
    if let Err(e) = request.respond(response) {
        eprintln!("govtune | WARN respond failed | err={e}");
    }
}

/// Serve requests sequentially on the calling thread until the server stops.
pub fn serve(addr: &str, service: &PredictionService) -> Result<()> {
    let server = Server::http(addr).map_err(|e| anyhow!("failed to bind {addr}: {e}"))?;
    eprintln!("govtune | listening | addr={addr}");
    for request in server.incoming_requests() {
        respond(request, service);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SampleCache;
    use crate::config::Config;
    use crate::rl::TrainingController;

    fn service() -> PredictionService {
        let mut cfg = Config::default();
        cfg.cache_path = None;
        cfg.model_dir = None;
        let controller = TrainingController::with_linear_policy(cfg.clone());
        PredictionService::new(SampleCache::in_memory(cfg.batch_threshold), controller)
    }

    const BODY: &str =
        r#"{"total_supply":5e8,"circ_supply":5e8,"balance":5e7,"votes":5e5,"height":0,"tx_volume":5e5}"#;

    #[test]
    fn health_is_static() {
        let svc = service();
        let reply = route(&svc, &Method::Get, "/health", "");
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, r#"{"status":"ok"}"#);
        assert_eq!(svc.cached_rows(), 0);
    }

    #[test]
    fn predict_below_threshold_is_pending() {
        let svc = service();
        let reply = route(&svc, &Method::Post, "/predict/", BODY);
        assert_eq!(reply.status, 200);
        let v: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
        assert_eq!(v["prediction"], json!([]));
        assert_eq!(v["status"], "pending");
        assert_eq!(svc.cached_rows(), 1);
    }

    #[test]
    fn invalid_body_is_422() {
        let svc = service();
        for body in ["not json", r#"{"total_supply":1}"#, r#"{"total_supply":"x","circ_supply":1,"balance":1,"votes":1,"height":1,"tx_volume":1}"#] {
            let reply = route(&svc, &Method::Post, "/predict", body);
            assert_eq!(reply.status, 422);
            assert!(reply.body.contains("detail"));
        }
        assert_eq!(svc.cached_rows(), 0);
    }

    #[test]
    fn metrics_exposition() {
        let svc = service();
        route(&svc, &Method::Post, "/predict/", BODY);
        let reply = route(&svc, &Method::Get, "/metrics", "");
        assert!(reply.body.contains("govtune_requests 1"));
        assert!(reply.body.contains("govtune_cache_rows 1"));
    }

    #[test]
    fn unknown_routes() {
        let svc = service();
        assert_eq!(route(&svc, &Method::Get, "/nope", "").status, 404);
        assert_eq!(route(&svc, &Method::Get, "/predict/", "").status, 405);
    }
}
