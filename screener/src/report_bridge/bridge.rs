use crate::report_bridge::model::ReportModel;
use crate::workflow::runner::{RunOutcome, Runner};
use log::{info, warn};
use screencore::telemetry::MetricsRecorder;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use warp::{http::StatusCode, Filter};

/// HTTP endpoint exposing the latest table summary and fit to the plotting layer.
#[derive(Clone)]
pub struct ReportBridge {
    state: Arc<RwLock<ReportModel>>,
    runner: Arc<Runner>,
    metrics: Arc<MetricsRecorder>,
    // One analysis at a time, so ledger rows never interleave.
    analysis: Arc<Mutex<()>>,
}

impl ReportBridge {
    pub fn new(runner: Arc<Runner>) -> Self {
        Self {
            state: Arc::new(RwLock::new(ReportModel {
                status: "idle".into(),
                ..ReportModel::default()
            })),
            runner,
            metrics: Arc::new(MetricsRecorder::new()),
            analysis: Arc::new(Mutex::new(())),
        }
    }

    pub fn publish(&self, outcome: &RunOutcome) {
        self.metrics.record_run();
        if outcome.ledgered {
            self.metrics.record_ledger_row();
        }
        let model = ReportModel::from_run(&outcome.table, &outcome.report, self.metrics.snapshot());
        info!(
            "[report] {} dataset(s), verdict {}",
            model.datasets.len(),
            model.status
        );
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = model;
    }

    pub fn publish_failure(&self, message: &str) {
        self.metrics.record_failure();
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        guard.status = format!("error: {}", message);
        guard.metrics = self.metrics.snapshot();
    }

    pub fn snapshot(&self) -> ReportModel {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// `GET /report` returns the current model; `POST /analyze` runs a
    /// persisted table sent as the request body.
    pub fn routes(
        &self,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let bridge = self.clone();
        let bridge_filter = warp::any().map(move || bridge.clone());

        let get_route = warp::path("report")
            .and(warp::path::end())
            .and(warp::get())
            .and(bridge_filter.clone())
            .map(|bridge: ReportBridge| warp::reply::json(&bridge.snapshot()));

        let post_route = warp::path("analyze")
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::body::content_length_limit(64 * 1024 * 1024))
            .and(warp::body::bytes())
            .and(bridge_filter)
            .and_then(|body: warp::hyper::body::Bytes, bridge: ReportBridge| async move {
                Ok::<_, warp::Rejection>(bridge.analyze(body).await)
            });

        get_route.or(post_route)
    }

    /// Runs the pipeline off the async workers; the ledger append happens under
    /// `analysis`, so concurrent requests append one complete row each.
    async fn analyze(
        &self,
        body: warp::hyper::body::Bytes,
    ) -> warp::reply::WithStatus<warp::reply::Json> {
        let _turn = self.analysis.lock().await;
        let runner = Arc::clone(&self.runner);
        let joined = tokio::task::spawn_blocking(move || {
            let text = String::from_utf8_lossy(&body);
            runner.analyze_text(&text, "request")
        })
        .await;
        let result =
            joined.unwrap_or_else(|err| Err(anyhow::anyhow!("analysis task failed: {}", err)));

        match result {
            Ok(outcome) => {
                self.publish(&outcome);
                warp::reply::with_status(
                    warp::reply::json(&json!({
                        "status": "ok",
                        "classification": outcome.report.fit.classification,
                        "moment": outcome.report.fit.moment,
                        "moment_err": outcome.report.fit.moment_err,
                        "stray_field_t": outcome.report.fit.stray_field_t,
                    })),
                    StatusCode::OK,
                )
            }
            Err(err) => {
                let message = format!("{:#}", err);
                warn!("[report] analyze request failed: {}", message);
                self.publish_failure(&message);
                warp::reply::with_status(
                    warp::reply::json(&json!({"status": "error", "message": message})),
                    StatusCode::UNPROCESSABLE_ENTITY,
                )
            }
        }
    }

    /// Serves until `shutdown` resolves.
    pub async fn serve(
        self,
        address: SocketAddr,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let (bound, server) =
            warp::serve(self.routes()).try_bind_with_graceful_shutdown(address, shutdown)?;
        info!("[report] listening on http://{}", bound);
        server.await;
        Ok(())
    }
}
