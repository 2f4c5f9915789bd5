use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokenguard_types::GatewayError;

use super::reconcile::ReconcileJob;
use super::response::{Rejection, ResponseTags};
use super::upstream::is_hop_header;
use super::usage::{push_tail, usage_from_body, usage_from_sse_tail};
use super::GatewayState;
use crate::estimator::CompletionRequest;
use crate::identity::ResolvedIdentity;
use crate::limiter::Admission;
use crate::metrics;
use crate::store::UsageTicket;

/// Output of the admit stage.
struct Admitted {
    ticket: Option<UsageTicket>,
}

/// Whom to reconcile against once the upstream answers.
#[derive(Clone)]
struct ReconcileTarget {
    identity: String,
    ticket: Option<UsageTicket>,
}

fn request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn path_and_query(parts: &Parts) -> String {
    parts.uri.path_and_query().map_or_else(|| parts.uri.path().to_string(), |pq| pq.as_str().to_string())
}

impl GatewayState {
    fn identify(&self, headers: &HeaderMap) -> ResolvedIdentity {
        self.resolver.resolve(headers)
    }

    async fn read_body(&self, body: Body) -> Result<Bytes, Rejection> {
        axum::body::to_bytes(body, self.body_limit).await.map_err(|e| {
            Rejection::new(GatewayError::MalformedRequest {
                message: format!("request body could not be read: {e}"),
            })
        })
    }

    /// Parse and estimate. A parse failure never reaches admission.
    fn estimate(&self, body: &[u8]) -> Result<u64, Rejection> {
        let payload = CompletionRequest::from_slice(body).map_err(|e| {
            Rejection::new(GatewayError::MalformedRequest { message: e.to_string() })
        })?;
        Ok(self.estimator.admission_estimate(&payload))
    }

    async fn admit(&self, identity: &str, estimate: u64) -> Result<Admitted, Rejection> {
        match self.controller.admit(identity, estimate).await {
            Ok(Admission::Allowed { ticket, degraded }) => {
                if degraded {
                    tracing::debug!(identity, "Admitted in degraded mode");
                }
                Ok(Admitted { ticket })
            },
            Ok(Admission::Denied(denial)) => Err(Rejection::new(denial.into())),
            Err(error) => Err(Rejection::new(error)),
        }
    }

    async fn forward(&self, parts: &Parts, body: Bytes) -> Result<reqwest::Response, Rejection> {
        self.upstream
            .forward(parts.method.clone(), &path_and_query(parts), &parts.headers, body)
            .await
            .map_err(Rejection::new)
    }

    fn schedule_reconcile(&self, target: &ReconcileTarget, usage: super::ActualUsage) {
        self.reconciler.submit(ReconcileJob {
            identity: target.identity.clone(),
            ticket: target.ticket,
            usage,
        });
    }

    /// Relay the upstream response unchanged and schedule reconciliation
    /// from whatever usage it reports.
    async fn relay(
        &self,
        upstream: reqwest::Response,
        target: Option<ReconcileTarget>,
    ) -> Result<Response, Rejection> {
        let status = upstream.status();
        let mut headers = HeaderMap::with_capacity(upstream.headers().len());
        for (name, value) in upstream.headers() {
            if !is_hop_header(name) {
                headers.append(name.clone(), value.clone());
            }
        }

        let is_sse = headers
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/event-stream"));

        let body = if is_sse {
            self.stream_body(upstream, target)
        } else {
            let bytes = upstream
                .bytes()
                .await
                .map_err(|e| Rejection::new(self.upstream.classify(&e)))?;
            if let Some(target) = &target {
                if let Some(usage) = usage_from_body(&bytes) {
                    self.schedule_reconcile(target, usage);
                }
            }
            Body::from(bytes)
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    /// Tee the event stream: chunks go to the caller as they arrive while the
    /// last few KB are kept for usage extraction. The upstream is drained even
    /// after the caller disconnects so reconciliation still happens.
    fn stream_body(&self, upstream: reqwest::Response, target: Option<ReconcileTarget>) -> Body {
        let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(64);
        let state = self.clone();

        tokio::spawn(async move {
            let mut stream = upstream.bytes_stream();
            let mut tail = Vec::new();
            let mut caller_open = true;

            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(chunk) => {
                        push_tail(&mut tail, &chunk);
                        if caller_open && tx.send(Ok(chunk)).await.is_err() {
                            caller_open = false;
                            tracing::debug!("Caller went away mid-stream, draining upstream");
                        }
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "Upstream stream failed");
                        if caller_open {
                            let _ = tx.send(Err(std::io::Error::other(e))).await;
                        }
                        break;
                    },
                }
            }

            if let (Some(target), Some(usage)) = (target, usage_from_sse_tail(&tail)) {
                state.schedule_reconcile(&target, usage);
            }
        });

        Body::from_stream(ReceiverStream::new(rx))
    }

    async fn run_metered(
        &self,
        request: Request,
        tags: &mut ResponseTags,
    ) -> Result<Response, Rejection> {
        let (parts, body) = request.into_parts();

        let caller = self.identify(&parts.headers);
        tags.identity = Some(caller.identity.clone());
        let with_identity = |r: Rejection| r.for_identity(&caller.identity);

        let bytes = self.read_body(body).await.map_err(with_identity)?;
        let estimate = self.estimate(&bytes).map_err(with_identity)?;
        tags.estimated_tokens = Some(estimate);

        let admitted = self
            .admit(&caller.identity, estimate)
            .await
            .map_err(|r| r.for_identity(&caller.identity).with_estimate(estimate))?;

        // No refund on upstream failure: the estimate stays charged.
        let upstream = self
            .forward(&parts, bytes)
            .await
            .map_err(|r| r.for_identity(&caller.identity).with_estimate(estimate))?;

        let target = ReconcileTarget { identity: caller.identity.clone(), ticket: admitted.ticket };
        self.relay(upstream, Some(target)).await.map_err(with_identity)
    }
}

fn finish(result: Result<Response, Rejection>, tags: &ResponseTags, started: Instant) -> Response {
    let (outcome, mut response) = match result {
        Ok(response) => ("allowed", response),
        Err(rejection) => {
            tracing::info!(
                request_id = %tags.request_id,
                error = %rejection.error,
                "Request rejected"
            );
            (rejection.outcome(), rejection.into_response())
        },
    };
    let elapsed = started.elapsed();
    tags.apply(response.headers_mut(), elapsed);
    metrics::record_request(outcome, elapsed);
    response
}

/// Admission-controlled route.
pub async fn metered_handler(State(state): State<GatewayState>, request: Request) -> Response {
    let started = Instant::now();
    let mut tags = ResponseTags { request_id: request_id(), ..Default::default() };
    let result = state.run_metered(request, &mut tags).await;
    finish(result, &tags, started)
}

/// Forwarded without admission or accounting.
pub async fn passthrough_handler(State(state): State<GatewayState>, request: Request) -> Response {
    let started = Instant::now();
    let tags = ResponseTags { request_id: request_id(), ..Default::default() };

    let result = async {
        let (parts, body) = request.into_parts();
        let bytes = state.read_body(body).await?;
        let upstream = state.forward(&parts, bytes).await?;
        state.relay(upstream, None).await
    }
    .await;

    finish(result, &tags, started)
}
