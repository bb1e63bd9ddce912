//! Request lifecycle middleware
//!
//! For every request the service:
//!
//! 1. opens a request context (and its start marker) with the request's
//!    method, path, client, user agent, referer and size;
//! 2. runs the inner service with the context bound;
//! 3. records status, response size and latency when a response comes back;
//! 4. finishes the request: end marker, final flush, teardown.
//!
//! Step 4 also runs when the inner service fails, panics, or the response
//! future is dropped, in which case no outcome is recorded.

use crate::meta::{request_id, request_meta, response_size, RequestId};
use futures_util::future::BoxFuture;
use http::{Request, Response};
use hyper::body::Body;
use reqlog_core::{HttpOutcome, RequestFutureExt, RequestLogger};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Layer wrapping services with [`RequestLoggingService`].
///
/// # Example
///
/// ```rust,ignore
/// use reqlog_core::{LoggerConfig, RequestLogger, TracingSink};
/// use reqlog_tower::RequestLoggingLayer;
/// use tower::ServiceBuilder;
///
/// let logger = RequestLogger::new(LoggerConfig::from_env()?, TracingSink::new())?;
/// let service = ServiceBuilder::new()
///     .layer(RequestLoggingLayer::new(logger))
///     .service(app);
/// ```
#[derive(Clone, Debug)]
pub struct RequestLoggingLayer {
    logger: RequestLogger,
}

impl RequestLoggingLayer {
    /// Create a layer logging through `logger`
    pub fn new(logger: RequestLogger) -> Self {
        Self { logger }
    }
}

impl<S> Layer<S> for RequestLoggingLayer {
    type Service = RequestLoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggingService {
            inner,
            logger: self.logger.clone(),
        }
    }
}

/// Service opening and finishing a request context around every call.
#[derive(Clone, Debug)]
pub struct RequestLoggingService<S> {
    inner: S,
    logger: RequestLogger,
}

impl<S> RequestLoggingService<S> {
    /// Wrap `inner`
    pub fn new(inner: S, logger: RequestLogger) -> Self {
        Self { inner, logger }
    }

    /// Get the logger
    pub fn logger(&self) -> &RequestLogger {
        &self.logger
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestLoggingService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Body + Send + 'static,
    ResBody: Body + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        // the clone may not be ready; keep the one that was polled
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let logger = self.logger.clone();

        let id = request_id(req.headers(), &logger.config().request_id_header);
        let meta = request_meta(&req);
        req.extensions_mut().insert(RequestId::new(id.clone()));

        let ctx = logger.begin(id, meta);
        let finish = logger.finish_on_drop(ctx.clone());

        Box::pin(async move {
            let result = async move { inner.call(req).await }
                .in_request(ctx.clone())
                .await;

            match &result {
                Ok(res) => {
                    let mut outcome = HttpOutcome::new(res.status().as_u16()).latency(ctx.elapsed());
                    if let Some(size) = response_size(res) {
                        outcome = outcome.response_size(size);
                    }
                    finish.complete(Some(outcome));
                }
                Err(_) => {
                    tracing::debug!(request_id = %ctx.request_id(), "inner service failed");
                    finish.complete(None);
                }
            }
            result
        })
    }
}
