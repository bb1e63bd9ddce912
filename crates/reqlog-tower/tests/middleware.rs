//! End-to-end behavior of the request logging middleware

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use reqlog_core::{LogBatch, LoggerConfig, MemorySink, RequestLogger, TransmissionUnit};
use reqlog_tower::{RequestId, RequestLoggingLayer};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower::{service_fn, Layer, ServiceExt};

type Body = Full<Bytes>;

fn logger(batch_size: usize, markers: bool) -> (RequestLogger, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let config = LoggerConfig::new()
        .batch_size(batch_size)
        .service_name("shop")
        .environment("test")
        .request_markers(markers);
    (RequestLogger::new(config, sink.clone()).unwrap(), sink)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn units(batches: &[LogBatch]) -> Vec<&TransmissionUnit> {
    batches.iter().flat_map(|b| &b.entries).collect()
}

#[tokio::test]
async fn test_handler_logs_are_correlated_with_the_request() {
    let (logger, sink) = logger(10, true);

    let handler_logger = logger.clone();
    let app = service_fn(move |_req: Request<Body>| {
        let logger = handler_logger.clone();
        async move {
            logger.info("listing orders");
            tokio::task::yield_now().await;
            logger.warn("page size capped");
            Ok::<_, Infallible>(Response::new(Full::new(Bytes::from_static(b"[1,2]"))))
        }
    });
    let service = RequestLoggingLayer::new(logger).layer(app);

    let req = Request::builder()
        .method("get")
        .uri("/orders?page=2")
        .header("x-request-id", "req-abc")
        .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
        .header("user-agent", "curl/8.0")
        .header("referer", "https://example.com/")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let res = service.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let batches = sink.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].log_name, "test_log");

    let units = units(&batches);
    let messages: Vec<&str> = units.iter().map(|u| u.message.as_str()).collect();
    assert_eq!(
        messages,
        vec!["Request Started", "listing orders", "page size capped", "Request Ended"]
    );

    for unit in &units {
        let op = unit.operation.as_ref().unwrap();
        assert_eq!(op.id, "req-abc");
        assert_eq!(op.producer, "shop#test");

        let http = unit.http_request.as_ref().unwrap();
        assert_eq!(http.method, "GET");
        assert_eq!(http.url, "/orders?page=2");
        assert_eq!(http.remote_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(http.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(http.referer.as_deref(), Some("https://example.com/"));
        assert_eq!(http.size, Some(0));
        assert_eq!(http.status, Some(200));
        assert_eq!(http.response_size, Some(5));
        assert!(http.latency.is_some());
    }
    assert!(units[0].operation.as_ref().unwrap().first);
    assert!(units[3].operation.as_ref().unwrap().last);
}

#[tokio::test]
async fn test_request_id_is_generated_and_exposed() {
    let (logger, sink) = logger(10, false);

    let handler_logger = logger.clone();
    let app = service_fn(move |req: Request<Body>| {
        let logger = handler_logger.clone();
        async move {
            let id = req.extensions().get::<RequestId>().cloned().unwrap();
            logger.info(format!("handling {}", id));
            Ok::<_, Infallible>(Response::new(Full::new(Bytes::from(id.to_string()))))
        }
    });
    let service = RequestLoggingLayer::new(logger).layer(app);

    let res = service.oneshot(get("/")).await.unwrap();
    let unit = &sink.entries()[0];
    let op = unit.operation.as_ref().unwrap();

    assert!(uuid::Uuid::parse_str(&op.id).is_ok());
    assert_eq!(unit.message, format!("handling {}", op.id));
    assert_eq!(
        unit.http_request.as_ref().unwrap().response_size,
        Some(op.id.len() as u64)
    );
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_partial_groups_carry_no_outcome() {
    let (logger, sink) = logger(3, false);

    let handler_logger = logger.clone();
    let app = service_fn(move |_req: Request<Body>| {
        let logger = handler_logger.clone();
        async move {
            for n in 1..=7 {
                logger.info(format!("row {}", n));
            }
            let res = Response::builder()
                .status(StatusCode::CREATED)
                .body(Full::new(Bytes::new()))
                .unwrap();
            Ok::<_, Infallible>(res)
        }
    });
    let service = RequestLoggingLayer::new(logger).layer(app);
    service.oneshot(get("/import")).await.unwrap();

    let batches = sink.batches();
    let sizes: Vec<usize> = batches.iter().map(|b| b.entries.len()).collect();
    assert_eq!(sizes, vec![3, 3, 1]);

    for batch in &batches[..2] {
        for unit in &batch.entries {
            assert!(unit.http_request.as_ref().unwrap().status.is_none());
        }
    }
    let last = &batches[2].entries[0];
    assert_eq!(last.http_request.as_ref().unwrap().status, Some(201));
    assert!(last.operation.as_ref().unwrap().last);
}

#[tokio::test]
async fn test_end_marker_never_splits_off_the_outcome() {
    let (logger, sink) = logger(3, true);

    let handler_logger = logger.clone();
    let app = service_fn(move |_req: Request<Body>| {
        let logger = handler_logger.clone();
        async move {
            logger.info("a");
            logger.info("b");
            Ok::<_, Infallible>(Response::new(Full::new(Bytes::new())))
        }
    });
    let service = RequestLoggingLayer::new(logger).layer(app);
    service.oneshot(get("/")).await.unwrap();

    let units = sink.entries();
    let messages: Vec<&str> = units.iter().map(|u| u.message.as_str()).collect();
    assert_eq!(messages, vec!["Request Started", "a", "b", "Request Ended"]);
    assert!(units
        .iter()
        .all(|u| u.http_request.as_ref().unwrap().status == Some(200)));
}

#[tokio::test]
async fn test_inner_error_still_finishes_the_request() {
    let (logger, sink) = logger(10, true);

    let handler_logger = logger.clone();
    let app = service_fn(move |_req: Request<Body>| {
        let logger = handler_logger.clone();
        async move {
            logger.error("upstream refused");
            Err::<Response<Body>, _>(std::io::Error::other("connection refused"))
        }
    });
    let service = RequestLoggingLayer::new(logger).layer(app);

    let err = service.oneshot(get("/checkout")).await.unwrap_err();
    assert_eq!(err.to_string(), "connection refused");

    let units = sink.entries();
    let messages: Vec<&str> = units.iter().map(|u| u.message.as_str()).collect();
    assert_eq!(messages, vec!["Request Started", "upstream refused", "Request Ended"]);
    assert!(units.iter().all(|u| u.http_request.as_ref().unwrap().status.is_none()));
    assert!(units[2].operation.as_ref().unwrap().last);
}

#[tokio::test]
async fn test_panicking_handler_still_finishes_the_request() {
    let (logger, sink) = logger(10, false);

    let handler_logger = logger.clone();
    let app = service_fn(move |_req: Request<Body>| {
        let logger = handler_logger.clone();
        async move {
            logger.info("about to fail");
            if logger.producer().is_empty() {
                return Ok::<_, Infallible>(Response::new(Full::new(Bytes::new())));
            }
            panic!("handler bug");
        }
    });
    let service = RequestLoggingLayer::new(logger).layer(app);

    let joined = tokio::spawn(service.oneshot(get("/boom"))).await;
    assert!(joined.unwrap_err().is_panic());

    let units = sink.entries();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].message, "about to fail");
    let op = units[0].operation.as_ref().unwrap();
    assert!(op.first && op.last);
    assert!(units[0].http_request.as_ref().unwrap().status.is_none());
}

#[tokio::test]
async fn test_cancelled_request_is_flushed() {
    let (logger, sink) = logger(10, false);

    let handler_logger = logger.clone();
    let app = service_fn(move |_req: Request<Body>| {
        let logger = handler_logger.clone();
        async move {
            logger.info("waiting on slow dependency");
            std::future::pending::<()>().await;
            Ok::<_, Infallible>(Response::new(Full::new(Bytes::new())))
        }
    });
    let service = RequestLoggingLayer::new(logger).layer(app);

    let result = tokio::time::timeout(Duration::from_millis(20), service.oneshot(get("/slow"))).await;
    assert!(result.is_err());

    let units = sink.entries();
    assert_eq!(units.len(), 1);
    assert!(units[0].operation.as_ref().unwrap().last);
}

#[tokio::test]
async fn test_logs_outside_requests_are_not_correlated() {
    let (logger, sink) = logger(10, true);

    let app = service_fn(|_req: Request<Body>| async {
        Ok::<_, Infallible>(Response::new(Full::new(Bytes::new())))
    });
    let service = RequestLoggingLayer::new(logger.clone()).layer(app);
    service.oneshot(get("/")).await.unwrap();

    logger.info("background job done");

    let batches = sink.batches();
    let fallback = batches.last().unwrap();
    assert_eq!(fallback.log_name, "shop_log");
    assert!(fallback.entries[0].operation.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_do_not_interleave() {
    let (logger, sink) = logger(2, false);

    let handler_logger = logger.clone();
    let app = service_fn(move |req: Request<Body>| {
        let logger = handler_logger.clone();
        async move {
            let path = req.uri().path().to_string();
            for i in 0..5 {
                logger.info(format!("{} {}", path, i));
                tokio::task::yield_now().await;
            }
            Ok::<_, Infallible>(Response::new(Full::new(Bytes::new())))
        }
    });
    let service = RequestLoggingLayer::new(logger).layer(app);

    let calls = (0..12).map(|n| {
        let service = service.clone();
        tokio::spawn(service.oneshot(get(&format!("/r{}", n))))
    });
    for call in futures_util::future::join_all(calls).await {
        call.unwrap().unwrap();
    }

    for batch in sink.batches() {
        let urls: Vec<&str> = batch
            .entries
            .iter()
            .map(|u| u.http_request.as_ref().unwrap().url.as_str())
            .collect();
        assert!(urls.windows(2).all(|w| w[0] == w[1]));
        for unit in &batch.entries {
            assert!(unit.message.starts_with(urls[0]));
        }
    }
    assert_eq!(sink.entries().len(), 60);
}
