//! Request attributes read from `http` types

use http::header::{CONTENT_LENGTH, REFERER, USER_AGENT};
use http::{HeaderMap, HeaderName, Request, Response};
use hyper::body::Body;
use reqlog_core::RequestMeta;
use std::fmt;
use std::net::SocketAddr;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Id of the request being logged, available as a request extension.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Wrap an id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read the request id from `header`, or generate a UUID v4.
pub fn request_id(headers: &HeaderMap, header: &str) -> String {
    HeaderName::try_from(header)
        .ok()
        .and_then(|name| header_str(headers, &name))
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Capture the static attributes of a request.
pub fn request_meta<B: Body>(req: &Request<B>) -> RequestMeta {
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| req.uri().path());

    let headers = req.headers();
    let mut meta = RequestMeta::new(req.method().as_str(), path);
    meta.remote_address = client_address(req);
    meta.user_agent = header_str(headers, &USER_AGENT).map(str::to_string);
    meta.referer = header_str(headers, &REFERER).map(str::to_string);
    meta.request_size = content_length(headers).or_else(|| req.body().size_hint().exact());
    meta
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the
/// peer address stored in the request extensions.
pub fn client_address<B>(req: &Request<B>) -> Option<String> {
    let headers = req.headers();

    let forwarded = header_str(headers, &HeaderName::from_static(X_FORWARDED_FOR))
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty());
    if let Some(hop) = forwarded {
        return Some(hop.to_string());
    }

    let real_ip = header_str(headers, &HeaderName::from_static(X_REAL_IP))
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = real_ip {
        return Some(ip.to_string());
    }

    req.extensions()
        .get::<SocketAddr>()
        .map(|addr| addr.ip().to_string())
}

/// Response body size, when known without reading the body.
pub fn response_size<B: Body>(res: &Response<B>) -> Option<u64> {
    res.body()
        .size_hint()
        .exact()
        .or_else(|| content_length(res.headers()))
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    header_str(headers, &CONTENT_LENGTH).and_then(|v| v.trim().parse().ok())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
