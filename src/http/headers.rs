//! Hop-by-hop header handling.
//!
//! # Responsibilities
//! - Strip headers named by the `Connection` header (RFC 7230 §6.1)
//! - Strip the fixed hop-by-hop set before a request crosses a proxy hop
//!
//! # Design Decisions
//! - Operates in place on a `HeaderMap`; never fails
//! - `TE: trailers` survives, every other `TE` value is dropped
//! - Idempotent: the first pass removes `Connection`, so a second pass has
//!   nothing left to expand

use axum::http::header::{self, HeaderMap, HeaderName};

/// Headers that only make sense on a single connection leg.
pub const HOP_BY_HOP_HEADERS: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    HeaderName::from_static("trailers"),
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Removes every header listed in the `Connection` header.
pub fn remove_connection_headers(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter_map(|name| HeaderName::from_bytes(name.as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(&name);
    }
}

/// Removes the fixed hop-by-hop set, keeping `TE: trailers`.
pub fn remove_hop_headers(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP_HEADERS.iter() {
        if *name == header::TE && te_is_trailers(headers) {
            continue;
        }
        headers.remove(name);
    }
}

/// Sanitizes a header set before it is forwarded upstream.
pub fn prune(headers: &mut HeaderMap) {
    remove_connection_headers(headers);
    remove_hop_headers(headers);
}

fn te_is_trailers(headers: &HeaderMap) -> bool {
    let mut values = headers.get_all(header::TE).iter().peekable();
    values.peek().is_some() && values.all(|value| value == "trailers")
}
