//! Extraction of [`ConnectionRequest`] from an HTTP upgrade request.

use std::net::SocketAddr;

use tokio_tungstenite::tungstenite::http::{header, HeaderMap, Request};

use crate::domain::{ConnectionRequest, RequestId, SubjectId};

const REQUEST_ID_HEADER: &str = "x-request-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const SESSION_COOKIE: &str = "session";

/// Build the connection parameters from an upgrade request.
///
/// The credential comes from `Authorization: Bearer`, else the `token`
/// query parameter. The source address is the peer IP, or the first
/// `X-Forwarded-For` entry when `trust_forwarded_for` is set.
pub fn parse_request<B>(
    request: &Request<B>,
    peer: SocketAddr,
    trust_forwarded_for: bool,
) -> ConnectionRequest {
    let headers = request.headers();
    let query = request.uri().query().unwrap_or_default();
    let param = |name: &str| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    };

    let source_address = trust_forwarded_for
        .then(|| forwarded_for(headers))
        .flatten()
        .unwrap_or_else(|| peer.ip().to_string());

    ConnectionRequest {
        credential: bearer(headers).or_else(|| param("token")),
        subject_hint: param("user_id").map(SubjectId::new),
        request_id: param("request_id")
            .or_else(|| header_str(headers, REQUEST_ID_HEADER).map(str::to_string))
            .map(RequestId::new),
        session_cookie: session_cookie(headers),
        source_address,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    let value = header_str(headers, header::AUTHORIZATION.as_str())?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    header_str(headers, FORWARDED_FOR_HEADER)?
        .split(',')
        .next()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
