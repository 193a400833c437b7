//! Content type checks and context extraction.

use http::header::CONTENT_TYPE;
use http::Request;

use super::headers::{
    collect_headers, header_value, parse_claims, parse_query, CATEGORY_HEADER,
    CLIENT_QUERY_HEADER, CONNECTION_ID_HEADER, EVENT_HEADER, HUB_HEADER, USER_CLAIMS_HEADER,
    USER_ID_HEADER,
};
use crate::error::GatewayError;
use crate::handler::{Category, InvocationContext};
use crate::protocol::HubProtocol;

/// Protocol selected by the request's content type.
pub fn request_protocol<B>(request: &Request<B>) -> Option<HubProtocol> {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(HubProtocol::from_content_type)
}

/// Whether the content type is one of the supported media types.
pub fn validate_content_type<B>(request: &Request<B>) -> bool {
    request_protocol(request).is_some()
}

/// Build the invocation context from the request headers.
///
/// Connection id, hub, category and event are required and must be
/// non-empty; the category must be a known one.
pub fn extract_context<B>(request: &Request<B>) -> Result<InvocationContext, GatewayError> {
    let headers = request.headers();
    let required = |name| header_value(headers, name).ok_or(GatewayError::MissingContext);

    let connection_id = required(CONNECTION_ID_HEADER)?;
    let hub = required(HUB_HEADER)?;
    let raw_category = required(CATEGORY_HEADER)?;
    let event = required(EVENT_HEADER)?;

    let category =
        Category::parse(raw_category.trim()).ok_or(GatewayError::InvalidCategory(raw_category))?;

    Ok(InvocationContext::new(connection_id, hub, category, event)
        .with_user_id(header_value(headers, USER_ID_HEADER))
        .with_query(header_value(headers, CLIENT_QUERY_HEADER).map(|q| parse_query(&q)))
        .with_claims(header_value(headers, USER_CLAIMS_HEADER).map(|c| parse_claims(&c)))
        .with_headers(collect_headers(headers)))
}

/// Like [`extract_context`], discarding the reason.
pub fn try_extract_context<B>(request: &Request<B>) -> Option<InvocationContext> {
    extract_context(request).ok()
}
