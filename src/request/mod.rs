//! Request module - upstream request validation.
//!
//! Provides:
//! - header names and parsers for the `X-ASRS-*` headers
//! - [`validate_signature`] - HMAC-SHA256 check against candidate keys
//! - [`try_extract_context`] - builds an [`InvocationContext`](crate::handler::InvocationContext)

mod headers;
mod signature;
mod validator;

pub use headers::{
    collect_headers, header_value, parse_claims, parse_query, parse_signatures, CATEGORY_HEADER,
    CLIENT_QUERY_HEADER, CONNECTION_ID_HEADER, EVENT_HEADER, HUB_HEADER, SIGNATURE_HEADER,
    USER_CLAIMS_HEADER, USER_ID_HEADER,
};
pub use signature::{compute_signature, signature_matches, validate_signature, SIGNATURE_PREFIX};
pub use validator::{
    extract_context, request_protocol, try_extract_context, validate_content_type,
};
