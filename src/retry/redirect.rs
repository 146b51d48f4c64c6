//! Redirect continuation building.

use bytes::Bytes;
use http::{Method, StatusCode, Uri};
use url::Url;

use crate::error::{Error, Result};
use crate::message::{Request, Response};

/// Statuses that carry a follow-up location.
const REDIRECT_STATUSES: [u16; 7] = [300, 301, 302, 303, 305, 307, 308];

pub fn is_redirect(status: StatusCode) -> bool {
    REDIRECT_STATUSES.contains(&status.as_u16())
}

/// Build the follow-up request for a redirect response, or `None` when the
/// response is not a redirect (or carries no usable Location).
///
/// The continuation keeps the original headers, body, and cookies; only the
/// target URL changes, with relative locations resolved against the original.
/// A 303 forces GET with an empty body. Each hop increments the request's
/// counter; exceeding `max_hops` is a terminal error for the caller.
pub fn continuation(
    original: &Request,
    response: &Response,
    max_hops: u32,
) -> Result<Option<Request>> {
    if !is_redirect(response.status) {
        return Ok(None);
    }
    let location = match response.location() {
        Some(l) => l,
        None => {
            tracing::debug!(status = %response.status, "Redirect without Location; passing through");
            return Ok(None);
        }
    };

    if original.redirect_hops + 1 > max_hops {
        return Err(Error::RedirectLoopExceeded {
            uri: original.uri.to_string(),
            max_hops,
        });
    }

    let target = match resolve(&original.uri, location) {
        Some(t) => t,
        None => {
            // A malformed target is deterministic; retrying or reconnecting
            // cannot fix it. Hand the redirect response to the caller.
            tracing::debug!(
                location,
                "Unresolvable redirect location; passing through"
            );
            return Ok(None);
        }
    };

    let mut next = original.clone();
    next.uri = target;
    next.redirect_hops += 1;
    if response.status == StatusCode::SEE_OTHER {
        next.method = Method::GET;
        next.body = Bytes::new();
    }
    tracing::debug!(
        status = %response.status,
        hop = next.redirect_hops,
        target = %next.uri,
        "Following redirect"
    );
    Ok(Some(next))
}

/// Resolve `location` against `base`, treating resolution as a pure function
/// of the two inputs.
fn resolve(base: &Uri, location: &str) -> Option<Uri> {
    let base = Url::parse(&base.to_string()).ok()?;
    let resolved = base.join(location).ok()?;
    resolved.as_str().parse().ok()
}
