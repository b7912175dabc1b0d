//! Redirect evaluation: where to go next and what survives the hop.

use log::warn;
use url::Url;

use crate::config::{ClientConfig, Target};
use crate::enums::Method;
use crate::error::Result;
use crate::wire::{Request, Response};

/// A decision to follow one redirect.
#[derive(Debug, PartialEq, Eq)]
pub struct Redirect {
    pub target: Target,
    pub path: String,
    /// 303 (and 302 when configured) turn the request into a bodyless GET.
    pub rewrite_to_get: bool,
}

/// Decide whether `resp` redirects the request, and to where. Returns `None`
/// for non-redirect statuses and for `Location` values that cannot be
/// followed (those surface the 3xx to the caller instead).
pub fn evaluate(
    resp: &Response,
    req: &Request,
    current: &Target,
    config: &ClientConfig,
) -> Result<Option<Redirect>> {
    if !matches!(resp.status, 301 | 302 | 303 | 307 | 308) {
        return Ok(None);
    }
    let Some(location) = resp.header("location") else {
        return Ok(None);
    };

    let scheme = if current.tls { "https" } else { "http" };
    let base = match Url::parse(&format!(
        "{scheme}://{}:{}{}",
        current.host, current.port, req.path
    )) {
        Ok(u) => u,
        Err(e) => {
            warn!("cannot form base url for redirect: {e}");
            return Ok(None);
        }
    };

    let next = match base.join(location) {
        Ok(u) => u,
        Err(e) => {
            warn!("unfollowable Location {location:?}: {e}");
            return Ok(None);
        }
    };

    let tls = match next.scheme() {
        "http" => false,
        "https" => true,
        other => {
            warn!("refusing redirect to {other} url");
            return Ok(None);
        }
    };
    let Some(host) = next.host_str() else {
        warn!("redirect target has no host");
        return Ok(None);
    };
    let port = next
        .port_or_known_default()
        .unwrap_or(if tls { 443 } else { 80 });

    let mut path = next.path().to_string();
    if let Some(query) = next.query() {
        path.push('?');
        path.push_str(query);
    }

    let downgrade = resp.status == 303 || (resp.status == 302 && config.downgrade_302);
    let rewrite_to_get = downgrade && !matches!(req.method, Method::GET | Method::HEAD);

    Ok(Some(Redirect {
        target: Target {
            host: host.to_string(),
            port,
            tls,
        },
        path,
        rewrite_to_get,
    }))
}
