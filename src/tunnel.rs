//! CONNECT tunnel establishment through a forward proxy.

use std::io::{Read, Write};

use log::{debug, warn};

use crate::authorize::Authorizer;
use crate::challenge::collect_challenges;
use crate::config::Target;
use crate::credentials::CredentialStore;
use crate::enums::{AuthScheme, AuthScope, Method};
use crate::error::{Error, Result};
use crate::wire::{BodyMode, Response, ResponseReader, WireError};

/// Outcome of a tunnel attempt that did not hard-fail.
#[derive(Debug)]
pub(crate) enum TunnelStatus {
    /// The proxy answered 2xx; the stream is ready for the TLS handshake.
    Established,
    /// Terminal 407: no credential, unparseable challenge, or the retry was
    /// also refused. The response is surfaced to the caller as-is.
    Denied(Response),
}

/// Send `CONNECT` and validate the proxy's answer, retrying exactly once per
/// challenge. The connection's reader is borrowed so that any bytes buffered
/// past the tunnel response stay with the connection.
pub(crate) fn establish<S: Read + Write>(
    stream: &mut S,
    reader: &mut ResponseReader,
    target: &Target,
    store: &CredentialStore,
    auth: &mut Authorizer,
) -> Result<TunnelStatus> {
    let authority = target.authority();
    let mut retried = false;

    loop {
        let mut head = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
        if let Some(value) =
            auth.preemptive(store, AuthScope::Proxy, &Method::CONNECT, &authority, None)?
        {
            head.push_str("Proxy-Authorization: ");
            head.push_str(&value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");

        debug!("CONNECT {authority}");
        stream
            .write_all(head.as_bytes())
            .and_then(|_| stream.flush())
            .map_err(|e| Error::ConnectionLost(format!("CONNECT write failed: {e}")))?;

        let (resp, _close) = reader
            .read_response(stream, BodyMode::Connect)
            .map_err(|e| match e {
                WireError::Io(e) => Error::ConnectionLost(format!("CONNECT read failed: {e}")),
                WireError::CleanEof => {
                    Error::ConnectionLost("proxy closed before CONNECT response".into())
                }
                WireError::Malformed(m) => Error::ConnectionLost(m),
            })?;

        if (200..300).contains(&resp.status) {
            debug!("tunnel to {authority} established");
            return Ok(TunnelStatus::Established);
        }

        if resp.status == 407 && !retried {
            let challenges = match collect_challenges(&resp, AuthScope::Proxy) {
                Ok(c) if !c.is_empty() => c,
                Ok(_) => return Ok(TunnelStatus::Denied(resp)),
                Err(e) => {
                    warn!("unusable proxy challenge: {e}");
                    return Ok(TunnelStatus::Denied(resp));
                }
            };
            match store.answer(AuthScope::Proxy, &challenges) {
                Ok((cred, ch)) => {
                    if cred.scheme == AuthScheme::Digest {
                        auth.absorb(AuthScope::Proxy, ch);
                    }
                    retried = true;
                    continue;
                }
                Err(Error::AuthConfigMissing { scope, scheme }) => {
                    debug!("no {scheme} credential for {scope} scope, giving up on tunnel");
                    return Ok(TunnelStatus::Denied(resp));
                }
                Err(e) => return Err(e),
            }
        }

        if resp.status == 407 {
            return Ok(TunnelStatus::Denied(resp));
        }

        return Err(Error::ProxyTunnelRejected {
            status: resp.status,
        });
    }
}
