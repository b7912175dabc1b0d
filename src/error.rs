use std::io;

use thiserror::Error;

use crate::enums::{AuthScheme, AuthScope};

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to callers of the connection layer.
///
/// Authentication rejections are deliberately *not* errors: after the single
/// permitted retry, the 401/407 response itself is returned and callers
/// inspect the status code.
#[derive(Debug, Error)]
pub enum Error {
    /// A `WWW-Authenticate` / `Proxy-Authenticate` value could not be parsed.
    #[error("malformed challenge: {0}")]
    MalformedChallenge(#[from] ChallengeError),

    /// A challenge arrived but no credential is configured for its scope.
    /// Consumed by the retry logic; the engine surfaces the 4xx response
    /// unchanged instead of propagating this.
    #[error("no {scheme} credential configured for the {scope} scope")]
    AuthConfigMissing {
        scope: AuthScope,
        scheme: AuthScheme,
    },

    /// The proxy answered `CONNECT` with a non-2xx, non-407 status.
    #[error("proxy refused CONNECT with status {status}")]
    ProxyTunnelRejected { status: u16 },

    /// A read or write failed mid-exchange and the reconnect budget is spent.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// A redirect chain exceeded the configured maximum hop count.
    #[error("redirect chain exceeded {limit} hops")]
    TooManyRedirects { limit: usize },

    /// Pass-through failure from the transport port (connect, TLS handshake).
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

/// Ways a challenge header can be malformed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChallengeError {
    #[error("unrecognized auth scheme: {0}")]
    UnknownScheme(String),
    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("bad qop value: {0}")]
    BadQop(String),
    #[error("missing \"{0}\" parameter")]
    MissingRequired(&'static str),
    #[error("invalid header syntax: {0}")]
    InvalidSyntax(String),
}
