//! HTTP/1.1 connection and authentication layer: one reused TCP (or TLS)
//! connection per client, CONNECT tunneling through forward proxies, Basic
//! and Digest authentication (IETF RFCs 2069, 2617 and 7616) with
//! independent origin and proxy scopes, redirect chains, and pipelined
//! batches whose responses come back in submission order.
//!
//! The transport is pluggable: [`PlainTransport`] covers cleartext TCP, and
//! anything implementing [`Transport`] (a TLS library wrapper, a test mock)
//! plugs into the same engine.
//!
//! # Examples
//!
//! Answering a Digest challenge by hand:
//!
//! ```
//! use httpsession::{parse_challenges, digest_header, AuthScope, Credential, DigestSession, Method};
//!
//! // Value from the WWW-Authenticate header of a 401 response
//! let www_authenticate = r#"Digest realm="http-auth@example.org", qop="auth, auth-int", algorithm=MD5, nonce="7ypf/xlj9XXwfDPEoM4URrv/xwf94BcCAzFZH4GiTo0v", opaque="FQhe/qaU925kfnzjCev0ciny7QMkPqMAFRtzCUYo5tdS""#;
//!
//! let challenge = parse_challenges(www_authenticate).unwrap().remove(0);
//!
//! // The session tracks the nonce count across requests. The client nonce
//! // is random; it is pinned here so the output is stable.
//! let mut session = DigestSession::from_challenge(&challenge);
//! session.set_cnonce("f2/wE4q74E6zIJEtWaHKaf5wv/H5QzzpXusqGemxURZJ");
//!
//! let cred = Credential::digest(AuthScope::Origin, "Mufasa", "Circle of Life");
//! let answer = digest_header(&cred, &mut session, &Method::GET, "/dir/index.html", None).unwrap();
//!
//! assert_eq!(answer, r#"Digest username="Mufasa", realm="http-auth@example.org", nonce="7ypf/xlj9XXwfDPEoM4URrv/xwf94BcCAzFZH4GiTo0v", uri="/dir/index.html", algorithm=MD5, response="8ca523f5e9506fed4657c9700eebdbec", qop=auth, nc=00000001, cnonce="f2/wE4q74E6zIJEtWaHKaf5wv/H5QzzpXusqGemxURZJ", opaque="FQhe/qaU925kfnzjCev0ciny7QMkPqMAFRtzCUYo5tdS""#);
//! ```
//!
//! Letting the client handle challenges, redirects and connection reuse:
//!
//! ```no_run
//! use httpsession::{AuthScope, Client, ClientConfig, Credential, Request};
//!
//! let config = ClientConfig::new("httpbin.org", 80).with_follow_redirects(true);
//! let mut client = Client::plain(config);
//! client.set_credential(Credential::digest(AuthScope::Origin, "user", "passwd"));
//!
//! let resp = client.perform(Request::get("/digest-auth/auth/user/passwd")).unwrap();
//! assert_eq!(resp.status, 200);
//! ```

mod authorize;
mod challenge;
mod config;
mod credentials;
mod enums;
mod error;
mod pipeline;
mod redirect;
mod session;
mod transport;
mod tunnel;
mod utils;
mod wire;

pub use crate::authorize::{basic_header, digest_header, Authorizer};
pub use crate::challenge::{parse_header_map, Challenge};
pub use crate::config::{ClientConfig, ProxyConfig, Target};
pub use crate::credentials::{Credential, CredentialStore};
pub use crate::enums::*;
pub use crate::error::{ChallengeError, Error, Result};
pub use crate::pipeline::Client;
pub use crate::session::DigestSession;
pub use crate::transport::{PlainTransport, Transport};
pub use crate::wire::{Request, Response};

/// Parse a `WWW-Authenticate` / `Proxy-Authenticate` value, which may carry
/// several comma-separated challenges. Convenience wrapper around
/// [`Challenge::parse_all()`].
pub fn parse_challenges(header: &str) -> Result<Vec<Challenge>> {
    Ok(Challenge::parse_all(header)?)
}

#[test]
fn test_parse_and_answer() {
    let src = r#"
    Digest
       realm="http-auth@example.org",
       qop="auth, auth-int",
       algorithm=MD5,
       nonce="7ypf/xlj9XXwfDPEoM4URrv/xwf94BcCAzFZH4GiTo0v",
       opaque="FQhe/qaU925kfnzjCev0ciny7QMkPqMAFRtzCUYo5tdS"
    "#;

    let challenge = parse_challenges(src).unwrap().remove(0);
    let mut session = DigestSession::from_challenge(&challenge);
    session.set_cnonce("f2/wE4q74E6zIJEtWaHKaf5wv/H5QzzpXusqGemxURZJ");

    let cred = Credential::digest(AuthScope::Origin, "Mufasa", "Circle of Life");
    let answer =
        digest_header(&cred, &mut session, &Method::GET, "/dir/index.html", None).unwrap();

    let str = answer.replace(", ", ",\n  ");

    assert_eq!(
        str,
        r#"
Digest username="Mufasa",
  realm="http-auth@example.org",
  nonce="7ypf/xlj9XXwfDPEoM4URrv/xwf94BcCAzFZH4GiTo0v",
  uri="/dir/index.html",
  algorithm=MD5,
  response="8ca523f5e9506fed4657c9700eebdbec",
  qop=auth,
  nc=00000001,
  cnonce="f2/wE4q74E6zIJEtWaHKaf5wv/H5QzzpXusqGemxURZJ",
  opaque="FQhe/qaU925kfnzjCev0ciny7QMkPqMAFRtzCUYo5tdS"
"#
        .trim()
    );
}
