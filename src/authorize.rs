//! Generation of `Authorization` / `Proxy-Authorization` header values.

use std::fmt::Write as _;

use base64::prelude::*;
use log::debug;

use crate::credentials::{Credential, CredentialStore};
use crate::enums::{AlgorithmType, AuthScheme, AuthScope, Method, Qop, QopAlgo};
use crate::error::{ChallengeError, Error, Result};
use crate::session::DigestSession;
use crate::utils::QuoteForDigest;

/// Build a Basic header value. Stateless and byte-stable for one credential.
pub fn basic_header(username: &str, password: &str) -> String {
    let creds = format!("{username}:{password}");
    format!("Basic {}", BASE64_STANDARD.encode(creds.as_bytes()))
}

/// Build a Digest header value against the session's current nonce,
/// claiming the next nonce count.
///
/// # Errors
/// Fails when the challenge offered an empty qop list (parser guarantees a
/// recognized value otherwise).
pub fn digest_header(
    cred: &Credential,
    session: &mut DigestSession,
    method: &Method,
    uri: &str,
    body: Option<&[u8]>,
) -> Result<String> {
    // figure out which QOP option to use
    let qop_algo = match &session.qop {
        None => QopAlgo::NONE,
        Some(vec) => {
            if vec.contains(&Qop::AUTH_INT) {
                match body {
                    Some(b) => QopAlgo::AUTH_INT(b),
                    // no body to protect. Fall back to regular auth if offered
                    None if vec.contains(&Qop::AUTH) => QopAlgo::AUTH,
                    None => QopAlgo::AUTH_INT(b""),
                }
            } else if vec.contains(&Qop::AUTH) {
                QopAlgo::AUTH
            } else {
                return Err(Error::MalformedChallenge(ChallengeError::BadQop(
                    "empty qop option list".into(),
                )));
            }
        }
    };

    let h = session.algorithm;

    let a1 = {
        let a = format!(
            "{name}:{realm}:{pw}",
            name = cred.username,
            realm = session.realm,
            pw = cred.password
        );

        if h.sess {
            format!(
                "{hash}:{nonce}:{cnonce}",
                hash = h.hash_str(&a),
                nonce = session.nonce,
                cnonce = session.cnonce
            )
        } else {
            a
        }
    };

    let a2 = match qop_algo {
        QopAlgo::AUTH | QopAlgo::NONE => format!("{method}:{uri}"),
        QopAlgo::AUTH_INT(body) => {
            format!("{method}:{uri}:{bodyhash}", bodyhash = h.hash(body))
        }
    };

    // hashed or plain username - always hash if the server asks for it
    let username = if session.userhash {
        h.hash_str(&format!(
            "{username}:{realm}",
            username = cred.username,
            realm = session.realm
        ))
    } else {
        cred.username.clone()
    };

    let qop: Option<Qop> = qop_algo.into();

    let ha1 = h.hash_str(&a1);
    let ha2 = h.hash_str(&a2);

    let nc = session.next_nc();

    let response = match &qop {
        Some(q) => h.hash_str(&format!(
            "{ha1}:{nonce}:{nc:08x}:{cnonce}:{q}:{ha2}",
            nonce = session.nonce,
            cnonce = session.cnonce,
        )),
        None => h.hash_str(&format!("{ha1}:{nonce}:{ha2}", nonce = session.nonce)),
    };

    let mut out = String::with_capacity(256);
    out.push_str("Digest ");
    let _ = write!(out, "username=\"{}\"", username.quote_for_digest());
    let _ = write!(out, ", realm=\"{}\"", session.realm.quote_for_digest());
    let _ = write!(out, ", nonce=\"{}\"", session.nonce.quote_for_digest());
    let _ = write!(out, ", uri=\"{uri}\"");

    // omitted only in RFC 2069 legacy mode with the default algorithm
    if qop.is_some() || session.algorithm.algo != AlgorithmType::MD5 {
        let _ = write!(out, ", algorithm={}", session.algorithm);
    }

    let _ = write!(out, ", response=\"{response}\"");

    if let Some(q) = &qop {
        let _ = write!(
            out,
            ", qop={q}, nc={nc:08x}, cnonce=\"{}\"",
            session.cnonce.quote_for_digest()
        );
    }

    if let Some(opaque) = &session.opaque {
        let _ = write!(out, ", opaque=\"{}\"", opaque.quote_for_digest());
    }

    if session.userhash {
        out.push_str(", userhash=true");
    }

    Ok(out)
}

/// Holds the two per-scope Digest sessions and produces ready-to-send header
/// values. Origin and proxy state never mix; the pipeline engine is the only
/// writer.
#[derive(Debug, Default)]
pub struct Authorizer {
    origin: Option<DigestSession>,
    proxy: Option<DigestSession>,
}

impl Authorizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, scope: AuthScope) -> &mut Option<DigestSession> {
        match scope {
            AuthScope::Origin => &mut self.origin,
            AuthScope::Proxy => &mut self.proxy,
        }
    }

    pub fn session(&self, scope: AuthScope) -> Option<&DigestSession> {
        match scope {
            AuthScope::Origin => self.origin.as_ref(),
            AuthScope::Proxy => self.proxy.as_ref(),
        }
    }

    /// Seed or refresh the session for a scope from a parsed challenge.
    pub fn absorb(&mut self, scope: AuthScope, ch: &crate::challenge::Challenge) {
        let slot = self.slot(scope);
        match slot {
            Some(session) => session.absorb(ch),
            None => *slot = Some(DigestSession::from_challenge(ch)),
        }
        debug!("absorbed {} digest challenge, realm {:?}", scope, ch.realm);
    }

    /// Drop the session for one scope (credential change, host change).
    pub fn clear(&mut self, scope: AuthScope) {
        *self.slot(scope) = None;
    }

    /// Drop both sessions (connection closed).
    pub fn clear_all(&mut self) {
        self.origin = None;
        self.proxy = None;
    }

    /// Header value to attach before any challenge has been seen on this
    /// exchange: Digest when a session exists for the scope, Basic whenever a
    /// Basic credential is configured, nothing otherwise.
    pub fn preemptive(
        &mut self,
        store: &CredentialStore,
        scope: AuthScope,
        method: &Method,
        uri: &str,
        body: Option<&[u8]>,
    ) -> Result<Option<String>> {
        if let Some(cred) = store.get(scope, AuthScheme::Digest) {
            if let Some(session) = self.slot(scope).as_mut() {
                return digest_header(cred, session, method, uri, body).map(Some);
            }
        }
        if let Some(cred) = store.get(scope, AuthScheme::Basic) {
            return Ok(Some(basic_header(&cred.username, &cred.password)));
        }
        Ok(None)
    }
}
