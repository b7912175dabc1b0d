//! Per-scope Digest session state, seeded from challenges.

use crate::challenge::Challenge;
use crate::enums::{Algorithm, Qop};
use crate::utils::gen_cnonce;

/// Nonce bookkeeping for one authentication scope on one connection.
///
/// `nonce_count` grows by one for every header generated against the current
/// nonce; a challenge carrying a different nonce resets the count and draws a
/// fresh client nonce. The session dies with the connection (or when the
/// credential for its scope is replaced).
#[derive(Debug, Clone, PartialEq)]
pub struct DigestSession {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub algorithm: Algorithm,
    pub qop: Option<Vec<Qop>>,
    pub userhash: bool,
    pub cnonce: String,
    pub nonce_count: u32,
}

impl DigestSession {
    pub fn from_challenge(ch: &Challenge) -> Self {
        DigestSession {
            realm: ch.realm.clone(),
            nonce: ch.nonce.clone(),
            opaque: ch.opaque.clone(),
            algorithm: ch.algorithm,
            qop: ch.qop.clone(),
            userhash: ch.userhash,
            cnonce: gen_cnonce(),
            nonce_count: 0,
        }
    }

    /// Fold a fresh challenge into the session. A changed nonce restarts the
    /// count and the client nonce; everything else is updated in place.
    pub fn absorb(&mut self, ch: &Challenge) {
        if ch.nonce != self.nonce {
            self.nonce = ch.nonce.clone();
            self.cnonce = gen_cnonce();
            self.nonce_count = 0;
        }
        self.realm = ch.realm.clone();
        self.opaque = ch.opaque.clone();
        self.algorithm = ch.algorithm;
        self.qop = ch.qop.clone();
        self.userhash = ch.userhash;
    }

    /// Claim the next nonce count for a header about to be emitted.
    pub fn next_nc(&mut self) -> u32 {
        self.nonce_count += 1;
        self.nonce_count
    }

    /// Pin the client nonce (tests and RFC vectors only; a random one is
    /// drawn otherwise).
    pub fn set_cnonce(&mut self, cnonce: impl Into<String>) {
        self.cnonce = cnonce.into();
    }
}
