use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use digest::{Digest, DynDigest};
use md5::Md5;
use sha2::{Sha256, Sha512};

use crate::error::ChallengeError;

/// Hash algorithm named by a Digest challenge.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[allow(non_camel_case_types)]
pub enum AlgorithmType {
    MD5,
    SHA2_256,
    SHA2_512,
}

/// Algorithm and the -sess flag pair.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Algorithm {
    pub algo: AlgorithmType,
    pub sess: bool,
}

impl Algorithm {
    /// Compose from algorithm type and the -sess flag
    pub fn new(algo: AlgorithmType, sess: bool) -> Algorithm {
        Algorithm { algo, sess }
    }

    /// Calculate a lower-case hex hash of bytes using the selected algorithm
    pub fn hash(self, bytes: &[u8]) -> String {
        let mut hash: Box<dyn DynDigest> = match self.algo {
            AlgorithmType::MD5 => Box::new(Md5::new()),
            AlgorithmType::SHA2_256 => Box::new(Sha256::new()),
            AlgorithmType::SHA2_512 => Box::new(Sha512::new()),
        };

        hash.update(bytes);
        hex::encode(hash.finalize())
    }

    /// Calculate a hash of string's bytes using the selected algorithm
    pub fn hash_str(self, bytes: &str) -> String {
        self.hash(bytes.as_bytes())
    }
}

impl FromStr for Algorithm {
    type Err = ChallengeError;

    /// Parse from the format used in challenge headers
    fn from_str(s: &str) -> Result<Self, ChallengeError> {
        match s {
            "MD5" => Ok(Algorithm::new(AlgorithmType::MD5, false)),
            "MD5-sess" => Ok(Algorithm::new(AlgorithmType::MD5, true)),
            "SHA-256" => Ok(Algorithm::new(AlgorithmType::SHA2_256, false)),
            "SHA-256-sess" => Ok(Algorithm::new(AlgorithmType::SHA2_256, true)),
            "SHA-512" => Ok(Algorithm::new(AlgorithmType::SHA2_512, false)),
            "SHA-512-sess" => Ok(Algorithm::new(AlgorithmType::SHA2_512, true)),
            _ => Err(ChallengeError::UnknownAlgorithm(s.into())),
        }
    }
}

impl Default for Algorithm {
    /// Get a MD5 instance
    fn default() -> Self {
        Algorithm::new(AlgorithmType::MD5, false)
    }
}

impl Display for Algorithm {
    /// Format to the form used in HTTP headers
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self.algo {
            AlgorithmType::MD5 => "MD5",
            AlgorithmType::SHA2_256 => "SHA-256",
            AlgorithmType::SHA2_512 => "SHA-512",
        })?;

        if self.sess {
            f.write_str("-sess")?;
        }

        Ok(())
    }
}

/// QOP field values
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[allow(non_camel_case_types)]
pub enum Qop {
    AUTH,
    AUTH_INT,
}

impl FromStr for Qop {
    type Err = ChallengeError;

    /// Parse from "auth" or "auth-int" as used in HTTP headers
    fn from_str(s: &str) -> Result<Self, ChallengeError> {
        match s {
            "auth" => Ok(Qop::AUTH),
            "auth-int" => Ok(Qop::AUTH_INT),
            _ => Err(ChallengeError::BadQop(s.into())),
        }
    }
}

impl Display for Qop {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Qop::AUTH => "auth",
            Qop::AUTH_INT => "auth-int",
        })
    }
}

/// QOP selected for one generated header, with the body when integrity
/// protection applies.
#[derive(Debug)]
#[allow(non_camel_case_types)]
pub(crate) enum QopAlgo<'a> {
    NONE,
    AUTH,
    AUTH_INT(&'a [u8]),
}

impl<'a> From<QopAlgo<'a>> for Option<Qop> {
    fn from(algo: QopAlgo<'a>) -> Self {
        match algo {
            QopAlgo::NONE => None,
            QopAlgo::AUTH => Some(Qop::AUTH),
            QopAlgo::AUTH_INT(_) => Some(Qop::AUTH_INT),
        }
    }
}

/// Authentication scheme of a credential or challenge.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AuthScheme {
    Basic,
    Digest,
}

impl Display for AuthScheme {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthScheme::Basic => "Basic",
            AuthScheme::Digest => "Digest",
        })
    }
}

/// Which party issued the challenge: the origin server (401) or an
/// intermediary proxy (407). The two scopes hold independent credentials
/// and Digest session state.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AuthScope {
    Origin,
    Proxy,
}

impl AuthScope {
    /// Status code that carries a challenge for this scope
    pub fn status_code(self) -> u16 {
        match self {
            AuthScope::Origin => 401,
            AuthScope::Proxy => 407,
        }
    }

    /// Response header carrying the challenge
    pub fn challenge_header(self) -> &'static str {
        match self {
            AuthScope::Origin => "WWW-Authenticate",
            AuthScope::Proxy => "Proxy-Authenticate",
        }
    }

    /// Request header carrying the answer
    pub fn authorization_header(self) -> &'static str {
        match self {
            AuthScope::Origin => "Authorization",
            AuthScope::Proxy => "Proxy-Authorization",
        }
    }
}

impl Display for AuthScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthScope::Origin => "origin",
            AuthScope::Proxy => "proxy",
        })
    }
}

/// HTTP method of a logical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    GET,
    HEAD,
    POST,
    PUT,
    DELETE,
    CONNECT,
    OTHER(String),
}

impl Method {
    /// Methods safe to transparently re-send after a reconnect.
    pub fn is_idempotent(&self) -> bool {
        matches!(self, Method::GET | Method::HEAD)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::CONNECT => "CONNECT",
            Method::OTHER(s) => s,
        }
    }
}

impl Default for Method {
    fn default() -> Self {
        Method::GET
    }
}

impl Display for Method {
    /// Convert to uppercase string
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
