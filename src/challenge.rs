//! Parsing of `WWW-Authenticate` / `Proxy-Authenticate` header values.

use std::collections::HashMap;
use std::str::FromStr;

use crate::enums::{Algorithm, AuthScheme, AuthScope, Qop};
use crate::error::{ChallengeError, Result};
use crate::wire::Response;

/// One authentication challenge issued by a server or proxy.
///
/// A single header value may carry several of these (one per scheme); the
/// credential store decides which one to answer.
#[derive(Debug, PartialEq, Clone)]
pub struct Challenge {
    pub scheme: AuthScheme,
    /// Authorization realm (i.e. hostname, serial number...)
    pub realm: String,
    /// Server nonce; empty for Basic
    pub nonce: String,
    /// Server opaque string, echoed back verbatim
    pub opaque: Option<String>,
    /// True if the server nonce expired and a fresh digest should be computed
    /// from this challenge rather than the session state.
    pub stale: bool,
    /// Hashing algo
    pub algorithm: Algorithm,
    /// QOP options offered by the server, in header order. None for RFC 2069
    /// legacy mode and for Basic.
    pub qop: Option<Vec<Qop>>,
    /// Flag that the server supports user-hashes
    pub userhash: bool,
}

impl Challenge {
    /// Parse every challenge found in one header value.
    ///
    /// # Errors
    /// Fails when a scheme token is unrecognized or a challenge is missing a
    /// required parameter. Unknown *parameters* are ignored per RFC 7616.
    pub fn parse_all(input: &str) -> std::result::Result<Vec<Challenge>, ChallengeError> {
        let mut out = Vec::new();
        for (scheme, params) in split_schemes(input)? {
            let scheme = match scheme.as_str() {
                "Basic" => AuthScheme::Basic,
                "Digest" => AuthScheme::Digest,
                other => return Err(ChallengeError::UnknownScheme(other.into())),
            };

            let mut kv = parse_header_map(&params)?;

            let realm = kv
                .remove("realm")
                .ok_or(ChallengeError::MissingRequired("realm"))?;

            if scheme == AuthScheme::Basic {
                out.push(Challenge {
                    scheme,
                    realm,
                    nonce: String::new(),
                    opaque: None,
                    stale: false,
                    algorithm: Algorithm::default(),
                    qop: None,
                    userhash: false,
                });
                continue;
            }

            let nonce = kv
                .remove("nonce")
                .ok_or(ChallengeError::MissingRequired("nonce"))?;

            let algorithm = match kv.get("algorithm") {
                Some(a) => Algorithm::from_str(a)?,
                None => Algorithm::default(),
            };

            let qop = match kv.get("qop") {
                Some(list) => {
                    let mut qops = Vec::new();
                    for q in list.split(',') {
                        qops.push(Qop::from_str(q.trim())?);
                    }
                    Some(qops)
                }
                None => None,
            };

            out.push(Challenge {
                scheme,
                realm,
                nonce,
                opaque: kv.remove("opaque"),
                stale: kv
                    .get("stale")
                    .map(|v| v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false),
                algorithm,
                qop,
                userhash: kv
                    .get("userhash")
                    .map(|v| v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false),
            });
        }
        Ok(out)
    }
}

/// Gather and parse every challenge a 401/407 response carries for `scope`,
/// across repeated header lines.
pub(crate) fn collect_challenges(resp: &Response, scope: AuthScope) -> Result<Vec<Challenge>> {
    let mut all = Vec::new();
    for value in resp.header_all(scope.challenge_header()) {
        all.extend(Challenge::parse_all(value)?);
    }
    Ok(all)
}

/// Split a header value into `(scheme, params)` chunks, quote-aware.
///
/// A bare token (no `=` after it) starts a new challenge; everything up to
/// the next such token belongs to the current one.
fn split_schemes(input: &str) -> std::result::Result<Vec<(String, String)>, ChallengeError> {
    let s: Vec<char> = input.chars().collect();
    let len = s.len();
    let mut i = 0;
    // (scheme, param range start, param range end)
    let mut segs: Vec<(String, usize, usize)> = Vec::new();

    while i < len {
        while i < len && (s[i].is_whitespace() || s[i] == ',') {
            i += 1;
        }
        if i >= len {
            break;
        }

        let tok_start = i;
        while i < len && (s[i].is_alphanumeric() || s[i] == '-' || s[i] == '_') {
            i += 1;
        }
        if i == tok_start {
            return Err(ChallengeError::InvalidSyntax(input.into()));
        }
        let token: String = s[tok_start..i].iter().collect();

        let mut j = i;
        while j < len && s[j] == ' ' {
            j += 1;
        }

        if j < len && s[j] == '=' {
            // parameter; skip its value (quoted or plain)
            i = j + 1;
            while i < len && s[i] == ' ' {
                i += 1;
            }
            if i < len && s[i] == '"' {
                i += 1;
                while i < len {
                    match s[i] {
                        '\\' => i += 2,
                        '"' => {
                            i += 1;
                            break;
                        }
                        _ => i += 1,
                    }
                }
            } else {
                while i < len && s[i] != ',' {
                    i += 1;
                }
            }
            match segs.last_mut() {
                Some(seg) => seg.2 = i,
                None => return Err(ChallengeError::InvalidSyntax(input.into())),
            }
        } else {
            // scheme token opens a new challenge
            segs.push((token, i, i));
        }
    }

    Ok(segs
        .into_iter()
        .map(|(scheme, start, end)| (scheme, s[start..end].iter().collect()))
        .collect())
}

/// Parse the key-value parameter list of a single challenge.
pub fn parse_header_map(input: &str) -> std::result::Result<HashMap<String, String>, ChallengeError> {
    #[derive(Debug)]
    #[allow(non_camel_case_types)]
    enum ParserState {
        P_WHITE,
        P_NAME(usize),
        P_VALUE_BEGIN,
        P_VALUE_QUOTED,
        P_VALUE_QUOTED_NEXTLITERAL,
        P_VALUE_PLAIN,
    }

    let mut state = ParserState::P_WHITE;

    let mut parsed = HashMap::<String, String>::new();
    let mut current_token = None;
    let mut current_value = String::new();

    for (char_n, c) in input.chars().enumerate() {
        match state {
            ParserState::P_WHITE => {
                if c.is_alphabetic() {
                    state = ParserState::P_NAME(char_n);
                }
            }
            ParserState::P_NAME(name_start) => {
                if c == '=' {
                    current_token = Some(input[name_start..char_n].trim().to_string());
                    state = ParserState::P_VALUE_BEGIN;
                }
            }
            ParserState::P_VALUE_BEGIN => {
                current_value.clear();
                state = match c {
                    '"' => ParserState::P_VALUE_QUOTED,
                    _ => {
                        current_value.push(c);
                        ParserState::P_VALUE_PLAIN
                    }
                };
            }
            ParserState::P_VALUE_QUOTED => match c {
                '"' => {
                    if let Some(token) = current_token.take() {
                        parsed.insert(token, current_value.clone());
                    }
                    current_value.clear();
                    state = ParserState::P_WHITE;
                }
                '\\' => {
                    state = ParserState::P_VALUE_QUOTED_NEXTLITERAL;
                }
                _ => {
                    current_value.push(c);
                }
            },
            ParserState::P_VALUE_PLAIN => {
                if c == ',' || c.is_ascii_whitespace() {
                    if let Some(token) = current_token.take() {
                        parsed.insert(token, current_value.clone());
                    }
                    current_value.clear();
                    state = ParserState::P_WHITE;
                } else {
                    current_value.push(c);
                }
            }
            ParserState::P_VALUE_QUOTED_NEXTLITERAL => {
                current_value.push(c);
                state = ParserState::P_VALUE_QUOTED
            }
        }
    }

    match state {
        ParserState::P_VALUE_PLAIN => {
            if let Some(token) = current_token.take() {
                parsed.insert(token, current_value);
            }
        }
        ParserState::P_WHITE => {}
        _ => return Err(ChallengeError::InvalidSyntax(input.into())),
    }

    Ok(parsed)
}
