//! Caller-configured credentials, held per scope and scheme.

use crate::challenge::Challenge;
use crate::enums::{AuthScheme, AuthScope};
use crate::error::{Error, Result};

/// A username/password pair bound to a scope and scheme.
///
/// Immutable once constructed; the store replaces the whole value when the
/// caller reconfigures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub scope: AuthScope,
    pub scheme: AuthScheme,
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn basic(scope: AuthScope, username: impl Into<String>, password: impl Into<String>) -> Self {
        Credential {
            scope,
            scheme: AuthScheme::Basic,
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn digest(scope: AuthScope, username: impl Into<String>, password: impl Into<String>) -> Self {
        Credential {
            scope,
            scheme: AuthScheme::Digest,
            username: username.into(),
            password: password.into(),
        }
    }
}

/// At most one credential per (scope, scheme); setting a new one replaces
/// the old.
#[derive(Debug, Default, Clone)]
pub struct CredentialStore {
    origin_basic: Option<Credential>,
    origin_digest: Option<Credential>,
    proxy_basic: Option<Credential>,
    proxy_digest: Option<Credential>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, scope: AuthScope, scheme: AuthScheme) -> &mut Option<Credential> {
        match (scope, scheme) {
            (AuthScope::Origin, AuthScheme::Basic) => &mut self.origin_basic,
            (AuthScope::Origin, AuthScheme::Digest) => &mut self.origin_digest,
            (AuthScope::Proxy, AuthScheme::Basic) => &mut self.proxy_basic,
            (AuthScope::Proxy, AuthScheme::Digest) => &mut self.proxy_digest,
        }
    }

    pub fn set(&mut self, cred: Credential) {
        let slot = self.slot(cred.scope, cred.scheme);
        *slot = Some(cred);
    }

    pub fn get(&self, scope: AuthScope, scheme: AuthScheme) -> Option<&Credential> {
        match (scope, scheme) {
            (AuthScope::Origin, AuthScheme::Basic) => self.origin_basic.as_ref(),
            (AuthScope::Origin, AuthScheme::Digest) => self.origin_digest.as_ref(),
            (AuthScope::Proxy, AuthScheme::Basic) => self.proxy_basic.as_ref(),
            (AuthScope::Proxy, AuthScheme::Digest) => self.proxy_digest.as_ref(),
        }
    }

    /// Pick the credential/challenge pair to answer with. Digest wins over
    /// Basic when both are offered and a Digest credential is configured.
    pub fn answer<'s, 'c>(
        &'s self,
        scope: AuthScope,
        challenges: &'c [Challenge],
    ) -> Result<(&'s Credential, &'c Challenge)> {
        if let Some(cred) = self.get(scope, AuthScheme::Digest) {
            if let Some(ch) = challenges.iter().find(|c| c.scheme == AuthScheme::Digest) {
                return Ok((cred, ch));
            }
        }
        if let Some(cred) = self.get(scope, AuthScheme::Basic) {
            if let Some(ch) = challenges.iter().find(|c| c.scheme == AuthScheme::Basic) {
                return Ok((cred, ch));
            }
        }
        let scheme = challenges
            .first()
            .map(|c| c.scheme)
            .unwrap_or(AuthScheme::Basic);
        Err(Error::AuthConfigMissing { scope, scheme })
    }
}
