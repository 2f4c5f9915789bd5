use axum::http::{header, HeaderMap};
use parking_lot::RwLock;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokenguard_types::models::config::IdentityConfig;
use tokenguard_types::LimitProfile;

use super::credentials::{CredentialMap, UsersFile};
use super::{validate_identity, IdentityError};

/// Where a resolved identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    Bearer,
    IdentityHeader,
    CredentialHeader,
    Anonymous,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub identity: String,
    pub source: IdentitySource,
}

/// What a users file reload produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReloadSummary {
    pub users: usize,
    pub credentials: usize,
    #[serde(skip)]
    pub profiles: HashMap<String, LimitProfile>,
    #[serde(skip)]
    pub default_limits: Option<LimitProfile>,
}

/// Resolves callers against the current credential snapshot.
pub struct IdentityResolver {
    credentials: RwLock<Arc<CredentialMap>>,
    anonymous: String,
    identity_header: String,
    credential_header: String,
    users_file: Option<PathBuf>,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|s| !s.is_empty())
}

/// Identity header value as raw UTF-8 or percent-encoded, the form echoed
/// back on responses. `Some(None)` means present but undecodable.
fn identity_header<'a>(headers: &'a HeaderMap, name: &str) -> Option<Option<Cow<'a, str>>> {
    let value = headers.get(name)?;
    let Ok(raw) = std::str::from_utf8(value.as_bytes()) else {
        return Some(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.contains('%') {
        return Some(urlencoding::decode(raw).ok());
    }
    Some(Some(Cow::Borrowed(raw)))
}

impl IdentityResolver {
    pub fn new(config: &IdentityConfig, credentials: CredentialMap) -> Self {
        Self {
            credentials: RwLock::new(Arc::new(credentials)),
            anonymous: config.anonymous_identity.clone(),
            identity_header: config.identity_header.to_ascii_lowercase(),
            credential_header: config.credential_header.to_ascii_lowercase(),
            users_file: config.users_file.clone(),
        }
    }

    /// Build from config, loading the users file when one is configured.
    pub fn from_config(config: &IdentityConfig) -> Result<(Self, Option<UsersFile>), IdentityError> {
        let file = match &config.users_file {
            Some(path) => Some(UsersFile::load(path)?),
            None => None,
        };
        let credentials = file.as_ref().map(CredentialMap::from_users).unwrap_or_default();
        Ok((Self::new(config, credentials), file))
    }

    pub fn anonymous_identity(&self) -> &str {
        &self.anonymous
    }

    pub fn snapshot(&self) -> Arc<CredentialMap> {
        Arc::clone(&self.credentials.read())
    }

    /// Unknown credentials never fail; they resolve to the anonymous identity.
    fn from_credential(&self, map: &CredentialMap, credential: &str, source: IdentitySource) -> ResolvedIdentity {
        match map.lookup(credential) {
            Some(identity) => ResolvedIdentity { identity: identity.to_string(), source },
            None => {
                tracing::debug!(?source, "Unknown credential, using anonymous identity");
                self.anonymous()
            },
        }
    }

    fn anonymous(&self) -> ResolvedIdentity {
        ResolvedIdentity { identity: self.anonymous.clone(), source: IdentitySource::Anonymous }
    }

    /// Bearer credential, then identity header, then credential header.
    pub fn resolve(&self, headers: &HeaderMap) -> ResolvedIdentity {
        let map = self.snapshot();

        if let Some(token) = header_str(headers, header::AUTHORIZATION.as_str())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            return self.from_credential(&map, token, IdentitySource::Bearer);
        }

        if let Some(decoded) = identity_header(headers, &self.identity_header) {
            if let Some(identity) = decoded.filter(|id| validate_identity(id)) {
                return ResolvedIdentity {
                    identity: identity.into_owned(),
                    source: IdentitySource::IdentityHeader,
                };
            }
            tracing::debug!("Malformed identity header, using anonymous identity");
            return self.anonymous();
        }

        if let Some(credential) = header_str(headers, &self.credential_header) {
            return self.from_credential(&map, credential, IdentitySource::CredentialHeader);
        }

        self.anonymous()
    }

    pub fn display_name(&self, identity: &str) -> String {
        self.snapshot().display_name(identity).to_string()
    }

    pub fn replace(&self, credentials: CredentialMap) {
        *self.credentials.write() = Arc::new(credentials);
    }

    /// Re-read the users file and swap the credential snapshot. On error
    /// the current snapshot stays in place.
    pub fn reload(&self) -> Result<ReloadSummary, IdentityError> {
        let path = self.users_file.as_ref().ok_or(IdentityError::NoUsersFile)?;
        let file = UsersFile::load(path)?;
        let map = CredentialMap::from_users(&file);

        let summary = ReloadSummary {
            users: file.users.len(),
            credentials: map.credential_count(),
            profiles: file.profiles(),
            default_limits: file.default_limits.clone(),
        };
        self.replace(map);

        tracing::info!(
            path = %path.display(),
            users = summary.users,
            credentials = summary.credentials,
            "Credentials reloaded"
        );
        Ok(summary)
    }
}
