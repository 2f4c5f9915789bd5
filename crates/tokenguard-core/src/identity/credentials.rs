//! Users file and the credential snapshot built from it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokenguard_types::LimitProfile;
use validator::Validate;

use super::{validate_identity, IdentityError};

/// One user entry of the users file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserRecord {
    pub api_keys: Vec<String>,
    pub display_name: Option<String>,
    pub limits: Option<LimitProfile>,
}

/// ```json
/// { "users": { "user1": { "api_keys": ["sk-..."], "display_name": "사용자1",
///                         "limits": { "rpm": 30 } } },
///   "default_limits": { "tpm": 8000 } }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UsersFile {
    pub users: HashMap<String, UserRecord>,
    pub default_limits: Option<LimitProfile>,
}

impl UsersFile {
    pub fn load(path: &Path) -> Result<Self, IdentityError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| IdentityError::Read { path: path.to_path_buf(), source })?;
        let file: Self = serde_json::from_str(&content)?;
        file.validate()?;
        Ok(file)
    }

    /// Identities are well-formed and every profile passes validation.
    pub fn validate(&self) -> Result<(), IdentityError> {
        for (identity, user) in &self.users {
            if !validate_identity(identity) {
                return Err(IdentityError::InvalidIdentity(identity.clone()));
            }
            if let Some(limits) = &user.limits {
                check_profile(identity, limits)?;
            }
        }
        if let Some(limits) = &self.default_limits {
            check_profile("default", limits)?;
        }
        Ok(())
    }

    /// Profiles declared per user.
    pub fn profiles(&self) -> HashMap<String, LimitProfile> {
        self.users
            .iter()
            .filter_map(|(id, user)| user.limits.clone().map(|limits| (id.clone(), limits)))
            .collect()
    }
}

fn check_profile(identity: &str, profile: &LimitProfile) -> Result<(), IdentityError> {
    profile.validate().map_err(|e| IdentityError::InvalidProfile {
        identity: identity.to_string(),
        message: e.to_string(),
    })
}

/// Immutable credential → identity mapping plus display names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialMap {
    credentials: HashMap<String, String>,
    display_names: HashMap<String, String>,
}

impl CredentialMap {
    pub fn from_users(file: &UsersFile) -> Self {
        let mut map = Self::default();
        for (identity, user) in &file.users {
            for key in &user.api_keys {
                if let Some(previous) = map.credentials.insert(key.clone(), identity.clone()) {
                    if &previous != identity {
                        tracing::warn!(
                            identity,
                            previous = %previous,
                            "Credential listed for two identities, last one wins"
                        );
                    }
                }
            }
            if let Some(name) = &user.display_name {
                map.display_names.insert(identity.clone(), name.clone());
            }
        }
        map
    }

    pub fn with_credential(mut self, credential: &str, identity: &str) -> Self {
        self.credentials.insert(credential.to_string(), identity.to_string());
        self
    }

    pub fn lookup(&self, credential: &str) -> Option<&str> {
        self.credentials.get(credential).map(String::as_str)
    }

    /// Display name, or the identity itself when none is configured.
    pub fn display_name<'a>(&'a self, identity: &'a str) -> &'a str {
        self.display_names.get(identity).map_or(identity, String::as_str)
    }

    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }

    /// Identities that own at least one credential, sorted.
    pub fn identities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.credentials.values().cloned().collect();
        ids.sort();
        ids.dedup();
        ids
    }
}
