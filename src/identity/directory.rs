use std::collections::HashMap;
use std::path::Path;

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use serde::{Deserialize, Serialize};

use super::principal::{CommuneId, UserContext};
use super::role::Role;
use crate::error::{AppError, AppResult};

/// A user row as provided by the authentication backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub user_id: String,
    /// Argon2 PHC string
    pub password_hash: String,
    pub role: Role,
    #[serde(default)]
    pub commune_id: Option<CommuneId>,
}

impl DirectoryUser {
    pub fn context(&self) -> UserContext {
        UserContext::new(self.user_id.clone(), self.role, self.commune_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: HashMap<String, DirectoryUser>,
}

impl UserDirectory {
    pub fn new(users: impl IntoIterator<Item = DirectoryUser>) -> Self {
        // user ids compare case-insensitively
        let users = users.into_iter().map(|u| (u.user_id.to_lowercase(), u)).collect();
        Self { users }
    }

    /// Load a JSON array of `DirectoryUser`.
    pub fn load(path: &Path) -> AppResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::io("users_file".to_string(), format!("{}: {}", path.display(), e)))?;
        let users: Vec<DirectoryUser> = serde_json::from_str(&text)?;
        tracing::info!(target: "civiq::auth", path = %path.display(), count = users.len(), "loaded user directory");
        Ok(Self::new(users))
    }

    pub fn len(&self) -> usize { self.users.len() }

    pub fn is_empty(&self) -> bool { self.users.is_empty() }

    pub fn get(&self, user_id: &str) -> Option<&DirectoryUser> {
        self.users.get(&user_id.to_lowercase())
    }

    /// `Ok(None)` for an unknown user or a wrong password.
    pub fn authenticate(&self, user_id: &str, password: &str) -> AppResult<Option<UserContext>> {
        let Some(u) = self.get(user_id) else { return Ok(None); };
        if verify_password(&u.password_hash, password)? {
            Ok(Some(u.context()))
        } else {
            Ok(None)
        }
    }
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| AppError::internal("salt".to_string(), e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AppError::internal("salt".to_string(), e.to_string()))?;
    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::internal("password_hash".to_string(), e.to_string()))?
        .to_string();
    Ok(phc)
}

/// A malformed stored hash is a directory error, not a failed login.
pub fn verify_password(phc: &str, password: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(phc)
        .map_err(|e| AppError::internal("invalid_password_hash".to_string(), e.to_string()))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}
