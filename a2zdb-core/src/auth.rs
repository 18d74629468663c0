// src/auth.rs
// User accounts: SHA-256 password hashes persisted as a JSON file

use crate::error::{A2zError, Result};
use crate::logging::log_operation;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

/// One account: username, password hash (SHA-256 hex) and role names
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub roles: Vec<String>,
}

/// On-disk record (the username is the map key)
#[derive(Debug, Serialize, Deserialize)]
struct StoredUser {
    password_hash: String,
    roles: Vec<String>,
}

/// Loads and persists users from a single JSON file (`auth.db`)
pub struct AuthManager {
    auth_db_path: PathBuf,
    users: HashMap<String, User>,
}

impl AuthManager {
    pub fn open(auth_db_path: PathBuf) -> Result<AuthManager> {
        let mut manager = AuthManager {
            auth_db_path,
            users: HashMap::new(),
        };
        manager.load_users()?;
        Ok(manager)
    }

    fn load_users(&mut self) -> Result<()> {
        if !self.auth_db_path.exists() {
            log_operation("AUTH", "LOAD", "SUCCESS", "loaded 0 users");
            return Ok(());
        }
        let text = std::fs::read_to_string(&self.auth_db_path).map_err(|e| {
            log_operation("AUTH", "LOAD", "FAILED", &e.to_string());
            A2zError::Io(e)
        })?;
        let stored: HashMap<String, StoredUser> = serde_json::from_str(&text).map_err(|e| {
            log_operation("AUTH", "LOAD", "FAILED", &e.to_string());
            A2zError::Serialization(e)
        })?;
        self.users = stored
            .into_iter()
            .map(|(username, user)| {
                (
                    username.clone(),
                    User {
                        id: Uuid::new_v4().to_string(),
                        username,
                        password_hash: user.password_hash,
                        roles: user.roles,
                    },
                )
            })
            .collect();
        log_operation(
            "AUTH",
            "LOAD",
            "SUCCESS",
            &format!("loaded {} users", self.users.len()),
        );
        Ok(())
    }

    fn save_users(&self) -> Result<()> {
        let stored: HashMap<&String, StoredUser> = self
            .users
            .values()
            .map(|user| {
                (
                    &user.username,
                    StoredUser {
                        password_hash: user.password_hash.clone(),
                        roles: user.roles.clone(),
                    },
                )
            })
            .collect();
        let text = serde_json::to_string_pretty(&stored)?;
        std::fs::write(&self.auth_db_path, text).map_err(|e| {
            log_operation("AUTH", "SAVE", "FAILED", &e.to_string());
            A2zError::Io(e)
        })?;
        log_operation(
            "AUTH",
            "SAVE",
            "SUCCESS",
            &format!("saved {} users", self.users.len()),
        );
        Ok(())
    }

    fn hash_password(password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Create an account; the default role is `read`
    pub fn create_user(
        &mut self,
        username: &str,
        password: &str,
        roles: Option<Vec<String>>,
    ) -> Result<&User> {
        if self.users.contains_key(username) {
            return Err(A2zError::UserExists(username.to_string()));
        }
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: Self::hash_password(password),
            roles: roles.unwrap_or_else(|| vec!["read".to_string()]),
        };
        self.users.insert(username.to_string(), user);
        self.save_users()?;
        log_operation("AUTH", "CREATE_USER", "SUCCESS", &format!("username:{username}"));
        Ok(&self.users[username])
    }

    /// Verify credentials; `None` on unknown user or wrong password
    pub fn authenticate(&self, username: &str, password: &str) -> Option<&User> {
        let user = self.users.get(username);
        match user {
            Some(user) if user.password_hash == Self::hash_password(password) => {
                log_operation("AUTH", "AUTHENTICATE", "SUCCESS", &format!("username:{username}"));
                Some(user)
            }
            _ => {
                log_operation("AUTH", "AUTHENTICATE", "FAILED", &format!("username:{username}"));
                None
            }
        }
    }

    pub fn delete_user(&mut self, username: &str) -> Result<bool> {
        if self.users.remove(username).is_some() {
            self.save_users()?;
            log_operation("AUTH", "DELETE_USER", "SUCCESS", &format!("username:{username}"));
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn update_user_roles(&mut self, username: &str, roles: Vec<String>) -> Result<bool> {
        match self.users.get_mut(username) {
            Some(user) => {
                user.roles = roles.clone();
                self.save_users()?;
                log_operation(
                    "AUTH",
                    "UPDATE_ROLES",
                    "SUCCESS",
                    &format!("username:{username}, roles:{roles:?}"),
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn user(&self, username: &str) -> Option<&User> {
        self.users.get(username)
    }
}
