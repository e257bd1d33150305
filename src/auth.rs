//! User accounts and authentication.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;

/// A registered user: name plus SHA-256 password hash.
///
/// The clear-text password never leaves the constructor.
#[derive(Clone, Debug)]
pub struct User {
    username: String,
    password_hash: Vec<u8>,
}

impl User {
    /// Creates a user, hashing the clear-text password.
    pub fn new(username: &str, password: &str) -> Self {
        User {
            username: username.to_string(),
            password_hash: hash_password(password),
        }
    }

    /// Creates a user from an already-computed hash (persistence).
    pub fn from_hash(username: &str, password_hash: Vec<u8>) -> Self {
        User {
            username: username.to_string(),
            password_hash,
        }
    }

    /// The account name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The stored password hash.
    pub fn password_hash(&self) -> &[u8] {
        &self.password_hash
    }

    /// Checks a clear-text password against the stored hash.
    ///
    /// Comparison over the hash bytes is constant-time.
    pub fn check_password(&self, password: &str) -> bool {
        constant_time_eq(&self.password_hash, &hash_password(password))
    }
}

fn hash_password(password: &str) -> Vec<u8> {
    let mut digest = Sha256::new();
    digest.update(password.as_bytes());
    digest.finalize().to_vec()
}

// Both inputs are SHA-256 digests, so the length check leaks nothing useful.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Outcome of a registration attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The account was created.
    Created,
    /// The username is already taken.
    AlreadyExists,
    /// Username or password was empty after trimming.
    Invalid,
}

/// Thread-safe username → user store.
///
/// Reads (authentication) vastly outnumber writes (registration), so the map
/// sits behind a readers-writer lock.
#[derive(Debug, Default)]
pub struct AuthStore {
    users: RwLock<HashMap<String, User>>,
}

impl AuthStore {
    /// An empty store.
    pub fn new() -> Self {
        AuthStore {
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a new account.
    ///
    /// The username is trimmed before use; empty usernames and empty
    /// passwords are rejected without touching the map.
    pub fn register(&self, username: &str, password: &str) -> RegisterOutcome {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return RegisterOutcome::Invalid;
        }

        let mut users = match self.users.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if users.contains_key(username) {
            return RegisterOutcome::AlreadyExists;
        }
        users.insert(username.to_string(), User::new(username, password));
        log::info!("Registered user '{}'", username);
        RegisterOutcome::Created
    }

    /// Registers a user whose password hash was loaded from disk.
    ///
    /// Returns false if the username is already present.
    pub fn register_prehashed(&self, user: User) -> bool {
        let mut users = match self.users.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if users.contains_key(user.username()) {
            return false;
        }
        users.insert(user.username().to_string(), user);
        true
    }

    /// Authenticates a user, returning a copy of the account on success.
    pub fn authenticate(&self, username: &str, password: &str) -> Option<User> {
        let users = match self.users.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let user = users.get(username)?;
        if user.check_password(password) {
            Some(user.clone())
        } else {
            None
        }
    }

    /// Number of registered users.
    pub fn user_count(&self) -> usize {
        match self.users.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Snapshot of every user, for persistence.
    pub fn all_users(&self) -> Vec<User> {
        let users = match self.users.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        users.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_authenticate() {
        let store = AuthStore::new();
        assert_eq!(store.register("alice", "secret"), RegisterOutcome::Created);
        assert!(store.authenticate("alice", "secret").is_some());
        assert!(store.authenticate("alice", "wrong").is_none());
        assert!(store.authenticate("bob", "secret").is_none());
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let store = AuthStore::new();
        assert_eq!(store.register("alice", "one"), RegisterOutcome::Created);
        assert_eq!(
            store.register("alice", "two"),
            RegisterOutcome::AlreadyExists
        );
        // Original password still works.
        assert!(store.authenticate("alice", "one").is_some());
    }

    #[test]
    fn test_username_trimmed_before_registration() {
        let store = AuthStore::new();
        assert_eq!(store.register("  alice  ", "pw"), RegisterOutcome::Created);
        assert!(store.authenticate("alice", "pw").is_some());
        assert_eq!(
            store.register("alice", "pw"),
            RegisterOutcome::AlreadyExists
        );
    }

    #[test]
    fn test_empty_credentials_invalid() {
        let store = AuthStore::new();
        assert_eq!(store.register("", "pw"), RegisterOutcome::Invalid);
        assert_eq!(store.register("   ", "pw"), RegisterOutcome::Invalid);
        assert_eq!(store.register("alice", ""), RegisterOutcome::Invalid);
        assert_eq!(store.user_count(), 0);
    }

    #[test]
    fn test_prehashed_roundtrip() {
        let store = AuthStore::new();
        store.register("alice", "secret");
        let users = store.all_users();
        assert_eq!(users.len(), 1);

        let restored = AuthStore::new();
        for user in users {
            assert!(restored.register_prehashed(user));
        }
        assert!(restored.authenticate("alice", "secret").is_some());
        assert!(restored.authenticate("alice", "wrong").is_none());
    }

    #[test]
    fn test_password_hash_is_sha256() {
        let user = User::new("alice", "secret");
        assert_eq!(user.password_hash().len(), 32);
        assert!(user.check_password("secret"));
        assert!(!user.check_password("Secret"));
    }
}
