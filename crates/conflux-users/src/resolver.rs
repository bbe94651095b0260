use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use conflux_core::types::UserRole;
use rusqlite::Connection;
use tracing::debug;

use crate::db;
use crate::error::Result;
use crate::types::User;

/// Maximum number of user ids kept in the in-process cache. Simple
/// eviction: when full, drop the oldest half.
const CACHE_MAX: usize = 256;

/// Answers "does this user id exist, and what's its global role" without a
/// DB round-trip for every request. The upstream identity system is the
/// source of truth; this is read-mostly with writes driven by `upsert_user`.
pub struct UserResolver {
    db: Arc<Mutex<Connection>>,
    cache: Mutex<HashMap<String, User>>,
    /// Insertion-order key list for eviction — parallel to the HashMap.
    cache_order: Mutex<Vec<String>>,
}

impl UserResolver {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self {
            db,
            cache: Mutex::new(HashMap::new()),
            cache_order: Mutex::new(Vec::new()),
        }
    }

    /// Look up a user by id, checking the in-process cache first.
    pub fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        if let Some(user) = self.cache_lookup(user_id) {
            debug!(user_id, "user cache hit");
            return Ok(Some(user));
        }

        let conn = self.db.lock().expect("users connection poisoned");
        let user = db::get_user(&conn, user_id)?;
        if let Some(ref u) = user {
            drop(conn);
            self.cache_insert(user_id.to_string(), u.clone());
        }
        Ok(user)
    }

    /// Return the user's global role, or `None` if the user is unknown.
    pub fn role_of(&self, user_id: &str) -> Result<Option<UserRole>> {
        Ok(self.get_user(user_id)?.map(|u| u.role))
    }

    /// Create-or-update the directory entry and
    /// refresh the cache so the next read reflects the change immediately.
    pub fn upsert_user(
        &self,
        id: &str,
        username: &str,
        display_name: &str,
        avatar_url: Option<&str>,
        role: UserRole,
    ) -> Result<User> {
        let conn = self.db.lock().expect("users connection poisoned");
        let user = db::upsert_user(&conn, id, username, display_name, avatar_url, role)?;
        drop(conn);
        self.cache_insert(id.to_string(), user.clone());
        Ok(user)
    }

    /// Drop a cached entry — call after an out-of-band role change so a
    /// stale role isn't served from cache.
    pub fn invalidate_user(&self, user_id: &str) {
        let mut cache = self.cache.lock().expect("users cache poisoned");
        let mut order = self.cache_order.lock().expect("users cache order poisoned");
        cache.remove(user_id);
        order.retain(|k| k != user_id);
    }

    fn cache_lookup(&self, user_id: &str) -> Option<User> {
        self.cache
            .lock()
            .expect("users cache poisoned")
            .get(user_id)
            .cloned()
    }

    fn cache_insert(&self, user_id: String, user: User) {
        let mut cache = self.cache.lock().expect("users cache poisoned");
        let mut order = self.cache_order.lock().expect("users cache order poisoned");

        if cache.contains_key(&user_id) {
            cache.insert(user_id, user);
            return;
        }

        if cache.len() >= CACHE_MAX {
            let evict_count = CACHE_MAX / 2;
            let to_remove: Vec<_> = order.drain(..evict_count).collect();
            for k in to_remove {
                cache.remove(&k);
            }
        }

        order.push(user_id.clone());
        cache.insert(user_id, user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> UserResolver {
        let conn = Connection::open_in_memory().unwrap();
        db::init_db(&conn).unwrap();
        UserResolver::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn upsert_then_get_roundtrips_through_cache() {
        let resolver = resolver();
        let user = resolver
            .upsert_user("u1", "alice", "Alice", None, UserRole::Moderator)
            .unwrap();
        assert_eq!(user.role, UserRole::Moderator);

        let fetched = resolver.get_user("u1").unwrap().expect("should exist");
        assert_eq!(fetched.username, "alice");
    }

    #[test]
    fn invalidate_user_forces_db_reread() {
        let resolver = resolver();
        resolver
            .upsert_user("u1", "alice", "Alice", None, UserRole::User)
            .unwrap();
        resolver.get_user("u1").unwrap();
        resolver.invalidate_user("u1");
        assert!(resolver.cache_lookup("u1").is_none());
    }

    #[test]
    fn unknown_user_returns_none() {
        let resolver = resolver();
        assert!(resolver.get_user("nonexistent").unwrap().is_none());
    }
}
