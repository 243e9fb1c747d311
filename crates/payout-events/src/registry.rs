//! Per-gateway-instance session registry (spec §4.8). Populated on
//! authenticated connect, pruned on disconnect; read by the Event
//! Bridge dispatch loop to decide whether this instance owns a user's
//! live connection.

use dashmap::DashMap;
use payout_core::UserId;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<UserId, HashSet<SessionId>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: UserId, session_id: SessionId) {
        self.sessions.entry(user_id).or_default().insert(session_id);
    }

    /// Removes the session, dropping the user's entry entirely once
    /// their last session disconnects.
    pub fn unregister(&self, user_id: &UserId, session_id: &SessionId) {
        if let Some(mut sessions) = self.sessions.get_mut(user_id) {
            sessions.remove(session_id);
            if sessions.is_empty() {
                drop(sessions);
                self.sessions.remove(user_id);
            }
        }
    }

    pub fn sessions_for(&self, user_id: &UserId) -> Vec<SessionId> {
        self.sessions
            .get(user_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_connected_here(&self, user_id: &UserId) -> bool {
        self.sessions.get(user_id).map(|s| !s.is_empty()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_look_up_sessions() {
        let registry = SessionRegistry::new();
        let user = UserId::new("user_001");
        let session = SessionId::generate();
        registry.register(user.clone(), session.clone());

        assert!(registry.is_connected_here(&user));
        assert_eq!(registry.sessions_for(&user), vec![session]);
    }

    #[test]
    fn unregister_drops_empty_user_entry() {
        let registry = SessionRegistry::new();
        let user = UserId::new("user_001");
        let session = SessionId::generate();
        registry.register(user.clone(), session.clone());
        registry.unregister(&user, &session);

        assert!(!registry.is_connected_here(&user));
        assert!(registry.sessions_for(&user).is_empty());
    }

    #[test]
    fn unrelated_user_is_never_connected_here() {
        let registry = SessionRegistry::new();
        registry.register(UserId::new("user_001"), SessionId::generate());
        assert!(!registry.is_connected_here(&UserId::new("user_002")));
    }
}
