//! Session lifecycle over the key-value store.
//!
//! A session is stored under `session:<id>` with a fixed lifetime counted
//! from creation. Reads never extend it. An absent key means the session
//! expired, was deleted, or never existed; callers cannot tell these apart.

use crate::codec;
use crate::kv::KeyValueStore;
use signwall_core::{Session, SessionId, SignwallResult, SESSION_TTL};
use std::sync::Arc;
use std::time::Duration;

const SESSION_KEY_PREFIX: &str = "session:";

pub fn session_key(id: &SessionId) -> String {
    format!("{SESSION_KEY_PREFIX}{id}")
}

/// Creates, reads, and destroys session records.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_ttl(store, SESSION_TTL)
    }

    pub fn with_ttl(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Persist `session` under a freshly generated handle.
    pub async fn create_session(&self, session: &Session) -> SignwallResult<SessionId> {
        let payload = codec::encode("session", session)?;
        let id = SessionId::generate();
        self.store
            .set_with_ttl(&session_key(&id), &payload, self.ttl)
            .await?;
        tracing::debug!(user_id = %session.user_id, "Session created");
        Ok(id)
    }

    /// `Ok(None)` when absent; a decode error when the stored blob is malformed.
    pub async fn get_session(&self, id: &SessionId) -> SignwallResult<Option<Session>> {
        let Some(payload) = self.store.get(&session_key(id)).await? else {
            return Ok(None);
        };
        let session = codec::decode("session", &payload)?;
        Ok(Some(session))
    }

    pub async fn delete_session(&self, id: &SessionId) -> SignwallResult<()> {
        self.store.delete(&session_key(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::InMemoryKvStore;
    use proptest::prelude::*;
    use signwall_core::{CodecError, SignwallError};

    fn session(user_id: &str) -> Session {
        Session {
            refresh_token: "refresh".to_string(),
            access_token: "access".to_string(),
            user_id: user_id.to_string(),
        }
    }

    fn manager_with_clock() -> (SessionManager, Arc<InMemoryKvStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(InMemoryKvStore::with_clock(clock.clone()));
        (SessionManager::new(store.clone()), store, clock)
    }

    #[tokio::test]
    async fn test_session_round_trip_until_ttl() {
        let (manager, _, clock) = manager_with_clock();
        let id = manager
            .create_session(&session("123456789012345678"))
            .await
            .unwrap();

        clock.advance(SESSION_TTL - Duration::from_secs(1));
        let fetched = manager.get_session(&id).await.unwrap();
        assert_eq!(fetched, Some(session("123456789012345678")));

        clock.advance(Duration::from_secs(1));
        assert_eq!(manager.get_session(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reads_do_not_extend_lifetime() {
        let (manager, _, clock) = manager_with_clock();
        let id = manager.create_session(&session("1")).await.unwrap();
        for _ in 0..6 {
            clock.advance(Duration::from_secs(86_400));
            assert!(manager.get_session(&id).await.unwrap().is_some());
        }
        clock.advance(Duration::from_secs(86_400));
        assert!(manager.get_session(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_stored_under_prefixed_key() {
        let (manager, store, _) = manager_with_clock();
        let id = manager.create_session(&session("1")).await.unwrap();
        let key = format!("session:{}", id);
        assert!(store.get(&key).await.unwrap().is_some());
        assert_eq!(store.ttl_of(&key), Some(SESSION_TTL));
    }

    #[tokio::test]
    async fn test_never_created_and_deleted_are_absent() {
        let (manager, _, _) = manager_with_clock();
        assert_eq!(
            manager.get_session(&SessionId::generate()).await.unwrap(),
            None
        );

        let id = manager.create_session(&session("1")).await.unwrap();
        manager.delete_session(&id).await.unwrap();
        manager.delete_session(&id).await.unwrap();
        assert_eq!(manager.get_session(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_blob_is_a_decode_error() {
        let (manager, store, _) = manager_with_clock();
        let id = SessionId::generate();
        store
            .set_persistent(&session_key(&id), b"{not a session")
            .await
            .unwrap();
        let err = manager.get_session(&id).await.unwrap_err();
        assert!(matches!(
            err,
            SignwallError::Codec(CodecError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_each_create_gets_a_new_id() {
        let (manager, _, _) = manager_with_clock();
        let a = manager.create_session(&session("1")).await.unwrap();
        let b = manager.create_session(&session("1")).await.unwrap();
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn prop_any_session_round_trips(
            refresh in ".{0,64}",
            access in ".{0,64}",
            user_id in "[0-9]{16,20}",
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let (manager, _, _) = manager_with_clock();
                let original = Session { refresh_token: refresh, access_token: access, user_id };
                let id = manager.create_session(&original).await.unwrap();
                let fetched = manager.get_session(&id).await.unwrap();
                assert_eq!(fetched, Some(original));
            });
        }
    }
}
