//! Reassigns anonymous session votes to a signed-in user.
use std::sync::Arc;

use crate::store::{StoreError, VoteStore};

pub struct SessionStitcher<V: ?Sized> {
    store: Arc<V>,
}

impl<V: ?Sized> Clone for SessionStitcher<V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<V> SessionStitcher<V>
where
    V: VoteStore + ?Sized,
{
    #[must_use]
    pub const fn new(store: Arc<V>) -> Self {
        Self { store }
    }

    /// Bind every still-anonymous vote of `session_id` to `user_id` and
    /// return how many were updated. Votes already bound to any user are left
    /// alone, so repeating the call updates nothing.
    ///
    /// # Errors
    ///
    /// Returns the store error; the write is not retried.
    pub async fn stitch(&self, session_id: &str, user_id: &str) -> Result<u64, StoreError> {
        if session_id.is_empty() || user_id.is_empty() {
            return Ok(0);
        }
        let updated = self.store.assign_session_user(session_id, user_id).await?;
        if updated > 0 {
            log::info!("stitched {updated} votes from session {session_id} to user {user_id}");
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::take::Stance;
    use crate::votes::VoteRequest;

    async fn seeded() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        for (take, session, user) in [
            ("t1", "s1", None),
            ("t2", "s1", None),
            ("t3", "s1", Some("user-a")),
            ("t4", "s2", None),
        ] {
            let mut request = VoteRequest::new(take, Stance::Agree).with_session(session);
            if let Some(user) = user {
                request = request.with_user(user);
            }
            store.insert_vote(request).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn stitch_is_idempotent() {
        let store = seeded().await;
        let stitcher = SessionStitcher::new(Arc::clone(&store));
        assert_eq!(stitcher.stitch("s1", "user-b").await.unwrap(), 2);
        assert_eq!(stitcher.stitch("s1", "user-b").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stitch_never_reassigns_identified_votes() {
        let store = seeded().await;
        let stitcher = SessionStitcher::new(Arc::clone(&store));
        stitcher.stitch("s1", "user-b").await.unwrap();

        let owners: Vec<_> = store
            .votes()
            .into_iter()
            .map(|vote| (vote.take_id, vote.user_id))
            .collect();
        assert_eq!(
            owners,
            vec![
                ("t1".to_string(), Some("user-b".to_string())),
                ("t2".to_string(), Some("user-b".to_string())),
                ("t3".to_string(), Some("user-a".to_string())),
                ("t4".to_string(), None),
            ]
        );
    }

    #[tokio::test]
    async fn empty_ids_update_nothing() {
        let store = seeded().await;
        let stitcher = SessionStitcher::new(store);
        assert_eq!(stitcher.stitch("", "user-b").await.unwrap(), 0);
        assert_eq!(stitcher.stitch("s1", "").await.unwrap(), 0);
    }
}
