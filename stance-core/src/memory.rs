//! In-process store implementing every store trait. Used by tests, the
//! tester binary and embedders that ship the corpus as a JSON asset.
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use crate::category::CategoryId;
use crate::collection::SavedStanceCard;
use crate::store::{CollectionStore, CorpusStore, StoreError, VoteStore};
use crate::take::{Take, TakeCorpus};
use crate::votes::{TakeStats, Vote, VoteContext, VoteId, VoteRequest};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    corpus: RwLock<TakeCorpus>,
    votes: Mutex<Vec<Vote>>,
    cards: Mutex<Vec<SavedStanceCard>>,
    next_vote_id: AtomicU64,
    offline: AtomicBool,
    corpus_queries: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new(corpus: TakeCorpus) -> Self {
        Self {
            corpus: RwLock::new(corpus),
            ..Self::default()
        }
    }

    /// Swap in a new corpus, as the offline pipeline would after a publish.
    pub fn replace_corpus(&self, corpus: TakeCorpus) {
        *self.corpus.write().unwrap_or_else(PoisonError::into_inner) = corpus;
    }

    /// Simulate an outage: every call fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of full eligible-corpus queries served so far.
    #[must_use]
    pub fn corpus_queries(&self) -> usize {
        self.corpus_queries.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn votes(&self) -> Vec<Vote> {
        guard(&self.votes).clone()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store is offline".into()))
        } else {
            Ok(())
        }
    }

    fn with_corpus<T>(&self, f: impl FnOnce(&TakeCorpus) -> T) -> Result<T, StoreError> {
        self.check_online()?;
        let corpus = self.corpus.read().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&corpus))
    }
}

#[async_trait]
impl CorpusStore for MemoryStore {
    async fn eligible_takes(&self) -> Result<Vec<Take>, StoreError> {
        self.corpus_queries.fetch_add(1, Ordering::SeqCst);
        self.with_corpus(|corpus| corpus.eligible().cloned().collect())
    }

    async fn take_by_id(&self, id: &str) -> Result<Option<Take>, StoreError> {
        self.with_corpus(|corpus| corpus.get_by_id(id).cloned())
    }

    async fn takes_by_category(&self, category: CategoryId) -> Result<Vec<Take>, StoreError> {
        self.with_corpus(|corpus| {
            corpus
                .takes
                .iter()
                .filter(|take| take.category == category)
                .cloned()
                .collect()
        })
    }
}

#[async_trait]
impl VoteStore for MemoryStore {
    async fn insert_vote(&self, request: VoteRequest) -> Result<Vote, StoreError> {
        self.check_online()?;
        let vote = Vote {
            id: self.next_vote_id.fetch_add(1, Ordering::SeqCst) + 1,
            take_id: request.take_id,
            stance: request.stance,
            reason_tags: request.context.reason_tags,
            explanation: request.context.explanation,
            session_id: request.session_id,
            user_id: request.user_id,
            created_at: Utc::now(),
        };
        guard(&self.votes).push(vote.clone());
        Ok(vote)
    }

    async fn update_vote_context(
        &self,
        vote_id: VoteId,
        context: VoteContext,
    ) -> Result<bool, StoreError> {
        self.check_online()?;
        let mut votes = guard(&self.votes);
        let Some(vote) = votes.iter_mut().find(|vote| vote.id == vote_id) else {
            return Ok(false);
        };
        vote.reason_tags = context.reason_tags;
        vote.explanation = context.explanation;
        Ok(true)
    }

    async fn take_stats(&self, take_id: &str) -> Result<Option<TakeStats>, StoreError> {
        self.check_online()?;
        let votes = guard(&self.votes);
        Ok(TakeStats::from_votes(
            take_id,
            votes.iter().filter(|vote| vote.take_id == take_id),
        ))
    }

    async fn assign_session_user(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<u64, StoreError> {
        self.check_online()?;
        let mut updated = 0;
        for vote in guard(&self.votes).iter_mut() {
            if vote.user_id.is_none() && vote.session_id.as_deref() == Some(session_id) {
                vote.user_id = Some(user_id.to_string());
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn session_votes(&self, session_id: &str) -> Result<Vec<Vote>, StoreError> {
        self.check_online()?;
        Ok(guard(&self.votes)
            .iter()
            .rev()
            .filter(|vote| vote.session_id.as_deref() == Some(session_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CollectionStore for MemoryStore {
    async fn save_card(&self, user_id: &str, token: &str) -> Result<bool, StoreError> {
        self.check_online()?;
        let mut cards = guard(&self.cards);
        if cards
            .iter()
            .any(|card| card.user_id == user_id && card.token == token)
        {
            return Ok(false);
        }
        cards.push(SavedStanceCard {
            user_id: user_id.to_string(),
            token: token.to_string(),
            saved_at: Utc::now(),
        });
        Ok(true)
    }

    async fn saved_cards(&self, user_id: &str) -> Result<Vec<SavedStanceCard>, StoreError> {
        self.check_online()?;
        Ok(guard(&self.cards)
            .iter()
            .rev()
            .filter(|card| card.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::take::{Stance, fixtures};

    #[tokio::test]
    async fn vote_ids_are_monotonic_from_one() {
        let store = MemoryStore::default();
        let first = store.insert_vote(VoteRequest::new("t1", Stance::Agree)).await.unwrap();
        let second = store.insert_vote(VoteRequest::new("t1", Stance::Disagree)).await.unwrap();
        assert_eq!((first.id, second.id), (1, 2));
    }

    #[tokio::test]
    async fn amend_only_touches_context() {
        let store = MemoryStore::default();
        let vote = store
            .insert_vote(VoteRequest::new("t1", Stance::Agree).with_session("s1"))
            .await
            .unwrap();
        let context = VoteContext {
            reason_tags: Some(vec!["fair".into()]),
            explanation: Some("because".into()),
        };
        assert!(store.update_vote_context(vote.id, context.clone()).await.unwrap());
        assert!(!store.update_vote_context(99, context).await.unwrap());

        let stored = &store.votes()[0];
        assert_eq!(stored.stance, Stance::Agree);
        assert_eq!(stored.take_id, "t1");
        assert_eq!(stored.explanation.as_deref(), Some("because"));
    }

    #[tokio::test]
    async fn corpus_queries_filter_and_fail_offline() {
        let store = MemoryStore::new(fixtures::corpus());
        assert_eq!(store.eligible_takes().await.unwrap().len(), 18);
        assert_eq!(
            store.takes_by_category(CategoryId::Philosophy).await.unwrap().len(),
            4
        );
        let hot = store
            .takes_by_intensity(CategoryId::Work, 4, 5)
            .await
            .unwrap();
        assert_eq!(hot.len(), 1);
        assert_eq!(hot[0].id, "work3");
        assert!(store.take_by_id("philosophy-raw").await.unwrap().is_some());
        assert_eq!(store.corpus_queries(), 1);

        store.set_offline(true);
        assert!(matches!(
            store.eligible_takes().await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn cards_are_saved_once_and_listed_newest_first() {
        let store = MemoryStore::default();
        assert!(store.save_card("u1", "tok-a").await.unwrap());
        assert!(store.save_card("u1", "tok-b").await.unwrap());
        assert!(!store.save_card("u1", "tok-a").await.unwrap());
        assert!(store.save_card("u2", "tok-a").await.unwrap());

        let tokens: Vec<_> = store
            .saved_cards("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|card| card.token)
            .collect();
        assert_eq!(tokens, ["tok-b", "tok-a"]);
    }
}
