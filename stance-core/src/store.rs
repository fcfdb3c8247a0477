//! Backing-store seams. Storage engines implement these traits; the rest of
//! the crate only ever talks to them through the cache, the aggregator, the
//! stitcher and the engine facade.
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::category::CategoryId;
use crate::collection::SavedStanceCard;
use crate::take::Take;
use crate::votes::{TakeStats, Vote, VoteContext, VoteId, VoteRequest};

/// Failure talking to the backing store.
///
/// `Clone` so a single failed cache reload can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("backing store unavailable: {0}")]
    Unavailable(String),
    #[error("backing store timed out after {0:?}")]
    Timeout(Duration),
}

/// Read access to the Take corpus.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Every Take that satisfies [`Take::is_eligible`], in storage order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    async fn eligible_takes(&self) -> Result<Vec<Take>, StoreError>;

    /// Look up one Take regardless of eligibility.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    async fn take_by_id(&self, id: &str) -> Result<Option<Take>, StoreError>;

    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    async fn takes_by_category(&self, category: CategoryId) -> Result<Vec<Take>, StoreError>;

    /// Takes of `category` whose intensity (default applied) falls in `min..=max`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    async fn takes_by_intensity(
        &self,
        category: CategoryId,
        min: u8,
        max: u8,
    ) -> Result<Vec<Take>, StoreError> {
        let takes = self.takes_by_category(category).await?;
        Ok(takes
            .into_iter()
            .filter(|take| (min..=max).contains(&take.intensity()))
            .collect())
    }
}

/// Append-mostly vote persistence.
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Persist a new vote and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn insert_vote(&self, request: VoteRequest) -> Result<Vote, StoreError>;

    /// Replace the mutable context of a vote. Returns `false` if no vote has that id.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn update_vote_context(
        &self,
        vote_id: VoteId,
        context: VoteContext,
    ) -> Result<bool, StoreError>;

    /// Aggregate all votes for a Take; `None` when it has none.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    async fn take_stats(&self, take_id: &str) -> Result<Option<TakeStats>, StoreError>;

    /// Bind every vote with `session_id` and no user to `user_id`.
    /// Returns the number of votes updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn assign_session_user(&self, session_id: &str, user_id: &str)
    -> Result<u64, StoreError>;

    /// Votes cast under a session, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    async fn session_votes(&self, session_id: &str) -> Result<Vec<Vote>, StoreError>;
}

/// Per-user saved stance cards.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Save a token for a user. Returns `false` when it was already saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn save_card(&self, user_id: &str, token: &str) -> Result<bool, StoreError>;

    /// Saved cards for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    async fn saved_cards(&self, user_id: &str) -> Result<Vec<SavedStanceCard>, StoreError>;
}
