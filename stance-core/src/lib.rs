//! Stance serving core
//!
//! Take serving, stance-card sharing and vote aggregation for the Stance game.
//! This crate holds every rule of the serving layer without any web framework
//! or storage engine; both plug in through the traits in [`store`].

pub mod cache;
pub mod category;
pub mod collection;
pub mod config;
pub mod constants;
pub mod memory;
pub mod selector;
pub mod stance_card;
pub mod stitch;
pub mod store;
pub mod take;
pub mod votes;

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

// Re-export commonly used types
pub use cache::{CacheSnapshot, CorpusCache};
pub use category::{CATEGORIES, Category, CategoryId, categories};
pub use collection::{CardCollection, CollectionError, SavedStanceCard};
pub use config::{ConfigError, EngineConfig};
pub use memory::MemoryStore;
pub use selector::{
    IntensityDistribution, LockedTakes, PickRequest, SpinResult, TakeFilter, filter_takes,
    find_by_slug, pick_random, spin,
};
pub use stance_card::{
    StanceCardEntry, StanceCardError, StanceCharPolicy, TokenEntry, encode, encode_pairs,
    parse_token,
};
pub use stitch::SessionStitcher;
pub use store::{CollectionStore, CorpusStore, StoreError, VoteStore};
pub use take::{CorpusError, EnrichmentMetadata, IntensityMetadata, Stance, Take, TakeCorpus};
pub use votes::{
    TakeStats, Vote, VoteAggregator, VoteContext, VoteError, VoteId, VotePayload, VoteRequest,
};

/// Failure surfaced by the engine's write paths.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid vote: {0}")]
    InvalidInput(#[from] VoteError),
    #[error("vote {0} does not exist")]
    VoteNotFound(VoteId),
    #[error("invalid stance card: {0}")]
    InvalidCard(#[from] StanceCardError),
    #[error("user id is required")]
    MissingUser,
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),
}

impl From<CollectionError> for EngineError {
    fn from(err: CollectionError) -> Self {
        match err {
            CollectionError::MissingUser => Self::MissingUser,
            CollectionError::InvalidToken(err) => Self::InvalidCard(err),
            CollectionError::Store(err) => Self::StoreUnavailable(err),
        }
    }
}

/// What the player sees right after voting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteReceipt {
    pub vote_id: VoteId,
    pub aggregate: TakeStats,
}

/// Serving facade for the presentation layer.
///
/// Every backing-store call is bounded by the configured timeout. Reads that
/// time out or fail degrade to empty data; writes report the failure.
pub struct StanceEngine<C: ?Sized, V: ?Sized> {
    config: EngineConfig,
    cache: CorpusCache<C>,
    votes: VoteAggregator<V>,
    stitcher: SessionStitcher<V>,
    collection: CardCollection<V>,
}

impl<C, V> StanceEngine<C, V>
where
    C: CorpusStore + ?Sized + 'static,
    V: VoteStore + CollectionStore + ?Sized + 'static,
{
    #[must_use]
    pub fn new(corpus: Arc<C>, votes: Arc<V>, config: EngineConfig) -> Self {
        let cache = CorpusCache::new(corpus, config.cache_ttl())
            .with_reload_timeout(config.store_timeout());
        Self {
            cache,
            votes: VoteAggregator::new(Arc::clone(&votes))
                .with_detached_timeout(config.store_timeout()),
            stitcher: SessionStitcher::new(Arc::clone(&votes)),
            collection: CardCollection::new(votes, config.stance_char_policy),
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub const fn cache(&self) -> &CorpusCache<C> {
        &self.cache
    }

    #[must_use]
    pub fn categories(&self) -> &'static [Category] {
        categories()
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let limit = self.config.store_timeout();
        tokio::time::timeout(limit, fut)
            .await
            .unwrap_or(Err(StoreError::Timeout(limit)))
    }

    async fn snapshot(&self, op: &str) -> Option<Arc<CacheSnapshot>> {
        match self.bounded(self.cache.get_takes()).await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                log::warn!("{op} degraded, corpus unavailable: {err}");
                None
            }
        }
    }

    /// Resolve an id through the snapshot first, then the store.
    async fn resolve_take(
        &self,
        snapshot: Option<&CacheSnapshot>,
        id: &str,
    ) -> Result<Option<Take>, StoreError> {
        if let Some(take) = snapshot.and_then(|s| s.find(id)) {
            return Ok(Some(take.clone()));
        }
        self.bounded(self.cache.store().take_by_id(id)).await
    }

    /// One Take per category in registry order, honouring pins whose Take
    /// exists, is servable and matches the slot's category.
    ///
    /// A pin on an unenriched Take is dropped like a missing one, so a spin
    /// never serves a Take that listings and random picks would hide.
    pub async fn spin(&self, locked: &LockedTakes) -> SpinResult {
        let Some(snapshot) = self.snapshot("spin").await else {
            return SpinResult::empty();
        };

        let mut resolved = BTreeMap::new();
        for (category, id) in locked.iter() {
            match self.resolve_take(Some(&snapshot), id).await {
                Ok(Some(take)) if take.category == category && take.is_eligible() => {
                    resolved.insert(category, take);
                }
                Ok(_) => log::debug!("lock {category}:{id} ignored, falling back to a random pick"),
                Err(err) => log::warn!("lock {category}:{id} unresolved: {err}"),
            }
        }

        spin(snapshot.takes(), &resolved, &mut rand::thread_rng())
    }

    /// Random Take for one category under the request's constraints.
    pub async fn pick_random(&self, request: &PickRequest<'_>) -> Option<Take> {
        let snapshot = self.snapshot("pick_random").await?;
        pick_random(snapshot.takes(), request, &mut rand::thread_rng()).cloned()
    }

    pub async fn intensity_distribution(
        &self,
        category: Option<CategoryId>,
    ) -> IntensityDistribution {
        self.snapshot("intensity_distribution")
            .await
            .map(|snapshot| IntensityDistribution::from_takes(snapshot.takes(), category))
            .unwrap_or_default()
    }

    pub async fn filtered_takes(&self, filter: &TakeFilter) -> Vec<Take> {
        self.snapshot("filtered_takes")
            .await
            .map(|snapshot| filter_takes(snapshot.takes(), filter))
            .unwrap_or_default()
    }

    pub async fn take_by_slug(&self, slug: &str) -> Option<Take> {
        let snapshot = self.snapshot("take_by_slug").await?;
        find_by_slug(snapshot.takes(), slug).cloned()
    }

    /// # Errors
    ///
    /// Returns an error unless there are six entries with separator-free ids.
    pub fn encode_stance_card(&self, entries: &[StanceCardEntry]) -> Result<String, StanceCardError> {
        encode(entries)
    }

    /// Resolve a shared token back into its entries. Any structural problem or
    /// unresolvable id yields `None`; a partial card is never returned.
    pub async fn decode_stance_card(&self, token: &str) -> Option<Vec<StanceCardEntry>> {
        match self.try_decode(token).await {
            Ok(entries) => Some(entries),
            Err(err) => {
                log::debug!("stance card rejected: {err}");
                None
            }
        }
    }

    async fn try_decode(&self, token: &str) -> Result<Vec<StanceCardEntry>, StanceCardError> {
        let pairs = parse_token(token, self.config.stance_char_policy)?;
        let snapshot = self.snapshot("decode_stance_card").await;
        let mut entries = Vec::with_capacity(pairs.len());
        for TokenEntry { take_id, stance } in pairs {
            let take = self
                .resolve_take(snapshot.as_deref(), &take_id)
                .await
                .ok()
                .flatten()
                .ok_or(StanceCardError::UnknownTake(take_id))?;
            entries.push(StanceCardEntry::new(take, stance));
        }
        Ok(entries)
    }

    /// Validate and persist a vote, then read back the Take's aggregate.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidInput`] for a malformed payload (nothing is
    /// written); [`EngineError::StoreUnavailable`] when the write fails.
    pub async fn record_vote(&self, payload: VotePayload) -> Result<VoteReceipt, EngineError> {
        let request = VoteRequest::try_from(payload)?;
        let vote = self.bounded(self.votes.record_vote(request)).await?;
        let aggregate = match self.bounded(self.votes.stats(&vote.take_id)).await {
            Ok(Some(stats)) => stats,
            Ok(None) => TakeStats::single_vote(&vote.take_id, vote.stance),
            Err(err) => {
                log::warn!("stats for {} unavailable after vote: {err}", vote.take_id);
                TakeStats::single_vote(&vote.take_id, vote.stance)
            }
        };
        Ok(VoteReceipt {
            vote_id: vote.id,
            aggregate,
        })
    }

    /// Validate a vote and write it in the background. The handle may be dropped.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] for a malformed payload.
    pub fn submit_vote(
        &self,
        payload: VotePayload,
    ) -> Result<JoinHandle<Result<Vote, StoreError>>, EngineError> {
        let request = VoteRequest::try_from(payload)?;
        Ok(self.votes.record_vote_detached(request))
    }

    /// Replace a vote's reason tags and explanation.
    ///
    /// # Errors
    ///
    /// Invalid context, an unknown vote id, or a failed write.
    pub async fn amend_vote(&self, vote_id: VoteId, context: VoteContext) -> Result<(), EngineError> {
        let context = context.validated()?;
        if self.bounded(self.votes.amend_vote(vote_id, context)).await? {
            Ok(())
        } else {
            Err(EngineError::VoteNotFound(vote_id))
        }
    }

    pub async fn vote_stats(&self, take_id: &str) -> Option<TakeStats> {
        self.bounded(self.votes.stats(take_id))
            .await
            .unwrap_or_else(|err| {
                log::warn!("stats for {take_id} degraded: {err}");
                None
            })
    }

    /// # Errors
    ///
    /// Returns [`EngineError::StoreUnavailable`] when the update fails.
    pub async fn stitch(&self, session_id: &str, user_id: &str) -> Result<u64, EngineError> {
        Ok(self.bounded(self.stitcher.stitch(session_id, user_id)).await?)
    }

    /// Stitch the player's anonymous session (when given) and save the card
    /// to their collection. Saving the same token twice is a no-op.
    ///
    /// # Errors
    ///
    /// A missing user, a malformed token, or a failed write.
    pub async fn save_stance_card(
        &self,
        user_id: &str,
        token: &str,
        session_id: Option<&str>,
    ) -> Result<(), EngineError> {
        if user_id.is_empty() {
            return Err(EngineError::MissingUser);
        }
        if let Some(session_id) = session_id {
            self.stitch(session_id, user_id).await?;
        }
        let limit = self.config.store_timeout();
        tokio::time::timeout(limit, self.collection.save(user_id, token))
            .await
            .unwrap_or(Err(CollectionError::Store(StoreError::Timeout(limit))))?;
        Ok(())
    }

    pub async fn saved_stance_cards(&self, user_id: &str) -> Vec<SavedStanceCard> {
        self.bounded(self.collection.list(user_id))
            .await
            .unwrap_or_else(|err| {
                log::warn!("saved cards for {user_id} degraded: {err}");
                Vec::new()
            })
    }

    pub async fn session_votes(&self, session_id: &str) -> Vec<Vote> {
        self.bounded(self.votes.session_votes(session_id))
            .await
            .unwrap_or_else(|err| {
                log::warn!("session votes degraded: {err}");
                Vec::new()
            })
    }
}
