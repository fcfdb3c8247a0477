//! Vote recording, amendment and per-Take aggregate stats.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::constants::EXPLANATION_MAX_CHARS;
use crate::store::{StoreError, VoteStore};
use crate::take::{Stance, UnknownStance};

pub type VoteId = u64;

/// A persisted vote. `take_id` and `stance` never change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: VoteId,
    pub take_id: String,
    pub stance: Stance,
    pub reason_tags: Option<Vec<String>>,
    pub explanation: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The amendable part of a vote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteContext {
    #[serde(default)]
    pub reason_tags: Option<Vec<String>>,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl VoteContext {
    /// Normalize empty values to absent and enforce the explanation limit.
    ///
    /// # Errors
    ///
    /// Returns [`VoteError::ExplanationTooLong`] past 280 characters.
    pub fn validated(self) -> Result<Self, VoteError> {
        let explanation = self.explanation.filter(|text| !text.trim().is_empty());
        if let Some(text) = &explanation {
            let len = text.chars().count();
            if len > EXPLANATION_MAX_CHARS {
                return Err(VoteError::ExplanationTooLong {
                    len,
                    max: EXPLANATION_MAX_CHARS,
                });
            }
        }
        Ok(Self {
            reason_tags: self.reason_tags.filter(|tags| !tags.is_empty()),
            explanation,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error(transparent)]
    Stance(#[from] UnknownStance),
    #[error("explanation must be <= {max} characters (got {len})")]
    ExplanationTooLong { len: usize, max: usize },
}

/// Vote body as received from the presentation layer, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VotePayload {
    #[serde(default)]
    pub take_id: Option<String>,
    #[serde(default)]
    pub stance: Option<String>,
    #[serde(default)]
    pub reason_tags: Option<Vec<String>>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// A validated vote ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRequest {
    pub take_id: String,
    pub stance: Stance,
    pub context: VoteContext,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

impl VoteRequest {
    #[must_use]
    pub fn new(take_id: impl Into<String>, stance: Stance) -> Self {
        Self {
            take_id: take_id.into(),
            stance,
            context: VoteContext::default(),
            session_id: None,
            user_id: None,
        }
    }

    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: VoteContext) -> Self {
        self.context = context;
        self
    }
}

impl TryFrom<VotePayload> for VoteRequest {
    type Error = VoteError;

    fn try_from(payload: VotePayload) -> Result<Self, Self::Error> {
        let take_id = payload
            .take_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(VoteError::MissingField("take_id"))?;
        let stance = payload
            .stance
            .filter(|s| !s.is_empty())
            .ok_or(VoteError::MissingField("stance"))?
            .parse::<Stance>()?;
        let context = VoteContext {
            reason_tags: payload.reason_tags,
            explanation: payload.explanation,
        }
        .validated()?;
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        Ok(Self {
            take_id,
            stance,
            context,
            session_id: non_empty(payload.session_id),
            user_id: non_empty(payload.user_id),
        })
    }
}

/// Aggregate view of every vote on one Take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeStats {
    pub take_id: String,
    pub total_votes: u64,
    /// Share of agree votes, 0..=100, one decimal place
    pub agree_percentage: f64,
    pub top_reason: Option<String>,
}

impl TakeStats {
    /// Aggregate `votes` (which must all be for `take_id`). `None` when there are none.
    /// Ties for the top reason go to the tag seen first in iteration order.
    pub fn from_votes<'a>(
        take_id: &str,
        votes: impl IntoIterator<Item = &'a Vote>,
    ) -> Option<Self> {
        let mut total = 0u64;
        let mut agree = 0u64;
        let mut tags: Vec<(&str, u64)> = Vec::new();
        for vote in votes {
            total += 1;
            if vote.stance == Stance::Agree {
                agree += 1;
            }
            for tag in vote.reason_tags.iter().flatten() {
                match tags.iter_mut().find(|(seen, _)| *seen == tag.as_str()) {
                    Some((_, count)) => *count += 1,
                    None => tags.push((tag.as_str(), 1)),
                }
            }
        }
        if total == 0 {
            return None;
        }

        let mut top: Option<(&str, u64)> = None;
        for (tag, count) in tags {
            if top.is_none_or(|(_, best)| count > best) {
                top = Some((tag, count));
            }
        }

        Some(Self {
            take_id: take_id.to_string(),
            total_votes: total,
            agree_percentage: agree_percentage(agree, total),
            top_reason: top.map(|(tag, _)| tag.to_string()),
        })
    }

    /// Stand-in aggregate for a vote whose stats could not be read back.
    #[must_use]
    pub fn single_vote(take_id: &str, stance: Stance) -> Self {
        Self {
            take_id: take_id.to_string(),
            total_votes: 1,
            agree_percentage: if stance == Stance::Agree { 100.0 } else { 0.0 },
            top_reason: None,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn agree_percentage(agree: u64, total: u64) -> f64 {
    ((agree as f64 * 1000.0) / total as f64).round() / 10.0
}

/// Thin layer over a [`VoteStore`]; holds no state of its own.
pub struct VoteAggregator<V: ?Sized> {
    store: Arc<V>,
    detached_timeout: Option<Duration>,
}

impl<V: ?Sized> Clone for VoteAggregator<V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            detached_timeout: self.detached_timeout,
        }
    }
}

impl<V> VoteAggregator<V>
where
    V: VoteStore + ?Sized + 'static,
{
    #[must_use]
    pub const fn new(store: Arc<V>) -> Self {
        Self {
            store,
            detached_timeout: None,
        }
    }

    /// Bound detached writes, which have no caller around to time them out.
    #[must_use]
    pub fn with_detached_timeout(mut self, limit: Duration) -> Self {
        self.detached_timeout = Some(limit);
        self
    }

    /// Append a vote and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns the store error; the write is not retried.
    pub async fn record_vote(&self, request: VoteRequest) -> Result<Vote, StoreError> {
        let vote = self.store.insert_vote(request).await?;
        log::debug!("recorded vote #{} on {} ({})", vote.id, vote.take_id, vote.stance);
        Ok(vote)
    }

    /// Submit a vote without waiting for it. At most once: a failed write is
    /// logged and dropped. Discarding the handle is fine.
    pub fn record_vote_detached(&self, request: VoteRequest) -> JoinHandle<Result<Vote, StoreError>> {
        let aggregator = self.clone();
        tokio::spawn(async move {
            let take_id = request.take_id.clone();
            let write = aggregator.record_vote(request);
            let result = match aggregator.detached_timeout {
                Some(limit) => tokio::time::timeout(limit, write)
                    .await
                    .unwrap_or(Err(StoreError::Timeout(limit))),
                None => write.await,
            };
            if let Err(err) = &result {
                log::warn!("detached vote on {take_id} lost: {err}");
            }
            result
        })
    }

    /// Replace the reason tags and explanation of an existing vote.
    /// Returns `false` when no vote has `vote_id`.
    ///
    /// # Errors
    ///
    /// Returns the store error; the write is not retried.
    pub async fn amend_vote(&self, vote_id: VoteId, context: VoteContext) -> Result<bool, StoreError> {
        self.store.update_vote_context(vote_id, context).await
    }

    /// # Errors
    ///
    /// Returns the store error.
    pub async fn stats(&self, take_id: &str) -> Result<Option<TakeStats>, StoreError> {
        self.store.take_stats(take_id).await
    }

    /// # Errors
    ///
    /// Returns the store error.
    pub async fn session_votes(&self, session_id: &str) -> Result<Vec<Vote>, StoreError> {
        self.store.session_votes(session_id).await
    }
}
