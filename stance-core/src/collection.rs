//! Saved stance cards per signed-in user.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::stance_card::{StanceCardError, StanceCharPolicy, parse_token};
use crate::store::{CollectionStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedStanceCard {
    pub user_id: String,
    pub token: String,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectionError {
    #[error("user id is required")]
    MissingUser,
    #[error(transparent)]
    InvalidToken(#[from] StanceCardError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct CardCollection<S: ?Sized> {
    store: Arc<S>,
    policy: StanceCharPolicy,
}

impl<S> CardCollection<S>
where
    S: CollectionStore + ?Sized,
{
    #[must_use]
    pub const fn new(store: Arc<S>, policy: StanceCharPolicy) -> Self {
        Self { store, policy }
    }

    /// Save a structurally valid token for `user_id`. Ids inside the token are
    /// not resolved. Returns `false` when the user had already saved it.
    ///
    /// # Errors
    ///
    /// Returns an error for a missing user, an unparseable token, or a store failure.
    pub async fn save(&self, user_id: &str, token: &str) -> Result<bool, CollectionError> {
        if user_id.is_empty() {
            return Err(CollectionError::MissingUser);
        }
        let token = token.trim();
        parse_token(token, self.policy)?;
        Ok(self.store.save_card(user_id, token).await?)
    }

    /// # Errors
    ///
    /// Returns the store error.
    pub async fn list(&self, user_id: &str) -> Result<Vec<SavedStanceCard>, StoreError> {
        self.store.saved_cards(user_id).await
    }
}
