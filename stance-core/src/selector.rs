//! Constrained random Take selection over a cache snapshot.
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::category::{Category, CategoryId, categories};
use crate::constants::{INTENSITY_MAX, INTENSITY_MIN};
use crate::take::Take;

/// Constraints for a single-category pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickRequest<'a> {
    pub category: CategoryId,
    pub exclude_ids: &'a [String],
    pub intensity: RangeInclusive<u8>,
}

impl<'a> PickRequest<'a> {
    /// Any intensity, no exclusions.
    #[must_use]
    pub const fn any(category: CategoryId) -> Self {
        Self {
            category,
            exclude_ids: &[],
            intensity: INTENSITY_MIN..=INTENSITY_MAX,
        }
    }

    #[must_use]
    pub const fn excluding(mut self, exclude_ids: &'a [String]) -> Self {
        self.exclude_ids = exclude_ids;
        self
    }

    #[must_use]
    pub const fn with_intensity(mut self, min: u8, max: u8) -> Self {
        self.intensity = min..=max;
        self
    }

    fn admits(&self, take: &Take) -> bool {
        take.category == self.category
            && self.intensity.contains(&take.intensity())
            && !self.exclude_ids.iter().any(|id| *id == take.id)
    }
}

/// Uniform pick among Takes satisfying `request`. `None` when nothing qualifies.
pub fn pick_random<'t, R: Rng + ?Sized>(
    takes: &'t [Take],
    request: &PickRequest<'_>,
    rng: &mut R,
) -> Option<&'t Take> {
    let pool: Vec<&Take> = takes.iter().filter(|take| request.admits(take)).collect();
    pool.choose(rng).copied()
}

/// Category id to Take id, as supplied by the player's pins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockedTakes(BTreeMap<CategoryId, String>);

impl LockedTakes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the `category:id,category:id` query form. Pairs with an unknown
    /// category or an empty side are skipped.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut locked = Self::new();
        for pair in raw.split(',') {
            let Some((category, id)) = pair.split_once(':') else {
                continue;
            };
            let id = id.trim();
            if id.is_empty() {
                continue;
            }
            if let Ok(category) = category.parse::<CategoryId>() {
                locked.lock(category, id);
            }
        }
        locked
    }

    pub fn lock(&mut self, category: CategoryId, take_id: impl Into<String>) {
        self.0.insert(category, take_id.into());
    }

    #[must_use]
    pub fn get(&self, category: CategoryId) -> Option<&str> {
        self.0.get(&category).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CategoryId, &str)> {
        self.0.iter().map(|(category, id)| (*category, id.as_str()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(CategoryId, String)> for LockedTakes {
    fn from_iter<I: IntoIterator<Item = (CategoryId, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One Take per category, keyed in registry order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpinResult {
    pub takes: BTreeMap<CategoryId, Take>,
    pub categories: &'static [Category],
}

impl SpinResult {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            takes: BTreeMap::new(),
            categories: categories(),
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.takes.len() == categories().len()
    }
}

/// Fill every category slot. `resolved_locks` holds Takes already looked up
/// for the player's pins; a pin is honoured only when its Take belongs to the
/// slot's category, otherwise the slot falls back to a random pick.
pub fn spin<R: Rng + ?Sized>(
    takes: &[Take],
    resolved_locks: &BTreeMap<CategoryId, Take>,
    rng: &mut R,
) -> SpinResult {
    let mut result = SpinResult::empty();
    for category in categories().iter().map(|c| c.name) {
        if let Some(locked) = resolved_locks.get(&category)
            && locked.category == category
        {
            result.takes.insert(category, locked.clone());
            continue;
        }
        if let Some(take) = pick_random(takes, &PickRequest::any(category), rng) {
            result.takes.insert(category, take.clone());
        } else {
            log::warn!("spin left {category} empty: no eligible takes");
        }
    }
    result
}

/// Count of eligible Takes per intensity level 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct IntensityDistribution([usize; INTENSITY_MAX as usize]);

impl IntensityDistribution {
    pub fn from_takes<'a>(
        takes: impl IntoIterator<Item = &'a Take>,
        category: Option<CategoryId>,
    ) -> Self {
        let mut counts = [0usize; INTENSITY_MAX as usize];
        for take in takes {
            if category.is_some_and(|c| c != take.category) {
                continue;
            }
            let level = take.intensity();
            if (INTENSITY_MIN..=INTENSITY_MAX).contains(&level) {
                counts[usize::from(level - INTENSITY_MIN)] += 1;
            }
        }
        Self(counts)
    }

    #[must_use]
    pub fn count(&self, level: u8) -> usize {
        level
            .checked_sub(INTENSITY_MIN)
            .and_then(|idx| self.0.get(usize::from(idx)))
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }

    /// Level to count, every level present.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<u8, usize> {
        (INTENSITY_MIN..=INTENSITY_MAX)
            .map(|level| (level, self.count(level)))
            .collect()
    }
}

/// Listing filter for category and tone pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TakeFilter {
    pub category: Option<CategoryId>,
    pub tone: Option<String>,
    pub limit: Option<usize>,
}

#[must_use]
pub fn filter_takes(takes: &[Take], filter: &TakeFilter) -> Vec<Take> {
    takes
        .iter()
        .filter(|take| filter.category.is_none_or(|c| c == take.category))
        .filter(|take| filter.tone.as_deref().is_none_or(|tone| take.has_tone(tone)))
        .take(filter.limit.unwrap_or(usize::MAX))
        .cloned()
        .collect()
}

#[must_use]
pub fn find_by_slug<'t>(takes: &'t [Take], slug: &str) -> Option<&'t Take> {
    takes.iter().find(|take| take.slug == slug)
}
