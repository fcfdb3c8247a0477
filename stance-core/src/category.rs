//! Fixed category registry. Registry order drives spin and card ordering.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryId {
    Philosophy,
    Relationships,
    Work,
    Money,
    Lifestyle,
    Society,
}

impl CategoryId {
    /// All categories in registry order.
    pub const ALL: [Self; 6] = [
        Self::Philosophy,
        Self::Relationships,
        Self::Work,
        Self::Money,
        Self::Lifestyle,
        Self::Society,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Philosophy => "philosophy",
            Self::Relationships => "relationships",
            Self::Work => "work",
            Self::Money => "money",
            Self::Lifestyle => "lifestyle",
            Self::Society => "society",
        }
    }

    /// Registry entry for this category.
    #[must_use]
    pub fn info(self) -> &'static Category {
        &CATEGORIES[self as usize]
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for CategoryId {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownCategory(needle.to_string()))
    }
}

/// Display metadata for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub name: CategoryId,
    pub label: &'static str,
    pub color: &'static str,
    pub icon: &'static str,
    pub archetype: &'static str,
    pub roman_numeral: &'static str,
    pub symbol: &'static str,
}

pub static CATEGORIES: [Category; 6] = [
    Category {
        name: CategoryId::Philosophy,
        label: "Philosophy",
        color: "var(--cat-philosophy)",
        icon: "brain",
        archetype: "The Thinker",
        roman_numeral: "I",
        symbol: "◈",
    },
    Category {
        name: CategoryId::Relationships,
        label: "Relationships",
        color: "var(--cat-relationships)",
        icon: "heart",
        archetype: "The Heart",
        roman_numeral: "II",
        symbol: "◎",
    },
    Category {
        name: CategoryId::Work,
        label: "Work",
        color: "var(--cat-work)",
        icon: "briefcase",
        archetype: "The Builder",
        roman_numeral: "III",
        symbol: "▲",
    },
    Category {
        name: CategoryId::Money,
        label: "Money",
        color: "var(--cat-money)",
        icon: "banknote",
        archetype: "The Merchant",
        roman_numeral: "IV",
        symbol: "☸",
    },
    Category {
        name: CategoryId::Lifestyle,
        label: "Lifestyle",
        color: "var(--cat-lifestyle)",
        icon: "sun",
        archetype: "The Seeker",
        roman_numeral: "V",
        symbol: "✦",
    },
    Category {
        name: CategoryId::Society,
        label: "Society",
        color: "var(--cat-society)",
        icon: "globe",
        archetype: "The Citizen",
        roman_numeral: "VI",
        symbol: "⚖",
    },
];

#[must_use]
pub fn categories() -> &'static [Category] {
    &CATEGORIES
}
