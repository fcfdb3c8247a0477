use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::category::CategoryId;
use crate::constants::{
    AGREE_CHAR, DEFAULT_INTENSITY, DISAGREE_CHAR, ENTRY_SEPARATOR, INTENSITY_MAX, INTENSITY_MIN,
    STANCE_SEPARATOR, STATEMENT_MAX_CHARS,
};

/// A player's agree/disagree choice on a Take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    Agree,
    Disagree,
}

impl Stance {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Agree => "agree",
            Self::Disagree => "disagree",
        }
    }

    /// Single-character form used inside stance-card tokens.
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Agree => AGREE_CHAR,
            Self::Disagree => DISAGREE_CHAR,
        }
    }

    #[must_use]
    pub const fn from_code(code: char) -> Option<Self> {
        match code {
            AGREE_CHAR => Some(Self::Agree),
            DISAGREE_CHAR => Some(Self::Disagree),
            _ => None,
        }
    }
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("stance must be \"agree\" or \"disagree\" (got {0:?})")]
pub struct UnknownStance(pub String);

impl FromStr for Stance {
    type Err = UnknownStance;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agree" => Ok(Self::Agree),
            "disagree" => Ok(Self::Disagree),
            other => Err(UnknownStance(other.to_string())),
        }
    }
}

/// Provenance of the offline enrichment pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentMetadata {
    pub model: String,
    #[serde(default)]
    pub validation_passed: bool,
    pub timestamp: String,
}

/// Editorial bookkeeping for the intensity rating. Informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntensityMetadata {
    pub ai_generated: u8,
    #[serde(default)]
    pub vote_refined: Option<u8>,
    /// Vote variance in 0..=1, 0.5 being an even split
    #[serde(default)]
    pub polarization: Option<f64>,
    #[serde(default)]
    pub avg_explanation_length: Option<f64>,
    pub last_updated: String,
}

/// A single debatable statement shown to a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Take {
    pub id: String,
    pub statement: String,
    pub category: CategoryId,
    pub slug: String,
    #[serde(default)]
    pub tone: Vec<String>,
    #[serde(default)]
    pub original_question: String,
    #[serde(default)]
    pub agree_reasons: Option<Vec<String>>,
    #[serde(default)]
    pub disagree_reasons: Option<Vec<String>>,
    #[serde(default)]
    pub intensity: Option<u8>,
    #[serde(default)]
    pub intensity_metadata: Option<IntensityMetadata>,
    #[serde(default)]
    pub enrichment_metadata: Option<EnrichmentMetadata>,
}

impl Take {
    /// Servable only once both reason lists are present and non-empty.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        let populated = |reasons: &Option<Vec<String>>| reasons.as_ref().is_some_and(|r| !r.is_empty());
        populated(&self.agree_reasons) && populated(&self.disagree_reasons)
    }

    /// Intensity rating, falling back to the medium default when unset.
    #[must_use]
    pub fn intensity(&self) -> u8 {
        self.intensity.unwrap_or(DEFAULT_INTENSITY)
    }

    #[must_use]
    pub fn reasons_for(&self, stance: Stance) -> &[String] {
        let reasons = match stance {
            Stance::Agree => &self.agree_reasons,
            Stance::Disagree => &self.disagree_reasons,
        };
        reasons.as_deref().unwrap_or(&[])
    }

    #[must_use]
    pub fn has_tone(&self, tone: &str) -> bool {
        self.tone.iter().any(|t| t == tone)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("corpus JSON could not be parsed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate take id {0}")]
    DuplicateId(String),
    #[error("take {id} has a reserved separator character in its id")]
    ReservedCharacter { id: String },
    #[error("take {id} statement exceeds {max} characters")]
    StatementTooLong { id: String, max: usize },
    #[error("take {id} has intensity {value} outside 1..=5")]
    IntensityOutOfRange { id: String, value: u8 },
}

/// All Takes produced by the offline pipeline, in corpus order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct TakeCorpus {
    pub takes: Vec<Take>,
}

impl TakeCorpus {
    #[must_use]
    pub fn empty() -> Self {
        Self { takes: Vec::new() }
    }

    /// Parse and validate the pipeline's JSON array of Takes.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a Take breaks a model invariant.
    pub fn from_json(json: &str) -> Result<Self, CorpusError> {
        let corpus: Self = serde_json::from_str(json)?;
        corpus.validate()?;
        Ok(corpus)
    }

    #[must_use]
    pub fn from_takes(takes: Vec<Take>) -> Self {
        Self { takes }
    }

    /// # Errors
    ///
    /// Returns the first invariant violation found in corpus order.
    pub fn validate(&self) -> Result<(), CorpusError> {
        let mut seen = std::collections::HashSet::with_capacity(self.takes.len());
        for take in &self.takes {
            if !seen.insert(take.id.as_str()) {
                return Err(CorpusError::DuplicateId(take.id.clone()));
            }
            if take.id.is_empty() || take.id.contains([STANCE_SEPARATOR, ENTRY_SEPARATOR]) {
                return Err(CorpusError::ReservedCharacter {
                    id: take.id.clone(),
                });
            }
            if take.statement.chars().count() > STATEMENT_MAX_CHARS {
                return Err(CorpusError::StatementTooLong {
                    id: take.id.clone(),
                    max: STATEMENT_MAX_CHARS,
                });
            }
            if let Some(value) = take.intensity
                && !(INTENSITY_MIN..=INTENSITY_MAX).contains(&value)
            {
                return Err(CorpusError::IntensityOutOfRange {
                    id: take.id.clone(),
                    value,
                });
            }
        }
        Ok(())
    }

    pub fn eligible(&self) -> impl Iterator<Item = &Take> {
        self.takes.iter().filter(|t| t.is_eligible())
    }

    #[must_use]
    pub fn get_by_id(&self, id: &str) -> Option<&Take> {
        self.takes.iter().find(|t| t.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.takes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.takes.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn eligibility_requires_both_reason_lists() {
        let base = take("t1", CategoryId::Work, None);
        assert!(base.is_eligible());
        assert!(!unenriched("t2", CategoryId::Work).is_eligible());

        let empty_disagree = Take {
            disagree_reasons: Some(Vec::new()),
            ..base.clone()
        };
        assert!(!empty_disagree.is_eligible());
    }

    #[test]
    fn intensity_defaults_to_medium() {
        assert_eq!(take("t1", CategoryId::Money, None).intensity(), 3);
        assert_eq!(take("t1", CategoryId::Money, Some(5)).intensity(), 5);
    }

    #[test]
    fn corpus_from_json_reads_camel_case_fields() {
        let json = r#"[
            {
                "id": "a1b2c3d4e5f6",
                "statement": "Breakfast is overrated",
                "category": "lifestyle",
                "slug": "breakfast-is-overrated",
                "tone": ["playful"],
                "originalQuestion": "Is breakfast the most important meal?",
                "agreeReasons": ["Coffee is enough"],
                "disagreeReasons": ["Energy"],
                "intensity": 2,
                "enrichmentMetadata": {
                    "model": "enricher-v1",
                    "validationPassed": true,
                    "timestamp": "2025-01-01T00:00:00Z"
                }
            }
        ]"#;

        let corpus = TakeCorpus::from_json(json).unwrap();
        assert_eq!(corpus.len(), 1);
        let take = corpus.get_by_id("a1b2c3d4e5f6").unwrap();
        assert_eq!(take.category, CategoryId::Lifestyle);
        assert_eq!(take.reasons_for(Stance::Agree), ["Coffee is enough".to_string()]);
        assert!(take.enrichment_metadata.as_ref().unwrap().validation_passed);
        assert!(take.has_tone("playful"));
        assert!(take.is_eligible());
    }

    #[test]
    fn corpus_rejects_reserved_separator_in_id() {
        let json = r#"[{"id": "a.b", "statement": "x", "category": "work", "slug": "x"}]"#;
        assert!(matches!(
            TakeCorpus::from_json(json),
            Err(CorpusError::ReservedCharacter { .. })
        ));
    }

    #[test]
    fn corpus_rejects_duplicates_and_bad_intensity() {
        let dupes = TakeCorpus::from_takes(vec![
            take("t1", CategoryId::Work, None),
            take("t1", CategoryId::Money, None),
        ]);
        assert!(matches!(dupes.validate(), Err(CorpusError::DuplicateId(id)) if id == "t1"));

        let hot = TakeCorpus::from_takes(vec![take("t9", CategoryId::Work, Some(9))]);
        assert!(matches!(
            hot.validate(),
            Err(CorpusError::IntensityOutOfRange { value: 9, .. })
        ));
    }

    #[test]
    fn stance_codes_and_names_round_trip() {
        for stance in [Stance::Agree, Stance::Disagree] {
            assert_eq!(Stance::from_code(stance.code()), Some(stance));
            assert_eq!(stance.as_str().parse::<Stance>().unwrap(), stance);
        }
        assert_eq!(Stance::from_code('x'), None);
        assert!("maybe".parse::<Stance>().is_err());
    }

    #[test]
    fn fixture_corpus_filters_unenriched() {
        let corpus = corpus();
        assert_eq!(corpus.len(), 19);
        assert_eq!(corpus.eligible().count(), 18);
    }
}
