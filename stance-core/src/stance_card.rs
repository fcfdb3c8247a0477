//! Shareable stance-card tokens.
//! Token format: base64url, no padding, of `id1.c1|id2.c2|...|id6.c6`
//! where each `c` is `a` (agree) or `d` (disagree).
use base64::Engine as _;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{CARD_SIZE, ENTRY_SEPARATOR, STANCE_SEPARATOR};
use crate::take::{Stance, Take};

/// Standard alphabet, padding optional. Tokens are mapped back from the
/// URL-safe alphabet before decoding.
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StanceCardEntry {
    pub take: Take,
    pub stance: Stance,
}

impl StanceCardEntry {
    #[must_use]
    pub const fn new(take: Take, stance: Stance) -> Self {
        Self { take, stance }
    }
}

/// How to treat a stance character other than `a` or `d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StanceCharPolicy {
    /// Anything that is not `a` reads as disagree.
    #[default]
    Lenient,
    /// Only `a` and `d` are accepted.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StanceCardError {
    #[error("a stance card needs exactly {expected} entries (got {actual})")]
    WrongSize { expected: usize, actual: usize },
    #[error("take id {0:?} contains a reserved separator")]
    ReservedCharacter(String),
    #[error("token is not valid base64: {0}")]
    Base64(String),
    #[error("token payload is not UTF-8")]
    NotUtf8,
    #[error("entry {index} is malformed: {part:?}")]
    MalformedEntry { index: usize, part: String },
    #[error("entry {index} has unknown stance character {found:?}")]
    UnknownStance { index: usize, found: String },
    #[error("take {0} could not be resolved")]
    UnknownTake(String),
}

/// One `(id, stance)` pair read from a token, not yet resolved to a Take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEntry {
    pub take_id: String,
    pub stance: Stance,
}

/// Encode the six entries of a finished card, in the order given.
///
/// # Errors
///
/// Returns an error unless there are exactly six entries and every id is free
/// of the `.` and `|` separators.
pub fn encode(entries: &[StanceCardEntry]) -> Result<String, StanceCardError> {
    let pairs: Vec<(&str, Stance)> = entries
        .iter()
        .map(|entry| (entry.take.id.as_str(), entry.stance))
        .collect();
    encode_pairs(&pairs)
}

/// Encode raw `(take id, stance)` pairs.
///
/// # Errors
///
/// Same conditions as [`encode`].
pub fn encode_pairs(pairs: &[(&str, Stance)]) -> Result<String, StanceCardError> {
    if pairs.len() != CARD_SIZE {
        return Err(StanceCardError::WrongSize {
            expected: CARD_SIZE,
            actual: pairs.len(),
        });
    }
    let mut payload = String::new();
    for (index, (id, stance)) in pairs.iter().enumerate() {
        if id.is_empty() || id.contains([ENTRY_SEPARATOR, STANCE_SEPARATOR]) {
            return Err(StanceCardError::ReservedCharacter((*id).to_string()));
        }
        if index > 0 {
            payload.push(ENTRY_SEPARATOR);
        }
        payload.push_str(id);
        payload.push(STANCE_SEPARATOR);
        payload.push(stance.code());
    }
    Ok(URL_SAFE_NO_PAD.encode(payload))
}

/// Parse a token into its ordered `(id, stance)` pairs without resolving ids.
///
/// # Errors
///
/// Returns an error if the token is not base64, is not UTF-8, does not hold
/// exactly six `id.c` entries, or (under [`StanceCharPolicy::Strict`]) uses a
/// stance character other than `a`/`d`.
pub fn parse_token(token: &str, policy: StanceCharPolicy) -> Result<Vec<TokenEntry>, StanceCardError> {
    let standard: String = token
        .trim()
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    let bytes = LENIENT_STANDARD
        .decode(standard)
        .map_err(|err| StanceCardError::Base64(err.to_string()))?;
    let payload = String::from_utf8(bytes).map_err(|_| StanceCardError::NotUtf8)?;

    let parts: Vec<&str> = payload.split(ENTRY_SEPARATOR).collect();
    if parts.len() != CARD_SIZE {
        return Err(StanceCardError::WrongSize {
            expected: CARD_SIZE,
            actual: parts.len(),
        });
    }

    parts
        .into_iter()
        .enumerate()
        .map(|(index, part)| parse_entry(index, part, policy))
        .collect()
}

fn parse_entry(index: usize, part: &str, policy: StanceCharPolicy) -> Result<TokenEntry, StanceCardError> {
    let malformed = || StanceCardError::MalformedEntry {
        index,
        part: part.to_string(),
    };
    let (id, code) = part.rsplit_once(STANCE_SEPARATOR).ok_or_else(malformed)?;
    if id.is_empty() {
        return Err(malformed());
    }

    let mut chars = code.chars();
    let stance = match (chars.next(), chars.next()) {
        (Some(c), None) => Stance::from_code(c),
        _ => None,
    };
    let stance = match (stance, policy) {
        (Some(stance), _) => stance,
        (None, StanceCharPolicy::Lenient) => Stance::Disagree,
        (None, StanceCharPolicy::Strict) => {
            return Err(StanceCardError::UnknownStance {
                index,
                found: code.to_string(),
            });
        }
    };

    Ok(TokenEntry {
        take_id: id.to_string(),
        stance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::CategoryId;
    use crate::take::fixtures;

    fn sample_entries() -> Vec<StanceCardEntry> {
        let ids = [
            "a1b2c3d4e5f6",
            "g7h8i9j0k1l2",
            "m3n4o5p6q7r8",
            "s9t0u1v2w3x4",
            "y5z6a7b8c9d0",
            "e1f2g3h4i5j6",
        ];
        ids.iter()
            .zip(CategoryId::ALL)
            .enumerate()
            .map(|(i, (id, category))| {
                let stance = if i % 2 == 0 { Stance::Agree } else { Stance::Disagree };
                StanceCardEntry::new(fixtures::take(id, category, None), stance)
            })
            .collect()
    }

    #[test]
    fn encode_produces_url_safe_token() {
        let token = encode(&sample_entries()).unwrap();
        assert!(!token.contains(['+', '/', '=']));
        let payload = URL_SAFE_NO_PAD.decode(&token).unwrap();
        assert_eq!(
            String::from_utf8(payload).unwrap(),
            "a1b2c3d4e5f6.a|g7h8i9j0k1l2.d|m3n4o5p6q7r8.a|s9t0u1v2w3x4.d|y5z6a7b8c9d0.a|e1f2g3h4i5j6.d"
        );
    }

    #[test]
    fn parse_returns_pairs_in_token_order() {
        let entries = sample_entries();
        let token = encode(&entries).unwrap();
        let parsed = parse_token(&token, StanceCharPolicy::Strict).unwrap();
        let expected: Vec<_> = entries
            .iter()
            .map(|e| TokenEntry {
                take_id: e.take.id.clone(),
                stance: e.stance,
            })
            .collect();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn encode_rejects_wrong_size_and_separators() {
        let mut entries = sample_entries();
        entries.pop();
        assert_eq!(
            encode(&entries),
            Err(StanceCardError::WrongSize {
                expected: 6,
                actual: 5
            })
        );

        let mut pairs: Vec<(&str, Stance)> = vec![("ok", Stance::Agree); 6];
        pairs[3] = ("bad.id", Stance::Agree);
        assert_eq!(
            encode_pairs(&pairs),
            Err(StanceCardError::ReservedCharacter("bad.id".into()))
        );
    }

    #[test]
    fn parse_accepts_padded_and_standard_alphabet_forms() {
        let payload = "x1.a|x2.d|x3.a|x4.a|x5.d|x6?.d";
        let padded = base64::engine::general_purpose::URL_SAFE.encode(payload);
        let standard = base64::engine::general_purpose::STANDARD.encode(payload);
        let a = parse_token(&padded, StanceCharPolicy::Strict).unwrap();
        let b = parse_token(&standard, StanceCharPolicy::Strict).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[5].take_id, "x6?");
    }

    #[test]
    fn unknown_stance_char_depends_on_policy() {
        let token = URL_SAFE_NO_PAD.encode("x1.a|x2.d|x3.z|x4.a|x5.d|x6.a");
        let lenient = parse_token(&token, StanceCharPolicy::Lenient).unwrap();
        assert_eq!(lenient[2].stance, Stance::Disagree);
        assert_eq!(
            parse_token(&token, StanceCharPolicy::Strict),
            Err(StanceCardError::UnknownStance {
                index: 2,
                found: "z".into()
            })
        );
    }

    #[test]
    fn parse_splits_on_last_dot() {
        let token = URL_SAFE_NO_PAD.encode("v1.2.a|x2.d|x3.a|x4.a|x5.d|x6.a");
        let parsed = parse_token(&token, StanceCharPolicy::Strict).unwrap();
        assert_eq!(parsed[0].take_id, "v1.2");
        assert_eq!(parsed[0].stance, Stance::Agree);
    }

    #[test]
    fn parse_rejects_structural_garbage() {
        assert!(matches!(
            parse_token("!!not base64!!", StanceCharPolicy::Lenient),
            Err(StanceCardError::Base64(_))
        ));
        assert_eq!(
            parse_token(&URL_SAFE_NO_PAD.encode([0xffu8, 0xfe]), StanceCharPolicy::Lenient),
            Err(StanceCardError::NotUtf8)
        );
        assert!(matches!(
            parse_token(&URL_SAFE_NO_PAD.encode("x1.a|x2.d"), StanceCharPolicy::Lenient),
            Err(StanceCardError::WrongSize { actual: 2, .. })
        ));
        assert!(matches!(
            parse_token(
                &URL_SAFE_NO_PAD.encode("x1.a|x2|x3.a|x4.a|x5.d|x6.a"),
                StanceCharPolicy::Lenient
            ),
            Err(StanceCardError::MalformedEntry { index: 1, .. })
        ));
        assert!(matches!(
            parse_token(
                &URL_SAFE_NO_PAD.encode(".a|x2.d|x3.a|x4.a|x5.d|x6.a"),
                StanceCharPolicy::Lenient
            ),
            Err(StanceCardError::MalformedEntry { index: 0, .. })
        ));
    }
}
