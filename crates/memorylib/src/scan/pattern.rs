use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Mask character for a byte that must match
pub const MASK_REQUIRED: char = 'x';
/// Mask character for a byte that is ignored
pub const MASK_WILDCARD: char = '?';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,

    #[error("mask length {mask} does not match pattern length {pattern}")]
    LengthMismatch { pattern: usize, mask: usize },

    #[error("invalid mask character '{character}' at position {position}")]
    InvalidMask { character: char, position: usize },

    #[error("invalid pattern token '{0}'")]
    InvalidToken(String),
}

/// Byte signature where `None` positions match any byte
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    bytes: Vec<Option<u8>>,
}

impl Pattern {
    /// Build from raw bytes and a parallel `x`/`?` mask
    pub fn new(bytes: &[u8], mask: &str) -> Result<Self, PatternError> {
        let mask_len = mask.chars().count();
        if mask_len != bytes.len() {
            return Err(PatternError::LengthMismatch {
                pattern: bytes.len(),
                mask: mask_len,
            });
        }

        let bytes = bytes
            .iter()
            .zip(mask.chars())
            .enumerate()
            .map(|(position, (&byte, character))| match character {
                MASK_REQUIRED => Ok(Some(byte)),
                MASK_WILDCARD => Ok(None),
                _ => Err(PatternError::InvalidMask {
                    character,
                    position,
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_options(bytes)
    }

    /// Every byte must match
    pub fn exact(bytes: &[u8]) -> Result<Self, PatternError> {
        Self::from_options(bytes.iter().copied().map(Some).collect())
    }

    /// Parse space-separated hex tokens, `?` or `??` for wildcards
    /// (e.g. `"48 8B 05 ?? ?? ?? ??"`)
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let bytes = pattern
            .split_whitespace()
            .map(|token| {
                if token == "??" || token == "?" {
                    return Ok(None);
                }
                u8::from_str_radix(token, 16)
                    .map(Some)
                    .map_err(|_| PatternError::InvalidToken(token.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_options(bytes)
    }

    pub fn from_options(bytes: Vec<Option<u8>>) -> Result<Self, PatternError> {
        if bytes.is_empty() {
            return Err(PatternError::Empty);
        }
        Ok(Self { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false; empty patterns are rejected at construction
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[Option<u8>] {
        &self.bytes
    }

    /// The `x`/`?` mask string
    pub fn mask(&self) -> String {
        self.bytes
            .iter()
            .map(|b| match b {
                Some(_) => MASK_REQUIRED,
                None => MASK_WILDCARD,
            })
            .collect()
    }

    /// Bytes needed to hold every required byte: one past the last `x`,
    /// 0 for an all-wildcard pattern
    pub fn required_len(&self) -> usize {
        self.bytes
            .iter()
            .rposition(Option::is_some)
            .map_or(0, |index| index + 1)
    }

    /// Whether `haystack` starts with this pattern.
    ///
    /// Trailing wildcards may run past the end of `haystack`.
    pub fn matches_at(&self, haystack: &[u8]) -> bool {
        haystack.len() >= self.required_len()
            && self
                .bytes
                .iter()
                .zip(haystack)
                .all(|(expected, actual)| expected.is_none_or(|b| b == *actual))
    }

    /// First required byte and its index, used to jump between candidates
    pub(crate) fn anchor(&self) -> Option<(usize, u8)> {
        self.bytes
            .iter()
            .enumerate()
            .find_map(|(index, b)| b.map(|b| (index, b)))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .bytes
            .iter()
            .map(|b| match b {
                Some(value) => format!("{:02X}", value),
                None => "??".to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        f.write_str(&text)
    }
}

impl FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_with_mask() {
        let pattern = Pattern::new(&[0x90, 0xFF, 0x11], "x?x").unwrap();
        assert_eq!(pattern.as_slice(), &[Some(0x90), None, Some(0x11)]);
        assert_eq!(pattern.mask(), "x?x");
        assert_eq!(pattern.len(), 3);
    }

    #[test]
    fn test_length_mismatch() {
        assert_eq!(
            Pattern::new(&[0x11, 0x22], "x"),
            Err(PatternError::LengthMismatch {
                pattern: 2,
                mask: 1
            })
        );
        assert!(Pattern::new(&[0x11], "xx").is_err());
    }

    #[test]
    fn test_mask_alphabet_is_strict() {
        assert_eq!(
            Pattern::new(&[0x11, 0x22], "xX"),
            Err(PatternError::InvalidMask {
                character: 'X',
                position: 1
            })
        );
        assert!(Pattern::new(&[0x11], " ").is_err());
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert_eq!(Pattern::new(&[], ""), Err(PatternError::Empty));
        assert_eq!(Pattern::exact(&[]), Err(PatternError::Empty));
        assert_eq!(Pattern::parse("   "), Err(PatternError::Empty));
    }

    #[test]
    fn test_parse_pattern_with_wildcards() {
        let pattern = Pattern::parse("48 8D 0D ?? ? ?? ??").unwrap();
        assert_eq!(pattern.len(), 7);
        assert_eq!(pattern.as_slice()[0], Some(0x48));
        assert_eq!(pattern.as_slice()[2], Some(0x0D));
        assert_eq!(pattern.as_slice()[4], None);
        assert_eq!(pattern.mask(), "xxx????");

        assert_eq!(
            Pattern::parse("48 GG"),
            Err(PatternError::InvalidToken("GG".to_string()))
        );
    }

    #[test]
    fn test_display_roundtrip() {
        let pattern: Pattern = "48 8d 0d ?? ff".parse().unwrap();
        let formatted = pattern.to_string();
        assert_eq!(formatted, "48 8D 0D ?? FF");
        assert_eq!(Pattern::parse(&formatted).unwrap(), pattern);
    }

    #[test]
    fn test_matches_at() {
        let pattern = Pattern::new(&[0x90, 0x00], "x?").unwrap();
        assert!(pattern.matches_at(&[0x90, 0xAB, 0xCD]));
        assert!(!pattern.matches_at(&[0x91, 0xAB]));
        assert!(pattern.matches_at(&[0x90]));
        assert!(!pattern.matches_at(&[]));

        let pattern = Pattern::parse("?? 90").unwrap();
        assert!(!pattern.matches_at(&[0x90]));
        assert!(Pattern::parse("?? ??").unwrap().matches_at(&[]));
    }

    #[test]
    fn test_required_len_ignores_trailing_wildcards() {
        assert_eq!(Pattern::parse("90 ?? 11 ?? ??").unwrap().required_len(), 3);
        assert_eq!(Pattern::parse("?? ?? 05").unwrap().required_len(), 3);
        assert_eq!(Pattern::parse("?? ??").unwrap().required_len(), 0);
    }

    #[test]
    fn test_anchor_skips_leading_wildcards() {
        let pattern = Pattern::parse("?? ?? 05 06").unwrap();
        assert_eq!(pattern.anchor(), Some((2, 0x05)));
        let pattern = Pattern::parse("?? ??").unwrap();
        assert_eq!(pattern.anchor(), None);
    }
}
