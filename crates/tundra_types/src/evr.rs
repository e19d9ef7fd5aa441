//! Epoch/version/release triples and the rpm version comparison algorithm.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An epoch-version-release triple.
///
/// Ordering follows rpm semantics: epochs compare numerically, then the
/// version and release strings compare with [`rpmvercmp`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Evr {
    /// The epoch. An absent epoch in the textual form means `0`.
    pub epoch: u64,
    /// The upstream version.
    pub version: String,
    /// The distribution release.
    pub release: String,
}

/// Error returned when parsing an [`Evr`] from its textual form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseEvrError {
    /// The string was empty.
    #[error("empty version string")]
    Empty,
    /// The text before the `:` was not a number.
    #[error("invalid epoch in {0:?}")]
    InvalidEpoch(String),
}

impl Evr {
    /// Construct an EVR from parts.
    pub fn new(epoch: u64, version: impl Into<String>, release: impl Into<String>) -> Self {
        Self {
            epoch,
            version: version.into(),
            release: release.into(),
        }
    }

    /// Parse an `[epoch:]version[-release]` string.
    ///
    /// The release defaults to the empty string when absent, which compares
    /// equal to any other empty release.
    pub fn parse(s: &str) -> Result<Self, ParseEvrError> {
        if s.is_empty() {
            return Err(ParseEvrError::Empty);
        }
        let (epoch, rest) = match s.split_once(':') {
            Some((e, rest)) => {
                let epoch = e
                    .parse::<u64>()
                    .map_err(|_| ParseEvrError::InvalidEpoch(s.to_string()))?;
                (epoch, rest)
            }
            None => (0, s),
        };
        let (version, release) = match rest.rsplit_once('-') {
            Some((v, r)) => (v.to_string(), r.to_string()),
            None => (rest.to_string(), String::new()),
        };
        Ok(Self {
            epoch,
            version,
            release,
        })
    }
}

impl FromStr for Evr {
    type Err = ParseEvrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Evr::parse(s)
    }
}

impl fmt::Display for Evr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}:", self.epoch)?;
        }
        f.write_str(&self.version)?;
        if !self.release.is_empty() {
            write!(f, "-{}", self.release)?;
        }
        Ok(())
    }
}

impl Ord for Evr {
    // rpm ordering compares distinct spellings as equal ("1.05" and
    // "1.5"); never use Evr as an ordered-map key.
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| rpmvercmp(&self.version, &other.version))
            .then_with(|| rpmvercmp(&self.release, &other.release))
    }
}

impl PartialOrd for Evr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two version fragments with rpm's segment-wise algorithm.
///
/// Strings are walked as alternating numeric and alphabetic segments,
/// separators are ignored beyond acting as segment boundaries. `~` sorts
/// before anything including the end of the string, `^` sorts after the
/// end of the string but before any other suffix.
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0, 0);

    loop {
        // Skip separators. Tilde and caret are significant, everything
        // else that is not alphanumeric only delimits segments.
        while i < a.len() && !a[i].is_ascii_alphanumeric() && a[i] != b'~' && a[i] != b'^' {
            i += 1;
        }
        while j < b.len() && !b[j].is_ascii_alphanumeric() && b[j] != b'~' && b[j] != b'^' {
            j += 1;
        }

        let a_tilde = i < a.len() && a[i] == b'~';
        let b_tilde = j < b.len() && b[j] == b'~';
        if a_tilde || b_tilde {
            if !b_tilde {
                return Ordering::Less;
            }
            if !a_tilde {
                return Ordering::Greater;
            }
            i += 1;
            j += 1;
            continue;
        }

        let a_caret = i < a.len() && a[i] == b'^';
        let b_caret = j < b.len() && b[j] == b'^';
        if a_caret || b_caret {
            if a_caret && b_caret {
                i += 1;
                j += 1;
                continue;
            }
            // A caret is newer than end-of-string but older than any
            // remaining ordinary segment.
            return if a_caret {
                if j == b.len() {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            } else if i == a.len() {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }

        if i == a.len() || j == b.len() {
            break;
        }

        let (seg_a, numeric_a) = take_segment(a, &mut i);
        let (seg_b, numeric_b) = take_segment_matching(b, &mut j, numeric_a);

        if seg_b.is_empty() {
            // Mismatched segment types: the numeric segment wins.
            return if numeric_a {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ord = if numeric_a && numeric_b {
            let seg_a = trim_leading_zeros(seg_a);
            let seg_b = trim_leading_zeros(seg_b);
            seg_a.len().cmp(&seg_b.len()).then_with(|| seg_a.cmp(seg_b))
        } else {
            seg_a.cmp(seg_b)
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    // One side ran out of segments; the longer string is newer.
    match (i == a.len(), j == b.len()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => unreachable!("loop exits only when a side is exhausted"),
    }
}

fn take_segment<'a>(s: &'a [u8], pos: &mut usize) -> (&'a [u8], bool) {
    let start = *pos;
    let numeric = s[start].is_ascii_digit();
    while *pos < s.len()
        && (if numeric {
            s[*pos].is_ascii_digit()
        } else {
            s[*pos].is_ascii_alphabetic()
        })
    {
        *pos += 1;
    }
    (&s[start..*pos], numeric)
}

/// Take a segment of the requested kind; returns an empty slice when the
/// next segment is of the other kind.
fn take_segment_matching<'a>(s: &'a [u8], pos: &mut usize, numeric: bool) -> (&'a [u8], bool) {
    let start = *pos;
    while *pos < s.len()
        && (if numeric {
            s[*pos].is_ascii_digit()
        } else {
            s[*pos].is_ascii_alphabetic()
        })
    {
        *pos += 1;
    }
    (&s[start..*pos], numeric)
}

fn trim_leading_zeros(s: &[u8]) -> &[u8] {
    match s.iter().position(|&c| c != b'0') {
        Some(off) => &s[off..],
        // All-zero segments compare equal regardless of width.
        None => &s[..0],
    }
}
