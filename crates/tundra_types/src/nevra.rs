//! Full package identities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::evr::{Evr, ParseEvrError};

/// The canonical `name-[epoch:]version-release.arch` identity of a package.
///
/// This is the only key used for cross-session references (history rows,
/// plan listings); solver-internal ids never leave a resolver session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Nevra {
    /// Package name.
    pub name: String,
    /// Epoch, version and release.
    pub evr: Evr,
    /// Architecture, e.g. `x86_64` or `noarch`.
    pub arch: String,
}

/// Error returned when parsing a [`Nevra`] from its textual form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseNevraError {
    /// No `.arch` suffix was present.
    #[error("missing architecture in {0:?}")]
    MissingArch(String),
    /// No `-release` component was present.
    #[error("missing release in {0:?}")]
    MissingRelease(String),
    /// The embedded EVR failed to parse.
    #[error("invalid version in {0:?}: {1}")]
    InvalidEvr(String, #[source] ParseEvrError),
}

impl Nevra {
    /// Construct from parts.
    pub fn new(name: impl Into<String>, evr: Evr, arch: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            evr,
            arch: arch.into(),
        }
    }

    /// Parse a `name-[epoch:]version-release.arch` string.
    ///
    /// Both name and version may contain dashes; the split walks from the
    /// right so the last two dash-separated fields become version and
    /// release.
    pub fn parse(s: &str) -> Result<Self, ParseNevraError> {
        let (rest, arch) = s
            .rsplit_once('.')
            .ok_or_else(|| ParseNevraError::MissingArch(s.to_string()))?;
        let (rest, release) = rest
            .rsplit_once('-')
            .ok_or_else(|| ParseNevraError::MissingRelease(s.to_string()))?;
        let (name, ev) = rest
            .rsplit_once('-')
            .ok_or_else(|| ParseNevraError::MissingRelease(s.to_string()))?;
        let evr = Evr::parse(&format!("{ev}-{release}"))
            .map_err(|e| ParseNevraError::InvalidEvr(s.to_string(), e))?;
        Ok(Self {
            name: name.to_string(),
            evr,
            arch: arch.to_string(),
        })
    }

    /// `name.arch` form used in a few user-facing listings.
    pub fn name_arch(&self) -> String {
        format!("{}.{}", self.name, self.arch)
    }
}

impl FromStr for Nevra {
    type Err = ParseNevraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Nevra::parse(s)
    }
}

impl fmt::Display for Nevra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}.{}", self.name, self.evr, self.arch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("foo-1.0-1.x86_64", "foo", 0, "1.0", "1", "x86_64")]
    #[case("tdnf-cli-libs-2:3.5.8-1.ph5.noarch", "tdnf-cli-libs", 2, "3.5.8", "1.ph5", "noarch")]
    #[case("gcc-c++-11.2.0-4.fc35.aarch64", "gcc-c++", 0, "11.2.0", "4.fc35", "aarch64")]
    fn parse(
        #[case] input: &str,
        #[case] name: &str,
        #[case] epoch: u64,
        #[case] version: &str,
        #[case] release: &str,
        #[case] arch: &str,
    ) {
        let nevra = Nevra::parse(input).unwrap();
        assert_eq!(nevra.name, name);
        assert_eq!(nevra.evr, Evr::new(epoch, version, release));
        assert_eq!(nevra.arch, arch);
    }

    #[test]
    fn display_round_trip() {
        for s in ["foo-1.0-1.x86_64", "bar-2:0.1-3.fc35.noarch"] {
            assert_eq!(Nevra::parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn rejects_malformed() {
        assert!(matches!(
            Nevra::parse("foo"),
            Err(ParseNevraError::MissingArch(_))
        ));
        assert!(matches!(
            Nevra::parse("foo.x86_64"),
            Err(ParseNevraError::MissingRelease(_))
        ));
    }
}
