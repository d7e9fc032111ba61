//! Canonical three-component version numbers.
//!
//! Hosts report versions in many shapes (`"17"`, `"17.4"`, `"2.1.0"`). The
//! flag service compares versions as `major.minor.patch`, so every version
//! attribute goes through [`normalize`] before it is sent.
//!
//! Grammar (whole string, ASCII only):
//!
//! ```text
//! version   = component [ "." component [ "." component ] ]
//! component = "0" | nonzero *digit
//! ```
//!
//! Anything else, including a fourth component, is rejected. Components may
//! be arbitrarily long: [`normalize`] echoes the digits back unchanged, while
//! parsing into a [`Version`] additionally requires each one to fit a `u64`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Maximum number of dot-separated components accepted.
const MAX_COMPONENTS: usize = 3;

/// Reasons a version string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("version string is empty")]
    Empty,

    #[error("version has more than {MAX_COMPONENTS} components")]
    TooManyComponents,

    #[error("version component {index} is empty")]
    EmptyComponent { index: usize },

    #[error("version component {index} is not a number: {component:?}")]
    NotNumeric { index: usize, component: String },

    #[error("version component {index} has a leading zero: {component:?}")]
    LeadingZero { index: usize, component: String },

    #[error("version component {index} is out of range: {component:?}")]
    OutOfRange { index: usize, component: String },
}

/// A parsed `major.minor.patch` version. Missing trailing components are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [major, minor, patch] = components(s)?;
        Ok(Version::new(
            to_number(0, major)?,
            to_number(1, minor)?,
            to_number(2, patch)?,
        ))
    }
}

/// Split `s` into exactly three validated components, padding with `"0"`.
fn components(s: &str) -> Result<[&str; MAX_COMPONENTS], VersionError> {
    if s.is_empty() {
        return Err(VersionError::Empty);
    }

    let mut parts = ["0"; MAX_COMPONENTS];
    for (index, component) in s.split('.').enumerate() {
        let slot = parts
            .get_mut(index)
            .ok_or(VersionError::TooManyComponents)?;
        check_component(index, component)?;
        *slot = component;
    }
    Ok(parts)
}

fn check_component(index: usize, component: &str) -> Result<(), VersionError> {
    if component.is_empty() {
        return Err(VersionError::EmptyComponent { index });
    }
    if !component.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VersionError::NotNumeric {
            index,
            component: component.to_string(),
        });
    }
    if component.len() > 1 && component.starts_with('0') {
        return Err(VersionError::LeadingZero {
            index,
            component: component.to_string(),
        });
    }
    Ok(())
}

fn to_number(index: usize, component: &str) -> Result<u64, VersionError> {
    component.parse().map_err(|_| VersionError::OutOfRange {
        index,
        component: component.to_string(),
    })
}

/// Convert a one- to three-component version into `major.minor.patch`.
///
/// Returns `None` when the input does not match the grammar; callers fall back
/// to the raw string in that case.
pub fn normalize(version: &str) -> Option<String> {
    components(version)
        .ok()
        .map(|[major, minor, patch]| format!("{major}.{minor}.{patch}"))
}
