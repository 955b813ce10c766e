use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid version: {0:?}")]
    InvalidVersion(String),
    #[error("invalid version requirement: {0:?}")]
    InvalidRequirement(String),
}

/// Dotted numeric version. Missing trailing segments compare as zero.
#[derive(Debug, Clone)]
pub struct Version(Vec<u64>);

impl Version {
    pub fn segments(&self) -> &[u64] {
        &self.0
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        parse_segments(raw)
            .map(Version)
            .ok_or_else(|| VersionError::InvalidVersion(raw.to_string()))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_segments(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Pessimistic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Constraint {
    op: Op,
    version: Version,
}

impl Constraint {
    fn matches(&self, candidate: &Version) -> bool {
        match self.op {
            Op::Eq => candidate == &self.version,
            Op::Ne => candidate != &self.version,
            Op::Gt => candidate > &self.version,
            Op::Ge => candidate >= &self.version,
            Op::Lt => candidate < &self.version,
            Op::Le => candidate <= &self.version,
            Op::Pessimistic => {
                candidate >= &self.version && candidate < &pessimistic_ceiling(&self.version)
            }
        }
    }
}

/// Comma-separated set of constraints, all of which must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    raw: String,
    constraints: Vec<Constraint>,
}

impl Requirement {
    pub fn any() -> Self {
        Self {
            raw: ">= 0".to_string(),
            constraints: Vec::new(),
        }
    }

    pub fn matches(&self, candidate: &Version) -> bool {
        self.constraints.iter().all(|c| c.matches(candidate))
    }
}

impl FromStr for Requirement {
    type Err = VersionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionError::InvalidRequirement(raw.to_string());
        let mut constraints = Vec::new();

        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(invalid());
            }
            let (op, rest) = split_operator(part);
            let version = rest.trim().parse::<Version>().map_err(|_| invalid())?;
            constraints.push(Constraint { op, version });
        }

        Ok(Self {
            raw: raw.trim().to_string(),
            constraints,
        })
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_operator(part: &str) -> (Op, &str) {
    // Two-character operators first so ">=" is not read as ">".
    for (token, op) in [
        ("~>", Op::Pessimistic),
        (">=", Op::Ge),
        ("<=", Op::Le),
        ("!=", Op::Ne),
        (">", Op::Gt),
        ("<", Op::Lt),
        ("=", Op::Eq),
    ] {
        if let Some(rest) = part.strip_prefix(token) {
            return (op, rest);
        }
    }
    (Op::Eq, part)
}

fn pessimistic_ceiling(floor: &Version) -> Version {
    let mut segments = floor.0.clone();
    if segments.len() > 1 {
        segments.pop();
    }
    if let Some(last) = segments.last_mut() {
        *last += 1;
    }
    Version(segments)
}

fn parse_segments(version: &str) -> Option<Vec<u64>> {
    let mut parts = Vec::new();
    for part in version.trim().split('.') {
        parts.push(part.trim().parse::<u64>().ok()?);
    }
    Some(parts)
}

fn compare_segments(a: &[u64], b: &[u64]) -> Ordering {
    let max_len = a.len().max(b.len());
    for i in 0..max_len {
        let left = *a.get(i).unwrap_or(&0);
        let right = *b.get(i).unwrap_or(&0);
        match left.cmp(&right) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::{Requirement, Version, VersionError};

    fn v(raw: &str) -> Version {
        raw.parse().unwrap()
    }

    fn req(raw: &str) -> Requirement {
        raw.parse().unwrap()
    }

    #[test]
    fn compares_versions_with_padding() {
        assert!(v("10.0.1") > v("10.0"));
        assert_eq!(v("10"), v("10.0.0"));
    }

    #[test]
    fn rejects_non_numeric_versions() {
        assert_eq!(
            "10.x".parse::<Version>(),
            Err(VersionError::InvalidVersion("10.x".to_string()))
        );
    }

    #[test]
    fn range_requirements() {
        let range = req(">= 1.2, < 2.0");
        assert!(range.matches(&v("1.2")));
        assert!(range.matches(&v("1.9.9")));
        assert!(!range.matches(&v("2.0")));
        assert!(!range.matches(&v("1.1")));
    }

    #[test]
    fn bare_version_means_equality() {
        assert!(req("1.4").matches(&v("1.4.0")));
        assert!(!req("1.4").matches(&v("1.4.1")));
        assert!(req("!= 1.4").matches(&v("1.4.1")));
    }

    #[test]
    fn pessimistic_requirement_bumps_second_to_last_segment() {
        let minor = req("~> 2.3");
        assert!(minor.matches(&v("2.9")));
        assert!(!minor.matches(&v("3.0")));

        let patch = req("~> 2.3.1");
        assert!(patch.matches(&v("2.3.7")));
        assert!(!patch.matches(&v("2.4.0")));

        let major = req("~> 2");
        assert!(major.matches(&v("2.8")));
        assert!(!major.matches(&v("3")));
    }

    #[test]
    fn rejects_malformed_requirements() {
        assert!(">= 1.0,".parse::<Requirement>().is_err());
        assert!(">= one".parse::<Requirement>().is_err());
    }

    #[test]
    fn any_matches_everything() {
        assert!(Requirement::any().matches(&v("0.0.1")));
    }
}
