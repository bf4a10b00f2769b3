// Version identifiers as Python packages declare them in `__version__`.
//
// Only the subset of PEP 440 that matters for "is this at least X" is understood:
// an optional epoch, the release numbers, one pre-release tag, a post and a dev release.
// Local labels (`+cu118` and the like) are accepted but ignored for ordering.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("'{0}' is not a valid version identifier")]
pub struct InvalidVersion(pub String);

/// The stage of a pre-release, ordered alpha < beta < release candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PreRelease {
    Alpha(u64),
    Beta(u64),
    Candidate(u64),
}

/// Equality follows the ordering, so `1.0 == 1.0.0` and `1.0-1 == 1.0.post1`.
#[derive(Debug, Clone)]
pub struct PythonVersion {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<PreRelease>,
    post: Option<u64>,
    dev: Option<u64>,
    raw: String,
}

impl PythonVersion {
    pub fn parse(input: &str) -> Result<Self, InvalidVersion> {
        let invalid = || InvalidVersion(input.to_string());

        let normalized = input.trim().to_ascii_lowercase();
        let normalized = normalized.strip_prefix('v').unwrap_or(&normalized);
        // The local label never takes part in the comparison.
        let public = normalized.split('+').next().unwrap_or_default();
        if public.is_empty() {
            return Err(invalid());
        }

        let (epoch, rest) = match public.split_once('!') {
            Some((epoch, rest)) => (epoch.parse::<u64>().map_err(|_| invalid())?, rest),
            None => (0, public),
        };

        // The release is the leading run of digits and dots.
        let release_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let release_part = rest[..release_end].trim_end_matches('.');
        if release_part.is_empty() {
            return Err(invalid());
        }
        let release = release_part
            .split('.')
            .map(|segment| segment.parse::<u64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut pre = None;
        let mut post = None;
        let mut dev = None;
        let mut suffix = &rest[release_end..];
        while !suffix.is_empty() {
            // "1.0-1" is the implicit spelling of a post release.
            if let Some(digits) = suffix.strip_prefix('-') {
                let number_end = digits
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(digits.len());
                if number_end > 0 && post.is_none() && dev.is_none() {
                    post = Some(digits[..number_end].parse::<u64>().map_err(|_| invalid())?);
                    suffix = &digits[number_end..];
                    continue;
                }
            }
            suffix = suffix.trim_start_matches(['.', '-', '_']);
            let tag_end = suffix
                .find(|c: char| !c.is_ascii_alphabetic())
                .unwrap_or(suffix.len());
            let (tag, after_tag) = suffix.split_at(tag_end);
            let after_tag = after_tag.trim_start_matches(['.', '-', '_']);
            let number_end = after_tag
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after_tag.len());
            let (number, remaining) = after_tag.split_at(number_end);
            // An implicit number means zero, as in "1.0rc" or "2.1.dev".
            let number = if number.is_empty() {
                0
            } else {
                number.parse::<u64>().map_err(|_| invalid())?
            };

            match tag {
                "a" | "alpha" if pre.is_none() && post.is_none() && dev.is_none() => {
                    pre = Some(PreRelease::Alpha(number))
                }
                "b" | "beta" if pre.is_none() && post.is_none() && dev.is_none() => {
                    pre = Some(PreRelease::Beta(number))
                }
                "rc" | "c" | "pre" | "preview" if pre.is_none() && post.is_none() && dev.is_none() => {
                    pre = Some(PreRelease::Candidate(number))
                }
                "post" | "rev" | "r" if post.is_none() && dev.is_none() => post = Some(number),
                "dev" if dev.is_none() => dev = Some(number),
                _ => return Err(invalid()),
            }
            suffix = remaining;
        }

        Ok(PythonVersion {
            epoch,
            release,
            pre,
            post,
            dev,
            raw: input.trim().to_string(),
        })
    }

    /// The release numbers without trailing zeros, so that 1.0 == 1.0.0.
    fn significant_release(&self) -> &[u64] {
        let significant = self
            .release
            .iter()
            .rposition(|&segment| segment != 0)
            .map_or(0, |last| last + 1);
        &self.release[..significant]
    }

    // A dev release of a final version ("1.0.dev1") sorts before all of its pre-releases.
    fn pre_key(&self) -> (u8, Option<PreRelease>) {
        match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => (0, None),
            (Some(pre), _, _) => (1, Some(pre)),
            (None, _, _) => (2, None),
        }
    }

    // No dev suffix sorts after every dev release of the same version.
    fn dev_key(&self) -> (u8, u64) {
        match self.dev {
            Some(dev) => (0, dev),
            None => (1, 0),
        }
    }
}

impl FromStr for PythonVersion {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PythonVersion::parse(s)
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Ord for PythonVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| self.significant_release().cmp(other.significant_release()))
            .then_with(|| self.pre_key().cmp(&other.pre_key()))
            .then_with(|| self.post.cmp(&other.post))
            .then_with(|| self.dev_key().cmp(&other.dev_key()))
    }
}

impl PartialEq for PythonVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PythonVersion {}

impl PartialOrd for PythonVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
