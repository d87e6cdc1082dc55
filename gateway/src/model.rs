// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Data model shared by the upstream client, the extractors, and the index generators.

use chrono::{DateTime, Utc};

/// An upstream release, as reported by a [crate::upstream::ReleaseFeed].
#[derive(Clone, Debug)]
pub struct Release {
    pub id: u64,
    pub tag: String,
    pub published_at: DateTime<Utc>,
    pub prerelease: bool,
    pub assets: Vec<Asset>,
}

/// A binary artifact attached to a [Release].
#[derive(Clone, Debug)]
pub struct Asset {
    pub name: String,
    pub size: u64,
    pub download_url: String,
    /// `sha256:HEX`, when the upstream supplies one. GitHub never does.
    pub digest: Option<String>,
}

impl Asset {
    /// The lowercase hex SHA-256 digest, if [Self::digest] is a well-formed `sha256:` value.
    pub fn sha256_hex(&self) -> Option<&str> {
        self.digest.as_deref()?.strip_prefix("sha256:")
    }
}

/// The stable/prerelease partition. Every cache key and synthesized index belongs to one.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Variant {
    Stable,
    Prerelease,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Prerelease => "prerelease",
        }
    }

    /// Releases admitted under this variant: prereleases are excluded from `stable`, and only
    /// prereleases are admitted under `prerelease`.
    pub fn admits(&self, release: &Release) -> bool {
        match self {
            Self::Stable => !release.prerelease,
            Self::Prerelease => release.prerelease,
        }
    }
}

/// Deterministic invalidation token derived from the set of release ids admitted under a variant.
///
/// Numerically sorted, comma-joined. Never mutated -- a mismatch against a previously cached
/// fingerprint means "regenerate".
pub fn release_set_fingerprint(releases: &[Release]) -> String {
    let mut ids: Vec<u64> = releases.iter().map(|r| r.id).collect();
    ids.sort_unstable();
    ids.into_iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// The fields decoded from a `.deb` control file.
#[derive(Clone, Debug, Default)]
pub struct DebianControl {
    pub package: String,
    pub version: String,
    pub architecture: String,
    pub maintainer: Option<String>,
    pub installed_size: u64,
    pub depends: Option<String>,
    pub recommends: Option<String>,
    pub suggests: Option<String>,
    pub conflicts: Option<String>,
    pub replaces: Option<String>,
    pub provides: Option<String>,
    pub section: Option<String>,
    pub priority: String,
    pub homepage: Option<String>,
    pub description: Option<String>,
}

impl DebianControl {
    pub fn new() -> Self {
        Self {
            architecture: "all".to_string(),
            priority: "optional".to_string(),
            ..Default::default()
        }
    }
}

/// A decoded `.deb` asset, ready to be filed into a `Packages` record.
#[derive(Clone, Debug)]
pub struct DebPackageEntry {
    pub control: DebianControl,
    pub pool_path: String,
    pub size: u64,
    pub sha256: String,
}

impl DebPackageEntry {
    /// `pool/{component}/{first-letter-of-package}/{package}/{assetName}`.
    pub fn pool_path(component: &str, package: &str, asset_name: &str) -> String {
        let first_letter = package
            .chars()
            .next()
            .map(|c| c.to_ascii_lowercase().to_string())
            .unwrap_or_else(|| "_".to_string());
        format!("pool/{component}/{first_letter}/{package}/{asset_name}")
    }
}

/// One changelog entry from an RPM header.
#[derive(Clone, Debug)]
pub struct ChangelogEntry {
    pub time: i64,
    pub author: String,
    pub text: String,
}

/// The fields decoded from an RPM header section.
#[derive(Clone, Debug, Default)]
pub struct RpmHeader {
    pub name: String,
    pub version: String,
    pub release: String,
    pub epoch: u64,
    pub summary: String,
    pub description: String,
    pub arch: String,
    pub license: Option<String>,
    pub group: Option<String>,
    pub url: Option<String>,
    pub vendor: Option<String>,
    pub packager: Option<String>,
    pub build_time: i64,
    pub source_rpm: Option<String>,
    pub requires: Vec<String>,
    pub provides: Vec<String>,
    pub conflicts: Vec<String>,
    pub obsoletes: Vec<String>,
    pub files: Vec<String>,
    pub changelog: Vec<ChangelogEntry>,
}

/// A decoded `.rpm` asset, ready to be filed into `primary.xml`/`filelists.xml`/`other.xml`.
#[derive(Clone, Debug)]
pub struct RpmPackageEntry {
    pub header: RpmHeader,
    pub filename: String,
    pub size: u64,
    pub checksum: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(id: u64, prerelease: bool) -> Release {
        Release {
            id,
            tag: format!("v{id}"),
            published_at: Utc::now(),
            prerelease,
            assets: vec![],
        }
    }

    #[test]
    fn fingerprint_is_sorted_and_comma_joined() {
        let releases = vec![release(5, false), release(1, false), release(3, false)];
        assert_eq!(release_set_fingerprint(&releases), "1,3,5");
    }

    #[test]
    fn fingerprint_empty_releases_is_empty_string() {
        assert_eq!(release_set_fingerprint(&[]), "");
    }

    #[test]
    fn variant_admits_by_prerelease_flag() {
        let stable = release(1, false);
        let pre = release(2, true);

        assert!(Variant::Stable.admits(&stable));
        assert!(!Variant::Stable.admits(&pre));
        assert!(Variant::Prerelease.admits(&pre));
        assert!(!Variant::Prerelease.admits(&stable));
    }

    #[test]
    fn pool_path_uses_lowercased_first_letter() {
        assert_eq!(
            DebPackageEntry::pool_path("main", "App", "app_1.0.0_amd64.deb"),
            "pool/main/a/App/app_1.0.0_amd64.deb"
        );
    }

    #[test]
    fn asset_sha256_hex_strips_prefix() {
        let asset = Asset {
            name: "x".to_string(),
            size: 1,
            download_url: "https://example.com/x".to_string(),
            digest: Some("sha256:deadbeef".to_string()),
        };
        assert_eq!(asset.sha256_hex(), Some("deadbeef"));

        let no_digest = Asset {
            digest: None,
            ..asset.clone()
        };
        assert_eq!(no_digest.sha256_hex(), None);
    }
}
