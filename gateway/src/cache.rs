// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The freshness-aware cache: a content store keyed by synthetic URL and a short-lived
//! fingerprint store used to decide whether the content needs regenerating.
//!
//! `moka::future::Cache` is the idiomatic async, TTL-aware, thread-safe cache for this kind
//! of service.

use std::time::{Duration, Instant};

use moka::future::Cache;

use crate::model::Variant;

/// Fixed TTL for `release-ids-hash/...` fingerprint entries: short enough that the gateway
/// notices new upstream releases within a handful of minutes even under steady traffic.
pub const FINGERPRINT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default TTL for generated content, overridden by `CACHE_TTL`.
pub const DEFAULT_CONTENT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// One cached body: bytes, the `Content-Type` to serve it with, and when it was stored.
///
/// `stored_at` lets a response compute its `max-age` from how long the entry has actually lived
/// rather than re-advertising the full TTL on every hit, so the header shrinks correctly as the
/// entry ages.
#[derive(Clone)]
pub struct CacheEntry {
    pub body: Vec<u8>,
    pub content_type: &'static str,
    stored_at: Instant,
}

impl CacheEntry {
    pub fn new(body: Vec<u8>, content_type: &'static str) -> Self {
        Self {
            body,
            content_type,
            stored_at: Instant::now(),
        }
    }

    /// `Cache-Control: public, max-age=N`, `N` reduced by how long this entry has already lived
    /// against `ttl`. Never goes negative; a fully aged-out entry (which should have already
    /// been evicted by `moka`) reports `max-age=0`.
    pub fn cache_control(&self, ttl: Duration) -> String {
        let remaining = ttl.saturating_sub(self.stored_at.elapsed());
        format!("public, max-age={}", remaining.as_secs())
    }
}

/// The two-tier cache: heavy generated artifacts on one TTL, release-set fingerprints on another,
/// much shorter one.
#[derive(Clone)]
pub struct GatewayCache {
    content: Cache<String, CacheEntry>,
    fingerprints: Cache<String, String>,
    content_ttl: Duration,
}

impl GatewayCache {
    pub fn new(content_ttl: Duration) -> Self {
        Self {
            content: Cache::builder().time_to_live(content_ttl).build(),
            fingerprints: Cache::builder().time_to_live(FINGERPRINT_TTL).build(),
            content_ttl,
        }
    }

    pub fn content_ttl(&self) -> Duration {
        self.content_ttl
    }

    pub async fn get_content(&self, key: &str) -> Option<CacheEntry> {
        self.content.get(key).await
    }

    pub async fn put_content(&self, key: String, entry: CacheEntry) {
        self.content.insert(key, entry).await;
    }

    pub async fn get_fingerprint(&self, key: &str) -> Option<String> {
        self.fingerprints.get(key).await
    }

    /// Written last in any refresh: by the time a consumer observes a new fingerprint, every
    /// artifact it names has already been written.
    pub async fn put_fingerprint(&self, key: String, fingerprint: String) {
        self.fingerprints.insert(key, fingerprint).await;
    }

    /// True iff no fingerprint is cached under `fingerprint_key`, or the cached value differs
    /// from `current`.
    pub async fn needs_refresh(&self, fingerprint_key: &str, current: &str) -> bool {
        match self.get_fingerprint(fingerprint_key).await {
            Some(cached) => cached != current,
            None => true,
        }
    }

    /// Drop every key namespaced under `{owner}/{repo}`, both variants, all known arches/formats.
    /// Invoked by `?cache=false`.
    pub async fn clear_all(&self, owner: &str, repo: &str, known_arches: &[&str]) {
        for variant in [Variant::Stable, Variant::Prerelease] {
            let v = variant.as_str();

            self.fingerprints
                .invalidate(&keys::release_ids_hash(v, owner, repo))
                .await;
            self.content.invalidate(&keys::release(v, owner, repo)).await;
            self.content.invalidate(&keys::inrelease(v, owner, repo)).await;
            self.content.invalidate(&keys::release_gpg(v, owner, repo)).await;

            for part in ["primary", "filelists", "other", "repomd", "repomd-asc", "timestamp"] {
                self.content
                    .invalidate(&keys::rpm(part, v, owner, repo))
                    .await;
            }

            for arch in known_arches {
                self.content
                    .invalidate(&keys::packages(v, owner, repo, arch))
                    .await;
            }
        }
    }
}

/// Synthetic cache-key construction, namespaced under `https://internal/...` per the key scheme.
pub mod keys {
    pub fn packages(variant: &str, owner: &str, repo: &str, arch: &str) -> String {
        format!("https://internal/packages/{variant}/{owner}/{repo}/{arch}")
    }

    pub fn release(variant: &str, owner: &str, repo: &str) -> String {
        format!("https://internal/release/{variant}/{owner}/{repo}")
    }

    pub fn inrelease(variant: &str, owner: &str, repo: &str) -> String {
        format!("https://internal/inrelease/{variant}/{owner}/{repo}")
    }

    pub fn release_gpg(variant: &str, owner: &str, repo: &str) -> String {
        format!("https://internal/release-gpg/{variant}/{owner}/{repo}")
    }

    pub fn release_ids_hash(variant: &str, owner: &str, repo: &str) -> String {
        format!("https://internal/release-ids-hash/{variant}/{owner}/{repo}")
    }

    /// `part` is one of `primary`, `filelists`, `other`, `repomd`, `repomd-asc`, `timestamp`.
    pub fn rpm(part: &str, variant: &str, owner: &str, repo: &str) -> String {
        format!("https://internal/rpm/{part}/{variant}/{owner}/{repo}")
    }

    pub fn asset_url(variant: &str, owner: &str, repo: &str, fingerprint: &str, filename: &str) -> String {
        format!("https://internal/asset-url/{variant}/{owner}/{repo}/{fingerprint}/{filename}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn needs_refresh_true_when_absent() {
        let cache = GatewayCache::new(DEFAULT_CONTENT_TTL);
        assert!(cache.needs_refresh("k", "abc").await);
    }

    #[tokio::test]
    async fn needs_refresh_true_when_mismatched_false_when_matched() {
        let cache = GatewayCache::new(DEFAULT_CONTENT_TTL);
        cache.put_fingerprint("k".to_string(), "abc".to_string()).await;

        assert!(cache.needs_refresh("k", "def").await);
        assert!(!cache.needs_refresh("k", "abc").await);
    }

    #[tokio::test]
    async fn content_round_trips() {
        let cache = GatewayCache::new(DEFAULT_CONTENT_TTL);
        let entry = CacheEntry::new(b"hello".to_vec(), "text/plain");
        cache.put_content("k".to_string(), entry).await;

        let fetched = cache.get_content("k").await.unwrap();
        assert_eq!(fetched.body, b"hello");
        assert_eq!(fetched.content_type, "text/plain");
    }

    #[tokio::test]
    async fn clear_all_removes_fingerprint_and_content_keys() {
        let cache = GatewayCache::new(DEFAULT_CONTENT_TTL);
        let fp_key = keys::release_ids_hash("stable", "o", "r");
        let pkg_key = keys::packages("stable", "o", "r", "amd64");

        cache.put_fingerprint(fp_key.clone(), "1,2,3".to_string()).await;
        cache
            .put_content(pkg_key.clone(), CacheEntry::new(b"x".to_vec(), "text/plain"))
            .await;

        cache.clear_all("o", "r", &["amd64"]).await;

        assert!(cache.get_fingerprint(&fp_key).await.is_none());
        assert!(cache.get_content(&pkg_key).await.is_none());
    }

    #[test]
    fn cache_control_reports_remaining_ttl_not_full_ttl() {
        let entry = CacheEntry {
            body: vec![],
            content_type: "text/plain",
            stored_at: Instant::now() - Duration::from_secs(10),
        };
        let header = entry.cache_control(Duration::from_secs(100));
        assert_eq!(header, "public, max-age=90");
    }

    #[test]
    fn cache_control_never_negative() {
        let entry = CacheEntry {
            body: vec![],
            content_type: "text/plain",
            stored_at: Instant::now() - Duration::from_secs(200),
        };
        let header = entry.cache_control(Duration::from_secs(100));
        assert_eq!(header, "public, max-age=0");
    }
}
