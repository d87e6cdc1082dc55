// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request orchestration: cache-hit-then-background-refresh on a hit, generate-then-cache on a
//! miss, and the parallel per-asset fan-out that builds an index pass.
//!
//! The concurrent range-fetch/decode fan-out mirrors
//! `debian_packaging::repository::builder::RepositoryBuilder::publish_indices`'s own
//! `futures::stream::iter(...).buffer_unordered(threads)` pipeline for concurrent index
//! expansion, generalized from "write pool artifacts to a `RepositoryWriter`" to "decode enough
//! of each asset to describe it."

use std::sync::Arc;

use chrono::{DateTime, Utc};
use debian_packaging::io::gzip_compress;
use futures::{stream, StreamExt};

use crate::arch;
use crate::cache::{self, CacheEntry, GatewayCache};
use crate::error::{debug, warn, Error, Result};
use crate::extract::{deb as extract_deb, rpm as extract_rpm};
use crate::index::{deb as index_deb, rpm as index_rpm};
use crate::model::{release_set_fingerprint, Asset, DebPackageEntry, Release, RpmPackageEntry, Variant};
use crate::sign::{SigningKey, VerifyingKey};
use crate::upstream::ReleaseFeed;

/// The single distribution name and component this gateway serves. The `Release` file's
/// `Suite`/`Codename` are always `stable` regardless of variant (`/prerelease` is a distinct URL
/// segment, not a distinct dist name), and every package is filed under one component.
pub const DIST: &str = "stable";
pub const COMPONENT: &str = "main";

/// How many assets are range-fetched and decoded at once, within a single index-generation pass.
const ASSET_CONCURRENCY: usize = 8;

#[derive(Clone)]
pub struct Coordinator {
    cache: GatewayCache,
    feed: Arc<dyn ReleaseFeed>,
    http_client: reqwest::Client,
    signing_key: Option<Arc<SigningKey>>,
    verifying_key: Option<Arc<VerifyingKey>>,
    passphrase: Arc<str>,
}

impl Coordinator {
    pub fn new(
        feed: Arc<dyn ReleaseFeed>,
        http_client: reqwest::Client,
        cache: GatewayCache,
        signing_key: Option<SigningKey>,
        verifying_key: Option<VerifyingKey>,
        passphrase: String,
    ) -> Self {
        Self {
            cache,
            feed,
            http_client,
            signing_key: signing_key.map(Arc::new),
            verifying_key: verifying_key.map(Arc::new),
            passphrase: Arc::from(passphrase),
        }
    }

    /// The armored public key to serve at `public.key`, or `None` if no key material at all is
    /// configured. `GPG_PUBLIC_KEY` short-circuits derivation when present.
    pub fn public_key_armored(&self) -> Result<Option<String>> {
        if let Some(vk) = &self.verifying_key {
            return vk.armored().map(Some);
        }
        if let Some(sk) = &self.signing_key {
            let derived = sk.derive_public_key(&self.passphrase)?;
            return derived.armored().map(Some);
        }
        Ok(None)
    }

    pub async fn clear_cache(&self, owner: &str, repo: &str, known_arches: &[&str]) {
        self.cache.clear_all(owner, repo, known_arches).await;
    }

    /// The content TTL this coordinator's cache was configured with, for callers that compute
    /// their own `Cache-Control` headers from a [CacheEntry] outside the cache itself.
    pub fn content_ttl(&self) -> std::time::Duration {
        self.cache.content_ttl()
    }

    // ---- Debian surface -------------------------------------------------

    pub async fn get_packages(&self, owner: &str, repo: &str, variant: Variant, arch: &str) -> Result<CacheEntry> {
        self.ensure_deb(owner, repo, variant).await?;
        self.cache
            .get_content(&cache::keys::packages(variant.as_str(), owner, repo, arch))
            .await
            .ok_or_else(|| Error::NotFound(format!("no Packages for architecture {arch}")))
    }

    pub async fn get_release(&self, owner: &str, repo: &str, variant: Variant) -> Result<CacheEntry> {
        self.ensure_deb(owner, repo, variant).await?;
        self.cache
            .get_content(&cache::keys::release(variant.as_str(), owner, repo))
            .await
            .ok_or_else(|| Error::NotFound("no Release file generated".to_string()))
    }

    pub async fn get_inrelease(&self, owner: &str, repo: &str, variant: Variant) -> Result<CacheEntry> {
        self.ensure_deb(owner, repo, variant).await?;
        self.cache
            .get_content(&cache::keys::inrelease(variant.as_str(), owner, repo))
            .await
            .ok_or_else(|| Error::NotFound("no signing key configured".to_string()))
    }

    pub async fn get_release_gpg(&self, owner: &str, repo: &str, variant: Variant) -> Result<CacheEntry> {
        self.ensure_deb(owner, repo, variant).await?;
        self.cache
            .get_content(&cache::keys::release_gpg(variant.as_str(), owner, repo))
            .await
            .ok_or_else(|| Error::NotFound("no signing key configured".to_string()))
    }

    /// Resolve a `by-hash/SHA256/{hex}` request against the Release file's own digest table, so
    /// a hit is only ever reported for a path the Release file actually vouches for.
    pub async fn get_by_hash(&self, owner: &str, repo: &str, variant: Variant, hash: &str) -> Result<CacheEntry> {
        self.ensure_deb(owner, repo, variant).await?;
        let release = self.get_release(owner, repo, variant).await?;
        let release_text = String::from_utf8_lossy(&release.body);

        let path = find_digest_path(&release_text, hash)
            .ok_or_else(|| Error::NotFound(format!("no index matches digest {hash}")))?;

        self.serve_release_path(owner, repo, variant, &path).await
    }

    async fn serve_release_path(&self, owner: &str, repo: &str, variant: Variant, path: &str) -> Result<CacheEntry> {
        let (arch_segment, gzipped) = parse_packages_path(path)
            .ok_or_else(|| Error::NotFound(format!("unrecognized index path {path}")))?;

        let entry = self.get_packages(owner, repo, variant, arch_segment).await?;
        if gzipped {
            Ok(CacheEntry::new(gzip_compress(&entry.body), "application/gzip"))
        } else {
            Ok(entry)
        }
    }

    /// Resolve the last path segment of a `pool/.../FILE.deb` request to its upstream download
    /// URL, scoped to the releases currently admitted under `variant`.
    pub async fn resolve_deb_download(&self, owner: &str, repo: &str, variant: Variant, filename: &str) -> Result<String> {
        self.ensure_deb(owner, repo, variant).await?;
        self.resolve_asset_url(owner, repo, variant, filename).await
    }

    async fn resolve_asset_url(&self, owner: &str, repo: &str, variant: Variant, filename: &str) -> Result<String> {
        let fingerprint = self
            .cache
            .get_fingerprint(&cache::keys::release_ids_hash(variant.as_str(), owner, repo))
            .await
            .ok_or_else(|| Error::NotFound(format!("no releases known for {owner}/{repo}")))?;

        let key = cache::keys::asset_url(variant.as_str(), owner, repo, &fingerprint, filename);
        self.cache
            .get_content(&key)
            .await
            .map(|e| String::from_utf8_lossy(&e.body).to_string())
            .ok_or_else(|| Error::NotFound(format!("no asset named {filename}")))
    }

    /// Cache-hit-then-background-refresh / miss-then-generate, for the Debian artifact set.
    async fn ensure_deb(&self, owner: &str, repo: &str, variant: Variant) -> Result<()> {
        let fp_key = cache::keys::release_ids_hash(variant.as_str(), owner, repo);
        let release_key = cache::keys::release(variant.as_str(), owner, repo);

        if self.cache.get_fingerprint(&fp_key).await.is_some()
            && self.cache.get_content(&release_key).await.is_some()
        {
            self.spawn_background(owner, repo, move |this, owner, repo| async move {
                this.refresh_deb(&owner, &repo, variant).await
            });
            return Ok(());
        }

        self.refresh_deb(owner, repo, variant).await
    }

    async fn refresh_deb(&self, owner: &str, repo: &str, variant: Variant) -> Result<()> {
        let releases = self.admitted_releases(owner, repo, variant).await?;
        let fingerprint = release_set_fingerprint(&releases);

        let fp_key = cache::keys::release_ids_hash(variant.as_str(), owner, repo);
        if !self.cache.needs_refresh(&fp_key, &fingerprint).await {
            return Ok(());
        }

        let decoded = self.decode_deb_assets(&releases).await;

        let entries: Vec<DebPackageEntry> = decoded
            .iter()
            .map(|(entry, _)| entry.clone())
            .filter(|e| !e.sha256.is_empty())
            .collect();

        let published_at = latest_published_at(&releases);
        let architectures = index_deb::supported_architectures(&entries);

        let mut digest_inputs: Vec<(String, Vec<u8>)> = Vec::new();
        for arch in &architectures {
            let filtered = index_deb::filter_by_arch(&entries, arch);
            let records: Vec<(&DebPackageEntry, String)> =
                filtered.iter().map(|e| (*e, e.pool_path.clone())).collect();
            let text = index_deb::render_packages_file(&records);
            let bytes = text.into_bytes();
            let gz_bytes = gzip_compress(&bytes);

            digest_inputs.push((format!("{COMPONENT}/binary-{arch}/Packages"), bytes.clone()));
            digest_inputs.push((format!("{COMPONENT}/binary-{arch}/Packages.gz"), gz_bytes));

            self.cache
                .put_content(
                    cache::keys::packages(variant.as_str(), owner, repo, arch),
                    CacheEntry::new(bytes, "text/plain; charset=utf-8"),
                )
                .await;
        }

        let release_file = index_deb::build_release_file(
            owner,
            repo,
            published_at,
            architectures.iter().cloned(),
            std::iter::once(COMPONENT.to_string()),
            digest_inputs.iter().map(|(p, b)| (p.clone(), b.as_slice())),
        );
        let release_text = release_file.to_string();

        self.cache
            .put_content(
                cache::keys::release(variant.as_str(), owner, repo),
                CacheEntry::new(release_text.clone().into_bytes(), "text/plain; charset=utf-8"),
            )
            .await;

        if let Some(signing_key) = &self.signing_key {
            if let Ok(inrelease) = signing_key
                .cleartext_sign(&self.passphrase, &release_text)
                .map_err(Error::logged)
            {
                self.cache
                    .put_content(
                        cache::keys::inrelease(variant.as_str(), owner, repo),
                        CacheEntry::new(inrelease.into_bytes(), "text/plain; charset=utf-8"),
                    )
                    .await;
            }

            if let Ok(detached) = signing_key
                .detached_text_sign(&self.passphrase, &release_text)
                .map_err(Error::logged)
            {
                self.cache
                    .put_content(
                        cache::keys::release_gpg(variant.as_str(), owner, repo),
                        CacheEntry::new(detached.into_bytes(), "application/pgp-signature"),
                    )
                    .await;
            }
        }

        for (entry, url) in &decoded {
            if entry.sha256.is_empty() {
                continue;
            }
            let filename = entry.pool_path.rsplit('/').next().unwrap_or(&entry.pool_path);
            let key = cache::keys::asset_url(variant.as_str(), owner, repo, &fingerprint, filename);
            self.cache
                .put_content(key, CacheEntry::new(url.clone().into_bytes(), "text/plain"))
                .await;
        }

        self.cache.put_fingerprint(fp_key, fingerprint).await;
        Ok(())
    }

    async fn decode_deb_assets(&self, releases: &[Release]) -> Vec<(DebPackageEntry, String)> {
        let jobs: Vec<(Release, Asset)> = releases
            .iter()
            .flat_map(|r| {
                r.assets
                    .iter()
                    .filter(|a| a.name.to_ascii_lowercase().ends_with(".deb"))
                    .map(move |a| (r.clone(), a.clone()))
            })
            .collect();

        let client = self.http_client.clone();
        stream::iter(jobs)
            .map(|(_release, asset)| {
                let client = client.clone();
                async move {
                    match decode_deb_asset(&client, &asset).await {
                        Ok(entry) => Some((entry, asset.download_url.clone())),
                        Err(e) => {
                            warn!("dropping deb asset {}: {e}", asset.name);
                            None
                        }
                    }
                }
            })
            .buffer_unordered(ASSET_CONCURRENCY)
            .filter_map(|r| async move { r })
            .collect()
            .await
    }

    // ---- RPM surface ------------------------------------------------------

    pub async fn get_rpm_part(&self, owner: &str, repo: &str, variant: Variant, part: &str) -> Result<CacheEntry> {
        self.ensure_rpm(owner, repo, variant).await?;
        self.cache
            .get_content(&cache::keys::rpm(part, variant.as_str(), owner, repo))
            .await
            .ok_or_else(|| Error::NotFound(format!("no {part}.xml generated")))
    }

    pub async fn get_repomd_asc(&self, owner: &str, repo: &str, variant: Variant) -> Result<CacheEntry> {
        self.ensure_rpm(owner, repo, variant).await?;
        self.cache
            .get_content(&cache::keys::rpm("repomd-asc", variant.as_str(), owner, repo))
            .await
            .ok_or_else(|| Error::NotFound("no signing key configured".to_string()))
    }

    pub async fn resolve_rpm_download(&self, owner: &str, repo: &str, variant: Variant, filename: &str) -> Result<String> {
        self.ensure_rpm(owner, repo, variant).await?;
        self.resolve_asset_url(owner, repo, variant, filename).await
    }

    async fn ensure_rpm(&self, owner: &str, repo: &str, variant: Variant) -> Result<()> {
        let fp_key = cache::keys::release_ids_hash(variant.as_str(), owner, repo);
        let repomd_key = cache::keys::rpm("repomd", variant.as_str(), owner, repo);

        if self.cache.get_fingerprint(&fp_key).await.is_some()
            && self.cache.get_content(&repomd_key).await.is_some()
        {
            self.spawn_background(owner, repo, move |this, owner, repo| async move {
                this.refresh_rpm(&owner, &repo, variant).await
            });
            return Ok(());
        }

        self.refresh_rpm(owner, repo, variant).await
    }

    async fn refresh_rpm(&self, owner: &str, repo: &str, variant: Variant) -> Result<()> {
        let releases = self.admitted_releases(owner, repo, variant).await?;
        let fingerprint = release_set_fingerprint(&releases);

        let fp_key = cache::keys::release_ids_hash(variant.as_str(), owner, repo);
        if !self.cache.needs_refresh(&fp_key, &fingerprint).await {
            return Ok(());
        }

        let decoded = self.decode_rpm_assets(&releases).await;
        let entries: Vec<RpmPackageEntry> = decoded.iter().map(|(entry, _)| entry.clone()).collect();

        let published_at = latest_published_at(&releases);
        let revision = index_rpm::revision_from_published_at(published_at);

        let primary = index_rpm::primary_xml(&entries);
        let filelists = index_rpm::filelists_xml(&entries);
        let other = index_rpm::other_xml(&entries);

        let primary_gz = gzip_compress(primary.as_bytes());
        let filelists_gz = gzip_compress(filelists.as_bytes());
        let other_gz = gzip_compress(other.as_bytes());

        let parts = [
            index_rpm::RepomdPart { data_type: "primary", open_xml: primary.as_bytes(), gz_xml: &primary_gz },
            index_rpm::RepomdPart { data_type: "filelists", open_xml: filelists.as_bytes(), gz_xml: &filelists_gz },
            index_rpm::RepomdPart { data_type: "other", open_xml: other.as_bytes(), gz_xml: &other_gz },
        ];
        let repomd = index_rpm::repomd_xml(revision, &parts);

        for (part, text) in [("primary", &primary), ("filelists", &filelists), ("other", &other)] {
            self.cache
                .put_content(
                    cache::keys::rpm(part, variant.as_str(), owner, repo),
                    CacheEntry::new(text.clone().into_bytes(), "application/xml"),
                )
                .await;
        }
        self.cache
            .put_content(
                cache::keys::rpm("repomd", variant.as_str(), owner, repo),
                CacheEntry::new(repomd.clone().into_bytes(), "application/xml"),
            )
            .await;
        self.cache
            .put_content(
                cache::keys::rpm("timestamp", variant.as_str(), owner, repo),
                CacheEntry::new(revision.to_string().into_bytes(), "text/plain"),
            )
            .await;

        if let Some(signing_key) = &self.signing_key {
            if let Ok(asc) = signing_key
                .detached_binary_sign(&self.passphrase, repomd.as_bytes())
                .map_err(Error::logged)
            {
                self.cache
                    .put_content(
                        cache::keys::rpm("repomd-asc", variant.as_str(), owner, repo),
                        CacheEntry::new(asc, "application/pgp-signature"),
                    )
                    .await;
            }
        }

        for (entry, url) in &decoded {
            let key = cache::keys::asset_url(variant.as_str(), owner, repo, &fingerprint, &entry.filename);
            self.cache
                .put_content(key, CacheEntry::new(url.clone().into_bytes(), "text/plain"))
                .await;
        }

        self.cache.put_fingerprint(fp_key, fingerprint).await;
        Ok(())
    }

    async fn decode_rpm_assets(&self, releases: &[Release]) -> Vec<(RpmPackageEntry, String)> {
        let jobs: Vec<(Release, Asset)> = releases
            .iter()
            .flat_map(|r| {
                r.assets
                    .iter()
                    .filter(|a| a.name.to_ascii_lowercase().ends_with(".rpm"))
                    .map(move |a| (r.clone(), a.clone()))
            })
            .collect();

        let client = self.http_client.clone();
        stream::iter(jobs)
            .map(|(_release, asset)| {
                let client = client.clone();
                async move {
                    match decode_rpm_asset(&client, &asset).await {
                        Ok(entry) => Some((entry, asset.download_url.clone())),
                        Err(e) => {
                            warn!("dropping rpm asset {}: {e}", asset.name);
                            None
                        }
                    }
                }
            })
            .buffer_unordered(ASSET_CONCURRENCY)
            .filter_map(|r| async move { r })
            .collect()
            .await
    }

    // ---- shared ------------------------------------------------------------

    async fn admitted_releases(&self, owner: &str, repo: &str, variant: Variant) -> Result<Vec<Release>> {
        let releases = self.feed.list_releases(owner, repo).await?;
        Ok(releases.into_iter().filter(|r| variant.admits(r)).collect())
    }

    /// Fire a background refresh once the in-hand response no longer depends on it. Errors are
    /// logged, never propagated -- this task's only side effect is writing to the cache.
    fn spawn_background<F, Fut>(&self, owner: &str, repo: &str, task: F)
    where
        F: FnOnce(Self, String, String) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send,
    {
        let this = self.clone();
        let owner = owner.to_string();
        let repo = repo.to_string();
        tokio::spawn(async move {
            let (owner_log, repo_log) = (owner.clone(), repo.clone());
            if let Err(e) = task(this, owner, repo).await {
                warn!("background refresh failed for {owner_log}/{repo_log}: {e}");
            } else {
                debug!("background refresh completed for {owner_log}/{repo_log}");
            }
        });
    }
}

async fn decode_deb_asset(client: &reqwest::Client, asset: &Asset) -> Result<DebPackageEntry> {
    let prefix = extract_deb::fetch_prefix(client, &asset.download_url).await?;
    let mut control = extract_deb::extract_control(&prefix)?;
    control.architecture = arch::resolve_deb_arch(&control.architecture, &asset.name);

    let pool_path = DebPackageEntry::pool_path(COMPONENT, &control.package, &asset.name);
    let sha256 = asset.sha256_hex().unwrap_or_default().to_string();

    Ok(DebPackageEntry {
        control,
        pool_path,
        size: asset.size,
        sha256,
    })
}

async fn decode_rpm_asset(client: &reqwest::Client, asset: &Asset) -> Result<RpmPackageEntry> {
    let prefix = extract_rpm::fetch_prefix(client, &asset.download_url).await?;
    let mut header = extract_rpm::parse(&prefix)?;
    if header.arch.is_empty() {
        header.arch = arch::rpm_arch_from_filename(&asset.name);
    }

    Ok(RpmPackageEntry {
        header,
        filename: asset.name.clone(),
        size: asset.size,
        checksum: asset.sha256_hex().map(str::to_string),
    })
}

fn latest_published_at(releases: &[Release]) -> DateTime<Utc> {
    releases
        .iter()
        .map(|r| r.published_at)
        .max()
        .unwrap_or_else(Utc::now)
}

/// Parse the `SHA256:` digest table of a rendered Release file, returning the path for a
/// matching 64-character hex digest. Lines are ` {64-hex} {size} {path}`, per
/// `ReleaseBuilder::create_release_file`'s output.
fn find_digest_path(release_text: &str, hash: &str) -> Option<String> {
    let mut in_table = false;
    for line in release_text.lines() {
        if line.trim_end() == "SHA256:" {
            in_table = true;
            continue;
        }
        if !in_table {
            continue;
        }
        if !line.starts_with(' ') {
            break;
        }

        // "{digest} {size:<8} {path}" -- the size field is left-padded with spaces, so the
        // fields are split on whitespace runs rather than single spaces. Paths never contain
        // whitespace in this namespace.
        let mut tokens = line.split_whitespace();
        let digest = tokens.next()?;
        let _size = tokens.next()?;
        let path = tokens.next()?;
        if digest.eq_ignore_ascii_case(hash) {
            return Some(path.to_string());
        }
    }
    None
}

/// Recognize `{component}/binary-{arch}/Packages[.gz]`, returning `(arch, is_gzipped)`.
fn parse_packages_path(path: &str) -> Option<(&str, bool)> {
    let rest = path.strip_prefix(&format!("{COMPONENT}/binary-"))?;
    let (arch, filename) = rest.split_once('/')?;
    match filename {
        "Packages" => Some((arch, false)),
        "Packages.gz" => Some((arch, true)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_packages_path_recognizes_plain_and_gzipped() {
        assert_eq!(parse_packages_path("main/binary-amd64/Packages"), Some(("amd64", false)));
        assert_eq!(parse_packages_path("main/binary-amd64/Packages.gz"), Some(("amd64", true)));
        assert_eq!(parse_packages_path("main/source/Sources.xz"), None);
    }

    #[test]
    fn find_digest_path_matches_case_insensitively() {
        let release = "Origin: x\nSHA256: \n 1234 100      main/binary-amd64/Packages\n 5678 200      main/binary-amd64/Packages.gz\n";
        assert_eq!(
            find_digest_path(release, "1234"),
            Some("main/binary-amd64/Packages".to_string())
        );
        assert_eq!(find_digest_path(release, "ABCD"), None);
    }

    #[test]
    fn find_digest_path_none_when_table_absent() {
        let release = "Origin: x\nLabel: y\n";
        assert_eq!(find_digest_path(release, "1234"), None);
    }
}
