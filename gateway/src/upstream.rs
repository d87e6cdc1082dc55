// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The release feed abstraction and its GitHub Releases API implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, LINK};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::{Asset, Release};

/// A source of releases for an `{owner}/{repo}` coordinate. GitHub is the only collaborator
/// today, but the coordinator depends on this trait rather than on `GitHubReleaseFeed` directly.
#[async_trait]
pub trait ReleaseFeed: Send + Sync {
    async fn list_releases(&self, owner: &str, repo: &str) -> Result<Vec<Release>>;
}

/// Releases from the GitHub REST API (`GET /repos/{owner}/{repo}/releases`), paginated via the
/// `Link` response header.
pub struct GitHubReleaseFeed {
    client: reqwest::Client,
    token: Option<String>,
    base_url: String,
}

impl GitHubReleaseFeed {
    pub fn new(client: reqwest::Client, token: Option<String>) -> Self {
        Self {
            client,
            token,
            base_url: "https://api.github.com".to_string(),
        }
    }

    fn first_page_url(&self, owner: &str, repo: &str) -> String {
        format!(
            "{}/repos/{owner}/{repo}/releases?per_page=100",
            self.base_url
        )
    }
}

/// GitHub release assets never carry a digest; map a decoded page entry accordingly.
fn map_release(r: GhRelease) -> Release {
    Release {
        id: r.id,
        tag: r.tag_name,
        published_at: r.published_at.unwrap_or_else(Utc::now),
        prerelease: r.prerelease,
        assets: r
            .assets
            .into_iter()
            .map(|a| Asset {
                name: a.name,
                size: a.size,
                download_url: a.browser_download_url,
                digest: None,
            })
            .collect(),
    }
}

#[derive(Deserialize)]
struct GhRelease {
    id: u64,
    tag_name: String,
    published_at: Option<DateTime<Utc>>,
    prerelease: bool,
    assets: Vec<GhAsset>,
}

#[derive(Deserialize)]
struct GhAsset {
    name: String,
    size: u64,
    browser_download_url: String,
}

#[async_trait]
impl ReleaseFeed for GitHubReleaseFeed {
    async fn list_releases(&self, owner: &str, repo: &str) -> Result<Vec<Release>> {
        let mut releases = Vec::new();
        let mut next_url = Some(self.first_page_url(owner, repo));

        while let Some(url) = next_url {
            let mut request = self.client.get(&url);
            if let Some(token) = &self.token {
                request = request.header(AUTHORIZATION, format!("Bearer {token}"));
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::UpstreamFetch(format!("{owner}/{repo}: {e}")))?;

            match response.status() {
                StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                    return Err(Error::UpstreamRateLimit(format!(
                        "{owner}/{repo}: {}",
                        response.status()
                    )))
                }
                status if !status.is_success() => {
                    return Err(Error::UpstreamFetch(format!(
                        "{owner}/{repo}: unexpected status {status}"
                    )))
                }
                _ => {}
            }

            next_url = next_page_url(response.headers().get(LINK));

            let page: Vec<GhRelease> = response
                .json()
                .await
                .map_err(|e| Error::UpstreamFetch(format!("{owner}/{repo}: {e}")))?;

            releases.extend(page.into_iter().map(map_release));
        }

        Ok(releases)
    }
}

/// Parse the `rel="next"` target out of a GitHub `Link` header, per RFC 8288.
fn next_page_url(header: Option<&reqwest::header::HeaderValue>) -> Option<String> {
    let header = header?.to_str().ok()?;

    header.split(',').find_map(|part| {
        let mut segments = part.split(';');
        let url_part = segments.next()?.trim();
        let is_next = segments.any(|p| p.trim() == "rel=\"next\"");

        if !is_next {
            return None;
        }
        url_part
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn next_page_url_extracts_rel_next() {
        let header = HeaderValue::from_static(
            "<https://api.github.com/repos/o/r/releases?page=2>; rel=\"next\", \
             <https://api.github.com/repos/o/r/releases?page=5>; rel=\"last\"",
        );
        assert_eq!(
            next_page_url(Some(&header)),
            Some("https://api.github.com/repos/o/r/releases?page=2".to_string())
        );
    }

    #[test]
    fn next_page_url_none_on_last_page() {
        let header = HeaderValue::from_static(
            "<https://api.github.com/repos/o/r/releases?page=1>; rel=\"first\"",
        );
        assert_eq!(next_page_url(Some(&header)), None);
    }

    #[test]
    fn next_page_url_none_when_header_absent() {
        assert_eq!(next_page_url(None), None);
    }

    #[test]
    fn map_release_never_reports_a_digest() {
        let raw = r#"{"id":1,"tag_name":"v1.0.0","published_at":"2024-01-01T00:00:00Z","prerelease":false,
                      "assets":[{"name":"widget_1.0.0_amd64.deb","size":1024,
                                 "browser_download_url":"https://cdn.example/widget.deb"}]}"#;
        let gh: GhRelease = serde_json::from_str(raw).unwrap();
        let release = map_release(gh);

        assert_eq!(release.id, 1);
        assert_eq!(release.tag, "v1.0.0");
        assert!(!release.prerelease);
        assert_eq!(release.assets[0].name, "widget_1.0.0_amd64.deb");
        assert_eq!(release.assets[0].digest, None);
    }

    #[test]
    fn map_release_defaults_published_at_when_absent() {
        let raw = r#"{"id":2,"tag_name":"v2.0.0","published_at":null,"prerelease":true,"assets":[]}"#;
        let gh: GhRelease = serde_json::from_str(raw).unwrap();
        let release = map_release(gh);

        assert!(release.prerelease);
        assert!(release.published_at <= Utc::now());
    }

    #[test]
    fn first_page_url_includes_per_page() {
        let feed = GitHubReleaseFeed::new(reqwest::Client::new(), None);
        assert_eq!(
            feed.first_page_url("acme", "widget"),
            "https://api.github.com/repos/acme/widget/releases?per_page=100"
        );
    }
}
