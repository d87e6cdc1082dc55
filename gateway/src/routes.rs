// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The HTTP surface: path routing, request dispatch, and server bootstrap.
//!
//! The `warp::Filter` combinator shape -- per-route `and_then(handler).map(...)`, `.or()`-chained
//! into one tree, a single `recover()` handler -- is grounded on `what-the-src::src::web`'s
//! `run()`. Path decoding itself is pulled out into a pure `route_repo_path` function, matching
//! the way the coordinator keeps its own path-shaped logic (`parse_packages_path`,
//! `find_digest_path`) as plain, independently testable functions.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use warp::http::{header, HeaderValue, StatusCode};
use warp::{Filter, Reply};

use crate::cache::{GatewayCache, FINGERPRINT_TTL};
use crate::config;
use crate::coordinator::{Coordinator, COMPONENT, DIST};
use crate::error::{error as log_error, Error};
use crate::model::Variant;
use crate::sign::{SigningKey, VerifyingKey};
use crate::upstream::{GitHubReleaseFeed, ReleaseFeed};

/// Architectures `?cache=false` clears, regardless of which ones currently have content cached.
const KNOWN_DEB_ARCHES: &[&str] = &["amd64", "arm64", "i386", "armhf", "all"];

/// Fixed TTL for by-hash responses and the favicon; independent of `CACHE_TTL`.
const IMMUTABLE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

static OWNER_REPO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9._-]*[A-Za-z0-9])?$").expect("valid regex"));

fn valid_owner(owner: &str) -> bool {
    owner.len() <= 39 && OWNER_REPO.is_match(owner)
}

fn valid_repo(repo: &str) -> bool {
    repo.len() <= 100 && OWNER_REPO.is_match(repo)
}

const README_MARKDOWN: &str = "\
# gateway

Presents a GitHub release feed as a Debian/APT repository and an RPM/YUM repository.

Point `apt`/`dnf` at `/{owner}/{repo}` (or `/{owner}/{repo}/prerelease` for prereleases).
";

const FAVICON_SVG: &str = "\
<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 16 16\">\
<rect width=\"16\" height=\"16\" rx=\"3\" fill=\"#2b2b2b\"/>\
<text x=\"8\" y=\"12\" font-size=\"10\" text-anchor=\"middle\" fill=\"#fff\">G</text>\
</svg>";

#[derive(Debug, serde::Deserialize)]
struct CacheQuery {
    cache: Option<String>,
}

/// One decoded request against `/{owner}/{repo}[/prerelease]/...`.
#[derive(Debug, PartialEq, Eq)]
enum Operation {
    PublicKey,
    InRelease,
    Release,
    ReleaseGpg,
    Packages { arch: String, gz: bool },
    ByHash { hex: String },
    DebDownload { filename: String },
    RepomdXml,
    RepomdAsc,
    RpmPart { part: &'static str, gz: bool },
    RpmDownload { filename: String },
}

/// Decode the path segments following `/{owner}/{repo}` into a release variant and operation.
/// `None` means an unrecognized route (handled as `404` by the caller).
fn route_repo_path(segments: &[&str]) -> Option<(Variant, Operation)> {
    let (variant, rest) = match segments.split_first() {
        Some((&"prerelease", rest)) => (Variant::Prerelease, rest),
        _ => (Variant::Stable, segments),
    };

    let op = match rest {
        ["public.key"] => Operation::PublicKey,
        ["dists", dist, "InRelease"] if *dist == DIST => Operation::InRelease,
        ["dists", dist, "Release"] if *dist == DIST => Operation::Release,
        ["dists", dist, "Release.gpg"] if *dist == DIST => Operation::ReleaseGpg,
        ["dists", dist, component, binary_arch, "by-hash", "SHA256", hex]
            if *dist == DIST && *component == COMPONENT && binary_arch.starts_with("binary-") =>
        {
            Operation::ByHash {
                hex: (*hex).to_string(),
            }
        }
        ["dists", dist, component, binary_arch, filename]
            if *dist == DIST && *component == COMPONENT && binary_arch.starts_with("binary-") =>
        {
            let arch = binary_arch.strip_prefix("binary-").unwrap().to_string();
            match *filename {
                "Packages" => Operation::Packages { arch, gz: false },
                "Packages.gz" => Operation::Packages { arch, gz: true },
                _ => return None,
            }
        }
        ["repodata", "repomd.xml"] => Operation::RepomdXml,
        ["repodata", "repomd.xml.asc"] => Operation::RepomdAsc,
        ["repodata", filename] => {
            let (part, gz) = match *filename {
                "primary.xml" => ("primary", false),
                "primary.xml.gz" => ("primary", true),
                "filelists.xml" => ("filelists", false),
                "filelists.xml.gz" => ("filelists", true),
                "other.xml" => ("other", false),
                "other.xml.gz" => ("other", true),
                _ => return None,
            };
            Operation::RpmPart { part, gz }
        }
        ["Packages", filename] if filename.ends_with(".rpm") => Operation::RpmDownload {
            filename: (*filename).to_string(),
        },
        _ if rest.first() == Some(&"pool")
            && rest.last().map(|f| f.ends_with(".deb")).unwrap_or(false) =>
        {
            Operation::DebDownload {
                filename: (*rest.last().unwrap()).to_string(),
            }
        }
        _ => return None,
    };

    Some((variant, op))
}

fn reject(e: Error) -> warp::Rejection {
    warp::reject::custom(e.logged())
}

/// Wrap a cached artifact into a response carrying its stored content type and a `Cache-Control`
/// header computed against `ttl`.
fn entry_reply(entry: crate::cache::CacheEntry, ttl: Duration) -> Box<dyn Reply> {
    let cache_control = entry.cache_control(ttl);
    let mut response = warp::reply::Response::new(entry.body.into());
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(entry.content_type),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_str(&cache_control).unwrap_or_else(|_| HeaderValue::from_static("no-cache")),
    );
    Box::new(response)
}

fn bytes_reply(body: Vec<u8>, content_type: &'static str, cache_control: &str) -> Box<dyn Reply> {
    let mut response = warp::reply::Response::new(body.into());
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_str(cache_control).unwrap_or_else(|_| HeaderValue::from_static("no-cache")),
    );
    Box::new(response)
}

fn redirect(url: &str) -> Result<Box<dyn Reply>, warp::Rejection> {
    let uri = url
        .parse::<warp::http::Uri>()
        .map_err(|e| reject(Error::UpstreamFetch(format!("bad redirect target: {e}"))))?;
    Ok(Box::new(warp::redirect::found(uri)))
}

async fn readme(accept: Option<String>) -> Result<Box<dyn Reply>, warp::Rejection> {
    let wants_html = accept.as_deref().unwrap_or("").contains("text/html");
    if wants_html {
        let html = format!(
            "<!doctype html><html><body><pre>{}</pre></body></html>",
            crate::xml::escape(README_MARKDOWN)
        );
        Ok(bytes_reply(
            html.into_bytes(),
            "text/html; charset=utf-8",
            "public, max-age=3600",
        ))
    } else {
        Ok(bytes_reply(
            README_MARKDOWN.as_bytes().to_vec(),
            "text/markdown; charset=utf-8",
            "public, max-age=3600",
        ))
    }
}

async fn favicon() -> Result<Box<dyn Reply>, warp::Rejection> {
    Ok(bytes_reply(
        FAVICON_SVG.as_bytes().to_vec(),
        "image/svg+xml",
        "public, max-age=86400",
    ))
}

async fn public_key(ctx: Arc<Coordinator>) -> Result<Box<dyn Reply>, warp::Rejection> {
    match ctx.public_key_armored().map_err(reject)? {
        Some(key) => Ok(bytes_reply(
            key.into_bytes(),
            "application/pgp-keys",
            "public, max-age=3600",
        )),
        None => Err(reject(Error::NotFound("no signing key configured".to_string()))),
    }
}

async fn repo_handler(
    owner: String,
    repo: String,
    tail: warp::path::Tail,
    query: CacheQuery,
    ctx: Arc<Coordinator>,
) -> Result<Box<dyn Reply>, warp::Rejection> {
    if !valid_owner(&owner) || !valid_repo(&repo) {
        return Err(reject(Error::BadRequest(format!(
            "invalid owner/repo: {owner}/{repo}"
        ))));
    }

    if query.cache.as_deref() == Some("false") {
        ctx.clear_cache(&owner, &repo, KNOWN_DEB_ARCHES).await;
    }

    let path = tail.as_str();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let Some((variant, op)) = route_repo_path(&segments) else {
        return Err(warp::reject::not_found());
    };

    let content_ttl = ctx.content_ttl();

    match op {
        Operation::PublicKey => public_key(ctx).await,
        Operation::InRelease => ctx
            .get_inrelease(&owner, &repo, variant)
            .await
            .map(|e| entry_reply(e, FINGERPRINT_TTL))
            .map_err(reject),
        Operation::Release => ctx
            .get_release(&owner, &repo, variant)
            .await
            .map(|e| entry_reply(e, content_ttl))
            .map_err(reject),
        Operation::ReleaseGpg => ctx
            .get_release_gpg(&owner, &repo, variant)
            .await
            .map(|e| entry_reply(e, content_ttl))
            .map_err(reject),
        Operation::Packages { arch, gz } => {
            let entry = ctx
                .get_packages(&owner, &repo, variant, &arch)
                .await
                .map_err(reject)?;
            if gz {
                let gz_body = debian_packaging::io::gzip_compress(&entry.body);
                Ok(bytes_reply(
                    gz_body,
                    "application/gzip",
                    &entry.cache_control(content_ttl),
                ))
            } else {
                Ok(entry_reply(entry, content_ttl))
            }
        }
        Operation::ByHash { hex } => ctx
            .get_by_hash(&owner, &repo, variant, &hex)
            .await
            .map(|e| entry_reply(e, IMMUTABLE_TTL))
            .map_err(reject),
        Operation::DebDownload { filename } => {
            let url = ctx
                .resolve_deb_download(&owner, &repo, variant, &filename)
                .await
                .map_err(reject)?;
            redirect(&url)
        }
        Operation::RepomdXml => ctx
            .get_rpm_part(&owner, &repo, variant, "repomd")
            .await
            .map(|e| entry_reply(e, content_ttl))
            .map_err(reject),
        Operation::RepomdAsc => ctx
            .get_repomd_asc(&owner, &repo, variant)
            .await
            .map(|e| entry_reply(e, content_ttl))
            .map_err(reject),
        Operation::RpmPart { part, gz } => {
            let entry = ctx
                .get_rpm_part(&owner, &repo, variant, part)
                .await
                .map_err(reject)?;
            if gz {
                let gz_body = debian_packaging::io::gzip_compress(&entry.body);
                Ok(bytes_reply(
                    gz_body,
                    "application/gzip",
                    &entry.cache_control(content_ttl),
                ))
            } else {
                Ok(entry_reply(entry, content_ttl))
            }
        }
        Operation::RpmDownload { filename } => {
            let url = ctx
                .resolve_rpm_download(&owner, &repo, variant, &filename)
                .await
                .map_err(reject)?;
            redirect(&url)
        }
    }
}

/// The final `recover()` handler: `gateway::error::Error` rejections map through their own
/// status code, routing-level rejections (unmatched path, bad query) become `404`/`400`, and
/// anything else is logged and surfaced as `500`.
pub async fn rejection(err: warp::Rejection) -> Result<impl Reply, Infallible> {
    if let Some(e) = err.find::<Error>() {
        return Ok(warp::reply::with_status(e.to_string(), e.status()));
    }
    if err.is_not_found() {
        return Ok(warp::reply::with_status(
            "not found".to_string(),
            StatusCode::NOT_FOUND,
        ));
    }
    log_error!("unhandled rejection: {err:?}");
    Ok(warp::reply::with_status(
        "internal error".to_string(),
        StatusCode::INTERNAL_SERVER_ERROR,
    ))
}

/// Build the full route tree, ready to hand to `warp::serve`.
pub fn build(ctx: Arc<Coordinator>) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let ctx = warp::any().map(move || ctx.clone());

    let readme_route = warp::get()
        .and(warp::path::end())
        .and(warp::header::optional::<String>("accept"))
        .and_then(readme);

    let favicon_route = warp::get()
        .and(warp::path("favicon.svg").or(warp::path("favicon.ico")).unify())
        .and(warp::path::end())
        .and_then(favicon);

    let repo_route = warp::get()
        .and(warp::path::param::<String>())
        .and(warp::path::param::<String>())
        .and(warp::path::tail())
        .and(warp::query::<CacheQuery>())
        .and(ctx)
        .and_then(repo_handler);

    readme_route
        .or(favicon_route)
        .or(repo_route)
        .recover(rejection)
}

/// Build the upstream client, coordinator, and signing material from configuration, then serve.
pub async fn run(args: &config::Serve) -> crate::error::Result<()> {
    let http_client = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(8))
        .build()
        .map_err(|e| Error::UpstreamFetch(format!("building http client: {e}")))?;

    let feed: Arc<dyn ReleaseFeed> = Arc::new(GitHubReleaseFeed::new(
        http_client.clone(),
        args.upstream_token.clone(),
    ));

    let signing_key = args
        .gpg_private_key
        .as_deref()
        .map(SigningKey::from_armored)
        .transpose()?;
    let verifying_key = args
        .gpg_public_key
        .as_deref()
        .map(VerifyingKey::from_armored)
        .transpose()?;

    let cache = GatewayCache::new(args.content_ttl());
    let coordinator = Arc::new(Coordinator::new(
        feed,
        http_client,
        cache,
        signing_key,
        verifying_key,
        args.gpg_passphrase.clone(),
    ));

    let routes = build(coordinator);
    warp::serve(routes).run(args.bind_addr).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_repo_validation() {
        assert!(valid_owner("acme"));
        assert!(valid_owner("a-c.m_e1"));
        assert!(!valid_owner("-bad"));
        assert!(!valid_owner(""));
        assert!(!valid_owner(&"a".repeat(40)));
        assert!(valid_repo(&"a".repeat(100)));
        assert!(!valid_repo(&"a".repeat(101)));
    }

    #[test]
    fn routes_stable_release_family() {
        let segs = ["dists", "stable", "InRelease"];
        assert_eq!(
            route_repo_path(&segs),
            Some((Variant::Stable, Operation::InRelease))
        );

        let segs = ["dists", "stable", "Release"];
        assert_eq!(
            route_repo_path(&segs),
            Some((Variant::Stable, Operation::Release))
        );

        let segs = ["dists", "stable", "Release.gpg"];
        assert_eq!(
            route_repo_path(&segs),
            Some((Variant::Stable, Operation::ReleaseGpg))
        );
    }

    #[test]
    fn routes_prerelease_prefix_selects_variant() {
        let segs = ["prerelease", "dists", "stable", "Release"];
        assert_eq!(
            route_repo_path(&segs),
            Some((Variant::Prerelease, Operation::Release))
        );
    }

    #[test]
    fn routes_packages_and_gz() {
        let segs = ["dists", "stable", "main", "binary-amd64", "Packages"];
        assert_eq!(
            route_repo_path(&segs),
            Some((
                Variant::Stable,
                Operation::Packages {
                    arch: "amd64".to_string(),
                    gz: false
                }
            ))
        );

        let segs = ["dists", "stable", "main", "binary-amd64", "Packages.gz"];
        assert_eq!(
            route_repo_path(&segs),
            Some((
                Variant::Stable,
                Operation::Packages {
                    arch: "amd64".to_string(),
                    gz: true
                }
            ))
        );
    }

    #[test]
    fn routes_by_hash() {
        let segs = [
            "dists", "stable", "main", "binary-amd64", "by-hash", "SHA256", "deadbeef",
        ];
        assert_eq!(
            route_repo_path(&segs),
            Some((
                Variant::Stable,
                Operation::ByHash {
                    hex: "deadbeef".to_string()
                }
            ))
        );
    }

    #[test]
    fn routes_pool_deb_download_any_depth() {
        let segs = ["pool", "main", "a", "app", "app_1.2.3_amd64.deb"];
        assert_eq!(
            route_repo_path(&segs),
            Some((
                Variant::Stable,
                Operation::DebDownload {
                    filename: "app_1.2.3_amd64.deb".to_string()
                }
            ))
        );
    }

    #[test]
    fn routes_repodata_family() {
        assert_eq!(
            route_repo_path(&["repodata", "repomd.xml"]),
            Some((Variant::Stable, Operation::RepomdXml))
        );
        assert_eq!(
            route_repo_path(&["repodata", "repomd.xml.asc"]),
            Some((Variant::Stable, Operation::RepomdAsc))
        );
        assert_eq!(
            route_repo_path(&["repodata", "primary.xml.gz"]),
            Some((
                Variant::Stable,
                Operation::RpmPart {
                    part: "primary",
                    gz: true
                }
            ))
        );
        assert_eq!(
            route_repo_path(&["repodata", "other.xml"]),
            Some((
                Variant::Stable,
                Operation::RpmPart {
                    part: "other",
                    gz: false
                }
            ))
        );
    }

    #[test]
    fn routes_rpm_download() {
        let segs = ["Packages", "app-1.0-1.x86_64.rpm"];
        assert_eq!(
            route_repo_path(&segs),
            Some((
                Variant::Stable,
                Operation::RpmDownload {
                    filename: "app-1.0-1.x86_64.rpm".to_string()
                }
            ))
        );
    }

    #[test]
    fn routes_wrong_dist_or_component_is_unrecognized() {
        assert_eq!(route_repo_path(&["dists", "testing", "Release"]), None);
        assert_eq!(
            route_repo_path(&["dists", "stable", "extra", "binary-amd64", "Packages"]),
            None
        );
    }

    #[test]
    fn routes_unknown_path_is_none() {
        assert_eq!(route_repo_path(&["unknown", "path"]), None);
    }
}
