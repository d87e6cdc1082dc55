// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Emit `Packages` records and, from them, a `Release` file.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use debian_packaging::io::ContentDigest;
use debian_packaging::repository::builder::ReleaseBuilder;

use crate::model::DebPackageEntry;

/// Render one `Packages` record, fields in the fixed order the format requires.
///
/// Optional fields are only emitted when set. `Description`'s first line is the summary;
/// subsequent lines are indented with a single space, and blank lines become ` .`.
fn render_record(entry: &DebPackageEntry, filename: &str) -> String {
    let c = &entry.control;
    let mut lines = Vec::new();

    lines.push(format!("Package: {}", c.package));
    lines.push(format!("Version: {}", c.version));
    lines.push(format!("Architecture: {}", c.architecture));

    if let Some(v) = &c.maintainer {
        lines.push(format!("Maintainer: {v}"));
    }
    if c.installed_size != 0 {
        lines.push(format!("Installed-Size: {}", c.installed_size));
    }
    if let Some(v) = &c.depends {
        lines.push(format!("Depends: {v}"));
    }
    if let Some(v) = &c.recommends {
        lines.push(format!("Recommends: {v}"));
    }
    if let Some(v) = &c.suggests {
        lines.push(format!("Suggests: {v}"));
    }
    if let Some(v) = &c.conflicts {
        lines.push(format!("Conflicts: {v}"));
    }
    if let Some(v) = &c.replaces {
        lines.push(format!("Replaces: {v}"));
    }
    if let Some(v) = &c.provides {
        lines.push(format!("Provides: {v}"));
    }
    if let Some(v) = &c.section {
        lines.push(format!("Section: {v}"));
    }
    lines.push(format!("Priority: {}", c.priority));
    if let Some(v) = &c.homepage {
        lines.push(format!("Homepage: {v}"));
    }

    lines.push(format!("Filename: {filename}"));
    lines.push(format!("Size: {}", entry.size));
    lines.push(format!("SHA256: {}", entry.sha256));

    if let Some(description) = &c.description {
        lines.push(format!("Description: {}", fold_description(description)));
    }

    lines.join("\n")
}

/// Fold a multi-line description: the first line stands alone; subsequent lines are indented
/// with one space, and blank lines become a lone `.`.
fn fold_description(description: &str) -> String {
    let mut fields_lines = description.lines();
    let first = fields_lines.next().unwrap_or("");

    let mut out = first.to_string();
    for line in fields_lines {
        out.push('\n');
        if line.is_empty() {
            out.push_str(" .");
        } else {
            out.push(' ');
            out.push_str(line);
        }
    }
    out
}

/// Filter entries admitted for a given `binary-{arch}` directory: arch-specific entries plus
/// every `"all"` entry, except the `"all"` directory itself, which only lists `"all"` entries.
pub fn filter_by_arch<'a>(
    entries: &'a [DebPackageEntry],
    arch: &str,
) -> Vec<&'a DebPackageEntry> {
    entries
        .iter()
        .filter(|e| {
            if arch == "all" {
                e.control.architecture == "all"
            } else {
                e.control.architecture == arch || e.control.architecture == "all"
            }
        })
        .collect()
}

/// Render a full `Packages` file: one record per entry, separated by exactly one blank line,
/// terminated by a single trailing newline. Entries without a valid SHA-256 digest must already
/// have been excluded by the caller (APT requires a checksum to validate downloads).
pub fn render_packages_file(entries: &[(&DebPackageEntry, String)]) -> String {
    let mut out = entries
        .iter()
        .map(|(entry, filename)| render_record(entry, filename))
        .collect::<Vec<_>>()
        .join("\n\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// The sorted union of architectures detected among admitted entries, plus `"all"`.
pub fn supported_architectures(entries: &[DebPackageEntry]) -> BTreeSet<String> {
    let mut arches: BTreeSet<String> = entries.iter().map(|e| e.control.architecture.clone()).collect();
    arches.insert("all".to_string());
    arches
}

/// Build the `Release` file for a dist, given the already-rendered per-arch index bytes.
///
/// `indices` yields `(path, bytes)` for every `Packages`/`Packages.gz` the dist serves; the
/// `SHA256` table is derived from those bytes, not recomputed independently, so the reported
/// digests are guaranteed to match what a fetch for those paths returns.
pub fn build_release_file<'a>(
    owner: &str,
    repo: &str,
    published_at: DateTime<Utc>,
    architectures: impl Iterator<Item = impl ToString>,
    components: impl Iterator<Item = impl ToString>,
    indices: impl Iterator<Item = (String, &'a [u8])>,
) -> debian_packaging::repository::release::ReleaseFile<'a> {
    let mut builder = ReleaseBuilder::new_recommended(architectures, components, "stable", "stable");
    builder.set_origin(format!("{owner}/{repo}"));
    builder.set_label(repo);
    builder.set_description(format!("{owner}/{repo} release mirror"));
    builder.set_date(published_at);
    builder.set_acquire_by_hash(true);

    let digests = indices.map(|(path, bytes)| (path, bytes.len() as u64, ContentDigest::from_bytes(bytes)));
    builder.create_release_file(digests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DebianControl;

    fn entry(package: &str, arch: &str, description: Option<&str>) -> DebPackageEntry {
        let mut control = DebianControl::new();
        control.package = package.to_string();
        control.version = "1.0.0".to_string();
        control.architecture = arch.to_string();
        control.description = description.map(str::to_string);
        DebPackageEntry {
            control,
            pool_path: DebPackageEntry::pool_path("main", package, &format!("{package}.deb")),
            size: 1234,
            sha256: "a".repeat(64),
        }
    }

    #[test]
    fn record_fields_in_required_order() {
        let e = entry("app", "amd64", Some("Summary line\n\nmore text"));
        let rendered = render_record(&e, "pool/main/a/app/app.deb");

        let package_pos = rendered.find("Package:").unwrap();
        let version_pos = rendered.find("Version:").unwrap();
        let arch_pos = rendered.find("Architecture:").unwrap();
        let filename_pos = rendered.find("Filename:").unwrap();
        let size_pos = rendered.find("Size:").unwrap();
        let sha_pos = rendered.find("SHA256:").unwrap();
        let desc_pos = rendered.find("Description:").unwrap();

        assert!(package_pos < version_pos);
        assert!(version_pos < arch_pos);
        assert!(arch_pos < filename_pos);
        assert!(filename_pos < size_pos);
        assert!(size_pos < sha_pos);
        assert!(sha_pos < desc_pos);
    }

    #[test]
    fn description_folds_blank_lines_as_dot() {
        let folded = fold_description("Summary line\n\nmore text");
        assert_eq!(folded, "Summary line\n .\n more text");
    }

    #[test]
    fn filter_by_arch_includes_all_entries() {
        let entries = vec![entry("a", "amd64", None), entry("b", "all", None), entry("c", "arm64", None)];
        let amd64 = filter_by_arch(&entries, "amd64");
        assert_eq!(amd64.len(), 2);
        assert!(amd64.iter().any(|e| e.control.package == "a"));
        assert!(amd64.iter().any(|e| e.control.package == "b"));
    }

    #[test]
    fn filter_by_arch_all_only_returns_all_entries() {
        let entries = vec![entry("a", "amd64", None), entry("b", "all", None)];
        let all = filter_by_arch(&entries, "all");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].control.package, "b");
    }

    #[test]
    fn packages_file_separates_records_by_blank_line_and_ends_with_newline() {
        let e1 = entry("a", "amd64", None);
        let e2 = entry("b", "amd64", None);
        let rendered = render_packages_file(&[
            (&e1, "pool/main/a/a.deb".to_string()),
            (&e2, "pool/main/b/b.deb".to_string()),
        ]);

        assert!(rendered.contains("\n\n"));
        assert!(rendered.ends_with('\n'));
        assert!(!rendered.ends_with("\n\n"));
    }

    #[test]
    fn supported_architectures_includes_all() {
        let entries = vec![entry("a", "amd64", None), entry("b", "arm64", None)];
        let arches = supported_architectures(&entries);
        assert!(arches.contains("amd64"));
        assert!(arches.contains("arm64"));
        assert!(arches.contains("all"));
    }
}
