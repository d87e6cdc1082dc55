// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Emit `repomd.xml`, `primary.xml`, `filelists.xml`, and `other.xml`.
//!
//! Hand-rolled string building, the same discipline `debian_packaging::repository::builder`
//! uses for the `Release` file: deterministic field order and byte-exact reproducibility are
//! easier to guarantee directly than through a generic `Serialize` impl. `rpm_repository`'s
//! `serde`-derived structs are the read-side/structural reference these functions' output is
//! round-tripped against in tests, not the write path itself.

use debian_packaging::io::sha256_hex;

use crate::model::RpmPackageEntry;
use crate::xml::escape;

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Revision shared by `repomd.xml` and all three `<data>` blocks: `floor(publishedAt/1000)`.
pub fn revision_from_published_at(published_at: chrono::DateTime<chrono::Utc>) -> i64 {
    published_at.timestamp()
}

/// Render `primary.xml`.
pub fn primary_xml(entries: &[RpmPackageEntry]) -> String {
    let mut out = String::new();
    out.push_str(XML_HEADER);
    out.push('\n');
    out.push_str(&format!(
        "<metadata xmlns=\"http://linux.duke.edu/metadata/common\" xmlns:rpm=\"http://linux.duke.edu/metadata/rpm\" packages=\"{}\">\n",
        entries.len()
    ));

    for entry in entries {
        out.push_str(&render_package(entry));
    }

    out.push_str("</metadata>\n");
    out
}

fn render_package(entry: &RpmPackageEntry) -> String {
    let h = &entry.header;
    let (checksum_type, checksum_value, pkgid) = match &entry.checksum {
        Some(c) => ("sha256", c.as_str(), "YES"),
        None => ("sha256", "", "NO"),
    };

    let mut out = String::new();
    out.push_str("  <package type=\"rpm\">\n");
    out.push_str(&format!("    <name>{}</name>\n", escape(&h.name)));
    out.push_str(&format!("    <arch>{}</arch>\n", escape(&h.arch)));
    out.push_str(&format!(
        "    <version epoch=\"{}\" ver=\"{}\" rel=\"{}\"/>\n",
        h.epoch,
        escape(&h.version),
        escape(&h.release)
    ));
    out.push_str(&format!(
        "    <checksum type=\"{checksum_type}\" pkgid=\"{pkgid}\">{}</checksum>\n",
        escape(checksum_value)
    ));
    out.push_str(&format!("    <summary>{}</summary>\n", escape(&h.summary)));
    out.push_str(&format!(
        "    <description>{}</description>\n",
        escape(&h.description)
    ));
    if let Some(packager) = &h.packager {
        out.push_str(&format!("    <packager>{}</packager>\n", escape(packager)));
    }
    if let Some(url) = &h.url {
        out.push_str(&format!("    <url>{}</url>\n", escape(url)));
    }
    out.push_str(&format!(
        "    <time file=\"{}\" build=\"{}\"/>\n",
        h.build_time, h.build_time
    ));
    out.push_str(&format!(
        "    <size package=\"{}\" installed=\"0\" archive=\"0\"/>\n",
        entry.size
    ));
    out.push_str(&format!(
        "    <location href=\"Packages/{}\"/>\n",
        escape(&entry.filename)
    ));

    out.push_str("    <format>\n");
    if let Some(license) = &h.license {
        out.push_str(&format!("      <rpm:license>{}</rpm:license>\n", escape(license)));
    }
    if let Some(vendor) = &h.vendor {
        out.push_str(&format!("      <rpm:vendor>{}</rpm:vendor>\n", escape(vendor)));
    }
    if let Some(group) = &h.group {
        out.push_str(&format!("      <rpm:group>{}</rpm:group>\n", escape(group)));
    }
    if let Some(source_rpm) = &h.source_rpm {
        out.push_str(&format!(
            "      <rpm:sourcerpm>{}</rpm:sourcerpm>\n",
            escape(source_rpm)
        ));
    }
    render_entry_list(&mut out, "rpm:requires", &h.requires);
    render_entry_list(&mut out, "rpm:provides", &h.provides);
    out.push_str("    </format>\n");

    out.push_str("  </package>\n");
    out
}

fn render_entry_list(out: &mut String, tag: &str, names: &[String]) {
    if names.is_empty() {
        return;
    }
    out.push_str(&format!("      <{tag}>\n"));
    for name in names {
        out.push_str(&format!(
            "        <rpm:entry name=\"{}\"/>\n",
            escape(name)
        ));
    }
    out.push_str(&format!("      </{tag}>\n"));
}

/// Render `filelists.xml`.
pub fn filelists_xml(entries: &[RpmPackageEntry]) -> String {
    let mut out = String::new();
    out.push_str(XML_HEADER);
    out.push('\n');
    out.push_str(&format!(
        "<filelists xmlns=\"http://linux.duke.edu/metadata/filelists\" packages=\"{}\">\n",
        entries.len()
    ));

    for entry in entries {
        let h = &entry.header;
        out.push_str(&format!(
            "  <package pkgid=\"{}\" name=\"{}\" arch=\"{}\">\n",
            escape(entry.checksum.as_deref().unwrap_or("")),
            escape(&h.name),
            escape(&h.arch)
        ));
        out.push_str(&format!(
            "    <version epoch=\"{}\" ver=\"{}\" rel=\"{}\"/>\n",
            h.epoch,
            escape(&h.version),
            escape(&h.release)
        ));
        for file in &h.files {
            out.push_str(&format!("    <file>{}</file>\n", escape(file)));
        }
        out.push_str("  </package>\n");
    }

    out.push_str("</filelists>\n");
    out
}

/// Render `other.xml`: changelog entries per package.
pub fn other_xml(entries: &[RpmPackageEntry]) -> String {
    let mut out = String::new();
    out.push_str(XML_HEADER);
    out.push('\n');
    out.push_str(&format!(
        "<otherdata xmlns=\"http://linux.duke.edu/metadata/other\" packages=\"{}\">\n",
        entries.len()
    ));

    for entry in entries {
        let h = &entry.header;
        out.push_str(&format!(
            "  <package pkgid=\"{}\" name=\"{}\" arch=\"{}\">\n",
            escape(entry.checksum.as_deref().unwrap_or("")),
            escape(&h.name),
            escape(&h.arch)
        ));
        out.push_str(&format!(
            "    <version epoch=\"{}\" ver=\"{}\" rel=\"{}\"/>\n",
            h.epoch,
            escape(&h.version),
            escape(&h.release)
        ));
        for change in &h.changelog {
            out.push_str(&format!(
                "    <changelog author=\"{}\" date=\"{}\">{}</changelog>\n",
                escape(&change.author),
                change.time,
                escape(&change.text)
            ));
        }
        out.push_str("  </package>\n");
    }

    out.push_str("</otherdata>\n");
    out
}

/// The three open/gzipped XML streams `repomd.xml` cross-references.
pub struct RepomdPart<'a> {
    pub data_type: &'a str,
    pub open_xml: &'a [u8],
    pub gz_xml: &'a [u8],
}

/// Render `repomd.xml`: three `<data>` blocks, each with open and gzipped checksums/sizes, all
/// sharing the same `revision`/`timestamp`.
pub fn repomd_xml(revision: i64, parts: &[RepomdPart<'_>]) -> String {
    let mut out = String::new();
    out.push_str(XML_HEADER);
    out.push('\n');
    out.push_str("<repomd xmlns=\"http://linux.duke.edu/metadata/repo\" xmlns:rpm=\"http://linux.duke.edu/metadata/rpm\">\n");
    out.push_str(&format!("  <revision>{revision}</revision>\n"));

    for part in parts {
        let open_checksum = sha256_hex(part.open_xml);
        let gz_checksum = sha256_hex(part.gz_xml);

        out.push_str(&format!("  <data type=\"{}\">\n", part.data_type));
        out.push_str(&format!(
            "    <checksum type=\"sha256\">{gz_checksum}</checksum>\n"
        ));
        out.push_str(&format!(
            "    <open-checksum type=\"sha256\">{open_checksum}</open-checksum>\n"
        ));
        out.push_str(&format!(
            "    <location href=\"repodata/{}.xml.gz\"/>\n",
            part.data_type
        ));
        out.push_str(&format!("    <timestamp>{revision}</timestamp>\n"));
        out.push_str(&format!("    <size>{}</size>\n", part.gz_xml.len()));
        out.push_str(&format!("    <open-size>{}</open-size>\n", part.open_xml.len()));
        out.push_str("  </data>\n");
    }

    out.push_str("</repomd>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RpmHeader;
    use debian_packaging::io::gzip_compress;

    fn package(name: &str) -> RpmPackageEntry {
        RpmPackageEntry {
            header: RpmHeader {
                name: name.to_string(),
                version: "1.0".to_string(),
                release: "1".to_string(),
                epoch: 0,
                summary: "a summary".to_string(),
                description: "a description".to_string(),
                arch: "x86_64".to_string(),
                files: vec!["/usr/bin/app".to_string()],
                ..Default::default()
            },
            filename: format!("{name}-1.0-1.x86_64.rpm"),
            size: 4096,
            checksum: Some("a".repeat(64)),
        }
    }

    #[test]
    fn primary_xml_contains_package_fields() {
        let xml = primary_xml(&[package("example")]);
        assert!(xml.contains("<name>example</name>"));
        assert!(xml.contains("<arch>x86_64</arch>"));
        assert!(xml.contains("pkgid=\"YES\""));
        assert!(xml.contains("packages=\"1\""));
    }

    #[test]
    fn filelists_xml_lists_files() {
        let xml = filelists_xml(&[package("example")]);
        assert!(xml.contains("<file>/usr/bin/app</file>"));
    }

    #[test]
    fn other_xml_without_changelog_has_no_entries() {
        let xml = other_xml(&[package("example")]);
        assert!(!xml.contains("<changelog"));
    }

    #[test]
    fn repomd_shares_revision_across_blocks_and_cross_hashes() {
        let open = primary_xml(&[package("example")]);
        let gz = gzip_compress(open.as_bytes());
        let parts = vec![RepomdPart {
            data_type: "primary",
            open_xml: open.as_bytes(),
            gz_xml: &gz,
        }];

        let xml = repomd_xml(1_700_000_000, &parts);
        assert_eq!(xml.matches("<revision>1700000000</revision>").count(), 1);
        assert_eq!(xml.matches("<timestamp>1700000000</timestamp>").count(), 1);
        assert!(xml.contains(&format!("<size>{}</size>", gz.len())));
        assert!(xml.contains(&format!("<open-size>{}</open-size>", open.len())));
    }

    #[test]
    fn repomd_is_byte_identical_across_regeneration() {
        let open = primary_xml(&[package("example")]);
        let gz = gzip_compress(open.as_bytes());
        let parts = vec![RepomdPart {
            data_type: "primary",
            open_xml: open.as_bytes(),
            gz_xml: &gz,
        }];

        let first = repomd_xml(42, &parts);
        let second = repomd_xml(42, &parts);
        assert_eq!(first, second);
    }
}
