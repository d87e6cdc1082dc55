// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Build `Release`/`InRelease` files.

See <https://wiki.debian.org/DebianRepository/Format> for the format of repositories.

This module only concerns itself with the `[In]Release` control paragraph: the static
metadata fields (`Suite`, `Codename`, `Architectures`, `Components`, ...) plus the `SHA256`
digest table pointing at whatever index files a caller has already produced. Callers decide
what those index files are and where they live; this builder never reads or writes a `pool/`,
and it has no notion of a `.deb` file or a filesystem/HTTP/S3 transport.
*/

use {
    crate::{
        control::{ControlField, ControlParagraph},
        io::ContentDigest,
        repository::release::{ReleaseFile, DATE_FORMAT},
    },
    chrono::{DateTime, Utc},
    std::collections::BTreeSet,
};

/// Accumulates the static metadata fields of a `Release` file and renders it against a set
/// of already-generated index files.
///
/// Instances are constructed via [Self::new_recommended()] or [Self::new_recommended_empty()]
/// and configured with the `set_*`/`add_*` methods before calling [Self::create_release_file()].
#[derive(Debug, Default)]
pub struct ReleaseBuilder {
    architectures: BTreeSet<String>,
    components: BTreeSet<String>,
    suite: Option<String>,
    codename: Option<String>,
    date: Option<DateTime<Utc>>,
    description: Option<String>,
    origin: Option<String>,
    label: Option<String>,
    acquire_by_hash: Option<bool>,
}

impl ReleaseBuilder {
    /// Create a new instance with recommended settings.
    ///
    /// `Architectures` and `Components` are left empty; prefer [Self::new_recommended()]
    /// unless those are not yet known.
    pub fn new_recommended_empty() -> Self {
        Self {
            architectures: BTreeSet::new(),
            components: BTreeSet::new(),
            suite: None,
            codename: None,
            date: None,
            description: None,
            origin: None,
            label: None,
            acquire_by_hash: Some(true),
        }
    }

    /// Create a new instance with recommended settings and fields populated.
    pub fn new_recommended(
        architectures: impl Iterator<Item = impl ToString>,
        components: impl Iterator<Item = impl ToString>,
        suite: impl ToString,
        codename: impl ToString,
    ) -> Self {
        Self {
            architectures: BTreeSet::from_iter(architectures.map(|x| x.to_string())),
            components: BTreeSet::from_iter(components.map(|x| x.to_string())),
            suite: Some(suite.to_string()),
            codename: Some(codename.to_string()),
            ..Self::new_recommended_empty()
        }
    }

    /// Register an architecture with the builder (e.g. `all`, `amd64`, `arm64`).
    pub fn add_architecture(&mut self, arch: impl ToString) {
        self.architectures.insert(arch.to_string());
    }

    /// Register a named component with the builder (e.g. `main`).
    pub fn add_component(&mut self, name: impl ToString) {
        self.components.insert(name.to_string());
    }

    /// Set the `Suite` field.
    pub fn set_suite(&mut self, value: impl ToString) {
        self.suite = Some(value.to_string());
    }

    /// Set the `Codename` field.
    pub fn set_codename(&mut self, value: impl ToString) {
        self.codename = Some(value.to_string());
    }

    /// Set the `Date` field. Callers derive this from the release's `publishedAt` so the
    /// rendered file is reproducible across invocations rather than depending on wall time.
    pub fn set_date(&mut self, value: DateTime<Utc>) {
        self.date = Some(value);
    }

    /// Set the `Description` field.
    pub fn set_description(&mut self, value: impl ToString) {
        self.description = Some(value.to_string());
    }

    /// Set the `Origin` field.
    pub fn set_origin(&mut self, value: impl ToString) {
        self.origin = Some(value.to_string());
    }

    /// Set the `Label` field.
    pub fn set_label(&mut self, value: impl ToString) {
        self.label = Some(value.to_string());
    }

    /// Set the `Acquire-By-Hash` field.
    pub fn set_acquire_by_hash(&mut self, value: bool) {
        self.acquire_by_hash = Some(value);
    }

    /// Derive the static fields of a `Release` file, in the fixed order the format requires:
    /// `Origin, Label, Suite, Codename, Date, Architectures, Components, Description,
    /// Acquire-By-Hash`. Unlike a generic control paragraph, `Release` field order is
    /// significant to some consumers, so this is built as an ordered `Vec`, never a sorted map.
    fn static_release_fields(&self) -> Vec<ControlField<'_>> {
        let mut fields = Vec::with_capacity(9);

        if let Some(origin) = &self.origin {
            fields.push(ControlField::new("Origin".into(), origin.into()));
        }
        if let Some(label) = &self.label {
            fields.push(ControlField::new("Label".into(), label.into()));
        }
        if let Some(suite) = &self.suite {
            fields.push(ControlField::new("Suite".into(), suite.into()));
        }
        if let Some(codename) = &self.codename {
            fields.push(ControlField::new("Codename".into(), codename.into()));
        }
        if let Some(date) = &self.date {
            fields.push(ControlField::new(
                "Date".into(),
                format!("{}", date.format(DATE_FORMAT)).into(),
            ));
        }

        fields.push(ControlField::new(
            "Architectures".into(),
            self.architectures
                .iter()
                .map(|x| x.as_str())
                .collect::<Vec<_>>()
                .join(" ")
                .into(),
        ));
        fields.push(ControlField::new(
            "Components".into(),
            self.components
                .iter()
                .map(|x| x.as_str())
                .collect::<Vec<_>>()
                .join(" ")
                .into(),
        ));

        if let Some(description) = &self.description {
            fields.push(ControlField::new("Description".into(), description.into()));
        }
        if let Some(acquire_by_hash) = self.acquire_by_hash {
            fields.push(ControlField::new(
                "Acquire-By-Hash".into(),
                if acquire_by_hash { "yes" } else { "no" }.into(),
            ));
        }

        fields
    }

    /// Derive a [ReleaseFile] from the static fields plus a set of already-rendered index files.
    ///
    /// `indices` yields the canonical path of each index file (e.g. `main/binary-amd64/Packages`),
    /// its size in bytes, and the SHA-256 digest computed over its content. Every entry becomes
    /// one row of the mandatory `SHA256:` table.
    pub fn create_release_file(
        &self,
        indices: impl Iterator<Item = (String, u64, ContentDigest)>,
    ) -> ReleaseFile<'_> {
        let mut para = ControlParagraph::default();

        for field in self.static_release_fields() {
            para.add_field(field);
        }

        let rows: Vec<String> = indices
            .map(|(path, size, digest)| {
                format!("{} {:<8} {}", digest.digest_hex(), size, path)
            })
            .collect();

        para.add_field(ControlField::from_lines(
            "SHA256".into(),
            std::iter::once(String::new()).chain(rows),
        ));

        para.into()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn static_fields_in_required_order() {
        let mut builder = ReleaseBuilder::new_recommended(
            ["amd64", "all"].iter(),
            ["main"].iter(),
            "stable",
            "bookworm",
        );
        builder.set_origin("example/repo");
        builder.set_label("repo");
        builder.set_acquire_by_hash(true);

        let names: Vec<_> = builder
            .static_release_fields()
            .iter()
            .map(|f| f.name().to_string())
            .collect();

        assert_eq!(
            names,
            vec![
                "Origin",
                "Label",
                "Suite",
                "Codename",
                "Architectures",
                "Components",
                "Acquire-By-Hash",
            ]
        );
    }

    #[test]
    fn release_file_renders_digest_table() {
        let mut builder = ReleaseBuilder::new_recommended_empty();
        builder.add_architecture("amd64");
        builder.add_component("main");

        let digest = ContentDigest::from_bytes(b"Package: foo\n");

        let release = builder.create_release_file(std::iter::once((
            "main/binary-amd64/Packages".to_string(),
            13u64,
            digest.clone(),
        )));

        let text = release.to_string();
        assert!(text.contains("SHA256:"));
        assert!(text.contains("main/binary-amd64/Packages"));
        assert!(text.contains(&digest.digest_hex()));
    }
}
