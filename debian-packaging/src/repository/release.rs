// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The `Release`/`InRelease` data model.

See <https://wiki.debian.org/DebianRepository/Format#A.22Release.22_files> for the format.

This only models what [crate::repository::builder::ReleaseBuilder] needs to produce a
`Release` paragraph and what the signing layer needs to wrap it: the exact HTTP-date format
the `Date` field uses, the one digest flavor this gateway emits, and a thin wrapper around
the underlying [ControlParagraph] so callers get a named type instead of a bare paragraph.
*/

use {
    crate::control::ControlParagraph,
    std::ops::{Deref, DerefMut},
};

/// The `strftime`-style format for the `Date` field.
///
/// Always rendered against a UTC instant, so the offset is the literal `GMT` suffix rather
/// than a computed `%z`, matching the RFC 7231 HTTP-date examples in the format's
/// documentation (e.g. `Mon, 15 Jan 2024 12:30:45 GMT`).
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// The checksum flavors a `Release` file's digest tables can hold.
///
/// The original format supports `MD5Sum`/`SHA1`/`SHA256` fields; this gateway only ever
/// emits the `SHA256` table.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ChecksumType {
    Sha256,
}

impl ChecksumType {
    /// The control field name this checksum's digest table is filed under.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Sha256 => "SHA256",
        }
    }
}

/// A `Release` (or `InRelease`) file: a single control paragraph holding repository metadata
/// and file digest tables.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReleaseFile<'a>(ControlParagraph<'a>);

impl<'a> From<ControlParagraph<'a>> for ReleaseFile<'a> {
    fn from(p: ControlParagraph<'a>) -> Self {
        Self(p)
    }
}

impl<'a> From<ReleaseFile<'a>> for ControlParagraph<'a> {
    fn from(r: ReleaseFile<'a>) -> Self {
        r.0
    }
}

impl<'a> Deref for ReleaseFile<'a> {
    type Target = ControlParagraph<'a>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'a> DerefMut for ReleaseFile<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_field_names() {
        assert_eq!(ChecksumType::Sha256.field_name(), "SHA256");
    }

    #[test]
    fn release_file_wraps_paragraph() {
        let mut para = ControlParagraph::default();
        para.set_field_from_string("Origin".into(), "example/repo".into());

        let release: ReleaseFile = para.into();
        assert_eq!(release.field_str("Origin"), Some("example/repo"));

        let para: ControlParagraph = release.into();
        assert!(para.has_field("Origin"));
    }
}
