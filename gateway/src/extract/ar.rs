// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! AR archive parsing.
//!
//! `.deb` files are AR archives -- the same format `debian-packaging`'s `.deb` writer produces
//! with the `ar` crate (`ar::Builder`/`ar::Header`). This is the reading counterpart, built on
//! the same crate rather than a hand-rolled header parser.

use std::io::{Cursor, Read};

use crate::error::{Error, Result};

/// One member of an AR archive.
pub struct ArMember {
    pub name: String,
    pub data: Vec<u8>,
}

/// Parse an AR archive, returning its members in order.
///
/// Fails with [Error::CorruptArchive] if the global magic is absent, a member header is
/// malformed, or a member's reported size would read past the end of `data`.
pub fn parse(data: &[u8]) -> Result<Vec<ArMember>> {
    let mut archive = ar::Archive::new(Cursor::new(data));
    let mut members = Vec::new();

    while let Some(entry) = archive.next_entry() {
        let mut entry =
            entry.map_err(|e| Error::CorruptArchive(format!("bad AR member header: {e}")))?;
        let name = String::from_utf8_lossy(entry.header().identifier()).into_owned();

        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(|e| Error::CorruptArchive(format!("AR member {name:?}: {e}")))?;

        members.push(ArMember { name, data: content });
    }

    Ok(members)
}

/// Locate the member whose name matches `^control\.tar` (optionally followed by a compression
/// suffix).
pub fn find_control_tar(members: &[ArMember]) -> Option<&ArMember> {
    members
        .iter()
        .find(|m| m.name == "control.tar" || m.name.starts_with("control.tar."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = ar::Builder::new(Vec::new());
        for (name, data) in members {
            let header = ar::Header::new(name.as_bytes().to_vec(), data.len() as u64);
            builder.append(&header, Cursor::new(*data)).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn rejects_missing_global_magic() {
        let err = parse(b"not an archive").unwrap_err();
        assert!(matches!(err, Error::CorruptArchive(_)));
    }

    #[test]
    fn parses_simple_members() {
        let data = archive(&[("debian-binary", b"2.0\n"), ("control.tar.gz", b"stubdata")]);
        let members = parse(&data).unwrap();

        assert_eq!(members.len(), 2);
        assert_eq!(members[0].name, "debian-binary");
        assert_eq!(members[0].data, b"2.0\n");
        assert_eq!(members[1].name, "control.tar.gz");
        assert_eq!(members[1].data, b"stubdata");
    }

    #[test]
    fn odd_sized_member_is_padded() {
        let data = archive(&[("a", b"odd"), ("b", b"next")]);
        let members = parse(&data).unwrap();

        assert_eq!(members.len(), 2);
        assert_eq!(members[0].data, b"odd");
        assert_eq!(members[1].name, "b");
        assert_eq!(members[1].data, b"next");
    }

    #[test]
    fn truncated_archive_fails_clearly() {
        let data = archive(&[("control.tar", b"short")]);
        let mut truncated = data.clone();
        truncated.truncate(data.len() - 2);

        let err = parse(&truncated).unwrap_err();
        assert!(matches!(err, Error::CorruptArchive(_)));
    }

    #[test]
    fn finds_control_tar_member_by_suffix() {
        let data = archive(&[("debian-binary", b"2.0\n"), ("control.tar.xz", b"xzdata")]);
        let members = parse(&data).unwrap();
        let found = find_control_tar(&members).unwrap();
        assert_eq!(found.name, "control.tar.xz");
    }
}
