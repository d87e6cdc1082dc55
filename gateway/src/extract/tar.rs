// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! POSIX/UStar tar parsing.
//!
//! The decompressed `control.tar` member is a bounded in-memory buffer, parsed with the same
//! `tar` crate `debian-packaging`'s writer uses for the equivalent byte layout.

use std::io::{Cursor, Read};

use crate::error::{Error, Result};

/// A regular file extracted from a tar archive.
pub struct TarEntry {
    pub name: String,
    pub data: Vec<u8>,
}

/// Parse a tar archive, returning only its regular-file entries.
///
/// Directories, GNU long-name headers, and POSIX extended headers (`pax`/global) are resolved
/// and skipped by the underlying reader; only plain files are surfaced here.
pub fn parse(data: &[u8]) -> Result<Vec<TarEntry>> {
    let mut archive = tar::Archive::new(Cursor::new(data));
    let mut entries = Vec::new();

    let raw_entries = archive
        .entries()
        .map_err(|e| Error::CorruptArchive(format!("bad tar header: {e}")))?;

    for entry in raw_entries {
        let mut entry = entry.map_err(|e| Error::CorruptArchive(format!("bad tar entry: {e}")))?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry
            .path()
            .map_err(|e| Error::CorruptArchive(format!("bad tar entry path: {e}")))?
            .to_string_lossy()
            .into_owned();
        let name = path.strip_prefix("./").map(str::to_string).unwrap_or(path);

        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(|e| Error::CorruptArchive(format!("tar entry {name:?}: {e}")))?;

        entries.push(TarEntry { name, data: content });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append(builder: &mut tar::Builder<Vec<u8>>, path: &str, entry_type: tar::EntryType, data: &[u8]) {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_entry_type(entry_type);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        builder.append_data(&mut header, path, data).unwrap();
    }

    #[test]
    fn parses_single_regular_file() {
        let mut builder = tar::Builder::new(Vec::new());
        append(&mut builder, "control", tar::EntryType::Regular, b"Package: foo\n");
        let data = builder.into_inner().unwrap();

        let entries = parse(&data).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "control");
        assert_eq!(entries[0].data, b"Package: foo\n");
    }

    #[test]
    fn strips_leading_dot_slash() {
        let mut builder = tar::Builder::new(Vec::new());
        append(&mut builder, "./control", tar::EntryType::Regular, b"data");
        let data = builder.into_inner().unwrap();

        let entries = parse(&data).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "control");
    }

    #[test]
    fn long_path_uses_gnu_long_name_extension() {
        let long_name = format!("usr/share/doc/{}/control", "u".repeat(200));

        let mut builder = tar::Builder::new(Vec::new());
        append(&mut builder, &long_name, tar::EntryType::Regular, b"payload");
        let data = builder.into_inner().unwrap();

        let entries = parse(&data).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, long_name);
        assert_eq!(entries[0].data, b"payload");
    }

    #[test]
    fn skips_directories_and_extended_headers() {
        let mut builder = tar::Builder::new(Vec::new());
        append(&mut builder, "usr/", tar::EntryType::Directory, b"");
        append(&mut builder, "control", tar::EntryType::Regular, b"Package: foo\n");
        let data = builder.into_inner().unwrap();

        let entries = parse(&data).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "control");
    }
}
