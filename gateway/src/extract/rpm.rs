// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RPM lead + header section parsing.
//!
//! Hand-rolled rather than built on an `rpm`-family crate: the available ones either pull in a
//! much larger surface (full package building/signing) than a read-only header extractor needs,
//! or are unmaintained. The binary format itself is small and stable (it predates the RPM v4
//! XML-metadata era this gateway otherwise targets), so parsing it directly against a
//! range-fetched buffer, in the same spirit as [crate::extract::ar] and [crate::extract::tar],
//! keeps the failure modes explicit.

use byteorder::{BigEndian, ReadBytesExt};
use reqwest::header::{ACCEPT, RANGE};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::io::Cursor;

use crate::error::{Error, Result};
use crate::model::{ChangelogEntry, RpmHeader};

/// How much of an `.rpm` to range-fetch. The lead, signature header, and main header (with file
/// lists and a truncated changelog) fit in this for the overwhelming majority of packages -- the
/// main header itself is typically much smaller than the control archive of a `.deb` but carries
/// more tag data up front, hence the larger budget than [crate::extract::deb::RANGE_FETCH_BYTES].
pub const RANGE_FETCH_BYTES: u64 = 262_144;

/// Fetch the leading `RANGE_FETCH_BYTES` of `url` via an HTTP `Range` request. Identical
/// acceptance rules to [crate::extract::deb::fetch_prefix]: both `206` and a `200` that ignored
/// the `Range` header count as success.
pub async fn fetch_prefix(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let response = client
        .get(url)
        .header(RANGE, format!("bytes=0-{}", RANGE_FETCH_BYTES - 1))
        .header(ACCEPT, "application/octet-stream")
        .send()
        .await
        .map_err(|e| Error::UpstreamFetch(format!("{url}: {e}")))?;

    match response.status() {
        StatusCode::OK | StatusCode::PARTIAL_CONTENT => {}
        other => {
            return Err(Error::UpstreamFetch(format!(
                "{url}: unexpected status {other}"
            )))
        }
    }

    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| Error::UpstreamFetch(format!("{url}: {e}")))
}

const LEAD_MAGIC: [u8; 4] = [0xED, 0xAB, 0xEE, 0xDB];
const LEAD_LEN: usize = 96;
const HEADER_MAGIC: [u8; 3] = [0x8E, 0xAD, 0xE8];
const INDEX_ENTRY_LEN: usize = 16;

const TAG_NAME: u32 = 1000;
const TAG_VERSION: u32 = 1001;
const TAG_RELEASE: u32 = 1002;
const TAG_EPOCH: u32 = 1003;
const TAG_SUMMARY: u32 = 1004;
const TAG_DESCRIPTION: u32 = 1005;
const TAG_BUILDTIME: u32 = 1006;
const TAG_VENDOR: u32 = 1011;
const TAG_LICENSE: u32 = 1014;
const TAG_PACKAGER: u32 = 1015;
const TAG_GROUP: u32 = 1016;
const TAG_URL: u32 = 1020;
const TAG_ARCH: u32 = 1022;
const TAG_SOURCERPM: u32 = 1044;
const TAG_PROVIDENAME: u32 = 1047;
const TAG_REQUIRENAME: u32 = 1049;
const TAG_CONFLICTNAME: u32 = 1054;
const TAG_CHANGELOGTIME: u32 = 1080;
const TAG_CHANGELOGNAME: u32 = 1081;
const TAG_CHANGELOGTEXT: u32 = 1082;
const TAG_OBSOLETENAME: u32 = 1090;
const TAG_DIRINDEXES: u32 = 1116;
const TAG_BASENAMES: u32 = 1117;
const TAG_DIRNAMES: u32 = 1118;

const TYPE_INT32: u32 = 4;
const TYPE_STRING: u32 = 6;
const TYPE_STRING_ARRAY: u32 = 8;
const TYPE_I18NSTRING: u32 = 9;

#[derive(Debug)]
enum Value {
    Int32(Vec<i32>),
    String(String),
    StringArray(Vec<String>),
}

struct IndexEntry {
    tag: u32,
    ty: u32,
    offset: u32,
    count: u32,
}

/// Parse an RPM's lead and both header sections (signature, then main), returning the decoded
/// fields from the main header as an [RpmHeader].
pub fn parse(data: &[u8]) -> Result<RpmHeader> {
    if data.len() < 4 || data[0..4] != LEAD_MAGIC {
        return Err(Error::CorruptArchive("missing RPM lead magic".to_string()));
    }
    if data.len() < LEAD_LEN {
        return Err(Error::CorruptArchive("truncated RPM lead".to_string()));
    }

    let mut pos = LEAD_LEN;
    let (sig_len, sig_values) = parse_header_section(data, pos)?;
    let _ = sig_values;
    pos += sig_len;
    pos += padding_to_8(pos - LEAD_LEN);

    let (_, values) = parse_header_section(data, pos)?;

    Ok(build_header(&values))
}

/// Parse one header section starting at `start`, returning its total on-disk length (magic
/// through the end of the data blob) and its decoded tag values.
fn parse_header_section(data: &[u8], start: usize) -> Result<(usize, HashMap<u32, Value>)> {
    if start + 16 > data.len() {
        return Err(Error::CorruptArchive(
            "truncated RPM header section prelude".to_string(),
        ));
    }
    if data[start..start + 3] != HEADER_MAGIC {
        return Err(Error::CorruptArchive(
            "missing RPM header section magic".to_string(),
        ));
    }

    let mut cursor = Cursor::new(&data[start + 8..start + 16]);
    let nindex = cursor
        .read_u32::<BigEndian>()
        .map_err(|_| Error::CorruptArchive("bad RPM header index count".to_string()))? as usize;
    let hsize = cursor
        .read_u32::<BigEndian>()
        .map_err(|_| Error::CorruptArchive("bad RPM header data size".to_string()))? as usize;

    let index_start = start + 16;
    let index_len = nindex
        .checked_mul(INDEX_ENTRY_LEN)
        .ok_or_else(|| Error::CorruptArchive("RPM header index count overflow".to_string()))?;
    let data_start = index_start
        .checked_add(index_len)
        .ok_or_else(|| Error::CorruptArchive("RPM header index length overflow".to_string()))?;
    let data_end = data_start
        .checked_add(hsize)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| {
            Error::CorruptArchive("RPM header data size exceeds buffer".to_string())
        })?;

    let mut entries = Vec::with_capacity(nindex);
    for i in 0..nindex {
        let entry_start = index_start + i * INDEX_ENTRY_LEN;
        let mut cursor = Cursor::new(&data[entry_start..entry_start + INDEX_ENTRY_LEN]);
        let tag = cursor.read_u32::<BigEndian>().unwrap();
        let ty = cursor.read_u32::<BigEndian>().unwrap();
        let offset = cursor.read_u32::<BigEndian>().unwrap();
        let count = cursor.read_u32::<BigEndian>().unwrap();
        entries.push(IndexEntry {
            tag,
            ty,
            offset,
            count,
        });
    }

    let blob = &data[data_start..data_end];
    let mut values = HashMap::new();
    for entry in entries {
        if let Some(value) = decode_entry(blob, &entry)? {
            values.insert(entry.tag, value);
        }
    }

    Ok((data_end - start, values))
}

fn decode_entry(blob: &[u8], entry: &IndexEntry) -> Result<Option<Value>> {
    let offset = entry.offset as usize;
    if offset > blob.len() {
        return Err(Error::CorruptArchive(
            "RPM index entry offset exceeds header data".to_string(),
        ));
    }
    let rest = &blob[offset..];

    match entry.ty {
        TYPE_INT32 => {
            let mut values = Vec::with_capacity(entry.count as usize);
            let mut cursor = Cursor::new(rest);
            for _ in 0..entry.count {
                let v = cursor
                    .read_i32::<BigEndian>()
                    .map_err(|_| Error::CorruptArchive("truncated RPM INT32 value".to_string()))?;
                values.push(v);
            }
            Ok(Some(Value::Int32(values)))
        }
        TYPE_STRING | TYPE_I18NSTRING => {
            let s = read_cstring(rest)?;
            Ok(Some(Value::String(s)))
        }
        TYPE_STRING_ARRAY => {
            let mut strings = Vec::with_capacity(entry.count as usize);
            let mut pos = 0;
            for _ in 0..entry.count {
                let s = read_cstring(&rest[pos..])?;
                pos += s.len() + 1;
                strings.push(s);
            }
            Ok(Some(Value::StringArray(strings)))
        }
        _ => Ok(None),
    }
}

fn read_cstring(bytes: &[u8]) -> Result<String> {
    let end = bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::CorruptArchive("unterminated RPM string value".to_string()))?;
    Ok(String::from_utf8_lossy(&bytes[..end]).to_string())
}

fn padding_to_8(len: usize) -> usize {
    (8 - (len % 8)) % 8
}

fn build_header(values: &HashMap<u32, Value>) -> RpmHeader {
    let string = |tag: u32| -> Option<String> {
        match values.get(&tag) {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        }
    };
    let string_array = |tag: u32| -> Vec<String> {
        match values.get(&tag) {
            Some(Value::StringArray(v)) => v.clone(),
            _ => Vec::new(),
        }
    };
    let int32_single = |tag: u32| -> Option<i32> {
        match values.get(&tag) {
            Some(Value::Int32(v)) => v.first().copied(),
            _ => None,
        }
    };

    let epoch = int32_single(TAG_EPOCH).unwrap_or(0).max(0) as u64;
    let build_time = int32_single(TAG_BUILDTIME).unwrap_or(0) as i64;

    let basenames = string_array(TAG_BASENAMES);
    let dirnames = string_array(TAG_DIRNAMES);
    let dirindexes: Vec<i32> = match values.get(&TAG_DIRINDEXES) {
        Some(Value::Int32(v)) => v.clone(),
        _ => Vec::new(),
    };

    let files = basenames
        .iter()
        .enumerate()
        .map(|(i, base)| {
            let dir_idx = dirindexes.get(i).copied().unwrap_or(0) as usize;
            let dir = dirnames.get(dir_idx).map(String::as_str).unwrap_or("");
            format!("{dir}{base}")
        })
        .collect();

    let changelog_times: Vec<i64> = match values.get(&TAG_CHANGELOGTIME) {
        Some(Value::Int32(v)) => v.iter().map(|&t| t as i64).collect(),
        _ => Vec::new(),
    };
    let changelog_names = string_array(TAG_CHANGELOGNAME);
    let changelog_texts = string_array(TAG_CHANGELOGTEXT);
    let changelog_len = changelog_times
        .len()
        .min(changelog_names.len())
        .min(changelog_texts.len())
        .min(10);
    let changelog = (0..changelog_len)
        .map(|i| ChangelogEntry {
            time: changelog_times[i],
            author: changelog_names[i].clone(),
            text: changelog_texts[i].clone(),
        })
        .collect();

    RpmHeader {
        name: string(TAG_NAME).unwrap_or_default(),
        version: string(TAG_VERSION).unwrap_or_default(),
        release: string(TAG_RELEASE).unwrap_or_default(),
        epoch,
        summary: string(TAG_SUMMARY).unwrap_or_default(),
        description: string(TAG_DESCRIPTION).unwrap_or_default(),
        arch: string(TAG_ARCH).unwrap_or_default(),
        license: string(TAG_LICENSE),
        group: string(TAG_GROUP),
        url: string(TAG_URL),
        vendor: string(TAG_VENDOR),
        packager: string(TAG_PACKAGER),
        build_time,
        source_rpm: string(TAG_SOURCERPM),
        requires: string_array(TAG_REQUIRENAME),
        provides: string_array(TAG_PROVIDENAME),
        conflicts: string_array(TAG_CONFLICTNAME),
        obsoletes: string_array(TAG_OBSOLETENAME),
        files,
        changelog,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_section(entries: &[(u32, u32, Vec<u8>)]) -> Vec<u8> {
        let mut index = Vec::new();
        let mut blob = Vec::new();

        for (tag, ty, bytes) in entries {
            let offset = blob.len() as u32;
            index.extend_from_slice(&tag.to_be_bytes());
            index.extend_from_slice(&ty.to_be_bytes());
            index.extend_from_slice(&offset.to_be_bytes());
            let count: u32 = match *ty {
                TYPE_STRING | TYPE_I18NSTRING => 1,
                TYPE_INT32 => (bytes.len() / 4) as u32,
                _ => 1,
            };
            index.extend_from_slice(&count.to_be_bytes());
            blob.extend_from_slice(bytes);
        }

        let mut out = Vec::new();
        out.extend_from_slice(&HEADER_MAGIC);
        out.push(1);
        out.extend_from_slice(&[0u8; 4]);
        out.extend_from_slice(&(entries.len() as u32).to_be_bytes());
        out.extend_from_slice(&(blob.len() as u32).to_be_bytes());
        out.extend(index);
        out.extend(blob);
        out
    }

    fn cstr(s: &str) -> Vec<u8> {
        let mut v = s.as_bytes().to_vec();
        v.push(0);
        v
    }

    fn full_rpm(main_header: &[u8]) -> Vec<u8> {
        let mut out = LEAD_MAGIC.to_vec();
        out.resize(LEAD_LEN, 0);

        let sig = header_section(&[]);
        out.extend(&sig);
        let pad = padding_to_8(sig.len());
        out.extend(vec![0u8; pad]);

        out.extend(main_header);
        out
    }

    #[test]
    fn rejects_missing_lead_magic() {
        let err = parse(b"not an rpm at all, padded out").unwrap_err();
        assert!(matches!(err, Error::CorruptArchive(_)));
    }

    #[test]
    fn parses_name_version_release() {
        let main = header_section(&[
            (TAG_NAME, TYPE_STRING, cstr("example")),
            (TAG_VERSION, TYPE_STRING, cstr("1.2.3")),
            (TAG_RELEASE, TYPE_STRING, cstr("1")),
            (TAG_ARCH, TYPE_STRING, cstr("x86_64")),
        ]);
        let data = full_rpm(&main);

        let header = parse(&data).unwrap();
        assert_eq!(header.name, "example");
        assert_eq!(header.version, "1.2.3");
        assert_eq!(header.release, "1");
        assert_eq!(header.arch, "x86_64");
    }

    #[test]
    fn synthesizes_file_list_from_dirnames_and_basenames() {
        let mut dirindexes_bytes = Vec::new();
        dirindexes_bytes.extend_from_slice(&0i32.to_be_bytes());
        dirindexes_bytes.extend_from_slice(&1i32.to_be_bytes());

        let mut basenames_blob = Vec::new();
        basenames_blob.extend(cstr("binary"));
        basenames_blob.extend(cstr("config.conf"));

        let mut dirnames_blob = Vec::new();
        dirnames_blob.extend(cstr("/usr/bin/"));
        dirnames_blob.extend(cstr("/etc/example/"));

        let main = header_section(&[
            (TAG_NAME, TYPE_STRING, cstr("example")),
            (TAG_BASENAMES, TYPE_STRING_ARRAY, basenames_blob),
            (TAG_DIRNAMES, TYPE_STRING_ARRAY, dirnames_blob),
            (TAG_DIRINDEXES, TYPE_INT32, dirindexes_bytes),
        ]);
        let data = full_rpm(&main);

        let header = parse(&data).unwrap();
        assert_eq!(
            header.files,
            vec!["/usr/bin/binary".to_string(), "/etc/example/config.conf".to_string()]
        );
    }

    #[test]
    fn changelog_is_truncated_to_shortest_array_and_capped_at_ten() {
        let mut times = Vec::new();
        for t in 0..3i32 {
            times.extend_from_slice(&t.to_be_bytes());
        }
        let mut names_blob = Vec::new();
        names_blob.extend(cstr("alice"));
        names_blob.extend(cstr("bob"));

        let main = header_section(&[
            (TAG_CHANGELOGTIME, TYPE_INT32, times),
            (TAG_CHANGELOGNAME, TYPE_STRING_ARRAY, names_blob),
            (TAG_CHANGELOGTEXT, TYPE_STRING_ARRAY, {
                let mut b = Vec::new();
                b.extend(cstr("did a thing"));
                b.extend(cstr("did another"));
                b
            }),
        ]);
        let data = full_rpm(&main);

        let header = parse(&data).unwrap();
        assert_eq!(header.changelog.len(), 2);
        assert_eq!(header.changelog[0].author, "alice");
    }
}
