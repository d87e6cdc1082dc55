// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Turn a `.deb` asset into a [DebianControl]: range-fetch just enough of the file to read its
//! control member, then AR-unpack, decompress, tar-unpack, and control-file-parse it.

use debian_packaging::control::ControlFile;
use debian_packaging::io::{decompress_bounded, Compression};
use reqwest::header::{ACCEPT, RANGE};
use reqwest::StatusCode;

use crate::error::{Error, Result};
use crate::extract::{ar, tar};
use crate::model::DebianControl;

/// How much of a `.deb` to range-fetch. Control members are a few KiB; this comfortably covers
/// the AR global header, the `debian-binary` member, and the `control.tar*` member for every
/// package observed in practice, while staying far short of downloading the whole artifact.
pub const RANGE_FETCH_BYTES: u64 = 65_536;

/// Fetch the leading `RANGE_FETCH_BYTES` of `url` via an HTTP `Range` request.
///
/// Accepts both `206 Partial Content` (the expected case) and `200 OK` (a server that ignored
/// the `Range` header and returned the whole body, which is a deliberately separate artifact
/// class from failure -- see testable property #5's related cases).
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

/// Decode the control file out of a (possibly truncated) `.deb` prefix.
pub fn extract_control(data: &[u8]) -> Result<DebianControl> {
    let members = ar::parse(data)?;
    let control_member = ar::find_control_tar(&members).ok_or_else(|| {
        Error::CorruptArchive("no control.tar member found in deb".to_string())
    })?;

    let compression = Compression::from_control_tar_suffix(&control_member.name)
        .map_err(|e| Error::UnsupportedCodec(e.to_string()))?;
    let tar_bytes = decompress_bounded(&control_member.data, compression, 8 * 1024 * 1024)
        .map_err(|e| Error::CorruptArchive(e.to_string()))?;

    let entries = tar::parse(&tar_bytes)?;
    let control_entry = entries
        .iter()
        .find(|e| e.name == "control" || e.name == "./control")
        .ok_or_else(|| Error::CorruptArchive("no control file in control.tar".to_string()))?;

    let text = String::from_utf8_lossy(&control_entry.data);
    let control_file = ControlFile::parse_str(&text)
        .map_err(|e| Error::CorruptArchive(format!("malformed control file: {e}")))?;
    let paragraph = control_file
        .paragraphs()
        .next()
        .ok_or_else(|| Error::CorruptArchive("control file has no paragraph".to_string()))?;

    let field = |name: &str| paragraph.field_str(name).map(str::to_string);

    let installed_size = field("Installed-Size")
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0);

    Ok(DebianControl {
        package: field("Package").ok_or_else(|| {
            Error::CorruptArchive("control file missing Package field".to_string())
        })?,
        version: field("Version").ok_or_else(|| {
            Error::CorruptArchive("control file missing Version field".to_string())
        })?,
        // Unlike `Package`/`Version`, a missing `Architecture` field is not malformed: the
        // control-file format documents no default, but a package built without one is treated
        // as arch-independent, consistent with `arch::resolve_deb_arch` trusting the filename
        // over a literal `all` here.
        architecture: field("Architecture").unwrap_or_else(|| "all".to_string()),
        maintainer: field("Maintainer"),
        installed_size,
        depends: field("Depends"),
        recommends: field("Recommends"),
        suggests: field("Suggests"),
        conflicts: field("Conflicts"),
        replaces: field("Replaces"),
        provides: field("Provides"),
        section: field("Section"),
        priority: field("Priority").unwrap_or_else(|| "optional".to_string()),
        homepage: field("Homepage"),
        description: field("Description"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ar_header(name: &str, size: usize) -> Vec<u8> {
        let mut header = vec![b' '; 60];
        header[0..name.len()].copy_from_slice(name.as_bytes());
        let size_str = size.to_string();
        header[48..48 + size_str.len()].copy_from_slice(size_str.as_bytes());
        header[58..60].copy_from_slice(b"`\n");
        header
    }

    fn tar_block(name: &str, data: &[u8]) -> Vec<u8> {
        let mut block = vec![0u8; 512];
        block[0..name.len()].copy_from_slice(name.as_bytes());
        let octal = format!("{:o}", data.len());
        block[124..124 + octal.len()].copy_from_slice(octal.as_bytes());
        block[156] = b'0';
        let mut out = block;
        out.extend_from_slice(data);
        let padded_len = (data.len() + 511) / 512 * 512;
        out.resize(512 + padded_len, 0);
        out
    }

    #[test]
    fn extracts_control_fields_from_uncompressed_tar() {
        let control_text = b"Package: example\nVersion: 1.2.3\nArchitecture: amd64\nInstalled-Size: 42\nDescription: an example\n";
        let tar_bytes = tar_block("control", control_text);

        let mut archive = b"!<arch>\n".to_vec();
        archive.extend(ar_header("debian-binary", 4));
        archive.extend_from_slice(b"2.0\n");
        archive.extend(ar_header("control.tar", tar_bytes.len()));
        archive.extend_from_slice(&tar_bytes);

        let control = extract_control(&archive).unwrap();
        assert_eq!(control.package, "example");
        assert_eq!(control.version, "1.2.3");
        assert_eq!(control.architecture, "amd64");
        assert_eq!(control.installed_size, 42);
        assert_eq!(control.description.as_deref(), Some("an example"));
    }

    #[test]
    fn missing_control_tar_member_is_corrupt_archive() {
        let mut archive = b"!<arch>\n".to_vec();
        archive.extend(ar_header("debian-binary", 4));
        archive.extend_from_slice(b"2.0\n");

        let err = extract_control(&archive).unwrap_err();
        assert!(matches!(err, Error::CorruptArchive(_)));
    }
}
