// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `repomd.xml` file format. */

use {
    crate::{
        error::{Result, RpmRepositoryError},
        io::ContentDigest,
    },
    serde::{Deserialize, Serialize},
    std::io::Read,
};

/// A `repomd.xml` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoMd {
    /// Revision of the repository.
    ///
    /// Often an integer-like value.
    pub revision: String,
    /// Describes additional primary data files constituting this repository.
    pub data: Vec<RepoMdData>,
}

impl RepoMd {
    /// Construct an instance by parsing XML from a reader.
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        Ok(serde_xml_rs::from_reader(reader)?)
    }

    /// Construct an instance by parsing XML from a string.
    pub fn from_xml(s: &str) -> Result<Self> {
        Ok(serde_xml_rs::from_str(s)?)
    }
}

/// A `<data>` element in a `repomd.xml` file.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RepoMdData {
    /// The type of data.
    #[serde(rename = "type")]
    pub data_type: String,
    /// Content checksum of this file.
    pub checksum: Checksum,
    /// Where the file is located.
    pub location: Location,
    /// Size in bytes of the file as stored in the repository.
    pub size: Option<u64>,
    /// Time file was created/modified.
    pub timestamp: Option<u64>,
    /// Content checksum of the decoded (often decompressed) file.
    #[serde(rename = "open-checksum")]
    pub open_checksum: Option<Checksum>,
    /// Size in bytes of the decoded (often decompressed) file.
    #[serde(rename = "open-size")]
    pub open_size: Option<u64>,
    /// Content checksum of header data.
    #[serde(rename = "header-checksum")]
    pub header_checksum: Option<Checksum>,
    /// Size in bytes of the header.
    #[serde(rename = "header-size")]
    pub header_size: Option<u64>,
}

/// The content checksum of a `<data>` element.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Checksum {
    /// The name of the content digest.
    #[serde(rename = "type")]
    pub name: String,
    /// The hex encoded content digest.
    #[serde(rename = "$value")]
    pub value: String,
}

impl TryFrom<Checksum> for ContentDigest {
    type Error = RpmRepositoryError;

    fn try_from(v: Checksum) -> std::result::Result<Self, Self::Error> {
        match v.name.as_str() {
            "sha1" => ContentDigest::sha1_hex(&v.value),
            "sha256" => ContentDigest::sha256_hex(&v.value),
            name => Err(RpmRepositoryError::UnknownDigestFormat(name.to_string())),
        }
    }
}

/// The location of a `<data>` element.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Location {
    pub href: String,
}

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLE_REPOMD_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo" xmlns:rpm="http://linux.duke.edu/metadata/rpm">
  <revision>1706356245</revision>
  <data type="primary">
    <checksum type="sha256">9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08</checksum>
    <open-checksum type="sha256">2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824</open-checksum>
    <location href="repodata/primary.xml.gz"/>
    <timestamp>1706356245</timestamp>
    <size>1234</size>
    <open-size>5678</open-size>
  </data>
  <data type="filelists">
    <checksum type="sha256">e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855</checksum>
    <location href="repodata/filelists.xml.gz"/>
    <timestamp>1706356245</timestamp>
    <size>234</size>
  </data>
  <data type="other">
    <checksum type="sha256">d9298a10d1b0735837dc4bd85dac641b0f3cef27a47e5d53a54f2f3f5b2fcffa</checksum>
    <location href="repodata/other.xml.gz"/>
    <timestamp>1706356245</timestamp>
    <size>345</size>
  </data>
</repomd>
"#;

    #[test]
    fn sample_repomd_parse() -> Result<()> {
        let repomd = RepoMd::from_xml(SAMPLE_REPOMD_XML)?;

        assert_eq!(repomd.revision, "1706356245");
        assert_eq!(repomd.data.len(), 3);

        let primary = repomd
            .data
            .iter()
            .find(|d| d.data_type == "primary")
            .expect("primary entry present");
        assert_eq!(primary.location.href, "repodata/primary.xml.gz");
        assert_eq!(primary.size, Some(1234));

        let digest = ContentDigest::try_from(primary.checksum.clone())?;
        assert_eq!(
            digest.digest_hex(),
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );

        Ok(())
    }
}
