// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use thiserror::Error;

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum DebianError {
    #[error("hex parsing error: {0:?}")]
    Hex(#[from] hex::FromHexError),

    #[error("PGP error: {0:?}")]
    Pgp(#[from] pgp::errors::Error),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("control file parse error: {0}")]
    ControlParseError(String),

    #[error("control field value cannot be represented as a single line")]
    ControlSimpleValueNoMultiline,

    #[error("Control file lacks a paragraph")]
    ControlFileNoParagraph,

    #[error("required field missing in control paragraph: {0}")]
    ControlRequiredFieldMissing(&'static str),

    #[error("unknown compression suffix on archive member: {0}")]
    UnsupportedCodec(String),

    #[error("archive is corrupt: {0}")]
    CorruptArchive(String),

    #[error("digest missing from release indices entry")]
    ReleaseMissingDigest,

    #[error("size missing from release indices entry")]
    ReleaseMissingSize,

    #[error("No PGP signatures found")]
    ReleaseNoSignatures,

    #[error("No PGP signatures found from the specified key")]
    ReleaseNoSignaturesByKey,
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, DebianError>;
