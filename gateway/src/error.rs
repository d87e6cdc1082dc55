// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The crate-wide error enum and its mapping onto HTTP responses.

use warp::http::StatusCode;

pub use log::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream rate limited: {0}")]
    UpstreamRateLimit(String),

    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(String),

    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("signing failure: {0}")]
    SigningFailure(String),
}

impl warp::reject::Reject for Error {}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The status this error kind maps to, per the error handling design.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UpstreamRateLimit(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamFetch(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::CorruptArchive(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UnsupportedCodec(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::SigningFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Log this error at the severity its origin warrants, then return it so
    /// call sites can chain `.map_err(Error::logged)?`.
    pub fn logged(self) -> Self {
        match &self {
            Self::BadRequest(msg) | Self::NotFound(msg) => warn!("{}: {}", self, msg),
            _ => error!("{}", self),
        }
        self
    }
}
