// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decode a binary asset's metadata from a bounded, range-fetched prefix of its bytes.
//!
//! `ar`/`tar` are the archive containers `.deb` is built from; `rpm` reads the RPM lead and
//! header sections directly. `deb` ties the AR/tar/control-file pieces together into a
//! [crate::model::DebianControl].

pub mod ar;
pub mod deb;
pub mod rpm;
pub mod tar;
