// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Repository-index synthesis: the Debian `Packages`/`Release` pair and the RPM
//! `repomd.xml`/`primary.xml`/`filelists.xml`/`other.xml` quartet.

pub mod deb;
pub mod rpm;
