// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian repository primitives.

A Debian repository is a collection of files holding packages and other
support primitives. See <https://wiki.debian.org/DebianRepository/Format>
for the canonical definition of a Debian repository.

This crate only concerns itself with the *index* side of a repository: parsing
and producing `[In]Release` files and the records they cross-reference. Pool
layout, package payload storage, and remote repository transports (HTTP,
filesystem, S3) are the concern of the service embedding this crate, not of
the crate itself.
*/

pub mod builder;
pub mod release;
