// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian packaging primitives.

This crate defines pure Rust implementations of the Debian packaging primitives needed to
synthesize repository indices: *control files*, the `Release`/`InRelease` data model, and the
digest/compression helpers that back them. Debian packaging (frequently interacted with by
tools like `apt` and `apt-get`) provides the basis for packaging on Debian-flavored Linux
distributions like Debian and Ubuntu.

The canonical home of this crate is <https://github.com/indygreg/PyOxidizer>. Please file issues
and pull requests there.

# Goals

## Compliance and Compatibility

We want this crate to be as-compliant and as-compatible as possible with in-the-wild Debian
packaging deployments so it can be used as a basis to implementing tools which consume and
produce entities that are compatible with the official Debian packaging implementations.

## Determinism and Reproducibility

To help combat the rise in software supply chain attacks and to make debugging and testing
easier, a goal of this crate is to be as deterministic and reproducible as possible.

Given the same inputs, a generated `Release` or `Packages` file should be byte-for-byte
identical across invocations.

# A Tour of Functionality

A common primitive within Debian packaging is *control files*. These consist of *paragraphs*
of key-value metadata. Low-level control file primitives are defined in the [control] module.
[control::ControlParagraph] defines a paragraph, which consists of [control::ControlField].
[control::ControlFile] provides an interface for a *control file*, which consists of multiple
paragraphs. [control::ControlParagraphReader] implements a streaming reader of control files.

The [repository] module provides functionality related to Debian repository *indices*: the
[repository::release::ReleaseFile] type models an `[In]Release` control paragraph, and
[repository::builder::ReleaseBuilder] accumulates the static repository metadata fields and
renders them, together with the digests of already-generated index files, into a
[repository::release::ReleaseFile]. This crate does not read or write `.deb` files, resolve
dependencies, or walk a pre-existing repository's filesystem/HTTP/S3 layout; callers supply
already-extracted package metadata and already-rendered index bytes.

The [signing_key] module provides functionality for generating PGP signing keys.
[signing_key::signing_secret_key_params_builder()] and [signing_key::create_self_signed_key()]
create self-signed keys suitable for signing a `Release` file.

The [io] module defines the digest and compression helpers shared by the control-file and
release-index code: [io::ContentDigest] for SHA-256 digests, and bounded decompression /
gzip compression helpers.
*/

pub mod control;
pub mod error;
pub mod io;
pub mod repository;
pub mod signing_key;
