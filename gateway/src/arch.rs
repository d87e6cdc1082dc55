// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Map package filenames and RPM filename arch tokens to canonical architecture strings.

use once_cell::sync::Lazy;
use regex::Regex;

const DEFAULT_ARCH: &str = "amd64";

static AMD64: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[_.-](amd64|x86_64|x64)[_.-]").expect("valid regex"));
static ARM64: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(arm64|aarch64)").expect("valid regex"));
static I386: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(i386|i686|x86)[_.-](?!64)").expect("valid regex"));
static ARMHF: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(armhf|armv7)").expect("valid regex"));
static ALL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[_.-]all[_.-]").expect("valid regex"));

/// Infer the Debian architecture token from a `.deb` filename.
///
/// Applies the ordered pattern list from the format description; the first match wins. Falls
/// back to `amd64` when nothing matches.
pub fn deb_arch_from_filename(filename: &str) -> &'static str {
    // Patterns are anchored by surrounding separators, except the single-word fallbacks, so the
    // filename is padded on both sides to let `[_.-]`-bounded patterns match at the edges too.
    let padded = format!("_{filename}_");

    if AMD64.is_match(&padded) {
        "amd64"
    } else if ARM64.is_match(filename) {
        "arm64"
    } else if I386.is_match(&padded) {
        "i386"
    } else if ARMHF.is_match(filename) {
        "armhf"
    } else if ALL.is_match(&padded) {
        "all"
    } else {
        DEFAULT_ARCH
    }
}

/// Resolve the architecture of a deb entry, preferring the filename over the control file's
/// `Architecture` field when the control file claims `all` but the filename encodes a specific
/// arch (observed packages mis-set this field).
pub fn resolve_deb_arch(control_architecture: &str, filename: &str) -> String {
    let from_filename = deb_arch_from_filename(filename);
    if control_architecture == "all" && from_filename != "all" {
        from_filename.to_string()
    } else {
        control_architecture.to_string()
    }
}

/// Normalize the last dot-separated segment of an RPM filename (before `.rpm`) to its canonical
/// RPM arch token.
pub fn rpm_arch_from_filename(filename: &str) -> String {
    let stem = filename.strip_suffix(".rpm").unwrap_or(filename);
    let token = stem.rsplit('.').next().unwrap_or(stem);

    match token {
        "amd64" => "x86_64".to_string(),
        "arm64" => "aarch64".to_string(),
        "i386" => "i686".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amd64_variants() {
        assert_eq!(deb_arch_from_filename("package_1.0.0_amd64.deb"), "amd64");
        assert_eq!(deb_arch_from_filename("package_x86_64.deb"), "amd64");
        assert_eq!(deb_arch_from_filename("package_x64.deb"), "amd64");
    }

    #[test]
    fn i386_is_not_confused_with_x86_64() {
        assert_eq!(deb_arch_from_filename("package_x86.deb"), "i386");
        assert_eq!(deb_arch_from_filename("package_i386.deb"), "i386");
    }

    #[test]
    fn arm_variants() {
        assert_eq!(deb_arch_from_filename("package_arm64.deb"), "arm64");
        assert_eq!(deb_arch_from_filename("package_aarch64.deb"), "arm64");
        assert_eq!(deb_arch_from_filename("package_armhf.deb"), "armhf");
    }

    #[test]
    fn unknown_defaults_to_amd64() {
        assert_eq!(deb_arch_from_filename("package.deb"), "amd64");
    }

    #[test]
    fn literal_all() {
        assert_eq!(deb_arch_from_filename("package_all.deb"), "all");
    }

    #[test]
    fn filename_wins_over_mis_set_control_arch() {
        assert_eq!(
            resolve_deb_arch("all", "package_1.0.0_amd64.deb"),
            "amd64"
        );
        assert_eq!(resolve_deb_arch("arm64", "package_all.deb"), "arm64");
    }

    #[test]
    fn rpm_arch_normalization() {
        assert_eq!(rpm_arch_from_filename("app-1.0-1.amd64.rpm"), "x86_64");
        assert_eq!(rpm_arch_from_filename("app-1.0-1.arm64.rpm"), "aarch64");
        assert_eq!(rpm_arch_from_filename("app-1.0-1.i386.rpm"), "i686");
        assert_eq!(rpm_arch_from_filename("app-1.0-1.noarch.rpm"), "noarch");
        assert_eq!(rpm_arch_from_filename("app-1.0-1.x86_64.rpm"), "x86_64");
    }
}
