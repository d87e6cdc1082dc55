// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared primitives used by both index generators: XML 1.0 text escaping.

/// Escape text for inclusion in XML 1.0 content or attribute values.
///
/// `&<>"'` become entities; characters outside the XML 1.0 character range
/// (`\x00-\x08`, `\x0B`, `\x0C`, `\x0E-\x1F`) are stripped rather than escaped, since there is no
/// valid entity for them. `\x09`, `\x0A`, and `\x0D` are preserved verbatim.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\x09' | '\x0A' | '\x0D' => out.push(c),
            '\x00'..='\x1F' => {}
            _ => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_entities() {
        assert_eq!(
            escape(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&apos;&amp;&apos;&lt;/a&gt;"
        );
    }

    #[test]
    fn strips_invalid_control_characters() {
        let input = "a\x00b\x08c\x0Bd\x0Ce\x0Ef\x1Fg";
        assert_eq!(escape(input), "abcdefg");
    }

    #[test]
    fn preserves_tab_lf_cr() {
        let input = "a\tb\nc\rd";
        assert_eq!(escape(input), "a\tb\nc\rd");
    }
}
