use unicode_normalization::UnicodeNormalization;

use crate::config::CharacterPolicy;

/// Blacklist removal followed by a general encoding repair pass. The
/// blacklist strip runs first: blacklist entries are exact corrupted
/// symbols that the repair pass would not recognize as artifacts.
pub fn clean_text(policy: &CharacterPolicy, text: &str) -> String {
    let stripped = remove_blacklisted(policy, text);
    normalize_encoding(&stripped)
}

/// Drops every blacklisted codepoint. The whitelist shields classification
/// only, not cleaning: a whitelisted-and-blacklisted character is still
/// removed here.
fn remove_blacklisted(policy: &CharacterPolicy, text: &str) -> String {
    text.chars()
        .filter(|character| !policy.is_blacklisted(*character))
        .collect()
}

/// Repairs common encoding-mismatch artifacts (UTF-8 bytes that were
/// decoded as cp1252, e.g. `CafÃ©` for `Café`), then NFC-normalizes.
fn normalize_encoding(text: &str) -> String {
    let repaired = text
        .split('\n')
        .map(repair_line)
        .collect::<Vec<String>>()
        .join("\n");

    repaired.nfc().collect()
}

/// A line is rewritten only when every character maps back onto a cp1252
/// byte and the resulting byte string decodes as UTF-8 containing at least
/// one multi-byte sequence. Anything else is left untouched.
fn repair_line(line: &str) -> String {
    match reverse_cp1252(line).and_then(|bytes| String::from_utf8(bytes).ok()) {
        Some(decoded) => decoded,
        None => line.to_string(),
    }
}

fn reverse_cp1252(line: &str) -> Option<Vec<u8>> {
    let mut bytes = Vec::with_capacity(line.len());
    let mut saw_high_byte = false;

    for character in line.chars() {
        let byte = cp1252_byte(character)?;
        if byte >= 0x80 {
            saw_high_byte = true;
        }
        bytes.push(byte);
    }

    if saw_high_byte { Some(bytes) } else { None }
}

/// cp1252 maps the 0x80..0x9F block to punctuation and a handful of
/// letters; every codepoint below U+0100 round-trips as itself.
const CP1252_PUNCTUATION: &[(char, u8)] = &[
    ('\u{20AC}', 0x80),
    ('\u{201A}', 0x82),
    ('\u{0192}', 0x83),
    ('\u{201E}', 0x84),
    ('\u{2026}', 0x85),
    ('\u{2020}', 0x86),
    ('\u{2021}', 0x87),
    ('\u{02C6}', 0x88),
    ('\u{2030}', 0x89),
    ('\u{0160}', 0x8A),
    ('\u{2039}', 0x8B),
    ('\u{0152}', 0x8C),
    ('\u{017D}', 0x8E),
    ('\u{2018}', 0x91),
    ('\u{2019}', 0x92),
    ('\u{201C}', 0x93),
    ('\u{201D}', 0x94),
    ('\u{2022}', 0x95),
    ('\u{2013}', 0x96),
    ('\u{2014}', 0x97),
    ('\u{02DC}', 0x98),
    ('\u{2122}', 0x99),
    ('\u{0161}', 0x9A),
    ('\u{203A}', 0x9B),
    ('\u{0153}', 0x9C),
    ('\u{017E}', 0x9E),
    ('\u{0178}', 0x9F),
];

fn cp1252_byte(character: char) -> Option<u8> {
    let codepoint = character as u32;
    if codepoint < 0x100 {
        return Some(codepoint as u8);
    }

    CP1252_PUNCTUATION
        .iter()
        .find(|(mapped, _)| *mapped == character)
        .map(|(_, byte)| *byte)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;

    #[test]
    fn clean_removes_every_blacklisted_codepoint() {
        let config = load_config(None).expect("default config builds");

        let input = "intro • bullet † dagger\u{200B}zero☺width ◦ ring";
        let cleaned = clean_text(&config.policy, input);

        for blacklisted in config.policy.blacklisted_chars() {
            assert!(
                !cleaned.contains(*blacklisted),
                "blacklisted {blacklisted:?} survived cleaning"
            );
        }
        assert!(cleaned.contains("intro"));
        assert!(cleaned.contains("ring"));
    }

    #[test]
    fn clean_strips_whitelisted_chars_that_are_also_blacklisted() {
        let config = load_config(None).expect("default config builds");

        // ◦ is whitelisted for classification, yet the blacklist strip
        // still removes it.
        let cleaned = clean_text(&config.policy, "a ◦ b");
        assert!(!cleaned.contains('◦'));
    }

    #[test]
    fn mojibake_lines_are_re_decoded() {
        let config = load_config(None).expect("default config builds");

        assert_eq!(clean_text(&config.policy, "ZÃ¼rich"), "Zürich");
        assert_eq!(clean_text(&config.policy, "maÃ±ana"), "mañana");
        // U+2019 right quote mangled through cp1252.
        assert_eq!(clean_text(&config.policy, "donâ€™t"), "don’t");
    }

    #[test]
    fn legitimate_latin1_lines_are_untouched() {
        let config = load_config(None).expect("default config builds");

        assert_eq!(clean_text(&config.policy, "Können"), "Können");
        assert_eq!(clean_text(&config.policy, "plain ascii"), "plain ascii");
        assert_eq!(clean_text(&config.policy, "Âge tendre"), "Âge tendre");
    }

    #[test]
    fn repair_applies_per_line() {
        let config = load_config(None).expect("default config builds");

        let input = "ZÃ¼rich\nKönnen\nplain";
        assert_eq!(clean_text(&config.policy, input), "Zürich\nKönnen\nplain");
    }

    #[test]
    fn blacklist_strip_precedes_encoding_repair() {
        let config = load_config(None).expect("default config builds");

        // The zero-width space would break the cp1252 byte sequence; only
        // because it is stripped first does the repair see ZÃ¼rich.
        assert_eq!(clean_text(&config.policy, "ZÃ\u{200B}¼rich"), "Zürich");

        // The same ordering means a blacklisted continuation character is
        // gone before the repair runs: Ã© loses its © and stays broken.
        assert_eq!(clean_text(&config.policy, "CafÃ©"), "CafÃ");
    }

    #[test]
    fn output_is_nfc_normalized() {
        let config = load_config(None).expect("default config builds");

        let decomposed = "re\u{0301}sume\u{0301}";
        assert_eq!(clean_text(&config.policy, decomposed), "résumé");
    }
}
