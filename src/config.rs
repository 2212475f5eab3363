use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::Deserialize;

pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.92;

/// Inclusive Unicode codepoint interval. `start <= end` holds for every
/// constructed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodepointRange {
    start: u32,
    end: u32,
}

impl CodepointRange {
    pub fn new(start: u32, end: u32) -> Result<Self> {
        if start > end {
            bail!("invalid codepoint range: U+{start:04X}..U+{end:04X}");
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, codepoint: u32) -> bool {
        self.start <= codepoint && codepoint <= self.end
    }
}

/// Character admission policy. Built once at startup and treated as
/// read-only for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct CharacterPolicy {
    allowed_ranges: Vec<CodepointRange>,
    whitelisted_chars: HashSet<char>,
    blacklisted_chars: HashSet<char>,
    allowed_control_chars: HashSet<char>,
}

impl CharacterPolicy {
    pub fn new(
        allowed_ranges: Vec<CodepointRange>,
        whitelisted_chars: HashSet<char>,
        blacklisted_chars: HashSet<char>,
        allowed_control_chars: HashSet<char>,
    ) -> Self {
        Self {
            allowed_ranges,
            whitelisted_chars,
            blacklisted_chars,
            allowed_control_chars,
        }
    }

    pub fn is_whitelisted(&self, character: char) -> bool {
        self.whitelisted_chars.contains(&character)
    }

    pub fn is_blacklisted(&self, character: char) -> bool {
        self.blacklisted_chars.contains(&character)
    }

    pub fn is_allowed_control(&self, character: char) -> bool {
        self.allowed_control_chars.contains(&character)
    }

    pub fn in_allowed_range(&self, character: char) -> bool {
        let codepoint = character as u32;
        self.allowed_ranges
            .iter()
            .any(|range| range.contains(codepoint))
    }

    pub fn blacklisted_chars(&self) -> &HashSet<char> {
        &self.blacklisted_chars
    }
}

/// Corrupted-substring to canonical-substring rewrite table. Entries are
/// applied independently with replace-all semantics; construction rejects
/// tables where one key is a substring of another, so application order
/// cannot change the result.
#[derive(Debug, Clone)]
pub struct RepairTable {
    entries: Vec<(String, String)>,
}

impl RepairTable {
    pub fn new(entries: Vec<(String, String)>) -> Result<Self> {
        for (corrupted, _) in &entries {
            if corrupted.is_empty() {
                bail!("repair table keys must be non-empty");
            }
        }

        for (index, (left, _)) in entries.iter().enumerate() {
            for (right, _) in entries.iter().skip(index + 1) {
                if left == right {
                    bail!("duplicate repair table key: {left:?}");
                }
                if left.contains(right.as_str()) || right.contains(left.as_str()) {
                    bail!("repair table keys must not nest: {left:?} vs {right:?}");
                }
            }
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub policy: CharacterPolicy,
    pub ligatures: RepairTable,
    pub accents: RepairTable,
    pub quality_threshold: f64,
}

/// Recognized keys of the optional JSON configuration file. Absent keys
/// fall back to the compiled-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub allowed_ranges: Option<Vec<String>>,
    pub whitelisted_chars: Option<Vec<String>>,
    pub blacklisted_chars: Option<Vec<String>>,
    pub allowed_control_chars: Option<Vec<String>>,
    pub ligature_map: Option<BTreeMap<String, String>>,
    pub accent_map: Option<BTreeMap<String, String>>,
    pub quality_threshold: Option<f64>,
}

pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let file = match path {
        Some(path) => {
            let raw = fs::read(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            serde_json::from_slice::<ConfigFile>(&raw)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        }
        None => ConfigFile::default(),
    };

    build_config(file)
}

pub fn build_config(file: ConfigFile) -> Result<PipelineConfig> {
    let allowed_ranges = match file.allowed_ranges {
        Some(specs) => parse_ranges(&specs)?,
        None => default_allowed_ranges()?,
    };

    let whitelisted_chars = match file.whitelisted_chars {
        Some(entries) => parse_char_set(&entries)?,
        None => DEFAULT_WHITELISTED_CHARS.iter().copied().collect(),
    };

    let blacklisted_chars = match file.blacklisted_chars {
        Some(entries) => parse_char_set(&entries)?,
        None => DEFAULT_BLACKLISTED_CHARS.iter().copied().collect(),
    };

    let allowed_control_chars = match file.allowed_control_chars {
        Some(entries) => parse_char_set(&entries)?,
        None => DEFAULT_CONTROL_CHARS.iter().copied().collect(),
    };

    let ligatures = match file.ligature_map {
        Some(map) => RepairTable::new(map.into_iter().collect()).context("invalid ligature_map")?,
        None => default_ligature_table()?,
    };

    let accents = match file.accent_map {
        Some(map) => RepairTable::new(map.into_iter().collect()).context("invalid accent_map")?,
        None => default_accent_table()?,
    };

    let quality_threshold = file
        .quality_threshold
        .unwrap_or(DEFAULT_QUALITY_THRESHOLD);
    if !(0.0..=1.0).contains(&quality_threshold) {
        bail!("quality_threshold must be in [0, 1], got {quality_threshold}");
    }

    Ok(PipelineConfig {
        policy: CharacterPolicy::new(
            allowed_ranges,
            whitelisted_chars,
            blacklisted_chars,
            allowed_control_chars,
        ),
        ligatures,
        accents,
        quality_threshold,
    })
}

/// Applies a command-line threshold override on top of a loaded config.
pub fn apply_threshold_override(
    config: &mut PipelineConfig,
    threshold: Option<f64>,
) -> Result<()> {
    if let Some(value) = threshold {
        if !(0.0..=1.0).contains(&value) {
            bail!("quality threshold must be in [0, 1], got {value}");
        }
        config.quality_threshold = value;
    }
    Ok(())
}

fn parse_ranges(specs: &[String]) -> Result<Vec<CodepointRange>> {
    let pattern = Regex::new(r"^U\+([0-9A-Fa-f]{1,6})\.\.U\+([0-9A-Fa-f]{1,6})$")
        .context("failed to compile codepoint range pattern")?;

    specs
        .iter()
        .map(|spec| parse_range(spec, &pattern))
        .collect()
}

fn parse_range(spec: &str, pattern: &Regex) -> Result<CodepointRange> {
    let captures = pattern
        .captures(spec.trim())
        .with_context(|| format!("range {spec:?} does not match the form U+XXXX..U+XXXX"))?;

    let start = u32::from_str_radix(&captures[1], 16)
        .with_context(|| format!("invalid start codepoint in {spec:?}"))?;
    let end = u32::from_str_radix(&captures[2], 16)
        .with_context(|| format!("invalid end codepoint in {spec:?}"))?;

    CodepointRange::new(start, end)
}

fn parse_char_set(entries: &[String]) -> Result<HashSet<char>> {
    entries.iter().map(|entry| parse_char_entry(entry)).collect()
}

/// Accepts either a literal single character or an escaped `U+XXXX` form.
fn parse_char_entry(entry: &str) -> Result<char> {
    if let Some(hex) = entry.strip_prefix("U+") {
        let codepoint =
            u32::from_str_radix(hex, 16).with_context(|| format!("invalid codepoint {entry:?}"))?;
        return char::from_u32(codepoint)
            .with_context(|| format!("{entry:?} is not a valid scalar value"));
    }

    let mut characters = entry.chars();
    match (characters.next(), characters.next()) {
        (Some(character), None) => Ok(character),
        _ => bail!("character entry {entry:?} must be a single character or U+XXXX"),
    }
}

const DEFAULT_ALLOWED_RANGES: &[(u32, u32)] = &[
    (0x0020, 0x007E), // Basic ASCII
    (0x00A0, 0x00FF), // Latin-1 Supplement
    (0x0370, 0x03FF), // Greek and Coptic
    (0x2000, 0x206F), // General Punctuation
    (0x2200, 0x22FF), // Mathematical Operators
];

const DEFAULT_WHITELISTED_CHARS: &[char] = &['◦', '˚', '°'];

const DEFAULT_BLACKLISTED_CHARS: &[char] = &[
    '¤', '§', '©', '®', '¶', '•', '†', '‡', '◦', '˚', '※', '⁂', '‽', '⁉', '‥', '☺', '☻', '♥',
    '♦', '♣', '♠', '✦', '✧', '★', '☆', '✪', '☀', '☁', '☂', '☃', '☄', '\u{FFFD}', '\u{200B}',
    '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{202A}', '\u{202B}', '\u{202C}',
    '\u{202D}', '\u{202E}', '\u{2066}', '\u{2067}', '\u{2068}', '\u{2069}', '\u{25AA}',
    '\u{25AB}', '\u{25B6}', '\u{25C0}',
];

const DEFAULT_CONTROL_CHARS: &[char] = &['\n', '\r', '\t'];

const DEFAULT_LIGATURES: &[(&str, &str)] = &[
    ("ﬀ", "ff"),
    ("ﬁ", "fi"),
    ("ﬂ", "fl"),
    ("ﬃ", "ffi"),
    ("ﬄ", "ffl"),
    ("æ", "ae"),
    ("œ", "oe"),
];

const DEFAULT_BROKEN_ACCENTS: &[(&str, &str)] = &[
    ("ı´", "í"),
    ("i´", "í"),
    ("I´", "Í"),
    ("a´", "á"),
    ("A´", "Á"),
    ("e´", "é"),
    ("E´", "É"),
    ("o´", "ó"),
    ("O´", "Ó"),
    ("u´", "ú"),
    ("U´", "Ú"),
    ("n~", "ñ"),
    ("N~", "Ñ"),
    ("c¸", "ç"),
    ("C¸", "Ç"),
    ("a`", "à"),
    ("A`", "À"),
    ("e`", "è"),
    ("E`", "È"),
    ("i`", "ì"),
    ("I`", "Ì"),
    ("o`", "ò"),
    ("O`", "Ò"),
    ("u`", "ù"),
    ("U`", "Ù"),
    ("a^", "â"),
    ("A^", "Â"),
    ("e^", "ê"),
    ("E^", "Ê"),
    ("i^", "î"),
    ("I^", "Î"),
    ("o^", "ô"),
    ("O^", "Ô"),
    ("u^", "û"),
    ("U^", "Û"),
    ("a¨", "ä"),
    ("A¨", "Ä"),
    ("e¨", "ë"),
    ("E¨", "Ë"),
    ("i¨", "ï"),
    ("I¨", "Ï"),
    ("o¨", "ö"),
    ("O¨", "Ö"),
    ("u¨", "ü"),
    ("U¨", "Ü"),
];

fn default_allowed_ranges() -> Result<Vec<CodepointRange>> {
    DEFAULT_ALLOWED_RANGES
        .iter()
        .map(|&(start, end)| CodepointRange::new(start, end))
        .collect()
}

fn default_ligature_table() -> Result<RepairTable> {
    RepairTable::new(
        DEFAULT_LIGATURES
            .iter()
            .map(|&(corrupted, canonical)| (corrupted.to_string(), canonical.to_string()))
            .collect(),
    )
}

fn default_accent_table() -> Result<RepairTable> {
    RepairTable::new(
        DEFAULT_BROKEN_ACCENTS
            .iter()
            .map(|&(corrupted, canonical)| (corrupted.to_string(), canonical.to_string()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_and_keeps_threshold() {
        let config = load_config(None).expect("default config builds");
        assert_eq!(config.quality_threshold, DEFAULT_QUALITY_THRESHOLD);
        assert!(config.policy.is_whitelisted('°'));
        assert!(config.policy.is_blacklisted('•'));
        assert!(config.policy.is_allowed_control('\n'));
    }

    #[test]
    fn codepoint_range_rejects_inverted_bounds() {
        assert!(CodepointRange::new(0x00FF, 0x00A0).is_err());
        assert!(CodepointRange::new(0x0020, 0x0020).is_ok());
    }

    #[test]
    fn parse_range_accepts_uplus_form() {
        let pattern = Regex::new(r"^U\+([0-9A-Fa-f]{1,6})\.\.U\+([0-9A-Fa-f]{1,6})$")
            .expect("pattern compiles");
        let range = parse_range("U+0020..U+007E", &pattern).expect("range parses");
        assert!(range.contains(0x0041));
        assert!(!range.contains(0x00A0));
    }

    #[test]
    fn parse_char_entry_accepts_literal_and_escaped_forms() {
        assert_eq!(parse_char_entry("°").expect("literal parses"), '°');
        assert_eq!(parse_char_entry("U+00B0").expect("escape parses"), '°');
        assert!(parse_char_entry("ab").is_err());
        assert!(parse_char_entry("U+D800").is_err());
    }

    #[test]
    fn repair_table_rejects_nested_keys() {
        let nested = vec![
            ("fi".to_string(), "fi".to_string()),
            ("ffi".to_string(), "ffi".to_string()),
        ];
        assert!(RepairTable::new(nested).is_err());

        let empty_key = vec![(String::new(), "x".to_string())];
        assert!(RepairTable::new(empty_key).is_err());
    }

    #[test]
    fn build_config_rejects_out_of_range_threshold() {
        let file = ConfigFile {
            quality_threshold: Some(1.2),
            ..ConfigFile::default()
        };
        assert!(build_config(file).is_err());
    }

    #[test]
    fn config_file_overrides_replace_defaults() {
        let file = ConfigFile {
            allowed_ranges: Some(vec!["U+0041..U+005A".to_string()]),
            whitelisted_chars: Some(vec!["U+0021".to_string()]),
            quality_threshold: Some(0.5),
            ..ConfigFile::default()
        };
        let config = build_config(file).expect("config builds");

        assert!(config.policy.in_allowed_range('Z'));
        assert!(!config.policy.in_allowed_range('a'));
        assert!(config.policy.is_whitelisted('!'));
        assert_eq!(config.quality_threshold, 0.5);
    }
}
