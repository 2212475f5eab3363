use crate::config::PipelineConfig;

/// Deterministic rewrite of known extraction artifacts: ligature
/// substitution first, then two-character broken-accent sequences. Each
/// table entry is a plain substring replace-all; the rest of the text is
/// untouched.
pub fn repair_text(config: &PipelineConfig, text: &str) -> String {
    let repaired = apply_repair_table(text, config.ligatures.entries());
    apply_repair_table(&repaired, config.accents.entries())
}

fn apply_repair_table(text: &str, entries: &[(String, String)]) -> String {
    let mut output = text.to_string();
    for (corrupted, canonical) in entries {
        if output.contains(corrupted.as_str()) {
            output = output.replace(corrupted.as_str(), canonical);
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;

    #[test]
    fn repair_expands_ligatures() {
        let config = load_config(None).expect("default config builds");

        assert_eq!(repair_text(&config, "eﬃcient ﬁndings"), "efficient findings");
        assert_eq!(repair_text(&config, "archæology"), "archaeology");
    }

    #[test]
    fn repair_rewrites_broken_accent_sequences() {
        let config = load_config(None).expect("default config builds");

        assert_eq!(
            repair_text(&config, "The e´tude was cliche´."),
            "The étude was cliché."
        );
        assert_eq!(repair_text(&config, "c¸a change"), "ça change");
        assert_eq!(repair_text(&config, "man~ana"), "mañana");
    }

    #[test]
    fn repair_is_idempotent_on_repaired_text() {
        let config = load_config(None).expect("default config builds");

        let samples = [
            "The e´tude was cliche´.",
            "eﬃcient ﬁndings about œdema",
            "plain text stays plain",
            "ı´ndice U¨ber re´sume´",
        ];

        for sample in samples {
            let once = repair_text(&config, sample);
            let twice = repair_text(&config, &once);
            assert_eq!(once, twice, "repair not idempotent for {sample:?}");
        }
    }

    #[test]
    fn repair_preserves_surrounding_text() {
        let config = load_config(None).expect("default config builds");

        let input = "before ﬁ after\nsecond e´ line";
        assert_eq!(repair_text(&config, input), "before fi after\nsecond é line");
    }
}
