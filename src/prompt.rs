use crate::diff::TranslationUnit;
use crate::placeholder::PLACEHOLDER_EXAMPLES;

/// Fixed translator instructions. Locale names are human-readable
/// ("English", "Traditional Chinese"); short codes are a file-naming
/// concern and never reach the prompt. Project and per-locale extra
/// text is appended verbatim.
pub fn build_system_prompt(source_lang: &str, target_lang: &str, extra: Option<&str>) -> String {
    let mut prompt = format!(
        "You are a professional localization translator for apps and web. \
         Translate from {source_lang} to {target_lang}. \
         Translate UI strings naturally for a mobile UI. \
         Be concise, clear, and consistent. \
         Preserve product/brand names (proper nouns) and URLs verbatim. \
         Preserve ALL placeholders and formatting tokens EXACTLY as-is \
         (e.g., {PLACEHOLDER_EXAMPLES}). \
         Keep formatting intact (punctuation, line breaks, spacing) while making the wording natural. \
         Return ONLY a single valid JSON object. \
         The JSON keys MUST match the input keys exactly; translate ONLY the values. \
         No extra commentary. No markdown. No code fences. \
         The input JSON is a flat object mapping keys to strings. \
         Output a JSON object with the SAME keys ONLY."
    );
    if let Some(extra) = extra.map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push(' ');
        prompt.push_str(extra);
    }
    prompt
}

/// Compact JSON object `{key: sourceText, ...}` in chunk order. The
/// target locale is conveyed by the system prompt, not the payload.
pub fn build_user_payload(units: &[TranslationUnit]) -> String {
    let mut map = serde_json::Map::with_capacity(units.len());
    for unit in units {
        map.insert(
            unit.key.clone(),
            serde_json::Value::String(unit.source_text.clone()),
        );
    }
    serde_json::Value::Object(map).to_string()
}

#[cfg(test)]
mod tests {
    use super::{build_system_prompt, build_user_payload};
    use crate::diff::TranslationUnit;

    #[test]
    fn payload_is_a_compact_object_in_chunk_order() {
        let units = vec![
            TranslationUnit {
                key: "b".into(),
                source_text: "Second".into(),
            },
            TranslationUnit {
                key: "a".into(),
                source_text: "First".into(),
            },
        ];
        assert_eq!(build_user_payload(&units), r#"{"b":"Second","a":"First"}"#);
    }

    #[test]
    fn extra_prompt_text_is_appended() {
        let base = build_system_prompt("English", "Japanese", None);
        let extended = build_system_prompt("English", "Japanese", Some("Keep it formal."));
        assert!(extended.starts_with(&base));
        assert!(extended.ends_with("Keep it formal."));
        assert!(base.contains("from English to Japanese"));
    }
}
