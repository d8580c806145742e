use std::collections::BTreeMap;

/// Reserved prefix for metadata keys. They are carried through merges
/// untouched and never sent for translation.
pub const META_PREFIX: &str = "@@";

pub fn is_meta_key(key: &str) -> bool {
    key.starts_with(META_PREFIX)
}

/// One key worth of translatable text, as read from a source file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslationUnit {
    pub key: String,
    pub source_text: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiffMode {
    /// Translate only what the target is missing.
    Incremental,
    /// Retranslate every source key regardless of target state.
    Full,
}

/// What a file task has to do: the units to translate, in source
/// order, plus keys whose source text is blank and is only synced into
/// the target without a request.
#[derive(Clone, Debug, Default)]
pub struct Backlog {
    pub todo: Vec<TranslationUnit>,
    pub sync_empty: Vec<String>,
}

/// Compute the translation backlog for one source/target pair.
///
/// Incremental rules: a key needs translation when the target lacks it,
/// the target value is empty, or (with `retranslate_equal_to_source`)
/// the target value is byte-identical to the source value. The last
/// rule reads "still equals the source" as "seeded but never
/// translated"; it misfires on strings that are legitimately identical
/// across languages, which is why it is a policy knob rather than a
/// hardcoded assumption.
pub fn compute_backlog(
    source: &[(String, String)],
    target: &BTreeMap<String, String>,
    mode: DiffMode,
    retranslate_equal_to_source: bool,
) -> Backlog {
    let mut backlog = Backlog::default();

    for (key, src_text) in source {
        if is_meta_key(key) {
            continue;
        }
        if src_text.trim().is_empty() {
            backlog.sync_empty.push(key.clone());
            continue;
        }

        let needed = match mode {
            DiffMode::Full => true,
            DiffMode::Incremental => match target.get(key) {
                None => true,
                Some(t) if t.is_empty() => true,
                Some(t) => retranslate_equal_to_source && t == src_text,
            },
        };
        if needed {
            backlog.todo.push(TranslationUnit {
                key: key.clone(),
                source_text: src_text.clone(),
            });
        }
    }

    backlog
}

#[cfg(test)]
mod tests {
    use super::{compute_backlog, DiffMode};
    use std::collections::BTreeMap;

    fn src(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn tgt(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn equal_to_source_counts_as_untranslated() {
        let source = src(&[("a", "X"), ("b", "Y")]);
        let target = tgt(&[("a", "X-translated"), ("b", "Y")]);
        let backlog = compute_backlog(&source, &target, DiffMode::Incremental, true);
        let keys: Vec<&str> = backlog.todo.iter().map(|u| u.key.as_str()).collect();
        assert_eq!(keys, vec!["b"]);
        assert_eq!(backlog.todo[0].source_text, "Y");
    }

    #[test]
    fn equal_to_source_policy_can_be_disabled() {
        let source = src(&[("brand", "Acme"), ("missing", "New")]);
        let target = tgt(&[("brand", "Acme")]);
        let backlog = compute_backlog(&source, &target, DiffMode::Incremental, false);
        let keys: Vec<&str> = backlog.todo.iter().map(|u| u.key.as_str()).collect();
        assert_eq!(keys, vec!["missing"]);
    }

    #[test]
    fn missing_and_empty_targets_need_translation() {
        let source = src(&[("a", "A"), ("b", "B"), ("c", "C")]);
        let target = tgt(&[("a", ""), ("c", "ok")]);
        let backlog = compute_backlog(&source, &target, DiffMode::Incremental, true);
        let keys: Vec<&str> = backlog.todo.iter().map(|u| u.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn full_mode_ignores_target_state() {
        let source = src(&[("a", "A"), ("b", "B")]);
        let target = tgt(&[("a", "done"), ("b", "done")]);
        let backlog = compute_backlog(&source, &target, DiffMode::Full, true);
        assert_eq!(backlog.todo.len(), 2);
    }

    #[test]
    fn meta_keys_and_blank_sources_are_skipped() {
        let source = src(&[("@@locale", "en"), ("spacer", "   "), ("real", "Text")]);
        let target = BTreeMap::new();
        let backlog = compute_backlog(&source, &target, DiffMode::Incremental, true);
        let keys: Vec<&str> = backlog.todo.iter().map(|u| u.key.as_str()).collect();
        assert_eq!(keys, vec!["real"]);
        assert_eq!(backlog.sync_empty, vec!["spacer".to_string()]);
    }
}
