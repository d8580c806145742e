use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// One pattern covers every placeholder family we promise to preserve:
/// mustache `{{name}}`, shell `${name}`, ruby `%{name}`, python
/// `%(name)s`, printf `%1$.2f` / `%@` / `%%`, and bare brace `{name}`.
/// Alternation order matters: the double-brace form must win over the
/// single-brace catch-all.
static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    let pat = concat!(
        r"(?:",
        r"\{\{\s*[A-Za-z0-9_.\-]+\s*\}\}",
        r"|\$\{\s*[A-Za-z0-9_.\-]+\s*\}",
        r"|%\{\s*[A-Za-z0-9_.\-]+\s*\}",
        r"|%\(\s*[A-Za-z0-9_.\-]+\s*\)[a-zA-Z]",
        r"|%(?:\d+\$)?[#0 +'\-]*\d*(?:\.\d+)?[a-zA-Z@]",
        r"|%%",
        r"|\{[^{}]+\}",
        r")",
    );
    Regex::new(pat).expect("placeholder regex")
});

/// Prompt-visible examples, kept in sync with the pattern above.
pub const PLACEHOLDER_EXAMPLES: &str =
    "{name}, {0}, {{name}}, ${name}, %{name}, %(name)s, %1$s, %@, %.2f, %%";

/// Ordered placeholder occurrences in `text`.
pub fn extract_placeholders(text: &str) -> Vec<String> {
    PLACEHOLDER_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn multiset(items: &[String]) -> HashMap<&str, usize> {
    let mut out: HashMap<&str, usize> = HashMap::new();
    for s in items {
        *out.entry(s.as_str()).or_insert(0) += 1;
    }
    out
}

/// True when both texts carry the same placeholder multiset (order may
/// differ; translation legitimately moves tokens around).
pub fn placeholders_compatible(source: &str, candidate: &str) -> bool {
    multiset(&extract_placeholders(source)) == multiset(&extract_placeholders(candidate))
}

/// Best-effort repair, not a validator. When the candidate's
/// placeholders diverge from the source's, each placeholder slot in the
/// candidate is rewritten with the source placeholder at the same
/// position, keeping the surrounding translated prose. Slots beyond the
/// source's count are left as-is; missing placeholders are never
/// invented. Success of the chunk is decided by key validation alone.
pub fn guard_value(source: &str, candidate: &str) -> String {
    let src_ph = extract_placeholders(source);
    if src_ph.is_empty() || placeholders_compatible(source, candidate) {
        return candidate.to_string();
    }

    let mut out = String::with_capacity(candidate.len());
    let mut pos = 0usize;
    let mut it = src_ph.iter();
    for m in PLACEHOLDER_RE.find_iter(candidate) {
        out.push_str(&candidate[pos..m.start()]);
        match it.next() {
            Some(orig) => out.push_str(orig),
            None => out.push_str(m.as_str()),
        }
        pos = m.end();
    }
    out.push_str(&candidate[pos..]);
    out
}

#[cfg(test)]
mod tests {
    use super::{extract_placeholders, guard_value, placeholders_compatible};

    #[test]
    fn extracts_every_family() {
        let text = "a {{name}} b ${var} c %{x} d %(key)s e %1$.2f f %@ g %% h {plain}";
        assert_eq!(
            extract_placeholders(text),
            vec!["{{name}}", "${var}", "%{x}", "%(key)s", "%1$.2f", "%@", "%%", "{plain}"]
        );
    }

    #[test]
    fn reordered_placeholders_are_compatible() {
        assert!(placeholders_compatible(
            "%1$@ meets %2$@",
            "%2$@ と %1$@ が出会う"
        ));
        assert!(!placeholders_compatible("Hello, {name}!", "你好，{user}！"));
    }

    #[test]
    fn repairs_renamed_brace_placeholder() {
        assert_eq!(
            guard_value("Hello, {name}!", "你好，{user}！"),
            "你好，{name}！"
        );
    }

    #[test]
    fn repairs_mangled_printf_token() {
        assert_eq!(guard_value("Save %1$.2f MB", "Spare %1$f MB"), "Spare %1$.2f MB");
    }

    #[test]
    fn count_mismatch_keeps_extra_slots() {
        // Two candidate slots, one source placeholder: first slot is
        // repaired, the surplus stays untouched.
        assert_eq!(guard_value("Use {a}", "Nutze {x} und {y}"), "Nutze {a} und {y}");
    }

    #[test]
    fn no_placeholders_passes_through() {
        assert_eq!(guard_value("Done", "完了 {oops}"), "完了 {oops}");
    }
}
