use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context};
use once_cell::sync::Lazy;
use regex::Regex;

/// Supported flat-document formats, detected by extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlatFormat {
    Json,
    Strings,
}

pub fn detect_format(path: &Path) -> anyhow::Result<FlatFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(FlatFormat::Json),
        Some("strings") => Ok(FlatFormat::Strings),
        _ => Err(anyhow!("unsupported flat file type: {}", path.display())),
    }
}

/// Load a flat key→string document. A missing file is an empty map.
/// Entry order follows the file, so downstream chunk planning is
/// reproducible run over run.
pub fn load_flat(path: &Path) -> anyhow::Result<Vec<(String, String)>> {
    let format = detect_format(path)?;
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read flat file: {}", path.display()))?;
    match format {
        FlatFormat::Json => parse_json_flat(&text).with_context(|| format!("{}", path.display())),
        FlatFormat::Strings => Ok(parse_strings_flat(&text)),
    }
}

/// Write the merged map back, staged through a temp file and renamed
/// over the target so readers never observe a partial document. Keys
/// are sorted; output is stable byte-for-byte for a given map.
pub fn save_flat(path: &Path, data: &BTreeMap<String, String>) -> anyhow::Result<()> {
    let format = detect_format(path)?;
    let text = match format {
        FlatFormat::Json => render_json_flat(data),
        FlatFormat::Strings => render_strings_flat(data),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create dir: {}", parent.display()))?;
    }
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("bad target path: {}", path.display()))?;
    let tmp = path.with_file_name(format!("{file_name}.tmp"));
    std::fs::write(&tmp, text).with_context(|| format!("write temp file: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("rename into place: {}", path.display()))?;
    Ok(())
}

fn parse_json_flat(text: &str) -> anyhow::Result<Vec<(String, String)>> {
    let value: serde_json::Value = serde_json::from_str(text).context("parse json")?;
    let obj = value
        .as_object()
        .ok_or_else(|| anyhow!("json root must be an object"))?;

    let mut out = Vec::with_capacity(obj.len());
    for (k, v) in obj {
        let text = match v {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out.push((k.clone(), text));
    }
    Ok(out)
}

fn render_json_flat(data: &BTreeMap<String, String>) -> String {
    let mut map = serde_json::Map::with_capacity(data.len());
    for (k, v) in data {
        map.insert(k.clone(), serde_json::Value::String(v.clone()));
    }
    let mut text = serde_json::to_string_pretty(&serde_json::Value::Object(map))
        .expect("serialize flat map");
    text.push('\n');
    text
}

static STRINGS_PAIR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*"((?:\\.|[^"\\])*)"\s*=\s*"((?:\\.|[^"\\])*)"\s*;\s*$"#)
        .expect("strings pair regex")
});

/// Reading tolerates `/* */` and `//` comments and skips anything else;
/// on duplicate keys the later entry wins.
fn parse_strings_flat(text: &str) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    let mut index: BTreeMap<String, usize> = BTreeMap::new();
    let mut in_block_comment = false;

    for line in text.lines() {
        let stripped = line.trim();

        if in_block_comment {
            if line.contains("*/") {
                in_block_comment = false;
            }
            continue;
        }
        if stripped.starts_with("/*") {
            if !line.contains("*/") {
                in_block_comment = true;
            }
            continue;
        }
        if stripped.starts_with("//") {
            continue;
        }

        if let Some(caps) = STRINGS_PAIR_RE.captures(line) {
            let key = unescape_strings(&caps[1]);
            let val = unescape_strings(&caps[2]);
            match index.get(&key) {
                Some(&i) => out[i].1 = val,
                None => {
                    index.insert(key.clone(), out.len());
                    out.push((key, val));
                }
            }
        }
    }
    out
}

/// Writing emits comment-free sorted pairs only.
fn render_strings_flat(data: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (k, v) in data {
        out.push('"');
        out.push_str(&escape_strings(k));
        out.push_str("\" = \"");
        out.push_str(&escape_strings(v));
        out.push_str("\";\n");
    }
    out
}

fn unescape_strings(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn escape_strings(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{load_flat, save_flat};
    use std::collections::BTreeMap;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn json_round_trip_preserves_file_order_on_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("en.json");
        std::fs::write(&path, r#"{"zeta":"Z","alpha":"A","@@locale":"en"}"#).unwrap();

        let loaded = load_flat(&path).expect("load");
        let keys: Vec<&str> = loaded.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "@@locale"]);
    }

    #[test]
    fn missing_file_is_an_empty_map() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = load_flat(&dir.path().join("nope.json")).expect("load");
        assert!(loaded.is_empty());
    }

    #[test]
    fn json_values_are_coerced_to_strings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("odd.json");
        std::fs::write(&path, r#"{"a":null,"b":3,"c":"ok"}"#).unwrap();

        let loaded = load_flat(&path).expect("load");
        assert_eq!(loaded[0].1, "");
        assert_eq!(loaded[1].1, "3");
        assert_eq!(loaded[2].1, "ok");
    }

    #[test]
    fn save_is_sorted_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.json");
        save_flat(&path, &map(&[("b", "2"), ("a", "1")])).expect("save");

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\n  \"a\": \"1\""));
        assert!(text.ends_with("\n"));
        assert!(!dir.path().join("out.json.tmp").exists());

        let loaded = load_flat(&path).expect("reload");
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn strings_parsing_skips_comments_and_unescapes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("Localizable.strings");
        let body = concat!(
            "/* header\n",
            "   comment */\n",
            "// line comment\n",
            "\"greeting\" = \"Hello \\\"World\\\"\";\n",
            "\"multi\" = \"line1\\nline2\";\n",
            "\"greeting\" = \"Replaced\";\n",
        );
        std::fs::write(&path, body).unwrap();

        let loaded = load_flat(&path).expect("load");
        let as_map: BTreeMap<_, _> = loaded.into_iter().collect();
        assert_eq!(as_map["greeting"], "Replaced");
        assert_eq!(as_map["multi"], "line1\nline2");
    }

    #[test]
    fn strings_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.strings");
        save_flat(&path, &map(&[("b.key", "two\nlines"), ("a.key", "quote \" here")]))
            .expect("save");

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("\"a.key\""));

        let loaded = load_flat(&path).expect("reload");
        let as_map: BTreeMap<_, _> = loaded.into_iter().collect();
        assert_eq!(as_map["b.key"], "two\nlines");
        assert_eq!(as_map["a.key"], "quote \" here");
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(load_flat(std::path::Path::new("x.yaml")).is_err());
    }
}
