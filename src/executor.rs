use std::collections::{BTreeMap, BTreeSet};
use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::diff::TranslationUnit;
use crate::error::TranslationError;
use crate::events::{ProgressEvent, ProgressSink};
use crate::options::TranslationOptions;
use crate::placeholder::guard_value;
use crate::prompt::build_user_payload;
use crate::provider::{ChatProvider, ChatRequest, ProviderError};

/// Successful outcome for one chunk. Invariant: `translations` holds
/// exactly the chunk's keys (extras from a non-strict reply are already
/// dropped, missing keys have already failed).
#[derive(Clone, Debug)]
pub struct ChunkResult {
    pub translations: BTreeMap<String, String>,
}

/// Everything a chunk needs besides its units. The executor itself is
/// stateless: same chunk + same context, same behavior.
pub struct ChunkContext<'a> {
    pub provider: &'a dyn ChatProvider,
    pub options: &'a TranslationOptions,
    pub system_prompt: &'a str,
    pub sink: &'a dyn ProgressSink,
    /// Display name for events (target file name).
    pub file: &'a str,
    /// Planner-assigned chunk index, 1-based, kept across splits so
    /// events stay attributable.
    pub index: usize,
}

/// Translate one chunk, retrying transient failures with backoff and
/// bisecting on exhaustion. A chunk of one key that still fails is a
/// terminal error; anything larger degrades into two independent
/// halves, so a single poison key cannot take the whole batch down.
pub fn execute_chunk(
    ctx: &ChunkContext<'_>,
    units: &[TranslationUnit],
) -> Result<ChunkResult, TranslationError> {
    match attempt_chunk(ctx, units) {
        Ok(translations) => Ok(ChunkResult { translations }),
        // Splitting cannot fix a request the provider rejects outright.
        Err(err @ TranslationError::Provider(_)) => Err(err),
        Err(_) if units.len() > 1 => {
            let mid = units.len() / 2;
            ctx.sink.emit(&ProgressEvent::ChunkSplit {
                file: ctx.file.to_string(),
                index: ctx.index,
                left: mid,
                right: units.len() - mid,
            });
            let left = execute_chunk(ctx, &units[..mid])?;
            let right = execute_chunk(ctx, &units[mid..])?;
            let mut translations = left.translations;
            translations.extend(right.translations);
            Ok(ChunkResult { translations })
        }
        Err(err) => Err(err),
    }
}

/// Retry loop for a single request. The structured-output fallback is
/// transparent: a schema rejection flips `json_mode` off and re-issues
/// immediately, without consuming a retry or sleeping.
fn attempt_chunk(
    ctx: &ChunkContext<'_>,
    units: &[TranslationUnit],
) -> Result<BTreeMap<String, String>, TranslationError> {
    let payload = build_user_payload(units);
    let mut json_mode = ctx.options.prefer_json_schema;
    let mut attempt = 0usize;

    loop {
        let req = ChatRequest {
            system_prompt: ctx.system_prompt,
            user_payload: &payload,
            json_mode,
        };
        let outcome = match ctx.provider.chat_complete(&req) {
            Ok(text) => parse_and_validate(ctx.options, units, &text),
            Err(ProviderError::SchemaUnsupported(_)) if json_mode => {
                json_mode = false;
                continue;
            }
            Err(ProviderError::SchemaUnsupported(msg)) => {
                Err(TranslationError::SchemaUnsupported(msg))
            }
            Err(ProviderError::Transient(msg)) => Err(TranslationError::Transient(msg)),
            Err(ProviderError::Fatal(msg)) => return Err(TranslationError::Provider(msg)),
        };

        let err = match outcome {
            Ok(map) => return Ok(map),
            Err(err) => err,
        };

        ctx.sink.emit(&ProgressEvent::ChunkError {
            file: ctx.file.to_string(),
            index: ctx.index,
            attempt,
            error: err.to_string(),
        });

        if attempt >= ctx.options.retries || !err.is_retryable() {
            return Err(err);
        }
        backoff_sleep(
            attempt,
            ctx.options.backoff_base,
            ctx.options.backoff_jitter,
        );
        attempt += 1;
    }
}

fn parse_and_validate(
    options: &TranslationOptions,
    units: &[TranslationUnit],
    text: &str,
) -> Result<BTreeMap<String, String>, TranslationError> {
    let mut got = parse_reply(text)?;
    validate_keys(units, &got, options.strict_key_match)?;

    let expected: BTreeSet<&str> = units.iter().map(|u| u.key.as_str()).collect();
    got.retain(|k, _| expected.contains(k.as_str()));

    if options.placeholder_guard {
        for unit in units {
            if let Some(v) = got.get_mut(&unit.key) {
                *v = guard_value(&unit.source_text, v);
            }
        }
    }
    Ok(got)
}

/// Parse the reply as a flat JSON object. Code fences are tolerated in
/// free-form mode; null values coerce to empty strings.
fn parse_reply(text: &str) -> Result<BTreeMap<String, String>, TranslationError> {
    let cleaned = strip_code_fence(text);
    let value: serde_json::Value = serde_json::from_str(cleaned)
        .map_err(|e| TranslationError::Parse(e.to_string()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| TranslationError::Parse("reply is not a JSON object".to_string()))?;

    let mut out = BTreeMap::new();
    for (k, v) in obj {
        let text = match v {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out.insert(k.clone(), text);
    }
    Ok(out)
}

fn strip_code_fence(text: &str) -> &str {
    let mut s = text.trim();
    if s.starts_with("```") {
        if let Some(i) = s.find('\n') {
            s = &s[i + 1..];
        }
        if let Some(end) = s.rfind("```") {
            s = &s[..end];
        }
    }
    s.trim()
}

fn validate_keys(
    units: &[TranslationUnit],
    got: &BTreeMap<String, String>,
    strict: bool,
) -> Result<(), TranslationError> {
    let expected: BTreeSet<&str> = units.iter().map(|u| u.key.as_str()).collect();
    let got_keys: BTreeSet<&str> = got.keys().map(String::as_str).collect();

    let missing: Vec<String> = expected
        .difference(&got_keys)
        .take(5)
        .map(|s| s.to_string())
        .collect();
    let extra: Vec<String> = got_keys
        .difference(&expected)
        .take(5)
        .map(|s| s.to_string())
        .collect();

    if !missing.is_empty() || (strict && !extra.is_empty()) {
        return Err(TranslationError::KeyMismatch {
            missing,
            extra: if strict { extra } else { Vec::new() },
        });
    }
    Ok(())
}

fn backoff_sleep(attempt: usize, base: f64, jitter: f64) {
    if base <= 0.0 {
        return;
    }
    let jitter = if jitter > 0.0 {
        rand::thread_rng().gen_range(0.0..jitter)
    } else {
        0.0
    };
    thread::sleep(Duration::from_secs_f64(base.powi(attempt as i32) + jitter));
}
