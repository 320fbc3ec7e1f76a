use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::pipeline::NO_MISSING_KNOWLEDGE;

static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));

/// First `{...}` in `text` that parses as a JSON object, ignoring prose around it.
pub fn must_extract_json_obj(text: &str) -> anyhow::Result<serde_json::Value> {
    let mut last_err = None;
    for (start, _) in text.match_indices('{') {
        let mut de = serde_json::Deserializer::from_str(&text[start..]);
        match serde_json::Value::deserialize(&mut de) {
            Ok(v) if v.is_object() => return Ok(v),
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
    }
    match last_err {
        Some(e) => Err(anyhow::Error::new(e).context("json_parse_failed")),
        None if text.contains('{') => anyhow::bail!("json_not_an_object"),
        None => anyhow::bail!("no_json_object_start"),
    }
}

pub fn signals_no_missing_knowledge(assessment: &str) -> bool {
    let Some(first) = assessment.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return false;
    };
    let first = first
        .trim_matches(|c: char| matches!(c, '`' | '"' | '\'' | '*' | '.' | '!' | ':'))
        .trim();
    first.eq_ignore_ascii_case(NO_MISSING_KNOWLEDGE)
}

pub fn clip_for_log(text: &str, max_chars: usize) -> String {
    let flat = WS_RE.replace_all(text.trim(), " ");
    if max_chars == 0 || flat.chars().count() <= max_chars {
        return flat.into_owned();
    }
    let mut out: String = flat.chars().take(max_chars).collect();
    out.push('…');
    out
}
