use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::models::CompletionResult;

use super::reflective::ReflectionStage;

/// The four stage results of one reflective run, in execution order.
#[derive(Clone, Debug, PartialEq)]
pub struct ReflectionTrace {
    results: [CompletionResult; 4],
}

impl ReflectionTrace {
    pub(crate) fn new(
        knowledge: CompletionResult,
        initial: CompletionResult,
        assessment: CompletionResult,
        final_translation: CompletionResult,
    ) -> Self {
        Self {
            results: [knowledge, initial, assessment, final_translation],
        }
    }

    pub fn results(&self) -> &[CompletionResult] {
        &self.results
    }

    pub fn into_results(self) -> [CompletionResult; 4] {
        self.results
    }

    pub fn get(&self, stage: ReflectionStage) -> &CompletionResult {
        &self.results[stage.index() - 1]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ReflectionStage, &CompletionResult)> {
        ReflectionStage::ALL.into_iter().zip(self.results.iter())
    }

    pub fn knowledge_triplets(&self) -> &str {
        &self.get(ReflectionStage::Extract).text
    }

    pub fn initial_translation(&self) -> &str {
        &self.get(ReflectionStage::Translate).text
    }

    pub fn assessment(&self) -> &str {
        &self.get(ReflectionStage::Assess).text
    }

    pub fn final_translation(&self) -> &str {
        &self.get(ReflectionStage::Improve).text
    }

    /// Whether the improve stage copied the initial translation without a model call.
    pub fn is_pass_through(&self) -> bool {
        self.get(ReflectionStage::Improve)
            .metadata
            .get("pass_through")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

#[derive(Serialize)]
struct StageRecord<'a> {
    index: usize,
    stage: ReflectionStage,
    text: &'a str,
    metadata: &'a serde_json::Value,
}

impl Serialize for ReflectionTrace {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.results.len()))?;
        for (stage, result) in self.iter() {
            seq.serialize_element(&StageRecord {
                index: stage.index(),
                stage,
                text: &result.text,
                metadata: &result.metadata,
            })?;
        }
        seq.end()
    }
}

/// Dumps prompts and raw outputs to disk for inspection. Disabled writers are no-ops.
pub struct TraceWriter {
    dir: PathBuf,
    enabled: bool,
}

impl TraceWriter {
    pub fn new(dir: PathBuf, enabled: bool) -> anyhow::Result<Self> {
        if enabled {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create trace dir: {}", dir.display()))?;
        }
        Ok(Self { dir, enabled })
    }

    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            enabled: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// A writer for one request, in a subdirectory named `<unix-secs>-<text-hash>`.
    pub fn for_run(&self, source_text: &str) -> anyhow::Result<Self> {
        if !self.enabled {
            return Ok(Self::disabled());
        }
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let digest = hex::encode(Sha256::digest(source_text.as_bytes()));
        Self::new(self.dir.join(format!("{secs}-{}", &digest[..12])), true)
    }

    pub fn write_named_text(&self, name: &str, text: &str) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let path = self.dir.join(sanitize_filename(name));
        std::fs::write(&path, text).with_context(|| format!("write trace: {}", path.display()))?;
        Ok(())
    }

    /// Writes `NN.<label>.<kind>.txt`. Failures are logged, never returned.
    pub fn write_step_text(&self, index: usize, label: &str, kind: &str, text: &str) {
        let name = format!("{index:02}.{label}.{kind}.txt");
        if let Err(err) = self.write_named_text(&name, text) {
            tracing::warn!(error = %format!("{err:#}"), "trace write failed");
        }
    }
}

fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => out.push('_'),
            _ => out.push(ch),
        }
    }
    out
}
