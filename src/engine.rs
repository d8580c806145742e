use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, Context};

use crate::chunk::plan_chunks;
use crate::config::Locale;
use crate::diff::{compute_backlog, is_meta_key, DiffMode};
use crate::events::{ProgressEvent, ProgressSink};
use crate::executor::{execute_chunk, ChunkContext};
use crate::flatfile::{load_flat, save_flat};
use crate::options::TranslationOptions;
use crate::prompt::build_system_prompt;
use crate::provider::ChatProvider;

/// One source/target file pair to bring up to date. Created by the
/// orchestrator from the project's locale list; tasks never share a
/// target path.
#[derive(Clone, Debug)]
pub struct FileTask {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub source_locale: Locale,
    pub target_locale: Locale,
    /// Extra system-prompt text (project default plus per-locale).
    pub extra_prompt: Option<String>,
}

impl FileTask {
    /// Display name used in events and summaries.
    pub fn label(&self) -> String {
        self.target_path
            .file_name()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| self.target_path.display().to_string())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FileOutcome {
    /// Keys the diff put on the backlog.
    pub todo: usize,
    /// Keys translated and merged this run.
    pub written: usize,
}

/// Preview of a task's backlog size, computed by the orchestrator for
/// all tasks before scheduling so aggregate totals are known up front.
/// I/O problems count as zero here; the real run reports them.
pub fn count_todo(task: &FileTask, options: &TranslationOptions, mode: DiffMode) -> usize {
    let Ok(source) = load_flat(&task.source_path) else {
        return 0;
    };
    let Ok(target_entries) = load_flat(&task.target_path) else {
        return 0;
    };
    let target: BTreeMap<String, String> = target_entries.into_iter().collect();
    compute_backlog(&source, &target, mode, options.retranslate_equal_to_source)
        .todo
        .len()
}

/// Run one file task to completion: load both maps, diff, plan chunks,
/// translate, merge, write. The target is rewritten atomically after
/// every successful chunk, so an interrupted run resumes where it
/// stopped. Untouched target keys always persist; the write is a
/// merge, never a replacement.
pub fn translate_file(
    task: &FileTask,
    provider: &dyn ChatProvider,
    options: &TranslationOptions,
    mode: DiffMode,
    sink: &dyn ProgressSink,
) -> anyhow::Result<FileOutcome> {
    let label = task.label();

    let source = load_flat(&task.source_path)?;
    if source.is_empty() {
        return Err(anyhow!(
            "source file empty or missing: {}",
            task.source_path.display()
        ));
    }
    let mut target: BTreeMap<String, String> = load_flat(&task.target_path)?.into_iter().collect();

    let backlog = compute_backlog(&source, &target, mode, options.retranslate_equal_to_source);
    sink.emit(&ProgressEvent::Diff {
        file: label.clone(),
        src_keys: source.len(),
        target_keys: target.len(),
        todo_keys: backlog.todo.len(),
    });

    for key in &backlog.sync_empty {
        target.entry(key.clone()).or_default();
    }

    if backlog.todo.is_empty() {
        // Nothing to translate; still make sure the target exists.
        save_flat(&task.target_path, &target)?;
        sink.emit(&ProgressEvent::Noop { file: label });
        return Ok(FileOutcome { todo: 0, written: 0 });
    }

    let system_prompt = build_system_prompt(
        &task.source_locale.name,
        &task.target_locale.name,
        task.extra_prompt.as_deref(),
    );
    let chunks = plan_chunks(&backlog.todo, options, &system_prompt)?;
    sink.emit(&ProgressEvent::ChunkingDone {
        file: label.clone(),
        chunk_total: chunks.len(),
        todo_keys: backlog.todo.len(),
    });

    let total = chunks.len();
    let mut written = 0usize;
    for (i, chunk) in chunks.iter().enumerate() {
        let index = i + 1;
        sink.emit(&ProgressEvent::ChunkBegin {
            file: label.clone(),
            index,
            total,
            items: chunk.units.len(),
        });
        let t0 = Instant::now();

        let ctx = ChunkContext {
            provider,
            options,
            system_prompt: &system_prompt,
            sink,
            file: &label,
            index,
        };
        let result = execute_chunk(&ctx, &chunk.units)
            .with_context(|| format!("chunk {index}/{total} of {label}"))?;

        for (k, v) in result.translations {
            if is_meta_key(&k) {
                continue;
            }
            target.insert(k, v);
        }
        written += chunk.units.len();
        save_flat(&task.target_path, &target)?;

        sink.emit(&ProgressEvent::ChunkDone {
            file: label.clone(),
            index,
            total,
            items: chunk.units.len(),
            elapsed: t0.elapsed(),
        });
    }

    sink.emit(&ProgressEvent::AllDone {
        file: label,
        total_written: written,
    });
    Ok(FileOutcome {
        todo: backlog.todo.len(),
        written,
    })
}
