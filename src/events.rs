use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Lifecycle events emitted while a file task runs. Each variant
/// carries a fixed payload; `file` is the display name of the target
/// file the event belongs to. Events are observability only: no
/// consumer decision feeds back into translation.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    Diff {
        file: String,
        src_keys: usize,
        target_keys: usize,
        todo_keys: usize,
    },
    ChunkingDone {
        file: String,
        chunk_total: usize,
        todo_keys: usize,
    },
    ChunkBegin {
        file: String,
        index: usize,
        total: usize,
        items: usize,
    },
    ChunkDone {
        file: String,
        index: usize,
        total: usize,
        items: usize,
        elapsed: Duration,
    },
    ChunkError {
        file: String,
        index: usize,
        attempt: usize,
        error: String,
    },
    ChunkSplit {
        file: String,
        index: usize,
        left: usize,
        right: usize,
    },
    Noop {
        file: String,
    },
    AllDone {
        file: String,
        total_written: usize,
    },
}

/// Consumer of progress events. Implementations are called from
/// multiple worker threads and must serialize their own output; they
/// must also never fail in a way that aborts translation (swallow your
/// own I/O errors).
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent);
}

/// Discards everything.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: &ProgressEvent) {}
}

/// Human-readable stderr reporting with run-relative timestamps.
pub struct ConsoleSink {
    enabled: bool,
    t0: Instant,
}

impl ConsoleSink {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            t0: Instant::now(),
        }
    }

    fn line(&self, msg: String) {
        let ts = fmt_elapsed(self.t0.elapsed().as_secs_f64());
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "[{ts}] {msg}");
    }
}

impl ProgressSink for ConsoleSink {
    fn emit(&self, event: &ProgressEvent) {
        if !self.enabled {
            return;
        }
        match event {
            ProgressEvent::Diff {
                file,
                src_keys,
                target_keys,
                todo_keys,
            } => self.line(format!(
                "{file}: diff src={src_keys} target={target_keys} todo={todo_keys}"
            )),
            ProgressEvent::ChunkingDone {
                file,
                chunk_total,
                todo_keys,
            } => self.line(format!("{file}: {todo_keys} keys in {chunk_total} chunks")),
            ProgressEvent::ChunkBegin {
                file,
                index,
                total,
                items,
            } => self.line(format!("{file}: chunk {index}/{total} ({items} keys)...")),
            ProgressEvent::ChunkDone {
                file,
                index,
                total,
                items,
                elapsed,
            } => self.line(format!(
                "{file}: chunk {index}/{total} done ({items} keys, {:.1}s)",
                elapsed.as_secs_f64()
            )),
            ProgressEvent::ChunkError {
                file,
                index,
                attempt,
                error,
            } => self.line(format!(
                "{file}: chunk {index} attempt {attempt} failed: {error}"
            )),
            ProgressEvent::ChunkSplit {
                file,
                index,
                left,
                right,
            } => self.line(format!(
                "{file}: chunk {index} split into {left}+{right} keys"
            )),
            ProgressEvent::Noop { file } => self.line(format!("{file}: nothing to translate")),
            ProgressEvent::AllDone {
                file,
                total_written,
            } => self.line(format!("{file}: done, {total_written} keys written")),
        }
    }
}

fn fmt_elapsed(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
