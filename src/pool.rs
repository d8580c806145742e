use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::anyhow;

use crate::diff::DiffMode;
use crate::engine::{count_todo, translate_file, FileTask};
use crate::events::{ProgressEvent, ProgressSink};
use crate::options::TranslationOptions;
use crate::provider::ChatProvider;

/// Worker cap when the caller does not pick one; the effective pool is
/// never larger than the task count.
pub const DEFAULT_MAX_WORKERS: usize = 8;

#[derive(Clone, Debug)]
pub struct PoolOptions {
    pub max_workers: Option<usize>,
    /// Stop scheduling new tasks after the first failure. Tasks already
    /// running always finish; they are never killed mid-write.
    pub fail_fast: bool,
    pub mode: DiffMode,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_workers: None,
            fail_fast: false,
            mode: DiffMode::Incremental,
        }
    }
}

#[derive(Debug)]
pub struct JobResult {
    pub task: FileTask,
    pub ok: bool,
    pub todo: usize,
    pub translated: usize,
    pub elapsed: Duration,
    /// Error class and file, no stack trace.
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct PoolResult {
    /// One entry per task, in submission order.
    pub results: Vec<JobResult>,
    pub elapsed: Duration,
}

impl PoolResult {
    pub fn ok_count(&self) -> usize {
        self.results.iter().filter(|r| r.ok).count()
    }

    pub fn fail_count(&self) -> usize {
        self.results.len() - self.ok_count()
    }

    pub fn total_translated(&self) -> usize {
        self.results.iter().map(|r| r.translated).sum()
    }

    pub fn files_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.results.len() as f64 / secs
    }
}

/// Worker-side sink: forwards every event into the aggregator channel.
/// The receiving end is drained by a single consumer, so downstream
/// sinks see a serialized stream without any ad hoc output locking.
struct ChannelSink {
    tx: Mutex<Sender<ProgressEvent>>,
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: &ProgressEvent) {
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send(event.clone());
        }
    }
}

/// Fan a list of file tasks out over a bounded worker pool. Each worker
/// translates whole files serially; parallelism is cross-file only.
/// Per-file failures are recorded and counted, never propagated to
/// sibling tasks.
pub fn translate_files(
    tasks: Vec<FileTask>,
    provider: &dyn ChatProvider,
    options: &TranslationOptions,
    pool: &PoolOptions,
    sink: &dyn ProgressSink,
) -> anyhow::Result<PoolResult> {
    if tasks.is_empty() {
        return Ok(PoolResult {
            results: Vec::new(),
            elapsed: Duration::ZERO,
        });
    }

    // Two jobs writing one target path would race; refuse up front.
    let mut seen: HashMap<PathBuf, usize> = HashMap::new();
    for (i, task) in tasks.iter().enumerate() {
        let key = std::path::absolute(&task.target_path)
            .unwrap_or_else(|_| task.target_path.clone());
        if let Some(&first) = seen.get(&key) {
            return Err(anyhow!(
                "duplicate target path: {} (tasks {} and {})",
                task.target_path.display(),
                first + 1,
                i + 1
            ));
        }
        seen.insert(key, i);
    }

    let started = Instant::now();
    let workers = pool
        .max_workers
        .unwrap_or(DEFAULT_MAX_WORKERS)
        .clamp(1, tasks.len());

    // Backlogs are sized before anything is scheduled, so totals are
    // known up front and failed or never-started jobs still report how
    // much work they were holding.
    let planned: Vec<usize> = tasks
        .iter()
        .map(|t| count_todo(t, options, pool.mode))
        .collect();

    let cursor = AtomicUsize::new(0);
    let stop = AtomicBool::new(false);
    let slots: Mutex<Vec<Option<JobResult>>> =
        Mutex::new((0..tasks.len()).map(|_| None).collect());

    let (tx, rx) = mpsc::channel::<ProgressEvent>();

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let worker_tx = tx.clone();
            let tasks = &tasks;
            let planned = &planned;
            let cursor = &cursor;
            let stop = &stop;
            let slots = &slots;
            scope.spawn(move || {
                let sink = ChannelSink {
                    tx: Mutex::new(worker_tx),
                };
                loop {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    let idx = cursor.fetch_add(1, Ordering::SeqCst);
                    if idx >= tasks.len() {
                        break;
                    }
                    let task = &tasks[idx];
                    let t0 = Instant::now();
                    let result = match translate_file(task, provider, options, pool.mode, &sink) {
                        Ok(outcome) => JobResult {
                            task: task.clone(),
                            ok: true,
                            todo: outcome.todo,
                            translated: outcome.written,
                            elapsed: t0.elapsed(),
                            error: None,
                        },
                        Err(err) => {
                            if pool.fail_fast {
                                stop.store(true, Ordering::SeqCst);
                            }
                            JobResult {
                                task: task.clone(),
                                ok: false,
                                todo: planned[idx],
                                translated: 0,
                                elapsed: t0.elapsed(),
                                error: Some(format!("{err:#}")),
                            }
                        }
                    };
                    slots.lock().expect("result slots")[idx] = Some(result);
                }
            });
        }
        drop(tx);

        // Single consumer: the event stream reaches the caller's sink in
        // arrival order, already serialized.
        for event in rx.iter() {
            sink.emit(&event);
        }
    });

    let slots = slots.into_inner().expect("result slots");
    let results: Vec<JobResult> = slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.unwrap_or_else(|| JobResult {
                task: tasks[i].clone(),
                ok: false,
                todo: planned[i],
                translated: 0,
                elapsed: Duration::ZERO,
                error: Some("not executed (fail-fast)".to_string()),
            })
        })
        .collect();

    Ok(PoolResult {
        results,
        elapsed: started.elapsed(),
    })
}
