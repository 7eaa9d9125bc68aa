//! Parallel elaboration engine for yolohdl
//!
//! This crate provides:
//! - A dedicated rayon thread pool sized from the configuration
//! - Independent task execution with per-task error and panic capture
//! - Aggregation of every failure into a single error after all tasks ran
//! - Completion statistics

use rayon::prelude::*;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum ParallelError {
    #[error("Failed to build worker pool: {0}")]
    PoolBuild(String),
    #[error("{} of {total} tasks failed: {}", .failures.len(), summarize(.failures))]
    TasksFailed {
        total: usize,
        failures: Vec<TaskFailure>,
    },
}

pub type ParallelResult<T> = Result<T, ParallelError>;

fn summarize(failures: &[TaskFailure]) -> String {
    failures
        .iter()
        .map(TaskFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A task that returned an error or panicked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// Position of the task in the submitted slice
    pub index: usize,
    /// Task label, e.g. the unit name
    pub label: String,
    pub message: String,
    pub panicked: bool,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.panicked {
            write!(f, "{} panicked: {}", self.label, self.message)
        } else {
            write!(f, "{}: {}", self.label, self.message)
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of worker threads
    pub worker_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
        }
    }
}

/// Elaboration engine
pub struct ElaborationEngine {
    pool: rayon::ThreadPool,
    config: EngineConfig,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl ElaborationEngine {
    pub fn new() -> ParallelResult<Self> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> ParallelResult<Self> {
        let threads = config.worker_threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("yolohdl-worker-{i}"))
            .build()
            .map_err(|e| ParallelError::PoolBuild(e.to_string()))?;

        Ok(Self {
            pool,
            config: EngineConfig {
                worker_threads: threads,
            },
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `job` on every task and collect the results in task order
    ///
    /// Every task runs even when others fail. Errors and panics are logged
    /// with the task label and returned together.
    pub fn run<T, R, E, F>(&self, tasks: &[T], job: F) -> ParallelResult<Vec<R>>
    where
        T: fmt::Display + Sync,
        R: Send,
        E: fmt::Display,
        F: Fn(&T) -> Result<R, E> + Sync,
    {
        info!(
            "Elaborating {} tasks on {} workers",
            tasks.len(),
            self.config.worker_threads
        );
        let start = Instant::now();

        let outcomes: Vec<Result<R, TaskFailure>> = self.pool.install(|| {
            tasks
                .par_iter()
                .enumerate()
                .map(|(index, task)| self.run_one(index, task, &job))
                .collect()
        });

        let mut results = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(failure) => failures.push(failure),
            }
        }

        info!(
            "Finished {} tasks in {:.2?} ({} failed)",
            tasks.len(),
            start.elapsed(),
            failures.len()
        );

        if failures.is_empty() {
            Ok(results)
        } else {
            Err(ParallelError::TasksFailed {
                total: tasks.len(),
                failures,
            })
        }
    }

    fn run_one<T, R, E, F>(&self, index: usize, task: &T, job: &F) -> Result<R, TaskFailure>
    where
        T: fmt::Display,
        E: fmt::Display,
        F: Fn(&T) -> Result<R, E>,
    {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(task)));
        let (message, panicked) = match outcome {
            Ok(Ok(result)) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                return Ok(result);
            }
            Ok(Err(e)) => (e.to_string(), false),
            Err(payload) => (panic_message(payload.as_ref()), true),
        };

        self.failed.fetch_add(1, Ordering::Relaxed);
        let failure = TaskFailure {
            index,
            label: task.to_string(),
            message,
            panicked,
        };
        error!("{}", failure);
        Err(failure)
    }

    /// Completion statistics since the engine was built
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            worker_threads: self.config.worker_threads,
            completed_tasks: self.completed.load(Ordering::Relaxed),
            failed_tasks: self.failed.load(Ordering::Relaxed),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Elaboration statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    pub worker_threads: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
}

impl EngineStats {
    pub fn efficiency(&self) -> f64 {
        let total_tasks = self.completed_tasks + self.failed_tasks;
        if total_tasks == 0 {
            0.0
        } else {
            self.completed_tasks as f64 / total_tasks as f64 * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(threads: usize) -> ElaborationEngine {
        ElaborationEngine::with_config(EngineConfig {
            worker_threads: threads,
        })
        .unwrap()
    }

    #[test]
    fn test_engine_creation() {
        let engine = ElaborationEngine::new().unwrap();
        assert!(engine.config().worker_threads > 0);
        assert_eq!(self::engine(0).config().worker_threads, 1);
    }

    #[test]
    fn test_results_keep_task_order() {
        let engine = engine(4);
        let tasks: Vec<u32> = (0..100).collect();
        let squares = engine
            .run(&tasks, |&n| Ok::<_, String>(n * n))
            .unwrap();
        assert_eq!(squares, tasks.iter().map(|n| n * n).collect::<Vec<_>>());
        assert_eq!(engine.stats().completed_tasks, 100);
    }

    #[test]
    fn test_failures_are_aggregated() {
        let engine = engine(2);
        let tasks: Vec<u32> = (0..10).collect();
        let err = engine
            .run(&tasks, |&n| {
                if n % 4 == 1 {
                    Err(format!("bad unit {n}"))
                } else {
                    Ok(n)
                }
            })
            .unwrap_err();

        match err {
            ParallelError::TasksFailed { total, failures } => {
                assert_eq!(total, 10);
                let indices: Vec<usize> = failures.iter().map(|f| f.index).collect();
                assert_eq!(indices, vec![1, 5, 9]);
                assert_eq!(failures[1].to_string(), "5: bad unit 5");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(engine.stats().failed_tasks, 3);
        assert_eq!(engine.stats().completed_tasks, 7);
    }

    #[test]
    fn test_panics_are_captured() {
        let engine = engine(2);
        let tasks = vec![1u32, 2, 3];
        let err = engine
            .run(&tasks, |&n| {
                if n == 2 {
                    panic!("unit {n} exploded");
                }
                Ok::<_, String>(n)
            })
            .unwrap_err();
        let ParallelError::TasksFailed { failures, .. } = err else {
            panic!("expected task failures");
        };
        assert_eq!(failures.len(), 1);
        assert!(failures[0].panicked);
        assert_eq!(failures[0].message, "unit 2 exploded");
    }

    #[test]
    fn test_stats_efficiency() {
        let stats = EngineStats {
            worker_threads: 4,
            completed_tasks: 90,
            failed_tasks: 10,
        };
        assert_eq!(stats.efficiency(), 90.0);
    }
}
