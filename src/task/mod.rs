//! Task combinator engine.
//!
//! # Responsibilities
//! - Represent deferred, fallible units of work ([`Task`])
//! - Compose them declaratively: parallel fan-out, sequential chains,
//!   success/failure continuations, a bound cancellation token
//! - Surface the first failure of a parallel group (first wins)
//!
//! # Data Flow
//! ```text
//! ExecutionOption* ──run()──▶ Task (deferred)
//!                               │ .await
//!                               ▼
//!           no tasks ─────────▶ Ok(())
//!           1 task, no token ─▶ awaited inline
//!           otherwise ────────▶ execute_parallel (spawn + semaphore)
//!                               │
//!                               ▼
//!           on_success / on_failure continuation, if registered
//! ```
//!
//! # Design Decisions
//! - A failing task does not cancel its siblings; only whoever owns the
//!   bound token cancels it.
//! - A registered continuation's result replaces the task phase result.
//! - A panic in a spawned task is reported as `Error::Panicked` like any
//!   other failure. The inline fast path lets a panic unwind into the caller.
//! - Later failures of a parallel group are dropped. Collecting all of them
//!   would need a multi-slot channel here and is not done.

mod execution;
pub mod semaphore;

use std::fmt;
use std::future::{Future, IntoFuture};

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

pub use semaphore::Semaphore;

/// A deferred, zero-argument, fallible operation.
///
/// Nothing runs until the task is awaited.
pub struct Task {
    future: BoxFuture<'static, Result<()>>,
}

impl Task {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            future: Box::pin(future),
        }
    }

    /// A task that succeeds immediately.
    pub fn ok() -> Self {
        Self::new(async { Ok(()) })
    }
}

impl IntoFuture for Task {
    type Output = Result<()>;
    type IntoFuture = BoxFuture<'static, Result<()>>;

    fn into_future(self) -> Self::IntoFuture {
        self.future
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Task")
    }
}

/// Something that can be closed gracefully, like the write end of a pipe.
pub trait Closable: Send + 'static {
    fn close(&self);
}

/// One configuration option applied to a single execution.
#[derive(Debug)]
pub enum ExecutionOption {
    Context(CancellationToken),
    Tasks(Vec<Task>),
    OnSuccess(Task),
    OnFailure(Task),
}

/// Bind a cancellation token to the execution.
pub fn with_context(token: CancellationToken) -> ExecutionOption {
    ExecutionOption::Context(token)
}

/// Run `tasks` concurrently with each other and every other task of the execution.
pub fn parallel<I>(tasks: I) -> ExecutionOption
where
    I: IntoIterator<Item = Task>,
{
    ExecutionOption::Tasks(tasks.into_iter().collect())
}

/// Run `tasks` strictly in order, stopping at the first failure.
pub fn sequential<I>(tasks: I) -> ExecutionOption
where
    I: IntoIterator<Item = Task>,
{
    let tasks: Vec<Task> = tasks.into_iter().collect();
    if tasks.len() <= 1 {
        return ExecutionOption::Tasks(tasks);
    }
    ExecutionOption::Tasks(vec![Task::new(execution::execute(tasks))])
}

pub fn on_success(task: Task) -> ExecutionOption {
    ExecutionOption::OnSuccess(task)
}

pub fn on_failure(task: Task) -> ExecutionOption {
    ExecutionOption::OnFailure(task)
}

/// Wrap one task as a sequential list, then apply `opts`.
pub fn single<I>(task: Task, opts: I) -> Task
where
    I: IntoIterator<Item = ExecutionOption>,
{
    run(std::iter::once(sequential([task])).chain(opts))
}

/// Fold `opts` into an execution and return the task that performs it.
pub fn run<I>(opts: I) -> Task
where
    I: IntoIterator<Item = ExecutionOption>,
{
    let mut context = execution::ExecutionContext::default();
    for opt in opts {
        context.apply(opt);
    }
    Task::new(context.run())
}

/// A task that closes `target` and succeeds.
pub fn close<C: Closable>(target: C) -> Task {
    Task::new(async move {
        target.close();
        Ok(())
    })
}
