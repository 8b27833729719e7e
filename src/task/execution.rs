//! Execution of a folded set of options.

use std::any::Any;
use std::future::IntoFuture;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{ExecutionOption, Semaphore, Task};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub(super) struct ExecutionContext {
    token: Option<CancellationToken>,
    tasks: Vec<Task>,
    on_success: Option<Task>,
    on_failure: Option<Task>,
}

impl ExecutionContext {
    pub(super) fn apply(&mut self, opt: ExecutionOption) {
        match opt {
            ExecutionOption::Context(token) => self.token = Some(token),
            ExecutionOption::Tasks(tasks) => self.tasks.extend(tasks),
            ExecutionOption::OnSuccess(task) => self.on_success = Some(task),
            ExecutionOption::OnFailure(task) => self.on_failure = Some(task),
        }
    }

    pub(super) async fn run(self) -> Result<()> {
        let ExecutionContext {
            token,
            mut tasks,
            on_success,
            on_failure,
        } = self;

        let outcome = if tasks.is_empty() {
            Ok(())
        } else if tasks.len() == 1 && token.is_none() {
            // Reuse the caller's task when there is nothing to fan out.
            match tasks.pop() {
                Some(task) => task.await,
                None => Ok(()),
            }
        } else {
            execute_parallel(token.unwrap_or_default(), tasks).await
        };

        match (outcome, on_success, on_failure) {
            (Ok(()), Some(next), _) => next.await,
            (Err(_), _, Some(next)) => next.await,
            (outcome, _, _) => outcome,
        }
    }
}

/// Run `tasks` in order, returning the first error.
pub(super) async fn execute(tasks: Vec<Task>) -> Result<()> {
    for task in tasks {
        task.await?;
    }
    Ok(())
}

/// Run `tasks` concurrently and wait until all succeed, one fails, or `token` is cancelled.
async fn execute_parallel(token: CancellationToken, tasks: Vec<Task>) -> Result<()> {
    let n = tasks.len();
    let semaphore = Arc::new(Semaphore::new(n));
    let (failure_tx, mut failure_rx) = mpsc::channel::<Error>(1);

    for task in tasks {
        semaphore.wait().await;
        let semaphore = semaphore.clone();
        let failure_tx = failure_tx.clone();
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(task.into_future())
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(Error::Panicked(panic_message(panic.as_ref()))));
            match outcome {
                Ok(()) => semaphore.signal(),
                Err(err) => {
                    // Only the first failure is kept.
                    let _ = failure_tx.try_send(err);
                }
            }
        });
    }
    drop(failure_tx);

    for _ in 0..n {
        tokio::select! {
            Some(err) = failure_rx.recv() => return Err(err),
            _ = token.cancelled() => return Err(Error::Cancelled),
            _ = semaphore.wait() => {}
        }
    }

    Ok(())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
