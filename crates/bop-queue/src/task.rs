//! Task-scoped cancellation.
//!
//! Tokio cancels a task by dropping its future, which gives a parked wait no
//! chance to report back. Tasks started through [`spawn`] (or wrapped with
//! [`scope`]) instead carry a [`CancellationToken`] in task-local storage.
//! Blocking queue operations watch that token: once it fires they stop
//! waiting, report failure, and leave the token cancelled so the task can
//! observe the request through [`current::is_cancelled`] and wind down.
//!
//! ```
//! use bop_queue::{Deadline, SpscQueue, task};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let queue = SpscQueue::<u32>::new(4).unwrap();
//! let mut consumer = queue.get_consumer().unwrap();
//! let _producer = queue.get_producer().unwrap();
//!
//! let waiter = task::spawn(async move {
//!     let popped = consumer.pop(Deadline::unbounded()).await;
//!     (popped, task::current::is_cancelled())
//! });
//! tokio::task::yield_now().await;
//! waiter.cancel();
//!
//! assert_eq!(waiter.await.unwrap(), (None, true));
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::trace;

tokio::task_local! {
    static CANCELLATION: CancellationToken;
}

/// Handle to a task started with [`spawn`].
///
/// Awaiting the handle joins the task. Dropping it detaches the task without
/// cancelling it.
#[derive(Debug)]
pub struct TaskHandle<T> {
    join: JoinHandle<T>,
    token: CancellationToken,
}

impl<T> TaskHandle<T> {
    /// Requests cancellation. Blocking queue calls inside the task return
    /// promptly; the task itself decides when to finish.
    pub fn cancel(&self) {
        trace!("task cancellation requested");
        self.token.cancel();
    }

    /// Returns `true` once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns `true` if the task has run to completion.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// The token watched by the task.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.join).poll(cx)
    }
}

/// Spawns `future` on the current tokio runtime with a fresh cancellation
/// token in scope.
///
/// # Panics
///
/// Panics when called outside a tokio runtime.
pub fn spawn<F>(future: F) -> TaskHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    spawn_with_token(CancellationToken::new(), future)
}

/// Spawns `future` watching `token`. Passing child tokens of one parent lets a
/// whole group of tasks be cancelled at once.
pub fn spawn_with_token<F>(token: CancellationToken, future: F) -> TaskHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let join = tokio::spawn(CANCELLATION.scope(token.clone(), future));
    TaskHandle { join, token }
}

/// Runs `future` with `token` as the current task's cancellation token.
pub async fn scope<F>(token: CancellationToken, future: F) -> F::Output
where
    F: Future,
{
    CANCELLATION.scope(token, future).await
}

/// Cancellation state of the running task.
pub mod current {
    use super::*;

    /// Returns `true` if the running task has been asked to stop. Always
    /// `false` outside a cancellation scope.
    pub fn is_cancelled() -> bool {
        CANCELLATION
            .try_with(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }

    /// The running task's token, if it runs inside a cancellation scope.
    pub fn cancellation_token() -> Option<CancellationToken> {
        CANCELLATION.try_with(CancellationToken::clone).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn outside_scope_is_never_cancelled() {
        assert!(!current::is_cancelled());
        assert!(current::cancellation_token().is_none());
    }

    #[tokio::test]
    async fn scope_exposes_token() {
        let token = CancellationToken::new();
        let observed = scope(token.clone(), async {
            let before = current::is_cancelled();
            if let Some(token) = current::cancellation_token() {
                token.cancel();
            }
            (before, current::is_cancelled())
        })
        .await;

        assert_eq!(observed, (false, true));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_reaches_spawned_task() {
        let handle = spawn(async {
            while !current::is_cancelled() {
                tokio::task::yield_now().await;
            }
            7
        });
        handle.cancel();
        assert!(handle.is_cancelled());
        assert_eq!(handle.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn child_tokens_cancel_together() {
        let parent = CancellationToken::new();
        let a = spawn_with_token(parent.child_token(), async {
            current::cancellation_token().unwrap().cancelled().await;
        });
        let b = spawn_with_token(parent.child_token(), async {
            current::cancellation_token().unwrap().cancelled().await;
        });
        parent.cancel();
        a.await.unwrap();
        b.await.unwrap();
    }
}
