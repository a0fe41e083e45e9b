//! Scoped context fields merged into every record logged inside the scope.
//!
//! Each logical call chain owns its own stack. Futures run through
//! [`scope`] or [`propagate`] get a tokio task-local stack that follows
//! the task across `.await` points and worker threads. Everything else
//! falls back to a per-thread table keyed by the tokio task id, so tasks
//! sharing a thread (current-thread runtimes, `LocalSet`) never see each
//! other's pushes; plain synchronous code uses the entry with no task id.
//! Every stack entry stores the fully merged map, so [`current`] is a
//! reference count bump.

use crate::record::Fields;
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};
use tokio::task;

type Stack = Vec<Arc<Fields>>;

tokio::task_local! {
    static TASK_STACK: RefCell<Stack>;
}

thread_local! {
    static THREAD_STACKS: RefCell<HashMap<Option<task::Id>, Stack>> = RefCell::new(HashMap::new());
}

fn empty() -> Arc<Fields> {
    static EMPTY: OnceLock<Arc<Fields>> = OnceLock::new();
    EMPTY.get_or_init(|| Arc::new(Fields::new())).clone()
}

fn with_stack<R>(f: impl FnOnce(&mut Stack) -> R) -> R {
    if TASK_STACK.try_with(|_| ()).is_ok() {
        return TASK_STACK.with(|stack| f(&mut stack.borrow_mut()));
    }
    let owner = task::try_id();
    THREAD_STACKS.with(|stacks| {
        let mut stacks = stacks.borrow_mut();
        let stack = stacks.entry(owner).or_default();
        let out = f(stack);
        if stack.is_empty() {
            stacks.remove(&owner);
        }
        out
    })
}

fn merge(base: &Fields, overlay: Fields) -> Fields {
    let mut merged = base.clone();
    merged.extend(overlay);
    merged
}

/// Handle for a pushed scope. Dropping it pops the scope.
///
/// Not `Send`: a scope belongs to the call chain that opened it.
#[must_use = "the scope is popped as soon as the guard is dropped"]
pub struct ScopeGuard {
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl ScopeGuard {
    /// Explicitly end the scope. Equivalent to dropping the guard.
    pub fn pop(self) {}
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        // Also discards inner scopes that were leaked above this one.
        with_stack(|stack| stack.truncate(self.depth));
    }
}

/// Push `overlay` on top of the current context.
pub fn push(overlay: Fields) -> ScopeGuard {
    with_stack(|stack| {
        let merged = match stack.last() {
            Some(top) => merge(top, overlay),
            None => overlay,
        };
        let depth = stack.len();
        stack.push(Arc::new(merged));
        ScopeGuard {
            depth,
            _not_send: PhantomData,
        }
    })
}

/// Pop a scope previously returned by [`push`].
pub fn pop(guard: ScopeGuard) {
    guard.pop()
}

/// The merged fields of every scope active on this call chain.
pub fn current() -> Arc<Fields> {
    with_stack(|stack| stack.last().cloned()).unwrap_or_else(empty)
}

/// Run `fut` with `overlay` pushed for its entire lifetime.
///
/// The scope starts from the caller's current context, so nesting works
/// the same as with [`push`].
pub async fn scope<F: Future>(overlay: Fields, fut: F) -> F::Output {
    let base = current();
    let merged = merge(&base, overlay);
    TASK_STACK
        .scope(RefCell::new(vec![Arc::new(merged)]), fut)
        .await
}

/// Carry the caller's current context into `fut`, typically before
/// handing it to `tokio::spawn`.
pub fn propagate<F: Future>(fut: F) -> impl Future<Output = F::Output> {
    let base = current();
    let stack = if base.is_empty() { Vec::new() } else { vec![base] };
    TASK_STACK.scope(RefCell::new(stack), fut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use serde_json::json;

    #[test]
    fn push_merges_and_pop_restores() {
        assert!(current().is_empty());

        let outer = push(fields! { "request_id" => "req_789", "user_id" => "user_456" });
        {
            let _inner = push(fields! { "user_id" => "user_123" });
            let ctx = current();
            assert_eq!(ctx["request_id"], json!("req_789"));
            assert_eq!(ctx["user_id"], json!("user_123"));
        }
        assert_eq!(current()["user_id"], json!("user_456"));

        pop(outer);
        assert!(current().is_empty());
    }

    #[test]
    fn popping_outer_discards_leaked_inner() {
        let outer = push(fields! { "a" => 1 });
        std::mem::forget(push(fields! { "b" => 2 }));
        assert_eq!(current().len(), 2);
        outer.pop();
        assert!(current().is_empty());
    }

    #[test]
    fn threads_do_not_share_scopes() {
        let _guard = push(fields! { "thread" => "main" });
        let seen = std::thread::spawn(|| current().len()).join().unwrap();
        assert_eq!(seen, 0);
        assert_eq!(current()["thread"], json!("main"));
    }

    #[tokio::test]
    async fn task_scopes_are_isolated() {
        let a = tokio::spawn(scope(fields! { "task" => "a" }, async {
            tokio::task::yield_now().await;
            current()["task"].clone()
        }));
        let b = tokio::spawn(scope(fields! { "task" => "b" }, async {
            tokio::task::yield_now().await;
            current()["task"].clone()
        }));
        assert_eq!(a.await.unwrap(), json!("a"));
        assert_eq!(b.await.unwrap(), json!("b"));
        assert!(current().is_empty());
    }

    #[tokio::test]
    async fn pushes_held_across_await_stay_with_their_task() {
        let unrelated = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            current().get("request_id").cloned()
        });

        let guard = push(fields! { "request_id" => "req_A" });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(current()["request_id"], json!("req_A"));

        assert_eq!(unrelated.await.unwrap(), None);
        guard.pop();
        assert!(current().is_empty());
    }

    #[tokio::test]
    async fn local_tasks_on_one_thread_are_isolated() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let a = tokio::task::spawn_local(async {
                    let _guard = push(fields! { "task" => "a" });
                    tokio::task::yield_now().await;
                    current()["task"].clone()
                });
                let b = tokio::task::spawn_local(async {
                    tokio::task::yield_now().await;
                    current().get("task").cloned()
                });
                assert_eq!(a.await.unwrap(), json!("a"));
                assert_eq!(b.await.unwrap(), None);
            })
            .await;
    }

    #[tokio::test]
    async fn propagate_inherits_parent_chain() {
        let child = scope(fields! { "correlation_id" => "corr_123" }, async {
            let nested = push(fields! { "step" => "spawn" });
            let handle = tokio::spawn(propagate(async { current() }));
            nested.pop();
            handle.await.unwrap()
        })
        .await;
        assert_eq!(child["correlation_id"], json!("corr_123"));
        assert_eq!(child["step"], json!("spawn"));
    }
}
