//! 待完成操作集合（pending）
//!
//! 记录被标记为“需要跟踪”的后台分发，供 `cleanup` 排空：
//! - 登记发生在调用时，且先于任务可能的完成；
//! - 任务结束（无论成功失败）后按自身 ID 移除，而非按位置；
//! - 排空只覆盖开始排空那一刻已登记的操作。
//!
use futures_core::future::BoxFuture;
use futures_util::FutureExt;
use futures_util::future::{Shared, join_all};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tracing::trace;

type Completion = Shared<BoxFuture<'static, ()>>;

/// 跟踪操作的唯一标识，同一集合内单调递增且不复用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct OperationId(u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

#[derive(Default)]
pub(crate) struct PendingOps {
    next_id: AtomicU64,
    ops: Mutex<HashMap<OperationId, Completion>>,
}

impl PendingOps {
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// 在运行时上启动 `work` 并登记，返回其标识；`work` 不应 panic
    pub(crate) fn track<F>(self: &Arc<Self>, runtime: &Handle, work: F) -> OperationId
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = OperationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let pending = Arc::clone(self);

        // 持锁期间启动并登记，任务的移除必须排在登记之后
        let mut ops = self.lock();
        let task = runtime.spawn(async move {
            work.await;
            pending.lock().remove(&id);
            trace!(operation = %id, "tracked dispatch settled");
        });
        ops.insert(id, task.map(|_| ()).boxed().shared());
        id
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: OperationId) -> bool {
        self.lock().contains_key(&id)
    }

    /// 等待当前已登记的全部操作结束，再移除它们
    pub(crate) async fn drain(&self) {
        let (ids, completions): (Vec<OperationId>, Vec<Completion>) = self
            .lock()
            .iter()
            .map(|(id, done)| (*id, done.clone()))
            .unzip();

        if ids.is_empty() {
            return;
        }

        trace!(operations = ids.len(), "draining tracked dispatches");
        join_all(completions).await;

        // 任务被运行时取消时不会自行移除
        let mut ops = self.lock();
        for id in ids {
            ops.remove(&id);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<OperationId, Completion>> {
        self.ops.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn tracked_work_is_visible_until_drained() {
        let pending = Arc::new(PendingOps::default());
        let done = Arc::new(AtomicUsize::new(0));
        let runtime = Handle::current();

        for delay in [30_u64, 5, 15] {
            let done = done.clone();
            pending.track(&runtime, async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(pending.len(), 3);
        pending.drain().await;
        assert_eq!(pending.len(), 0);
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn operations_get_distinct_ids_and_leave_by_their_own_id() {
        let pending = Arc::new(PendingOps::default());
        let runtime = Handle::current();
        let (release, gate) = tokio::sync::oneshot::channel::<()>();

        let quick = pending.track(&runtime, async {});
        let held = pending.track(&runtime, async move {
            let _ = gate.await;
        });
        assert_ne!(quick, held);

        tokio::time::timeout(Duration::from_secs(2), async {
            while pending.contains(quick) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(pending.contains(held));
        assert_eq!(pending.len(), 1);

        release.send(()).unwrap();
        pending.drain().await;
        assert!(!pending.contains(held));
    }

    #[tokio::test]
    async fn draining_nothing_is_a_noop() {
        let pending = PendingOps::default();
        pending.drain().await;
        pending.drain().await;
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn instant_work_still_leaves_no_residue() {
        let pending = Arc::new(PendingOps::default());
        let runtime = Handle::current();

        for _ in 0..64 {
            pending.track(&runtime, async {});
        }

        pending.drain().await;
        assert_eq!(pending.len(), 0);
    }
}
