//! 事件分发器（EventDispatcher）
//!
//! 持有某一个事件名下的有序处理器集合，并把载荷扇出给全部处理器：
//! - 注册按身份去重，保持插入顺序；
//! - 分发时所有处理器并发启动，等待全部结算（all settled），
//!   任何一个失败都不会中断其它处理器；
//! - 结果按注册顺序逐位收集。
//!
use crate::handler::EventHandler;
use crate::payload::EventPayload;
use crate::settlement::{HandlerError, Settlement, SettlementReport};
use futures_util::future::join_all;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};

/// 单一事件名的分发器
pub struct EventDispatcher<D = serde_json::Value> {
    name: String,
    handlers: RwLock<Vec<EventHandler<D>>>,
}

impl<D> EventDispatcher<D> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// 当前处理器列表的快照
    pub fn handlers(&self) -> Vec<EventHandler<D>> {
        self.read().clone()
    }

    /// 注册处理器；同一身份已存在时返回 `false` 且不做修改
    pub fn register(&self, handler: EventHandler<D>) -> bool {
        let mut handlers = self.write();
        if handlers.iter().any(|h| h.same_as(&handler)) {
            return false;
        }

        debug!(event = %self.name, handler = handler.name(), "handler registered");
        handlers.push(handler);
        true
    }

    /// 移除第一个身份匹配的处理器
    pub fn unregister(&self, handler: &EventHandler<D>) -> bool {
        let mut handlers = self.write();
        let Some(index) = handlers.iter().position(|h| h.same_as(handler)) else {
            return false;
        };

        handlers.remove(index);
        debug!(event = %self.name, handler = handler.name(), "handler unregistered");
        true
    }

    /// 清空全部处理器；本就为空时返回 `false`
    pub fn unregister_all(&self) -> bool {
        let mut handlers = self.write();
        if handlers.is_empty() {
            return false;
        }

        let removed = handlers.len();
        handlers.clear();
        debug!(event = %self.name, removed, "all handlers unregistered");
        true
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<EventHandler<D>>> {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<EventHandler<D>>> {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<D> EventDispatcher<D>
where
    D: Send + Sync + 'static,
{
    /// 分发载荷
    ///
    /// 事件名不匹配或没有处理器时返回 `None`（未投递），否则返回完整的结算报告。
    pub async fn dispatch(&self, payload: Arc<EventPayload<D>>) -> Option<SettlementReport> {
        if payload.name() != self.name {
            trace!(
                dispatcher = %self.name,
                event = payload.name(),
                "payload name mismatch, skipped"
            );
            return None;
        }

        // 快照后释放锁，处理器内部可以安全地再次订阅/退订
        let handlers = self.handlers();
        if handlers.is_empty() {
            return None;
        }

        trace!(
            event = %self.name,
            payload_id = payload.id(),
            handlers = handlers.len(),
            "dispatching"
        );

        let results = join_all(handlers.iter().map(|h| h.invoke(payload.clone()))).await;

        let outcomes = handlers
            .iter()
            .zip(results)
            .map(|(h, res)| match res {
                Ok(value) => Settlement::Fulfilled { value },
                Err(err) => Settlement::Rejected {
                    reason: HandlerError::new(h.name(), err),
                },
            })
            .collect();

        Some(SettlementReport::new(outcomes))
    }
}

impl<D> std::fmt::Debug for EventDispatcher<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("name", &self.name)
            .field("handlers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn payload(name: &str) -> Arc<EventPayload> {
        Arc::new(EventPayload::new(name, json!({"value": 42})))
    }

    fn counting(hits: Arc<AtomicUsize>, value: bool) -> EventHandler {
        EventHandler::from_fn(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        })
    }

    #[test]
    fn register_is_idempotent_by_identity() {
        let dispatcher: EventDispatcher = EventDispatcher::new("STUB");
        let h: EventHandler = EventHandler::from_fn(|_| Ok(true));

        assert!(dispatcher.register(h.clone()));
        assert!(!dispatcher.register(h.clone()));
        assert_eq!(dispatcher.len(), 1);

        // 行为相同但身份不同
        assert!(dispatcher.register(EventHandler::from_fn(|_| Ok(true))));
        assert_eq!(dispatcher.len(), 2);
    }

    #[test]
    fn unregister_removes_a_single_match() {
        let dispatcher: EventDispatcher = EventDispatcher::new("STUB");
        let h: EventHandler = EventHandler::from_fn(|_| Ok(true));

        dispatcher.register(h.clone());
        assert!(dispatcher.unregister(&h));
        assert!(!dispatcher.unregister(&h));
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn unregister_all_reports_noop_on_empty() {
        let dispatcher: EventDispatcher = EventDispatcher::new("STUB");
        assert!(!dispatcher.unregister_all());

        dispatcher.register(EventHandler::from_fn(|_| Ok(true)));
        dispatcher.register(EventHandler::from_fn(|_| Ok(false)));
        assert!(dispatcher.unregister_all());
        assert!(dispatcher.is_empty());
    }

    #[tokio::test]
    async fn mismatched_name_invokes_nothing() {
        let hits = Arc::new(AtomicUsize::new(0));
        let dispatcher: EventDispatcher = EventDispatcher::new("A");
        dispatcher.register(counting(hits.clone(), true));

        assert!(dispatcher.dispatch(payload("B")).await.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_handlers_means_no_delivery() {
        let dispatcher: EventDispatcher = EventDispatcher::new("A");
        assert!(dispatcher.dispatch(payload("A")).await.is_none());
    }

    #[tokio::test]
    async fn outcomes_follow_registration_order_not_completion_order() {
        let finished = Arc::new(Mutex::new(Vec::new()));
        let dispatcher: EventDispatcher = EventDispatcher::new("A");

        for (tag, delay_ms, value) in [("h1", 5_u64, true), ("h2", 60, false), ("h3", 1, true)] {
            let finished = finished.clone();
            dispatcher.register(EventHandler::from_async(move |_| {
                let finished = finished.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    finished.lock().unwrap().push(tag);
                    Ok(value)
                }
            }));
        }

        let report = dispatcher.dispatch(payload("A")).await.unwrap();

        assert_eq!(report.values(), vec![Some(true), Some(false), Some(true)]);
        // h2 最慢，最后完成
        assert_eq!(finished.lock().unwrap().last(), Some(&"h2"));
    }

    #[tokio::test]
    async fn failures_never_short_circuit_siblings() {
        let hits = Arc::new(AtomicUsize::new(0));
        let dispatcher: EventDispatcher = EventDispatcher::new("A");

        dispatcher.register(EventHandler::from_fn(|_| Err(anyhow!("refused"))).named("refuser"));
        dispatcher.register(counting(hits.clone(), true));
        dispatcher.register(EventHandler::from_fn(|_| panic!("exploded")).named("bomb"));
        dispatcher.register(counting(hits.clone(), false));

        let report = dispatcher.dispatch(payload("A")).await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(report.values(), vec![None, Some(true), None, Some(false)]);

        let rejected: Vec<_> = report
            .rejections()
            .map(|(i, e)| (i, e.handler().to_string()))
            .collect();
        assert_eq!(
            rejected,
            vec![(0, "refuser".to_string()), (2, "bomb".to_string())]
        );
    }

    #[tokio::test]
    async fn every_handler_starts_before_any_settles() {
        let started = Arc::new(AtomicUsize::new(0));
        let dispatcher: EventDispatcher = EventDispatcher::new("A");

        for _ in 0..3 {
            let started = started.clone();
            dispatcher.register(EventHandler::from_async(move |_| {
                let started = started.clone();
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    // 串行执行时第一个处理器永远等不到其余处理器启动
                    let all_started = tokio::time::timeout(Duration::from_secs(2), async {
                        while started.load(Ordering::SeqCst) < 3 {
                            tokio::task::yield_now().await;
                        }
                    })
                    .await
                    .is_ok();
                    Ok(all_started)
                }
            }));
        }

        let report = dispatcher.dispatch(payload("A")).await.unwrap();

        assert_eq!(report.len(), 3);
        assert_eq!(report.values(), vec![Some(true); 3]);
        assert_eq!(started.load(Ordering::SeqCst), 3);
    }
}
