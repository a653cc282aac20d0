//! 事件处理器（EventHandler）
//!
//! 处理器是一个“能力”：接受载荷并返回（或异步返回）表示逻辑成功与否的布尔值。
//! 同步闭包、异步闭包与实现 `HandleEvent` 的对象统一收敛为同一个 `EventHandler` 类型。
//!
//! 处理器按**身份**比较：克隆出的句柄彼此相等，
//! 而两个行为完全相同、但分别构造的处理器视为两个不同的注册。
//!
use crate::payload::EventPayload;
use anyhow::anyhow;
use async_trait::async_trait;
use futures_core::future::BoxFuture;
use futures_util::FutureExt;
use std::any::{Any, type_name};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// 处理器一次调用的结果
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<bool>>;

type SyncFn<D> = dyn Fn(&EventPayload<D>) -> anyhow::Result<bool> + Send + Sync;
type AsyncFn<D> = dyn Fn(Arc<EventPayload<D>>) -> HandlerFuture + Send + Sync;

/// 以对象形式实现的处理器（可携带自身状态与名称）
#[async_trait]
pub trait HandleEvent<D>: Send + Sync {
    /// 处理器名称（用于失败上报与日志）
    fn handler_name(&self) -> &str;

    /// 处理事件，`Ok(false)` 表示处理器运行成功但在业务上拒绝该事件
    async fn handle(&self, payload: &EventPayload<D>) -> anyhow::Result<bool>;
}

enum HandlerKind<D> {
    Sync(Arc<SyncFn<D>>),
    Async(Arc<AsyncFn<D>>),
    Object(Arc<dyn HandleEvent<D>>),
}

impl<D> Clone for HandlerKind<D> {
    fn clone(&self) -> Self {
        match self {
            HandlerKind::Sync(f) => HandlerKind::Sync(f.clone()),
            HandlerKind::Async(f) => HandlerKind::Async(f.clone()),
            HandlerKind::Object(h) => HandlerKind::Object(h.clone()),
        }
    }
}

/// 事件处理器句柄
pub struct EventHandler<D = serde_json::Value> {
    name: Arc<str>,
    kind: HandlerKind<D>,
}

impl<D> Clone for EventHandler<D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind.clone(),
        }
    }
}

impl<D> EventHandler<D> {
    /// 覆盖诊断名称，不影响身份
    pub fn named(mut self, name: impl AsRef<str>) -> Self {
        self.name = Arc::from(name.as_ref());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 是否为同一个处理器（身份比较）
    pub fn same_as(&self, other: &Self) -> bool {
        std::ptr::eq(self.identity(), other.identity())
    }

    fn identity(&self) -> *const () {
        match &self.kind {
            HandlerKind::Sync(f) => Arc::as_ptr(f) as *const (),
            HandlerKind::Async(f) => Arc::as_ptr(f) as *const (),
            HandlerKind::Object(h) => Arc::as_ptr(h) as *const (),
        }
    }
}

impl<D> EventHandler<D>
where
    D: Send + Sync + 'static,
{
    /// 同步处理器
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&EventPayload<D>) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(type_name::<F>()),
            kind: HandlerKind::Sync(Arc::new(f)),
        }
    }

    /// 异步处理器
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<EventPayload<D>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        let f: Arc<AsyncFn<D>> = Arc::new(move |payload| f(payload).boxed());

        Self {
            name: Arc::from(type_name::<F>()),
            kind: HandlerKind::Async(f),
        }
    }

    /// 对象处理器，身份即该 `Arc` 所指向的实例
    pub fn from_handler<H>(handler: Arc<H>) -> Self
    where
        H: HandleEvent<D> + 'static,
    {
        Self {
            name: Arc::from(handler.handler_name()),
            kind: HandlerKind::Object(handler),
        }
    }

    /// 调用处理器；同步/异步阶段的 panic 均被捕获为错误
    pub(crate) fn invoke(&self, payload: Arc<EventPayload<D>>) -> HandlerFuture {
        let kind = self.kind.clone();
        let call = async move {
            match kind {
                HandlerKind::Sync(f) => f(&payload),
                HandlerKind::Async(f) => f(payload).await,
                HandlerKind::Object(h) => h.handle(&payload).await,
            }
        };

        AssertUnwindSafe(call)
            .catch_unwind()
            .map(|res| {
                res.unwrap_or_else(|panic| {
                    Err(anyhow!("handler panicked: {}", panic_message(&*panic)))
                })
            })
            .boxed()
    }
}

impl<D> PartialEq for EventHandler<D> {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl<D> Eq for EventHandler<D> {}

impl<D> fmt::Debug for EventHandler<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("name", &self.name)
            .field("identity", &self.identity())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
