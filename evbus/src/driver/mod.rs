//! 事件驱动（EventDriver）协议
//!
//! 驱动是一个具名的、可插拔的注册表：事件名 → 分发器。
//! 总线只依赖该协议，因此远程、分片等其它后端可以在不改动总线的情况下替换进来。
//!
//! 驱动同时提供一个可选的错误钩子（`on_error`），用于承接
//! “发出即忘”（`send`）路径上处理器的失败；未注册钩子时失败在这一层被静默吞掉。
//!
mod local;

pub use local::LocalEventDriver;

use crate::dispatcher::EventDispatcher;
use crate::settlement::HandlerError;
use std::fmt;
use std::sync::Arc;

/// 默认驱动名
pub const LOCAL_DRIVER: &str = "local";

/// 错误钩子
pub type ErrorCallback = Arc<dyn Fn(&DispatchFailure) + Send + Sync>;

/// 后台分发中单个处理器的失败
#[derive(Debug, Clone)]
pub struct DispatchFailure {
    /// 事件名
    pub event_name: String,
    /// 载荷 ID
    pub payload_id: String,
    /// 处理器在分发器中的位置（注册顺序）
    pub position: usize,
    pub error: HandlerError,
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dispatch failed: event={}, payload={}, position={}, {}",
            self.event_name, self.payload_id, self.position, self.error
        )
    }
}

/// 事件驱动：按事件名保存分发器
pub trait EventDriver<D = serde_json::Value>: Send + Sync {
    /// 路由用的驱动名
    fn name(&self) -> &str;

    /// 保存分发器；已存在同名条目时静默忽略，不做替换
    fn set(&self, event_name: &str, dispatcher: Arc<EventDispatcher<D>>);

    fn get(&self, event_name: &str) -> Option<Arc<EventDispatcher<D>>>;

    fn has(&self, event_name: &str) -> bool {
        self.get(event_name).is_some()
    }

    /// 已注册的分发器数量
    fn size(&self) -> usize;

    /// 上报一次后台分发失败
    fn error(&self, failure: &DispatchFailure);

    /// 注册错误钩子，新钩子替换旧钩子
    fn on_error(&self, callback: ErrorCallback);
}
