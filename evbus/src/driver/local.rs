//! 本地驱动（LocalEventDriver）
//!
//! 基于 `DashMap` 的进程内注册表，总线构造时自动注册，驱动名为 `"local"`。
//!
use super::{DispatchFailure, ErrorCallback, EventDriver, LOCAL_DRIVER};
use crate::dispatcher::EventDispatcher;
use dashmap::DashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// 进程内驱动
pub struct LocalEventDriver<D = serde_json::Value> {
    dispatchers: DashMap<String, Arc<EventDispatcher<D>>>,
    on_error: RwLock<Option<ErrorCallback>>,
}

impl<D> Default for LocalEventDriver<D> {
    fn default() -> Self {
        Self {
            dispatchers: DashMap::new(),
            on_error: RwLock::new(None),
        }
    }
}

impl<D> LocalEventDriver<D> {
    /// 驱动名，同 [`LOCAL_DRIVER`]
    pub const NAME: &'static str = LOCAL_DRIVER;

    pub fn new() -> Self {
        Self::default()
    }
}

impl<D> EventDriver<D> for LocalEventDriver<D> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn set(&self, event_name: &str, dispatcher: Arc<EventDispatcher<D>>) {
        self.dispatchers
            .entry(event_name.to_string())
            .or_insert(dispatcher);
    }

    fn get(&self, event_name: &str) -> Option<Arc<EventDispatcher<D>>> {
        self.dispatchers.get(event_name).map(|d| d.value().clone())
    }

    fn has(&self, event_name: &str) -> bool {
        self.dispatchers.contains_key(event_name)
    }

    fn size(&self) -> usize {
        self.dispatchers.len()
    }

    fn error(&self, failure: &DispatchFailure) {
        let callback = self
            .on_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match callback {
            Some(cb) => cb(failure),
            None => debug!(%failure, "no error hook registered, failure dropped"),
        }
    }

    fn on_error(&self, callback: ErrorCallback) {
        *self.on_error.write().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }
}
