//! 事件总线（EventBus）
//!
//! 进程内发布/订阅的统一入口：
//! - 按名称路由到驱动（默认 `"local"`，构造时自动注册）；
//! - 首次订阅时惰性创建分发器；
//! - 三种投递方式：`publish`（等待并返回结算报告）、`send`（发出即忘）、
//!   `send(.., track = true)`（发出即忘，但登记到待完成集合，供 `cleanup` 排空）。
//!
//! 全局实例通过 `EventBus::instance()` 获取；需要依赖注入或隔离测试时，
//! 直接 `EventBus::new()` 构造即可。
//!
//! 注意：处理器若永不结束，其跟踪的操作会一直留在待完成集合中，`cleanup` 也会一直等待。
//!
use crate::dispatcher::EventDispatcher;
use crate::driver::{DispatchFailure, EventDriver, LocalEventDriver};
use crate::error::{BusError, BusResult};
use crate::handler::EventHandler;
use crate::options::{EventBusConfig, PublishOptions};
use crate::payload::EventPayload;
use crate::pending::PendingOps;
use crate::settlement::SettlementReport;
use dashmap::DashMap;
use futures_util::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use tokio::runtime::Handle;
use tracing::{debug, warn};

static INSTANCE: OnceLock<EventBus> = OnceLock::new();

/// 事件总线
pub struct EventBus<D = Value> {
    drivers: DashMap<String, Arc<dyn EventDriver<D>>>,
    pending: Arc<PendingOps>,
    config: EventBusConfig,
}

impl EventBus<Value> {
    /// 进程级全局实例，首次访问时创建
    pub fn instance() -> &'static EventBus {
        INSTANCE.get_or_init(EventBus::new)
    }
}

impl<D> Default for EventBus<D>
where
    D: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::with_config(EventBusConfig::default())
    }
}

impl<D> EventBus<D>
where
    D: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EventBusConfig) -> Self {
        let bus = Self {
            drivers: DashMap::new(),
            pending: Arc::new(PendingOps::default()),
            config,
        };
        bus.register(Arc::new(LocalEventDriver::<D>::new()));
        bus
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    /// 注册驱动；同名驱动以最后一次注册为准
    pub fn register(&self, driver: Arc<dyn EventDriver<D>>) {
        let name = driver.name().to_string();
        let replaced = self.drivers.insert(name.clone(), driver).is_some();
        debug!(driver = %name, replaced, "event driver registered");
    }

    pub fn has_driver(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    /// 解析驱动：未指定时使用默认驱动，找不到即为调用方的编程错误
    pub fn driver(&self, options: &PublishOptions) -> BusResult<Arc<dyn EventDriver<D>>> {
        let name = options
            .driver()
            .unwrap_or(self.config.default_driver.as_str());

        self.drivers
            .get(name)
            .map(|d| d.value().clone())
            .ok_or_else(|| BusError::driver_not_found(name))
    }

    /// 查找事件对应的分发器，不会创建
    pub fn dispatcher(
        &self,
        event_name: &str,
        options: &PublishOptions,
    ) -> BusResult<Option<Arc<EventDispatcher<D>>>> {
        Ok(self.driver(options)?.get(event_name))
    }

    /// 订阅事件，返回分发器 `register` 的结果
    pub fn subscribe(
        &self,
        event_name: &str,
        handler: EventHandler<D>,
        options: &PublishOptions,
    ) -> BusResult<bool> {
        let driver = self.driver(options)?;

        let dispatcher = match driver.get(event_name) {
            Some(dispatcher) => dispatcher,
            None => {
                let created = Arc::new(EventDispatcher::new(event_name));
                driver.set(event_name, created.clone());
                // set 不覆盖既有条目，并发创建时以驱动中保存的那个为准
                driver.get(event_name).unwrap_or(created)
            }
        };

        Ok(dispatcher.register(handler))
    }

    pub fn unsubscribe(
        &self,
        event_name: &str,
        handler: &EventHandler<D>,
        options: &PublishOptions,
    ) -> BusResult<bool> {
        Ok(self
            .dispatcher(event_name, options)?
            .is_some_and(|d| d.unregister(handler)))
    }

    pub fn unsubscribe_all(&self, event_name: &str, options: &PublishOptions) -> BusResult<bool> {
        Ok(self
            .dispatcher(event_name, options)?
            .is_some_and(|d| d.unregister_all()))
    }

    /// 发布并等待全部处理器结算
    ///
    /// `Ok(None)` 表示没有任何处理器在监听；`Ok(Some(report))` 时报告必不为空。
    pub async fn publish(
        &self,
        payload: EventPayload<D>,
        options: &PublishOptions,
    ) -> BusResult<Option<SettlementReport>> {
        let Some(dispatcher) = self.dispatcher(payload.name(), options)? else {
            return Ok(None);
        };

        Ok(dispatcher.dispatch(Arc::new(payload)).await)
    }

    /// 发出即忘
    ///
    /// 分发在后台任务中进行，失败的处理器结果交给驱动的错误钩子。
    /// `track` 为 `true` 时该操作登记到待完成集合，直到结算后移除。
    pub fn send(
        &self,
        payload: EventPayload<D>,
        track: bool,
        options: &PublishOptions,
    ) -> BusResult<()> {
        let driver = self.driver(options)?;
        let Some(dispatcher) = driver.get(payload.name()) else {
            return Ok(());
        };
        let runtime = Handle::try_current().map_err(|_| BusError::NoRuntime)?;

        let payload = Arc::new(payload);
        let event_name = payload.name().to_string();
        let work = contain_panic(
            payload.id().to_string(),
            background_dispatch(driver, dispatcher, payload),
        );

        if track {
            let operation = self.pending.track(&runtime, work);
            debug!(operation = %operation, event = %event_name, "tracked dispatch started");
        } else {
            runtime.spawn(work);
        }

        Ok(())
    }

    /// 排空：等待调用时刻所有已跟踪的操作结算完毕
    ///
    /// 只移除开始时快照到的操作；排空期间新登记的操作留待下一次 `cleanup`。
    pub async fn cleanup(&self) {
        self.pending.drain().await;
    }

    /// 当前已跟踪且未结算的操作数
    pub fn ongoing(&self) -> usize {
        self.pending.len()
    }
}

async fn background_dispatch<D>(
    driver: Arc<dyn EventDriver<D>>,
    dispatcher: Arc<EventDispatcher<D>>,
    payload: Arc<EventPayload<D>>,
) where
    D: Send + Sync + 'static,
{
    let Some(report) = dispatcher.dispatch(payload.clone()).await else {
        return;
    };

    for (position, error) in report.rejections() {
        driver.error(&DispatchFailure {
            event_name: payload.name().to_string(),
            payload_id: payload.id().to_string(),
            position,
            error: error.clone(),
        });
    }
}

async fn contain_panic<F>(payload_id: String, work: F)
where
    F: Future<Output = ()>,
{
    if AssertUnwindSafe(work).catch_unwind().await.is_err() {
        warn!(payload_id = %payload_id, "background dispatch aborted by a panicking error hook");
    }
}

impl<D> std::fmt::Debug for EventBus<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let drivers: Vec<String> = self.drivers.iter().map(|d| d.key().clone()).collect();
        f.debug_struct("EventBus")
            .field("drivers", &drivers)
            .field("ongoing", &self.pending.len())
            .field("config", &self.config)
            .finish()
    }
}
