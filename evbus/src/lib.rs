//! 进程内事件总线（evbus）
//!
//! 以“命名事件 + 载荷”的方式在同一进程的模块之间解耦通信：
//! - 载荷（`payload`）：事件名、唯一 ID、数据与发出时间，构造后不可变；
//! - 处理器（`handler`）：同步或异步的可调用对象，按身份比较；
//! - 分发器（`dispatcher`）：某个事件名下的处理器集合，并发扇出并汇总每个处理器的结算结果；
//! - 驱动（`driver`）：事件名 → 分发器的可插拔注册表，默认提供本地驱动 `"local"`；
//! - 总线（`bus`）：按驱动路由订阅与投递，跟踪“发出即忘”的后台分发并在关闭前排空。
//!
//! 典型用法：
//! ```rust
//! use evbus::{EventBus, EventHandler, EventPayload, PublishOptions};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), evbus::BusError> {
//! let bus: EventBus = EventBus::new();
//! let opts = PublishOptions::default();
//!
//! // 闭包参数需标注载荷类型，`D` 无法从闭包体推断
//! let created = EventHandler::from_fn(|p: &EventPayload| Ok(p.data()["id"] == 1));
//! bus.subscribe("user.created", created, &opts)?;
//!
//! let report = bus
//!     .publish(EventPayload::new("user.created", json!({"id": 1})), &opts)
//!     .await?
//!     .expect("someone is listening");
//! assert_eq!(report.values(), vec![Some(true)]);
//!
//! // 后台投递并在退出前排空
//! bus.send(EventPayload::new("user.created", json!({"id": 2})), true, &opts)?;
//! bus.cleanup().await;
//! assert_eq!(bus.ongoing(), 0);
//! # Ok(())
//! # }
//! ```
//!
pub mod bus;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod handler;
pub mod options;
pub mod payload;
mod pending;
pub mod settlement;

pub use bus::EventBus;
pub use dispatcher::EventDispatcher;
pub use driver::{DispatchFailure, ErrorCallback, EventDriver, LOCAL_DRIVER, LocalEventDriver};
pub use error::{BusError, BusResult};
pub use handler::{EventHandler, HandleEvent, HandlerFuture};
pub use options::{EventBusConfig, PublishOptions};
pub use payload::EventPayload;
pub use settlement::{HandlerError, Settlement, SettlementReport};
