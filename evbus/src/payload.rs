//! 事件载荷（EventPayload）
//!
//! 描述一次命名事件的发生：事件名、唯一 ID、数据与发出时间。
//! 构造后不可变，总线与分发器只以 `Arc<EventPayload<D>>` 共享读取。
//!
use crate::error::BusResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use uuid::Uuid;

/// 事件载荷，`D` 默认为 JSON 值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload<D = Value> {
    /// 事件唯一标识符（uuid v4，无需外部协调）
    id: String,
    /// 事件名，总线据此路由到分发器
    name: String,
    /// 事件数据，对总线不透明
    data: D,
    /// 发出时间
    issued_at: DateTime<Utc>,
}

impl<D> EventPayload<D> {
    pub fn new(name: impl Into<String>, data: D) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            data,
            issued_at: Utc::now(),
        }
    }

    /// 以既有的 ID 与时间重建载荷（例如从日志或存储中恢复）
    pub fn from_parts(
        id: impl Into<String>,
        name: impl Into<String>,
        data: D,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            data,
            issued_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

impl EventPayload<Value> {
    /// 将任意可序列化数据转换为 JSON 载荷
    pub fn from_serialize<T>(name: impl Into<String>, data: &T) -> BusResult<Self>
    where
        T: Serialize + ?Sized,
    {
        Ok(Self::new(name, serde_json::to_value(data)?))
    }

    /// 将 JSON 数据还原为具体类型
    pub fn data_as<T>(&self) -> BusResult<T>
    where
        T: DeserializeOwned,
    {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}
