//! 事件总线统一错误定义
//!
//! 仅覆盖总线自身会产生的错误：驱动路由、运行时缺失与载荷序列化。
//! 处理器自身的失败不会以 `BusError` 抛出，而是记录在结算报告（`Settlement`）中。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BusError {
    // --- 路由 ---
    #[error("event driver not found: {name}")]
    DriverNotFound { name: String },

    // --- 运行时 ---
    #[error("no tokio runtime available to spawn background dispatch")]
    NoRuntime,

    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
}

impl BusError {
    pub fn driver_not_found(name: impl Into<String>) -> Self {
        BusError::DriverNotFound { name: name.into() }
    }
}

/// 统一 Result 类型别名
pub type BusResult<T> = Result<T, BusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_not_found_names_the_driver() {
        let err = BusError::driver_not_found("ghost");
        assert!(matches!(&err, BusError::DriverNotFound { name } if name == "ghost"));
        assert_eq!(err.to_string(), "event driver not found: ghost");
    }

    #[test]
    fn serde_errors_convert_with_question_mark() {
        fn parse() -> BusResult<serde_json::Value> {
            Ok(serde_json::from_str("{not json")?)
        }

        assert!(matches!(parse(), Err(BusError::Serde { .. })));
    }
}
