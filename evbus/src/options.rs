//! 总线配置与调用选项
//!
use crate::driver::LOCAL_DRIVER;
use bon::Builder;

/// 单次订阅/发布调用的选项
///
/// ```rust
/// use evbus::PublishOptions;
///
/// let opts = PublishOptions::builder().driver("local").build();
/// assert_eq!(opts.driver(), Some("local"));
/// assert_eq!(PublishOptions::default().driver(), None);
/// ```
#[derive(Builder, Debug, Clone, Default)]
pub struct PublishOptions {
    /// 目标驱动名；为空时使用总线配置的默认驱动
    #[builder(into)]
    driver: Option<String>,
}

impl PublishOptions {
    /// 指定驱动的快捷构造
    pub fn on(driver: impl Into<String>) -> Self {
        Self {
            driver: Some(driver.into()),
        }
    }

    pub fn driver(&self) -> Option<&str> {
        self.driver.as_deref()
    }
}

/// 总线配置
#[derive(Builder, Debug, Clone)]
pub struct EventBusConfig {
    /// 调用未指定驱动时使用的驱动名
    #[builder(into, default = LOCAL_DRIVER.to_string())]
    pub default_driver: String,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            default_driver: LOCAL_DRIVER.to_string(),
        }
    }
}
