//! 结算报告（SettlementReport）
//!
//! 一次分发中每个处理器的结果：成功（携带布尔值）或失败（携带原因），
//! 按处理器注册顺序排列，与完成先后无关。
//!
use std::fmt;
use std::sync::Arc;

/// 单个处理器的失败原因
#[derive(Clone)]
pub struct HandlerError {
    handler: String,
    reason: Arc<anyhow::Error>,
}

impl HandlerError {
    pub fn new(handler: impl Into<String>, reason: anyhow::Error) -> Self {
        Self {
            handler: handler.into(),
            reason: Arc::new(reason),
        }
    }

    pub fn handler(&self) -> &str {
        &self.handler
    }

    pub fn reason(&self) -> &anyhow::Error {
        &self.reason
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerError")
            .field("handler", &self.handler)
            .field("reason", &format_args!("{:#}", self.reason))
            .finish()
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "event handler error: handler={}, reason={:#}",
            self.handler, self.reason
        )
    }
}

impl std::error::Error for HandlerError {}

/// 单个处理器的结算结果
#[derive(Debug, Clone)]
pub enum Settlement {
    Fulfilled { value: bool },
    Rejected { reason: HandlerError },
}

impl Settlement {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Settlement::Fulfilled { .. })
    }

    pub fn is_rejected(&self) -> bool {
        !self.is_fulfilled()
    }

    /// 成功时的返回值；失败时为 `None`
    pub fn value(&self) -> Option<bool> {
        match self {
            Settlement::Fulfilled { value } => Some(*value),
            Settlement::Rejected { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&HandlerError> {
        match self {
            Settlement::Fulfilled { .. } => None,
            Settlement::Rejected { reason } => Some(reason),
        }
    }
}

/// 一次分发的全部结算结果（按注册顺序）
#[derive(Debug, Clone, Default)]
pub struct SettlementReport {
    outcomes: Vec<Settlement>,
}

impl SettlementReport {
    pub fn new(outcomes: Vec<Settlement>) -> Self {
        Self { outcomes }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Settlement> {
        self.outcomes.iter()
    }

    pub fn get(&self, position: usize) -> Option<&Settlement> {
        self.outcomes.get(position)
    }

    /// 每个处理器的返回值，失败位置为 `None`
    pub fn values(&self) -> Vec<Option<bool>> {
        self.outcomes.iter().map(Settlement::value).collect()
    }

    /// 失败项及其位置
    pub fn rejections(&self) -> impl Iterator<Item = (usize, &HandlerError)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.reason().map(|r| (i, r)))
    }

    pub fn is_all_fulfilled(&self) -> bool {
        self.outcomes.iter().all(Settlement::is_fulfilled)
    }

    pub fn into_inner(self) -> Vec<Settlement> {
        self.outcomes
    }
}

impl<'a> IntoIterator for &'a SettlementReport {
    type Item = &'a Settlement;
    type IntoIter = std::slice::Iter<'a, Settlement>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.iter()
    }
}

impl IntoIterator for SettlementReport {
    type Item = Settlement;
    type IntoIter = std::vec::IntoIter<Settlement>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}
