/// 事件总线示例：订阅 → 同步发布 → 后台投递 → 优雅关闭
/// 展示结算报告、驱动错误钩子，以及退出前通过 cleanup 排空后台分发
use anyhow::{Result as AnyResult, anyhow};
use async_trait::async_trait;
use evbus::{
    DispatchFailure, EventBus, EventHandler, EventPayload, HandleEvent, PublishOptions,
    Settlement,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ============================================================================
// 事件数据
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRegistered {
    user_id: u64,
    email: String,
}

// ============================================================================
// 处理器
// ============================================================================

/// 发送欢迎邮件（模拟慢速 IO）
struct WelcomeMailer;

#[async_trait]
impl HandleEvent<Value> for WelcomeMailer {
    fn handler_name(&self) -> &str {
        "welcome_mailer"
    }

    async fn handle(&self, payload: &EventPayload<Value>) -> anyhow::Result<bool> {
        let user: UserRegistered = payload.data_as()?;
        tokio::time::sleep(Duration::from_millis(200)).await;
        println!("📧 welcome mail sent to {}", user.email);
        Ok(true)
    }
}

fn audit_handler() -> EventHandler {
    EventHandler::from_fn(|payload: &EventPayload| {
        println!(
            "📝 audit: event={} id={} at={}",
            payload.name(),
            payload.id(),
            payload.issued_at()
        );
        Ok(true)
    })
    .named("audit")
}

/// 同步到 CRM，测试域名的地址会被拒绝
async fn sync_to_crm(payload: Arc<EventPayload>) -> anyhow::Result<bool> {
    let user: UserRegistered = payload.data_as()?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    if user.email.ends_with("@example.invalid") {
        return Err(anyhow!("crm rejected address {}", user.email));
    }
    Ok(true)
}

fn registered(user_id: u64, email: &str) -> AnyResult<EventPayload> {
    let data = UserRegistered {
        user_id,
        email: email.to_string(),
    };
    Ok(EventPayload::from_serialize("user.registered", &data)?)
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("evbus=debug")),
        )
        .init();

    println!("=== 事件总线示例 ===\n");
    let bus = EventBus::instance();
    let opts = PublishOptions::default();

    bus.driver(&opts)?
        .on_error(Arc::new(|failure: &DispatchFailure| {
            println!("⚠️  background failure: {failure}");
        }));

    bus.subscribe("user.registered", audit_handler(), &opts)?;
    bus.subscribe(
        "user.registered",
        EventHandler::from_async(sync_to_crm).named("crm_sync"),
        &opts,
    )?;
    bus.subscribe(
        "user.registered",
        EventHandler::from_handler(Arc::new(WelcomeMailer)),
        &opts,
    )?;
    println!("✅ 已订阅 3 个处理器\n");

    // 同步发布：等待全部处理器结算
    let report = bus
        .publish(registered(1, "alice@example.com")?, &opts)
        .await?;
    match report {
        Some(report) => {
            for (position, outcome) in report.iter().enumerate() {
                match outcome {
                    Settlement::Fulfilled { value } => println!("  #{position} fulfilled: {value}"),
                    Settlement::Rejected { reason } => println!("  #{position} rejected: {reason}"),
                }
            }
        }
        None => println!("  nobody is listening"),
    }

    // 后台投递：一个跟踪，一个不跟踪
    bus.send(registered(2, "bob@example.invalid")?, true, &opts)?;
    bus.send(registered(3, "carol@example.com")?, false, &opts)?;
    println!("\n✅ 后台投递已发出，待完成: {}", bus.ongoing());

    // 关闭前排空
    bus.cleanup().await;
    println!("✅ 优雅关闭完成，待完成: {}", bus.ongoing());

    // 未跟踪的投递可能仍在运行，给它一点时间输出
    tokio::time::sleep(Duration::from_millis(300)).await;
    Ok(())
}
