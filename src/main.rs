//! DocReview 通知客户端 CLI
//!
//! `run` 子命令启动完整客户端（推送通道 + 重连 + 控制台 Toast），
//! 其余子命令是一次性的 REST 操作，用于调试与降级场景下的手动刷新。

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use review_notify::{
    Config, ConsoleToastSink, NoopNativeNotifier, NotificationGateway, NotifyClient,
    RestGateway, WsTransport,
};

#[derive(Parser)]
#[command(name = "rnotify")]
#[command(about = "DocReview notification client")]
#[command(version)]
struct Cli {
    /// Bearer 凭证（默认读环境变量 DOCREVIEW_TOKEN）
    #[arg(long, global = true, env = "DOCREVIEW_TOKEN", default_value = "")]
    token: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动实时客户端，Ctrl-C 退出
    Run {
        /// 用户邮箱（决定订阅的推送目的地）
        #[arg(long)]
        email: String,
    },
    /// 拉取未读聚合
    Summary {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 拉取未读通知列表
    Unread {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 拉取通知偏好设置
    Settings {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 标记单条已读
    MarkRead {
        /// 通知 id
        id: i64,
    },
    /// 全部标记已读
    ReadAll,
    /// 删除单条通知
    Delete {
        /// 通知 id
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let gateway = RestGateway::new(&config, cli.token.clone()).context("building REST gateway")?;

    match cli.command {
        Commands::Run { email } => run_client(config, gateway, email, cli.token).await,
        Commands::Summary { json } => {
            let summary = gateway.fetch_summary().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "unread: {} / total: {}{}",
                    summary.unread_count,
                    summary.total_count,
                    if summary.has_urgent { " (urgent!)" } else { "" }
                );
            }
            Ok(())
        }
        Commands::Unread { json } => {
            let items = gateway.fetch_unread().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                for n in &items {
                    println!("[{}] #{} {} — {}", n.priority, n.id, n.title, n.message);
                }
                println!("{} unread", items.len());
            }
            Ok(())
        }
        Commands::Settings { json } => {
            let settings = gateway.fetch_settings().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                println!(
                    "browser: {}, email: {}, quiet hours: {}–{}",
                    settings.browser_enabled,
                    settings.email_enabled,
                    settings.quiet_hours_start,
                    settings.quiet_hours_end
                );
            }
            Ok(())
        }
        Commands::MarkRead { id } => {
            gateway.mark_read(id).await?;
            println!("notification {} marked read", id);
            Ok(())
        }
        Commands::ReadAll => {
            gateway.mark_all_read().await?;
            println!("all notifications marked read");
            Ok(())
        }
        Commands::Delete { id } => {
            gateway.delete(id).await?;
            println!("notification {} deleted", id);
            Ok(())
        }
    }
}

async fn run_client(
    config: Config,
    gateway: RestGateway,
    email: String,
    token: String,
) -> Result<()> {
    let transport = Box::new(WsTransport::new(config.push_url.clone()));
    let (client, join) = NotifyClient::spawn(
        config,
        Arc::new(gateway),
        transport,
        Arc::new(ConsoleToastSink),
        Arc::new(NoopNativeNotifier),
        email,
        token,
    );

    info!("notification client running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;

    client.shutdown().await;
    join.await.context("joining client loop")?;
    Ok(())
}
