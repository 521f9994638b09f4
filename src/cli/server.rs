use anyhow::anyhow;
use clap::Parser;
use log::{error, info};
use prometheus::{BasicAuthentication, labels};
use tokio::net::TcpListener;
use tokio::task::spawn_blocking;
use tokio::time::{Duration, interval};

use crate::cli::SubCommandExtend;
use crate::config::ExtractOptions;
use crate::feedback::DEFAULT_HISTORY;
use crate::{IMDBBuilder, Opts, server};

/// 指标推送间隔
const PUSH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub extract: ExtractOptions,
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: String,
    /// 反馈搜索时使用的最近反馈数量
    #[arg(long, value_name = "N", default_value_t = DEFAULT_HISTORY)]
    pub feedback_history: usize,
    /// prometheus 主动推送地址
    #[arg(long, value_name = "URL")]
    pub prometheus_push: Option<String>,
    /// 自定义 instance 标签值
    #[arg(long, value_name = "NAME")]
    pub prometheus_instance: Option<String>,
    /// prometheus 认证信息，格式为 username:password
    #[arg(long, value_name = "AUTH")]
    pub prometheus_auth: Option<String>,
}

/// pushgateway 推送目标
#[derive(Clone)]
struct PushTarget {
    url: String,
    instance: String,
    auth: Option<(String, String)>,
}

impl PushTarget {
    fn push(self) -> prometheus::Result<()> {
        prometheus::push_metrics(
            "cbir",
            labels! { "instance".to_string() => self.instance },
            &self.url,
            prometheus::gather(),
            self.auth.map(|(username, password)| BasicAuthentication { username, password }),
        )
    }
}

impl ServerCommand {
    fn push_target(&self) -> anyhow::Result<Option<PushTarget>> {
        let Some(url) = self.prometheus_push.clone() else {
            return Ok(None);
        };
        let auth = self
            .prometheus_auth
            .as_deref()
            .map(|s| {
                s.split_once(':')
                    .map(|(u, p)| (u.to_string(), p.to_string()))
                    .ok_or_else(|| anyhow!("prometheus 认证信息格式错误，应为 username:password"))
            })
            .transpose()?;
        let instance = self.prometheus_instance.clone().unwrap_or_else(|| self.addr.clone());
        Ok(Some(PushTarget { url, instance, auth }))
    }
}

async fn push_loop(target: PushTarget) {
    let mut ticker = interval(PUSH_INTERVAL);
    loop {
        ticker.tick().await;
        let target = target.clone();
        match spawn_blocking(move || target.push()).await {
            Ok(Err(e)) => error!("推送指标失败: {e}"),
            Err(e) => error!("推送任务异常退出: {e}"),
            Ok(Ok(())) => {}
        }
    }
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let push_target = self.push_target()?;

        let db = IMDBBuilder::new(opts.conf_dir.clone())
            .extract(self.extract.clone())
            .feedback_history(self.feedback_history)
            .open()
            .await?;
        let app = server::create_app(server::AppState::new(db, opts.conf_dir.uploads()));

        if let Some(target) = push_target {
            info!("指标推送地址: {}", target.url);
            tokio::spawn(push_loop(target));
        }

        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
