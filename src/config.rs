use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::builder::TypedValueParser;
use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;
use crate::feedback::DEFAULT_HISTORY;
use crate::ranker::{DEFAULT_MAX_RESULTS, ScoreMode};
use crate::store::Category;

static CONF_DIR: LazyLock<String> = LazyLock::new(|| {
    ProjectDirs::from("", "cbir", "cbir")
        .map(|dirs| dirs.config_dir().to_string_lossy().into_owned())
        .unwrap_or_else(|| ".cbir".to_string())
});

fn default_config_dir() -> &'static str {
    CONF_DIR.as_str()
}

#[derive(Parser, Debug, Clone, Default)]
pub struct ExtractOptions {
    /// 主色聚类使用的随机种子，不填则根据当前时间生成
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 评分方式
    #[arg(long, value_enum, default_value_t = ScoreMode::Cosine)]
    pub mode: ScoreMode,
    /// 显示的结果数量
    #[arg(long, value_name = "COUNT", default_value_t = DEFAULT_MAX_RESULTS, value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize))]
    pub count: usize,
    /// 使用相关反馈重新排序
    #[arg(long)]
    pub feedback: bool,
    /// 计算反馈统计量时使用的最近反馈数量
    #[arg(long, value_name = "N", default_value_t = DEFAULT_HISTORY)]
    pub feedback_history: usize,
    /// 只搜索指定分类的图片
    #[arg(long, value_name = "CATEGORY")]
    pub category: Option<Category>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            mode: ScoreMode::default(),
            count: DEFAULT_MAX_RESULTS,
            feedback: false,
            feedback_history: DEFAULT_HISTORY,
            category: None,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "cbir", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 配置文件目录，数据库保存在此目录下
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 添加图片到数据库
    Add(AddCommand),
    /// 重新计算已添加图片的描述符
    Compute(ComputeCommand),
    /// 删除图片记录
    Delete(DeleteCommand),
    /// 输出图片的描述符
    Show(ShowCommand),
    /// 从数据库中搜索图片
    Search(SearchCommand),
    /// 提交相关反馈
    Feedback(FeedbackCommand),
    /// 列出数据库中的图片
    List(ListCommand),
    /// 启动 HTTP 服务
    Server(ServerCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("cbir.db")
    }

    /// 返回通过 HTTP 上传的图片的保存目录
    pub fn uploads(&self) -> PathBuf {
        self.path.join("uploads")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}
