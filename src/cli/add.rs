use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use indicatif::ProgressBar;
use log::{info, warn};
use regex::Regex;
use tokio::task::JoinSet;
use walkdir::WalkDir;

use crate::cli::SubCommandExtend;
use crate::config::{ExtractOptions, Opts};
use crate::imdb::{IMDB, IMDBBuilder, IngestRequest};
use crate::store::{Category, DescriptorStore};
use crate::utils::{content_id, pb_style};

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    #[command(flatten)]
    pub extract: ExtractOptions,
    /// 图片所在目录，也可以是单个图片文件
    pub path: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg,png,gif")]
    pub suffix: String,
    /// 图片分类
    #[arg(long, value_name = "CATEGORY")]
    pub category: Option<Category>,
    /// 如果图片已添加，是否覆盖旧的记录
    #[arg(long)]
    pub overwrite: bool,
    /// 只登记图片，不计算描述符
    #[arg(long)]
    pub no_extract: bool,
}

enum Outcome {
    Added,
    Registered,
    Skipped,
}

/// 扫描目录下符合后缀的文件
fn scan(path: &Path, re_suf: &Regex) -> Vec<PathBuf> {
    WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension().is_some_and(|ext| re_suf.is_match(&ext.to_string_lossy()))
        })
        .collect()
}

async fn add_one(
    db: &IMDB,
    path: PathBuf,
    category: Option<Category>,
    overwrite: bool,
    no_extract: bool,
) -> crate::error::Result<Outcome> {
    let bytes = tokio::fs::read(&path).await?;
    if !overwrite && db.store().get(&content_id(&bytes)).await?.is_some() {
        return Ok(Outcome::Skipped);
    }

    let path = path.canonicalize().unwrap_or(path);
    let req = IngestRequest::from_path(&path, category);
    if no_extract {
        db.register(&bytes, req).await?;
        Ok(Outcome::Registered)
    } else {
        db.ingest(bytes, req).await?;
        Ok(Outcome::Added)
    }
}

impl SubCommandExtend for AddCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let re_suf = format!("^(?i)({})$", self.suffix.replace(',', "|"));
        let re_suf = Regex::new(&re_suf).context("无效的后缀名")?;

        let db = Arc::new(
            IMDBBuilder::new(opts.conf_dir.clone()).extract(self.extract.clone()).open().await?,
        );

        let paths = scan(&self.path, &re_suf);
        info!("共找到 {} 张图片", paths.len());

        let pb = ProgressBar::new(paths.len() as u64).with_style(pb_style());
        let workers = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);

        let (mut added, mut skipped, mut failed) = (0, 0, 0);
        let mut report = |path: PathBuf, result: crate::error::Result<Outcome>| {
            match result {
                Ok(Outcome::Added | Outcome::Registered) => added += 1,
                Ok(Outcome::Skipped) => {
                    skipped += 1;
                    pb.set_message(format!("跳过已添加图片: {}", path.display()));
                }
                Err(e) => {
                    failed += 1;
                    warn!("添加失败 {}: {}", path.display(), e);
                    pb.println(format!("[ERR] {}: {}", path.display(), e));
                }
            }
            pb.inc(1);
        };

        let mut tasks = JoinSet::new();
        for path in paths {
            // 限制同时处理的图片数量
            if tasks.len() >= workers {
                if let Some(joined) = tasks.join_next().await {
                    let (path, result) = joined?;
                    report(path, result);
                }
            }
            let db = db.clone();
            let (category, overwrite, no_extract) = (self.category, self.overwrite, self.no_extract);
            tasks.spawn(async move {
                let result = add_one(&db, path.clone(), category, overwrite, no_extract).await;
                (path, result)
            });
        }
        while let Some(joined) = tasks.join_next().await {
            let (path, result) = joined?;
            report(path, result);
        }

        pb.finish_with_message("图片添加完成");
        println!("added: {added}, skipped: {skipped}, failed: {failed}");

        Ok(())
    }
}
