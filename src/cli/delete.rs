use clap::Parser;
use log::warn;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::imdb::IMDBBuilder;

#[derive(Parser, Debug, Clone)]
pub struct DeleteCommand {
    /// 图片 ID，可以指定多个；只删除数据库记录，不删除图片文件
    #[arg(required = true, value_name = "ID")]
    pub ids: Vec<String>,
}

impl SubCommandExtend for DeleteCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let db = IMDBBuilder::new(opts.conf_dir.clone()).open().await?;
        let summary = db.delete_many(&self.ids).await?;
        for id in &summary.missing {
            warn!("图片不存在: {id}");
        }
        println!("deleted: {}, missing: {}", summary.deleted.len(), summary.missing.len());
        if summary.deleted.is_empty() {
            anyhow::bail!("没有删除任何图片");
        }
        Ok(())
    }
}
