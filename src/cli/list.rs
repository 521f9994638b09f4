use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::imdb::IMDBBuilder;
use crate::store::{Category, ImageSummary};

#[derive(Parser, Debug, Clone)]
pub struct ListCommand {
    /// 只列出指定分类的图片
    #[arg(long, value_name = "CATEGORY")]
    pub category: Option<Category>,
}

impl SubCommandExtend for ListCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let db = IMDBBuilder::new(opts.conf_dir.clone()).open().await?;
        for record in db.list(self.category).await? {
            let summary = ImageSummary::from(&record);
            let category = summary.category.map(|c| c.as_str()).unwrap_or("-");
            let computed = if summary.computed { "computed" } else { "pending" };
            println!("{}\t{}\t{}\t{}", summary.id, category, computed, summary.filename);
        }
        Ok(())
    }
}
