use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::{ExtractOptions, Opts};
use crate::imdb::IMDBBuilder;
use crate::store::ImageSummary;

#[derive(Parser, Debug, Clone)]
pub struct ComputeCommand {
    #[command(flatten)]
    pub extract: ExtractOptions,
    /// 图片 ID
    pub id: String,
}

impl SubCommandExtend for ComputeCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let db = IMDBBuilder::new(opts.conf_dir.clone()).extract(self.extract.clone()).open().await?;
        let record = db.compute(&self.id).await?;
        println!("{}", serde_json::to_string_pretty(&ImageSummary::from(&record))?);
        Ok(())
    }
}
