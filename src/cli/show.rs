use anyhow::Result;
use clap::Parser;
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{ExtractOptions, Opts};
use crate::descriptor::DescriptorExtractor;

#[derive(Parser, Debug, Clone)]
pub struct ShowCommand {
    #[command(flatten)]
    pub extract: ExtractOptions,
    /// 图片路径
    pub image: String,
}

impl SubCommandExtend for ShowCommand {
    async fn run(&self, _opts: &Opts) -> Result<()> {
        let extractor = DescriptorExtractor::create(self.extract.clone());
        let bundle = block_in_place(|| extractor.extract_file(&self.image))?;
        println!("{}", serde_json::to_string_pretty(&bundle)?);
        Ok(())
    }
}
