use clap::Parser;
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{ExtractOptions, Opts};
use crate::imdb::{FeedbackRequest, IMDBBuilder};
use crate::store::FeedbackLabel;

#[derive(Parser, Debug, Clone)]
pub struct FeedbackCommand {
    #[command(flatten)]
    pub extract: ExtractOptions,
    /// 被评价的图片 ID
    pub id: String,
    /// relevant 或 non-relevant
    pub label: FeedbackLabel,
    /// 产生这次搜索结果的查询图片
    pub image: String,
}

impl SubCommandExtend for FeedbackCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let db = IMDBBuilder::new(opts.conf_dir.clone()).extract(self.extract.clone()).open().await?;
        let extractor = db.extractor();
        let query = block_in_place(|| extractor.extract_file(&self.image))?;

        let record = db
            .submit_feedback(FeedbackRequest {
                image_id: Some(self.id.clone()),
                feedback: Some(self.label),
                query_descriptors: Some(query),
            })
            .await?;
        println!("feedback #{} recorded at {}", record.id, record.timestamp.to_rfc3339());
        Ok(())
    }
}
