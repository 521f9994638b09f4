use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::debug;
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{ExtractOptions, Opts, SearchOptions};
use crate::descriptor::Modality;
use crate::imdb::{IMDBBuilder, SearchRequest};
use crate::ranker::SearchHit;

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub extract: ExtractOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 被搜索的图片路径
    pub image: String,
    /// 只使用指定的模态，多个模态用逗号分隔
    #[arg(long, value_name = "MODALITY", value_delimiter = ',')]
    pub modalities: Vec<Modality>,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let db = IMDBBuilder::new(opts.conf_dir.clone())
            .extract(self.extract.clone())
            .feedback_history(self.search.feedback_history)
            .open()
            .await?;

        let extractor = db.extractor();
        let mut query = block_in_place(|| extractor.extract_file(&self.image))?;
        if !self.modalities.is_empty() {
            query = query.select(&self.modalities);
        }
        debug!("查询模态: {:?}", query.iter().map(|(m, _)| m.name()).collect::<Vec<_>>());

        let req = SearchRequest {
            query_descriptors: Some(query),
            max_results: Some(self.search.count),
            mode: self.search.mode,
            category: self.search.category,
        };
        let result = if self.search.feedback {
            db.search_with_feedback(req).await?
        } else {
            db.search(req).await?
        };

        print_result(&result, self)
    }
}

fn print_result(result: &[SearchHit], opts: &SearchCommand) -> Result<()> {
    match opts.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for hit in result {
                println!("{:.4}\t{}\t{}", hit.similarity_score, hit.image_id, hit.filename);
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Table,
}
