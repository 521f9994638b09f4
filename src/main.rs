use cbir::Opts;
use cbir::cli::SubCommandExtend;
use cbir::config::SubCommand;
use clap::Parser;
use tikv_jemallocator::Jemalloc;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::Add(config) => config.run(&opts).await,
        SubCommand::Compute(config) => config.run(&opts).await,
        SubCommand::Delete(config) => config.run(&opts).await,
        SubCommand::Show(config) => config.run(&opts).await,
        SubCommand::Search(config) => config.run(&opts).await,
        SubCommand::Feedback(config) => config.run(&opts).await,
        SubCommand::List(config) => config.run(&opts).await,
        SubCommand::Server(config) => config.run(&opts).await,
    }
}
