mod add;
mod compute;
mod delete;
mod feedback;
mod list;
mod search;
pub mod server;
mod show;

pub use add::*;
pub use compute::*;
pub use delete::*;
pub use feedback::*;
pub use list::*;
pub use search::*;
pub use server::*;
pub use show::*;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}
