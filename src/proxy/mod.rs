mod pipeline;
pub mod response;
pub mod rewrite;

pub use pipeline::DownloadProxy;
