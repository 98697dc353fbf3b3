pub mod analysis;
pub mod blob;

pub use analysis::AnalysisHttpClient;
pub use blob::BlobStore;
