pub mod checkpoint;
pub mod error;
pub mod models;
pub mod output;
pub mod runner;
pub mod sas;
pub mod stores;
pub mod traits;

pub use checkpoint::FileCheckpoint;
pub use error::{ObjectError, RunError};
pub use models::{
    AccessDescriptor, AnalysisPage, AnalysisResult, ObjectOutcome, ObjectRef, ObjectStatus,
    RunOptions, RunSummary,
};
pub use output::{JsonlSink, NullSink, ResultSink};
pub use runner::PipelineRunner;
pub use sas::{SharedKeyIssuer, DEFAULT_TOKEN_VALIDITY};
pub use stores::{AnalysisHttpClient, BlobStore};
pub use traits::{CheckpointLog, DocumentAnalyzer, ObjectLister};
