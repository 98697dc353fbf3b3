use crate::{AnalysisResult, ObjectRef};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Receives the structured result for each successfully analyzed object.
/// The runner writes to the sink before appending the checkpoint, so a
/// checkpointed name always has its output on record.
pub trait ResultSink {
    fn write(&mut self, object: &ObjectRef, result: &AnalysisResult) -> io::Result<()>;
}

/// Sink for callers that only want the checkpoint side effect.
#[derive(Default)]
pub struct NullSink;

impl ResultSink for NullSink {
    fn write(&mut self, _object: &ObjectRef, _result: &AnalysisResult) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct ResultRecord<'a> {
    container: &'a str,
    name: &'a str,
    result: &'a AnalysisResult,
}

/// Appends one JSON document per analyzed object to a line-delimited file.
pub struct JsonlSink {
    writer: BufWriter<File>,
}

impl JsonlSink {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::options().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl ResultSink for JsonlSink {
    fn write(&mut self, object: &ObjectRef, result: &AnalysisResult) -> io::Result<()> {
        let record = ResultRecord {
            container: &object.container,
            name: &object.name,
            result,
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}
