use crate::output::ResultSink;
use crate::sas::SharedKeyIssuer;
use crate::traits::{CheckpointLog, DocumentAnalyzer, ObjectLister};
use crate::{
    AnalysisResult, ObjectError, ObjectOutcome, ObjectRef, ObjectStatus, RunError, RunOptions,
    RunSummary,
};
use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Drives every pending object in the container through credential
/// issuance, analysis, result emission, and checkpoint append, one object
/// in flight at a time. Object failures are contained per iteration; only
/// configuration, listing, and checkpoint-load problems abort the run.
pub struct PipelineRunner<L, A, C>
where
    L: ObjectLister,
    A: DocumentAnalyzer,
    C: CheckpointLog,
{
    lister: L,
    analyzer: A,
    checkpoint: C,
    issuer: SharedKeyIssuer,
    container: String,
    options: RunOptions,
}

impl<L, A, C> PipelineRunner<L, A, C>
where
    L: ObjectLister + Send + Sync,
    A: DocumentAnalyzer + Send + Sync,
    C: CheckpointLog + Send,
{
    pub fn new(
        lister: L,
        analyzer: A,
        checkpoint: C,
        issuer: SharedKeyIssuer,
        container: impl Into<String>,
        options: RunOptions,
    ) -> Self {
        Self {
            lister,
            analyzer,
            checkpoint,
            issuer,
            container: container.into(),
            options,
        }
    }

    /// One full pass over the container. Returns the per-object tally;
    /// `Err` is reserved for conditions that prevent the run itself.
    pub async fn run(&mut self, sink: &mut dyn ResultSink) -> Result<RunSummary, RunError> {
        let done = self.checkpoint.load().map_err(RunError::CheckpointLoad)?;
        info!(
            container = %self.container,
            completed = done.len(),
            "resuming from checkpoint"
        );

        let objects = self.lister.list_objects(&self.container).await?;
        info!(container = %self.container, listed = objects.len(), "container enumerated");

        let mut summary = RunSummary::default();
        for object in objects {
            if done.contains(&object.name) {
                debug!(object = %object.name, "already processed, skipping");
                summary.skipped += 1;
                continue;
            }

            match self.process(&object, sink).await {
                Ok(result) => {
                    info!(
                        object = %object.name,
                        pages = result.pages.len(),
                        lines = result.line_count(),
                        "object analyzed and checkpointed"
                    );
                    summary.succeeded += 1;
                    summary.outcomes.push(ObjectOutcome {
                        name: object.name,
                        status: ObjectStatus::Succeeded,
                        error_kind: None,
                        detail: None,
                        pages: result.pages.len(),
                    });
                }
                Err(error) => {
                    match &error {
                        ObjectError::Checkpoint(_) => warn!(
                            object = %object.name,
                            error = %error,
                            "analysis succeeded but was not durably recorded; \
                             the next run will repeat a successful analysis"
                        ),
                        _ => warn!(
                            object = %object.name,
                            kind = error.kind(),
                            error = %error,
                            "object failed; it stays pending for the next run"
                        ),
                    }
                    summary.failed += 1;
                    summary.outcomes.push(ObjectOutcome {
                        name: object.name,
                        status: ObjectStatus::Failed,
                        error_kind: Some(error.kind().to_string()),
                        detail: Some(error.to_string()),
                        pages: 0,
                    });
                }
            }
        }

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "run finished"
        );
        Ok(summary)
    }

    async fn process(
        &mut self,
        object: &ObjectRef,
        sink: &mut dyn ResultSink,
    ) -> Result<AnalysisResult, ObjectError> {
        let descriptor = self.issuer.issue(object, Utc::now())?;
        debug!(
            object = %object.name,
            expires_at = %descriptor.expires_at(),
            "credential issued"
        );

        let result = match timeout(
            self.options.analysis_timeout,
            self.analyzer.analyze(&descriptor),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(ObjectError::AnalysisTimeout {
                    timeout_secs: self.options.analysis_timeout.as_secs(),
                })
            }
        };

        for page in &result.pages {
            debug!(
                object = %object.name,
                page = page.number,
                lines = page.lines.len(),
                "page extracted"
            );
        }

        // Output first, checkpoint last: a name in the checkpoint set
        // implies its result was emitted and durably acknowledged.
        sink.write(object, &result).map_err(ObjectError::Sink)?;
        self.checkpoint
            .append(&object.name)
            .map_err(ObjectError::Checkpoint)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::FileCheckpoint;
    use crate::output::NullSink;
    use crate::sas::DEFAULT_TOKEN_VALIDITY;
    use crate::{AccessDescriptor, AnalysisPage};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::io;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    struct FakeLister {
        objects: Vec<ObjectRef>,
        fail: bool,
    }

    #[async_trait]
    impl ObjectLister for FakeLister {
        async fn list_objects(&self, container: &str) -> Result<Vec<ObjectRef>, RunError> {
            if self.fail {
                return Err(RunError::Listing {
                    container: container.to_string(),
                    details: "listing unavailable".to_string(),
                });
            }
            Ok(self.objects.clone())
        }
    }

    enum Scripted {
        Succeed(AnalysisResult),
        TransportFail,
        ServiceFail(&'static str),
    }

    struct FakeAnalyzer {
        script: HashMap<String, Scripted>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DocumentAnalyzer for FakeAnalyzer {
        async fn analyze(
            &self,
            descriptor: &AccessDescriptor,
        ) -> Result<AnalysisResult, ObjectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = descriptor
                .url()
                .path_segments()
                .and_then(|segments| segments.last())
                .unwrap_or_default()
                .to_string();
            match self.script.get(&name) {
                Some(Scripted::Succeed(result)) => Ok(result.clone()),
                Some(Scripted::TransportFail) => {
                    Err(ObjectError::Transport("connection refused".to_string()))
                }
                Some(Scripted::ServiceFail(message)) => Err(ObjectError::AnalysisFailed {
                    message: (*message).to_string(),
                }),
                None => panic!("unexpected object submitted: {name}"),
            }
        }
    }

    struct FailingCheckpoint;

    impl CheckpointLog for FailingCheckpoint {
        fn load(&self) -> io::Result<HashSet<String>> {
            Ok(HashSet::new())
        }

        fn append(&mut self, _name: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    fn issuer() -> SharedKeyIssuer {
        SharedKeyIssuer::new(
            "https://acct.blob.example.net",
            "acct",
            "c2VjcmV0LWFjY291bnQta2V5",
            DEFAULT_TOKEN_VALIDITY,
        )
        .expect("issuer config is valid")
    }

    fn one_page(line: &str) -> AnalysisResult {
        AnalysisResult {
            pages: vec![AnalysisPage {
                number: 1,
                lines: vec![line.to_string()],
            }],
        }
    }

    fn objects(names: &[&str]) -> Vec<ObjectRef> {
        names
            .iter()
            .map(|name| ObjectRef::new("docs", *name))
            .collect()
    }

    fn runner(
        listed: Vec<ObjectRef>,
        script: HashMap<String, Scripted>,
        calls: Arc<AtomicUsize>,
        checkpoint_path: &Path,
    ) -> PipelineRunner<FakeLister, FakeAnalyzer, FileCheckpoint> {
        PipelineRunner::new(
            FakeLister {
                objects: listed,
                fail: false,
            },
            FakeAnalyzer { script, calls },
            FileCheckpoint::new(checkpoint_path),
            issuer(),
            "docs",
            RunOptions::default(),
        )
    }

    #[tokio::test]
    async fn end_to_end_scenario_with_one_failure() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("processed.txt");
        let calls = Arc::new(AtomicUsize::new(0));

        let mut script = HashMap::new();
        script.insert("doc1".to_string(), Scripted::Succeed(one_page("Hello")));
        script.insert("doc2".to_string(), Scripted::TransportFail);

        let mut first_run = runner(
            objects(&["doc1", "doc2"]),
            script,
            calls.clone(),
            &path,
        );
        let summary = first_run
            .run(&mut NullSink)
            .await
            .expect("run completes despite object failures");

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 0);

        let done = FileCheckpoint::new(&path).load().expect("checkpoint loads");
        assert!(done.contains("doc1"));
        assert!(!done.contains("doc2"));

        // Second run attempts only doc2.
        let mut script = HashMap::new();
        script.insert("doc2".to_string(), Scripted::Succeed(one_page("World")));
        let before = calls.load(Ordering::SeqCst);
        let mut second_run = runner(objects(&["doc1", "doc2"]), script, calls.clone(), &path);
        let summary = second_run.run(&mut NullSink).await.expect("second run");

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(calls.load(Ordering::SeqCst) - before, 1);
    }

    #[tokio::test]
    async fn completed_container_is_not_reanalyzed() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("processed.txt");
        let calls = Arc::new(AtomicUsize::new(0));

        let mut script = HashMap::new();
        script.insert("a".to_string(), Scripted::Succeed(one_page("a")));
        script.insert("b".to_string(), Scripted::Succeed(one_page("b")));

        let mut first_run = runner(objects(&["a", "b"]), script, calls.clone(), &path);
        first_run.run(&mut NullSink).await.expect("first run");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let before = FileCheckpoint::new(&path).load().expect("checkpoint loads");
        let mut second_run = runner(
            objects(&["a", "b"]),
            HashMap::new(),
            calls.clone(),
            &path,
        );
        let summary = second_run.run(&mut NullSink).await.expect("second run");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.succeeded + summary.failed, 0);
        let after = FileCheckpoint::new(&path).load().expect("checkpoint loads");
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_neighbors() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("processed.txt");
        let calls = Arc::new(AtomicUsize::new(0));

        let mut script = HashMap::new();
        script.insert("a".to_string(), Scripted::Succeed(one_page("a")));
        script.insert("b".to_string(), Scripted::ServiceFail("unreadable scan"));
        script.insert("c".to_string(), Scripted::Succeed(one_page("c")));

        let mut run = runner(objects(&["a", "b", "c"]), script, calls, &path);
        let summary = run.run(&mut NullSink).await.expect("run completes");

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);

        let done = FileCheckpoint::new(&path).load().expect("checkpoint loads");
        assert!(done.contains("a"));
        assert!(done.contains("c"));
        assert!(!done.contains("b"));

        let failed = summary
            .outcomes
            .iter()
            .find(|outcome| outcome.name == "b")
            .expect("outcome for b");
        assert_eq!(failed.status, ObjectStatus::Failed);
        assert_eq!(failed.error_kind.as_deref(), Some("analysis-failed"));
        assert!(failed
            .detail
            .as_deref()
            .unwrap_or_default()
            .contains("unreadable scan"));
    }

    #[tokio::test]
    async fn checkpoint_append_failure_fails_the_object() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut script = HashMap::new();
        script.insert("doc1".to_string(), Scripted::Succeed(one_page("Hello")));

        let mut run = PipelineRunner::new(
            FakeLister {
                objects: objects(&["doc1"]),
                fail: false,
            },
            FakeAnalyzer {
                script,
                calls: calls.clone(),
            },
            FailingCheckpoint,
            issuer(),
            "docs",
            RunOptions::default(),
        );

        let summary = run.run(&mut NullSink).await.expect("run completes");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failed, 1);
        assert_eq!(
            summary.outcomes[0].error_kind.as_deref(),
            Some("checkpoint")
        );
    }

    #[tokio::test]
    async fn listing_failure_aborts_before_any_analysis() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("processed.txt");
        let calls = Arc::new(AtomicUsize::new(0));

        let mut run = PipelineRunner::new(
            FakeLister {
                objects: Vec::new(),
                fail: true,
            },
            FakeAnalyzer {
                script: HashMap::new(),
                calls: calls.clone(),
            },
            FileCheckpoint::new(&path),
            issuer(),
            "docs",
            RunOptions::default(),
        );

        let error = run
            .run(&mut NullSink)
            .await
            .expect_err("listing failure is run-fatal");
        assert!(matches!(error, RunError::Listing { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!path.exists());
    }
}
