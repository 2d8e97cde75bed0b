use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::pipeline::error::PipelineError;
use crate::pipeline::kill_switch::KillSwitch;
use crate::pipeline::processor::{forward, run_guarded, DataProcessor};
use crate::pipeline::sqlite_writer::SqliteWriter;

/// The read side of a read-then-write stage: runs a query for an input item and yields the
/// results as zero or more batches, each a JSON object or array of objects.
pub trait QueryReader: Send + Sync {
    fn query_batches<'a>(&'a self, data: &'a Value) -> BoxStream<'a, Result<Value, PipelineError>>;

    fn describe(&self) -> String {
        "QueryReader".to_string()
    }
}

/// Runs a query per input item, writes each result batch with a [`SqliteWriter`] and, once a
/// batch is written, sends it on to the next stage.
///
/// A failure on one batch kills the pipeline and skips the rest of that item's batches.
pub struct SqlReaderSqliteWriter<R> {
    reader: R,
    writer: SqliteWriter,
    concurrency_level: usize,
}

impl<R: QueryReader> SqlReaderSqliteWriter<R> {
    pub fn new(reader: R, writer: SqliteWriter) -> Self {
        Self { reader, writer, concurrency_level: 1 }
    }

    pub fn with_concurrency(mut self, concurrency_level: usize) -> Self {
        self.concurrency_level = concurrency_level.max(1);
        self
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn writer(&self) -> &SqliteWriter {
        &self.writer
    }

    async fn read_and_write(
        &self,
        data: &Value,
        output: &mpsc::Sender<Value>,
        kill: &KillSwitch,
    ) -> Result<(), PipelineError> {
        let mut batches = self.reader.query_batches(data);

        while let Some(batch) = batches.next().await {
            if kill.is_killed() {
                debug!("{}: pipeline killed, skipping remaining batches", self.describe());
                break;
            }

            let batch = batch?;
            self.writer.write(&batch).await?;
            forward(output, batch).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl<R: QueryReader> DataProcessor for SqlReaderSqliteWriter<R> {
    async fn process(&self, data: Value, output: &mpsc::Sender<Value>, kill: &KillSwitch) {
        run_guarded(&self.describe(), kill, self.read_and_write(&data, output, kill)).await;
    }

    fn describe(&self) -> String {
        format!("SqlReaderSqliteWriter({})", self.reader.describe())
    }

    fn concurrency(&self) -> usize {
        self.concurrency_level
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use futures::stream;
    use rusqlite::Connection;
    use serde_json::json;

    use super::*;
    use crate::database::sqlite::client::SqliteClient;
    use crate::pipeline::kill_switch::kill_switch;

    /// Yields the batches listed under the item's `batches` key, counting how many were pulled.
    #[derive(Default)]
    struct FixedReader {
        pulled: Arc<AtomicUsize>,
    }

    impl QueryReader for FixedReader {
        fn query_batches<'a>(&'a self, data: &'a Value) -> BoxStream<'a, Result<Value, PipelineError>> {
            let batches = data["batches"].as_array().cloned().unwrap_or_default();
            let pulled = Arc::clone(&self.pulled);

            stream::iter(batches)
                .map(move |batch| {
                    pulled.fetch_add(1, Ordering::SeqCst);
                    if batch == json!("unreadable") {
                        Err(PipelineError::Read("query failed".to_string()))
                    } else {
                        Ok(batch)
                    }
                })
                .boxed()
        }

        fn describe(&self) -> String {
            "FixedReader".to_string()
        }
    }

    async fn composite(dir: &tempfile::TempDir) -> (SqlReaderSqliteWriter<FixedReader>, Connection) {
        let path = dir.path().join("composite.db");
        let client = SqliteClient::connect_to(path.to_string_lossy()).await.unwrap();
        client.batch_execute("CREATE TABLE copies (id INTEGER PRIMARY KEY, v TEXT);").await.unwrap();
        let writer = SqliteWriter::new(Arc::new(client), "copies");

        (SqlReaderSqliteWriter::new(FixedReader::default(), writer), Connection::open(path).unwrap())
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM copies", [], |row| row.get(0)).unwrap()
    }

    #[tokio::test]
    async fn test_writes_and_forwards_each_batch() {
        let dir = tempfile::tempdir().unwrap();
        let (stage, check) = composite(&dir).await;
        let (kill, mut killed) = kill_switch();
        let (tx, mut rx) = mpsc::channel(8);

        let first = json!([{ "id": 1, "v": "a" }, { "id": 2, "v": "b" }]);
        let second = json!({ "id": 3, "v": "c" });
        stage.process(json!({ "batches": [first.clone(), second.clone()] }), &tx, &kill).await;
        drop(tx);

        assert_eq!(rx.recv().await.unwrap(), first);
        assert_eq!(rx.recv().await.unwrap(), second);
        assert!(rx.recv().await.is_none());
        assert!(killed.try_take().is_none());
        assert_eq!(count(&check), 3);
        assert_eq!(stage.describe(), "SqlReaderSqliteWriter(FixedReader)");
    }

    #[tokio::test]
    async fn test_no_batches_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let (stage, check) = composite(&dir).await;
        let (kill, _killed) = kill_switch();
        let (tx, mut rx) = mpsc::channel(8);

        stage.process(json!({ "batches": [] }), &tx, &kill).await;
        drop(tx);

        assert!(rx.recv().await.is_none());
        assert!(!kill.is_killed());
        assert_eq!(count(&check), 0);
    }

    #[tokio::test]
    async fn test_failed_batch_stops_remaining_batches() {
        let dir = tempfile::tempdir().unwrap();
        let (stage, check) = composite(&dir).await;
        let (kill, mut killed) = kill_switch();
        let (tx, mut rx) = mpsc::channel(8);

        let good = json!({ "id": 1, "v": "a" });
        let bad = json!({ "id": 2, "missing_column": "x" });
        let never = json!({ "id": 3, "v": "c" });
        stage.process(json!({ "batches": [good.clone(), bad, never] }), &tx, &kill).await;
        drop(tx);

        assert_eq!(rx.recv().await.unwrap(), good);
        assert!(rx.recv().await.is_none());
        assert!(matches!(killed.try_take(), Some(PipelineError::BatchInsert(_))));
        assert_eq!(stage.reader().pulled.load(Ordering::SeqCst), 2);
        assert_eq!(count(&check), 1);
    }

    #[tokio::test]
    async fn test_reader_error_kills_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let (stage, _check) = composite(&dir).await;
        let (kill, mut killed) = kill_switch();
        let (tx, _rx) = mpsc::channel(8);

        stage.process(json!({ "batches": ["unreadable"] }), &tx, &kill).await;

        assert!(matches!(killed.try_take(), Some(PipelineError::Read(_))));
    }
}
