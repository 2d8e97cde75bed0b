use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::{future::join_all, FutureExt};
use serde_json::Value;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info};

use crate::pipeline::error::PipelineError;
use crate::pipeline::kill_switch::{kill_switch, KillReceiver, KillSwitch};
use crate::pipeline::processor::{panic_message, run_guarded, DataProcessor};

const DEFAULT_BUFFER: usize = 100;

async fn worker(
    id: usize,
    stage: Arc<dyn DataProcessor>,
    input: Arc<Mutex<mpsc::Receiver<Value>>>,
    output: mpsc::Sender<Value>,
    kill: KillSwitch,
) {
    let name = stage.describe();

    loop {
        if kill.is_killed() {
            debug!("{} worker {}: pipeline killed, not taking new items", name, id);
            break;
        }

        let item = input.lock().await.recv().await;
        let Some(item) = item else {
            break;
        };

        // killed while waiting for the item
        if kill.is_killed() {
            break;
        }

        if let Err(panic) = AssertUnwindSafe(stage.process(item, &output, &kill)).catch_unwind().await
        {
            let message = format!("{} panicked: {}", name, panic_message(panic.as_ref()));
            kill.kill(PipelineError::Abort(message)).await;
            break;
        }
    }
}

/// Runs `stage` over every item of `input` with `stage.concurrency()` workers.
///
/// Workers share the input receiver, so with a single worker items are processed and forwarded in
/// arrival order. Once the input is drained `finish` is called, unless the run was killed. The
/// output channel is closed when this returns.
pub async fn run_stage(
    stage: Arc<dyn DataProcessor>,
    input: mpsc::Receiver<Value>,
    output: mpsc::Sender<Value>,
    kill: KillSwitch,
) {
    let name = stage.describe();
    let concurrency = stage.concurrency().max(1);
    let input = Arc::new(Mutex::new(input));

    debug!("{}: starting {} worker(s)", name, concurrency);

    let workers = (0..concurrency).map(|id| {
        tokio::spawn(worker(
            id,
            Arc::clone(&stage),
            Arc::clone(&input),
            output.clone(),
            kill.clone(),
        ))
    });

    for result in join_all(workers).await {
        if let Err(e) = result {
            kill.kill(PipelineError::Abort(format!("{} worker failed: {}", name, e))).await;
        }
    }

    if kill.is_killed() {
        info!("{}: stopped after pipeline was killed", name);
        return;
    }

    run_guarded(&name, &kill, async {
        stage.finish(&output, &kill).await;
        Ok(())
    })
    .await;

    debug!("{}: input drained", name);
}

/// A chain of stages connected by bounded channels, sharing one kill switch per run.
#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<Arc<dyn DataProcessor>>,
    buffer: usize,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self { stages: vec![], buffer: DEFAULT_BUFFER }
    }

    /// Capacity of the channels between stages.
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    pub fn stage(mut self, stage: impl DataProcessor + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Adds a stage the caller keeps a handle on.
    pub fn shared_stage(mut self, stage: Arc<dyn DataProcessor>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn describe(&self) -> String {
        self.stages.iter().map(|stage| stage.describe()).collect::<Vec<_>>().join(" -> ")
    }

    /// Starts every stage reading from `input`. With no stages the input is the output.
    pub fn spawn(&self, input: mpsc::Receiver<Value>) -> PipelineRun {
        let (kill, kill_rx) = kill_switch();
        let mut upstream = input;
        let mut handles = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let (tx, rx) = mpsc::channel(self.buffer);
            handles.push(tokio::spawn(run_stage(Arc::clone(stage), upstream, tx, kill.clone())));
            upstream = rx;
        }

        PipelineRun { output: upstream, kill, kill_rx, handles }
    }

    /// Feeds `items` through the pipeline and collects what comes out of the last stage.
    pub async fn run(
        &self,
        items: impl IntoIterator<Item = Value>,
    ) -> Result<Vec<Value>, PipelineError> {
        info!("Pipeline: running {}", self.describe());

        let (tx, rx) = mpsc::channel(self.buffer);
        let run = self.spawn(rx);
        let kill = run.kill_switch().clone();
        let items: Vec<Value> = items.into_iter().collect();

        let feeder = tokio::spawn(async move {
            for item in items {
                if kill.is_killed() || tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        let output = run.collect().await;

        if let Err(e) = feeder.await {
            return Err(PipelineError::Abort(format!("Pipeline feeder failed: {}", e)));
        }

        output
    }
}

/// A running [`Pipeline`].
pub struct PipelineRun {
    output: mpsc::Receiver<Value>,
    kill: KillSwitch,
    kill_rx: KillReceiver,
    handles: Vec<JoinHandle<()>>,
}

impl PipelineRun {
    /// Items leaving the last stage.
    pub fn output(&mut self) -> &mut mpsc::Receiver<Value> {
        &mut self.output
    }

    pub fn kill_switch(&self) -> &KillSwitch {
        &self.kill
    }

    /// Drains the remaining output and waits for every stage, returning the drained items or the
    /// error that killed the run.
    pub async fn collect(mut self) -> Result<Vec<Value>, PipelineError> {
        let mut items = vec![];
        while let Some(item) = self.output.recv().await {
            items.push(item);
        }

        for result in join_all(self.handles).await {
            if let Err(e) = result {
                self.kill.kill(PipelineError::Abort(format!("Pipeline stage failed: {}", e))).await;
            }
        }

        match self.kill_rx.try_take() {
            Some(err) => {
                error!("Pipeline failed: {}", err);
                Err(err)
            }
            None => Ok(items),
        }
    }

    /// Like [`PipelineRun::collect`], discarding the output.
    pub async fn wait(self) -> Result<(), PipelineError> {
        self.collect().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use rusqlite::Connection;
    use serde_json::json;

    use super::*;
    use crate::database::sqlite::client::SqliteClient;
    use crate::pipeline::processor::forward;
    use crate::pipeline::sqlite_writer::SqliteWriter;

    async fn sqlite(dir: &tempfile::TempDir) -> (Arc<SqliteClient>, Connection) {
        let path = dir.path().join("pipeline.db");
        let client = SqliteClient::connect_to(path.to_string_lossy()).await.unwrap();
        client
            .batch_execute(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
                 CREATE TABLE audit (id INTEGER PRIMARY KEY, action TEXT);",
            )
            .await
            .unwrap();
        (Arc::new(client), Connection::open(path).unwrap())
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0)).unwrap()
    }

    fn users(ids: impl IntoIterator<Item = i64>) -> Vec<Value> {
        ids.into_iter().map(|id| json!({ "id": id, "name": format!("user-{}", id) })).collect()
    }

    /// Wraps every item into an envelope for the `audit` table.
    struct ToAudit;

    #[async_trait]
    impl DataProcessor for ToAudit {
        async fn process(&self, data: Value, output: &mpsc::Sender<Value>, kill: &KillSwitch) {
            run_guarded("ToAudit", kill, async move {
                let envelope = json!({ "table": "audit", "payload": { "id": data["id"], "action": "write" } });
                forward(output, envelope).await
            })
            .await;
        }

        fn describe(&self) -> String {
            "ToAudit".to_string()
        }
    }

    /// Counts items and emits the count once the input is drained.
    #[derive(Default)]
    struct Counter {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl DataProcessor for Counter {
        async fn process(&self, _data: Value, _output: &mpsc::Sender<Value>, _kill: &KillSwitch) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }

        async fn finish(&self, output: &mpsc::Sender<Value>, kill: &KillSwitch) {
            let total = self.seen.load(Ordering::SeqCst);
            run_guarded("Counter", kill, forward(output, json!({ "total": total }))).await;
        }

        fn describe(&self) -> String {
            "Counter".to_string()
        }
    }

    struct Explodes;

    #[async_trait]
    impl DataProcessor for Explodes {
        async fn process(&self, data: Value, _output: &mpsc::Sender<Value>, _kill: &KillSwitch) {
            if data["explode"] == json!(true) {
                panic!("item {} exploded", data["id"]);
            }
        }

        fn describe(&self) -> String {
            "Explodes".to_string()
        }
    }

    /// Fails every item: item 0 at once, the others after a delay. Counts items started.
    #[derive(Default)]
    struct FailingPool {
        started: AtomicUsize,
    }

    #[async_trait]
    impl DataProcessor for FailingPool {
        async fn process(&self, data: Value, _output: &mpsc::Sender<Value>, kill: &KillSwitch) {
            self.started.fetch_add(1, Ordering::SeqCst);
            run_guarded("FailingPool", kill, async move {
                let id = data["id"].as_i64().unwrap_or_default();
                if id > 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                }
                Err(PipelineError::Abort(format!("item {} failed", id)))
            })
            .await;
        }

        fn describe(&self) -> String {
            "FailingPool".to_string()
        }

        fn concurrency(&self) -> usize {
            4
        }
    }

    #[tokio::test]
    async fn test_sequential_stage_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let (client, check) = sqlite(&dir).await;
        let pipeline = Pipeline::new().with_buffer(2).stage(SqliteWriter::new(client, "users"));

        let items = users(1..=10);
        let output = pipeline.run(items.clone()).await.unwrap();

        assert_eq!(output, items);
        assert_eq!(count(&check, "users"), 10);
    }

    #[tokio::test]
    async fn test_concurrent_stage_writes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let (client, check) = sqlite(&dir).await;
        let writer = SqliteWriter::new(client, "users").with_concurrency(4);
        let pipeline = Pipeline::new().stage(writer);

        let mut output = pipeline.run(users(1..=40)).await.unwrap();
        output.sort_by_key(|item| item["id"].as_i64());

        assert_eq!(output, users(1..=40));
        assert_eq!(count(&check, "users"), 40);
    }

    #[tokio::test]
    async fn test_failure_stops_new_work_and_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let (client, check) = sqlite(&dir).await;
        let pipeline = Pipeline::new().stage(SqliteWriter::new(client, "users"));

        let mut items = users(1..=2);
        items.push(json!({ "id": 3, "unknown": "column" }));
        items.extend(users(4..=6));

        let err = pipeline.run(items).await.unwrap_err();

        assert!(matches!(err, PipelineError::BatchInsert(_)));
        assert_eq!(count(&check, "users"), 2);
    }

    #[tokio::test]
    async fn test_concurrent_failure_returns_first_error_and_stops_new_work() {
        let stage = Arc::new(FailingPool::default());
        let pipeline = Pipeline::new().with_buffer(100).shared_stage(stage.clone());

        let items: Vec<Value> = (0..50).map(|id| json!({ "id": id })).collect();
        let err = pipeline.run(items).await.unwrap_err();

        match err {
            PipelineError::Abort(message) => assert_eq!(message, "item 0 failed"),
            other => panic!("expected abort, got {:?}", other),
        }
        // only the items already taken by the four workers ran
        assert!(stage.started.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn test_chained_stages_route_to_other_table() {
        let dir = tempfile::tempdir().unwrap();
        let (client, check) = sqlite(&dir).await;
        let pipeline = Pipeline::new()
            .stage(SqliteWriter::new(client.clone(), "users"))
            .stage(ToAudit)
            .stage(SqliteWriter::new(client, "users"));

        assert_eq!(pipeline.describe(), "SqliteWriter -> ToAudit -> SqliteWriter");

        let output = pipeline.run(users(1..=3)).await.unwrap();

        assert_eq!(output.len(), 3);
        assert_eq!(output[0], json!({ "table": "audit", "payload": { "id": 1, "action": "write" } }));
        assert_eq!(count(&check, "users"), 3);
        assert_eq!(count(&check, "audit"), 3);
    }

    #[tokio::test]
    async fn test_finish_runs_after_input_drains() {
        let pipeline = Pipeline::new().stage(Counter::default());

        let output = pipeline.run(users(1..=5)).await.unwrap();

        assert_eq!(output, vec![json!({ "total": 5 })]);
    }

    #[tokio::test]
    async fn test_panicking_stage_aborts_run() {
        let pipeline = Pipeline::new().stage(Explodes).stage(Counter::default());

        let err = pipeline
            .run(vec![json!({ "id": 1 }), json!({ "id": 2, "explode": true }), json!({ "id": 3 })])
            .await
            .unwrap_err();

        match err {
            PipelineError::Abort(message) => assert_eq!(message, "Explodes panicked: item 2 exploded"),
            other => panic!("expected abort, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_stages_passes_input_through() {
        let output = Pipeline::new().run(users(1..=3)).await.unwrap();

        assert_eq!(output, users(1..=3));
    }

    #[tokio::test]
    async fn test_spawned_run_can_be_drained_incrementally() {
        let (tx, rx) = mpsc::channel(4);
        let mut run = Pipeline::new().stage(Counter::default()).spawn(rx);

        for item in users(1..=2) {
            tx.send(item).await.unwrap();
        }
        drop(tx);

        assert_eq!(run.output().recv().await, Some(json!({ "total": 2 })));
        assert!(!run.kill_switch().is_killed());
        assert!(run.wait().await.is_ok());
    }
}
