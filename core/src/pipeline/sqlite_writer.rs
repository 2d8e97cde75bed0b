use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, dispatcher, info, info_span, instrument::WithSubscriber, Dispatch};

use crate::database::batch_operations::{ConfigError, WriteOptions};
use crate::database::sqlite::batch_insert::{insert_batch, ChunkStats};
use crate::database::sqlite::store::Store;
use crate::manifest::config::WriterConfig;
use crate::pipeline::envelope::PipelineEnvelope;
use crate::pipeline::error::PipelineError;
use crate::pipeline::kill_switch::KillSwitch;
use crate::pipeline::processor::{forward, panic_message, run_guarded, DataProcessor};

/// Writes every item it receives into a SQLite table, then passes the item on unchanged.
///
/// An item is a JSON object or an array of objects whose keys are column names. To send an item
/// to a different table wrap it as `{ "table": "<name>", "payload": <object or array> }`.
///
/// Any failure while building or executing the INSERT is sent to the kill switch and the item is
/// not forwarded.
pub struct SqliteWriter {
    store: Arc<dyn Store>,
    table_name: String,
    options: WriteOptions,
    concurrency_level: usize,
    dispatch: Option<Dispatch>,
}

impl SqliteWriter {
    /// A writer replacing existing rows, 100 records per statement, one item at a time.
    pub fn new(store: Arc<dyn Store>, table_name: impl Into<String>) -> Self {
        Self {
            store,
            table_name: table_name.into(),
            options: WriteOptions::default(),
            concurrency_level: 1,
            dispatch: None,
        }
    }

    pub fn from_config(store: Arc<dyn Store>, config: &WriterConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self::new(store, config.target_table.clone())
            .with_options(config.write_options()?)
            .with_concurrency(config.concurrency_level))
    }

    pub fn with_options(mut self, options: WriteOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_concurrency(mut self, concurrency_level: usize) -> Self {
        self.concurrency_level = concurrency_level.max(1);
        self
    }

    /// Routes this writer's logging to `dispatch` instead of the default subscriber.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    fn dispatch(&self) -> Dispatch {
        self.dispatch.clone().unwrap_or_else(|| dispatcher::get_default(Dispatch::clone))
    }

    /// Writes one item without forwarding it.
    pub async fn write(&self, data: &Value) -> Result<Vec<ChunkStats>, PipelineError> {
        let dispatch = self.dispatch();
        self.write_with(data, dispatch.clone()).with_subscriber(dispatch).await
    }

    async fn write_with(&self, data: &Value, dispatch: Dispatch) -> Result<Vec<ChunkStats>, PipelineError> {
        info!("SqliteWriter: Writing data...");

        let envelope = PipelineEnvelope::decode(data)?;
        match envelope {
            PipelineEnvelope::Routed { .. } => debug!("SqliteWriter: routed envelope scenario"),
            PipelineEnvelope::Batch(_) => debug!("SqliteWriter: normal data scenario"),
        }

        let table = envelope.table(&self.table_name).to_string();
        let records = envelope.into_records();
        let span = info_span!("sqlite_writer", table = %table, records = records.len());
        let store = Arc::clone(&self.store);
        let options = self.options.clone();

        let stats = tokio::task::spawn_blocking(move || {
            dispatcher::with_default(&dispatch, || {
                span.in_scope(|| insert_batch(store.as_ref(), &records, &table, &options))
            })
        })
        .await
        .map_err(|e| match e.try_into_panic() {
            Ok(panic) => PipelineError::Abort(format!(
                "SqliteWriter panicked: {}",
                panic_message(panic.as_ref())
            )),
            Err(e) => PipelineError::Abort(format!("SqliteWriter task failed: {}", e)),
        })??;

        info!("SqliteWriter: Write complete");

        Ok(stats)
    }
}

#[async_trait]
impl DataProcessor for SqliteWriter {
    async fn process(&self, data: Value, output: &mpsc::Sender<Value>, kill: &KillSwitch) {
        run_guarded(&self.describe(), kill, async move {
            self.write(&data).await?;
            forward(output, data).await
        })
        .await;
    }

    fn describe(&self) -> String {
        "SqliteWriter".to_string()
    }

    fn concurrency(&self) -> usize {
        self.concurrency_level
    }
}
