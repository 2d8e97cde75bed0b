use crate::database::batch_operations::ConfigError;
use crate::database::sqlite::batch_insert::BatchInsertError;
use crate::pipeline::envelope::ParseError;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Could not parse data: {0}")]
    Parse(#[from] ParseError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    BatchInsert(#[from] BatchInsertError),

    #[error("Could not read data: {0}")]
    Read(String),

    #[error("Downstream stage is no longer receiving data")]
    OutputClosed,

    #[error("Pipeline aborted: {0}")]
    Abort(String),
}
