use std::path::PathBuf;

use serde_json::Value;
use sqlsink::{
    compile_batch, read_manifest, BatchInsertError, CompiledStatement, PipelineEnvelope,
    PipelineError, SqlValue, WriterConfig,
};

use crate::{commands::read_items, console::print_error_message};

fn compile_item(item: &Value, writer: &WriterConfig) -> Result<Vec<CompiledStatement>, PipelineError> {
    let options = writer.write_options()?;
    let envelope = PipelineEnvelope::decode(item)?;
    let table = envelope.table(&writer.target_table);

    compile_batch(envelope.records(), table, &options)
        .map_err(|e| PipelineError::BatchInsert(BatchInsertError::from(e)))
}

fn render_args(args: &[SqlValue]) -> String {
    args.iter().map(|arg| arg.to_string()).collect::<Vec<_>>().join(", ")
}

pub fn handle_compile_command(
    manifest_path: &PathBuf,
    input: &Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = read_manifest(manifest_path).map_err(|e| {
        print_error_message(&format!("Could not read the manifest {}: {}", manifest_path.display(), e));
        e
    })?;

    let items = read_items(input).map_err(|e| {
        print_error_message(&e);
        e
    })?;

    for (index, item) in items.iter().enumerate() {
        let statements = compile_item(item, &manifest.writer).map_err(|e| {
            print_error_message(&format!("Item {}: {}", index + 1, e));
            e
        })?;

        for statement in statements {
            println!("{};", statement.sql);
            println!("-- args: [{}]", render_args(&statement.args));
        }
    }

    Ok(())
}
