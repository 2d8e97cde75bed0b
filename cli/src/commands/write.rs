use std::{path::PathBuf, sync::Arc};

use sqlsink::{read_manifest, setup_logger, LevelFilter, Pipeline, SqliteClient, SqliteWriter};

use crate::{
    commands::read_items,
    console::{print_error_message, print_success_message, print_warn_message},
};

pub async fn handle_write_command(
    manifest_path: &PathBuf,
    input: &Option<PathBuf>,
    log_level: LevelFilter,
) -> Result<(), Box<dyn std::error::Error>> {
    setup_logger(log_level);

    let manifest = read_manifest(manifest_path).map_err(|e| {
        print_error_message(&format!("Could not read the manifest {}: {}", manifest_path.display(), e));
        e
    })?;

    let items = read_items(input).map_err(|e| {
        print_error_message(&e);
        e
    })?;

    if items.is_empty() {
        print_warn_message("No items to write");
        return Ok(());
    }

    let client = SqliteClient::connect_to(manifest.database_url()).await.map_err(|e| {
        print_error_message(&format!("Could not open the database: {}", e));
        e
    })?;

    let writer = SqliteWriter::from_config(Arc::new(client), &manifest.writer)?;
    let pipeline = Pipeline::new().with_buffer(manifest.buffer).stage(writer);

    let total = items.len();
    let written = pipeline.run(items).await.map_err(|e| {
        print_error_message(&format!("{} failed: {}", manifest.name, e));
        e
    })?;

    print_success_message(&format!(
        "{}: wrote {} of {} items to {}",
        manifest.name,
        written.len(),
        total,
        manifest.writer.target_table
    ));

    Ok(())
}
