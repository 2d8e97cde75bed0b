pub mod batch_operations;
pub mod sql_value;
pub mod sqlite;
