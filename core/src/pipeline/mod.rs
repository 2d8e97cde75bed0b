pub mod envelope;
pub mod error;
pub mod kill_switch;
pub mod processor;
pub mod runner;
pub mod sql_reader_sqlite_writer;
pub mod sqlite_writer;
