pub mod batch_insert;
pub mod client;
pub mod query_builder;
pub mod store;
