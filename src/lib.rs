// Library crate exposing modules for integration tests

pub mod adapter;
pub mod error;
pub mod layout;
pub mod model;
pub mod orchestrator;
pub mod rollup;
pub mod store;
