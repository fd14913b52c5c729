//! Mock implementations for testing


pub use table::{MockTable, Traffic};
