//! CLI command implementations

pub mod model;
pub mod predict;
pub mod simulate;
pub mod train;
pub mod validate;
