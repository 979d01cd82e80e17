pub mod error;
pub mod groups;
pub mod plugins;
mod traversal;
pub mod vertex;
