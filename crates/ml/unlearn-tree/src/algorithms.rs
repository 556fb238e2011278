pub mod stats;
pub mod tree;

pub use tree::{Tree, TreeConfig};
