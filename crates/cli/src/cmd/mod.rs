mod augment;
mod graph;
mod steps;

pub use augment::{AugmentArgs, cmd_augment};
pub use graph::cmd_graph;
pub use steps::cmd_steps;
