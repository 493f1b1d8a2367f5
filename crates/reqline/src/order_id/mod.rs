mod coordinator;
mod interface;
mod strategy;

pub use coordinator::*;
pub use interface::*;
pub use strategy::*;
