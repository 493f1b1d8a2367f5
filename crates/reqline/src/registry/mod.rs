mod entry;
mod interface;
#[allow(clippy::module_inception)]
mod registry;
#[cfg(test)]
mod tests;

pub use entry::*;
pub use interface::*;
pub use registry::*;
