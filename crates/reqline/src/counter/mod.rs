mod atomic;
mod interface;
mod lock;

pub use atomic::*;
pub use interface::*;
pub use lock::*;
