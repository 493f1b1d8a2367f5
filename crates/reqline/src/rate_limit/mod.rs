mod limiter;
mod wrapper;

pub use limiter::*;
pub use wrapper::*;
