pub use parking_lot::{Condvar, Mutex, MutexGuard};
