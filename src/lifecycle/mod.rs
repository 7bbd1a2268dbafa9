//! Signal handling for graceful shutdown

mod shutdown;

pub use shutdown::wait_for_shutdown;
