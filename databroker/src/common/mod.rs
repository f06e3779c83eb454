mod atomic;
mod constants;
mod event_bus;
mod future;
mod registration;

pub use atomic::*;
pub use constants::*;
pub use event_bus::*;
pub use future::*;
pub use registration::*;
