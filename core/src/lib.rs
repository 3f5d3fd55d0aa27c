pub mod error;

mod device;
mod messaging;
mod reading;
mod sensor;

pub use device::*;
pub use messaging::*;
pub use reading::*;
pub use sensor::*;

pub static CORE_VERSION: &str = env!("CARGO_PKG_VERSION");
