mod entities;
mod ports;

pub use entities::*;
pub use ports::*;
