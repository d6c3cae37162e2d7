pub mod cancel;
pub mod error;
pub mod fusion;
pub mod io;
pub mod math;
pub mod mesh;
pub mod projection;
pub mod registration;
pub mod sample;
pub mod weight;

pub use error::{Result, SpimsphereError};
