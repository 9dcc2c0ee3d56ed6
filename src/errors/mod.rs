pub mod world_error;

pub use world_error::{WorldError, WorldResult};
