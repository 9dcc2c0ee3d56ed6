//! Futures durables asociados a hooks.

mod future;

pub use future::{FutureCommand, FutureSnapshot, HookFutureState, HookFutures, HookWaiter, Resolution};
