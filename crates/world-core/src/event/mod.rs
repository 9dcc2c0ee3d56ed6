//! Journal de eventos append-only de un run y trait `EventStore`.

mod store;

pub use store::EventStore;
pub use store::InMemoryEventStore;
