use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use world_domain::{CreateEventRequest, Event};

/// Almacenamiento de eventos append-only de un único run.
pub trait EventStore {
    /// Agrega un evento asignándole el siguiente `event_id` (1, 2, 3, ...).
    fn append(&mut self, run_id: &str, req: CreateEventRequest, now: DateTime<Utc>) -> Event;
    /// Lista eventos (orden ascendente por `event_id`).
    fn list(&self) -> Vec<Event>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Journal en memoria: contador monotónico + mapa ordenado por id, de modo
/// que el orden de lectura es numérico y no depende del orden de inserción.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    last_id: u64,
    events: BTreeMap<u64, Event>,
}

impl EventStore for InMemoryEventStore {
    fn append(&mut self, run_id: &str, req: CreateEventRequest, now: DateTime<Utc>) -> Event {
        self.last_id += 1;
        let ev = Event { run_id: run_id.to_string(),
                         event_id: self.last_id,
                         event_type: req.event_type,
                         correlation_id: req.correlation_id,
                         event_data: req.event_data,
                         created_at: now };
        self.events.insert(ev.event_id, ev.clone());
        ev
    }

    fn list(&self) -> Vec<Event> {
        self.events.values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_contiguous_from_one() {
        let mut store = InMemoryEventStore::default();
        for i in 0..5 {
            store.append("wfrun_a", CreateEventRequest::new(format!("e{i}")), Utc::now());
        }
        let ids: Vec<u64> = store.list().iter().map(|e| e.event_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(store.len(), 5);
    }
}
