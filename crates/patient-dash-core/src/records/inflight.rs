//! Per-id single-flight guard for record mutations.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use crate::models::PatientId;

/// Ids with a mutation currently awaiting the record service.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    ids: Mutex<HashSet<PatientId>>,
}

impl InFlight {
    /// Claim `id`. `None` if another mutation already holds it.
    pub(crate) fn acquire(&self, id: &PatientId) -> Option<InFlightGuard<'_>> {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        if ids.insert(id.clone()) {
            Some(InFlightGuard {
                owner: self,
                id: id.clone(),
            })
        } else {
            None
        }
    }

    pub(crate) fn contains(&self, id: &PatientId) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }
}

/// Releases the id on drop, including when the owning future is cancelled.
#[derive(Debug)]
pub(crate) struct InFlightGuard<'a> {
    owner: &'a InFlight,
    id: PatientId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.owner
            .ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let in_flight = InFlight::default();
        let id = PatientId::new("p1");

        let guard = in_flight.acquire(&id).unwrap();
        assert!(in_flight.contains(&id));
        assert!(in_flight.acquire(&id).is_none());

        drop(guard);
        assert!(!in_flight.contains(&id));
        assert!(in_flight.acquire(&id).is_some());
    }

    #[test]
    fn test_ids_are_independent() {
        let in_flight = InFlight::default();
        let _a = in_flight.acquire(&PatientId::new("a")).unwrap();
        assert!(in_flight.acquire(&PatientId::new("b")).is_some());
    }
}
