//! Keyed single-flight request coordination.
//!
//! At most one request per key is outstanding; anyone asking for the same
//! key while it runs awaits the same shared future and gets a clone of its
//! result. One coordinator is built at startup and handed to whoever needs
//! de-duplication, so separate engines (and separate tests) never share
//! flights.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::debug;

type Flight<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// Shares in-flight requests between concurrent callers.
pub struct RequestCoordinator<T, E> {
    flights: Mutex<HashMap<String, (u64, Flight<T, E>)>>,
    next_flight: AtomicU64,
}

impl<T, E> Default for RequestCoordinator<T, E> {
    fn default() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
            next_flight: AtomicU64::new(0),
        }
    }
}

impl<T, E> std::fmt::Debug for RequestCoordinator<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCoordinator")
            .field(
                "in_flight",
                &self
                    .flights
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .len(),
            )
            .finish()
    }
}

impl<T, E> RequestCoordinator<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create a coordinator with no flights.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `start` under `key`, or join the flight already running there.
    ///
    /// `start` is only called when no flight exists for `key`. The entry is
    /// removed once the flight resolves, so the next call starts afresh.
    pub async fn run<F, Fut>(&self, key: &str, start: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (flight_id, flight) = {
            let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some((id, flight)) = flights.get(key) {
                debug!(key, "Joining in-flight request");
                (*id, flight.clone())
            } else {
                let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
                let flight = start().boxed().shared();
                flights.insert(key.to_string(), (id, flight.clone()));
                (id, flight)
            }
        };

        let result = flight.await;

        let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
        if flights.get(key).is_some_and(|(id, _)| *id == flight_id) {
            flights.remove(key);
        }
        result
    }

    /// Stop handing out the flight under `key`.
    ///
    /// Callers already awaiting it still get its result; the next `run`
    /// for `key` starts a new flight.
    pub fn forget(&self, key: &str) {
        if self
            .flights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
        {
            debug!(key, "Forgot in-flight request");
        }
    }

    /// Whether a flight is running under `key`.
    #[must_use]
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.flights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Number of running flights.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.flights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
