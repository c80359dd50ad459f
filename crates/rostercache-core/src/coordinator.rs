//! Request deduplication and cancellation.
//!
//! At most one request ("flight") is live per key. Callers asking for a key
//! that already has a flight join it and receive the same result. Every new
//! flight and every cancellation bumps the key's generation; a result only
//! counts if its generation is still the current one when it settles.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tracing::debug;

use crate::fetch::{cancel_pair, CancelHandle, CancelSignal, FetchError};

pub type FlightResult<T> = Result<T, FetchError>;
pub type FlightFuture<T> = Shared<BoxFuture<'static, FlightResult<T>>>;

/// What a producer gets when its flight starts.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub generation: u64,
    pub cancel: CancelSignal,
}

/// A caller's share of a flight.
pub struct FlightHandle<T: Clone> {
    generation: u64,
    joined: bool,
    future: FlightFuture<T>,
}

impl<T: Clone> FlightHandle<T> {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True when this call attached to an existing flight instead of
    /// starting one.
    pub fn joined(&self) -> bool {
        self.joined
    }

    pub fn wait(self) -> FlightFuture<T> {
        self.future
    }
}

struct InFlight<T: Clone> {
    generation: u64,
    cancel: CancelHandle,
    interest: usize,
    future: FlightFuture<T>,
}

struct Flights<K, T: Clone> {
    live: HashMap<K, InFlight<T>>,
    generations: HashMap<K, u64>,
}

impl<K: Eq + Hash + Clone, T: Clone> Flights<K, T> {
    fn bump(&mut self, key: &K) -> u64 {
        let generation = self.generations.entry(key.clone()).or_insert(0);
        *generation += 1;
        *generation
    }

    fn is_current(&self, key: &K, generation: u64) -> bool {
        self.generations.get(key) == Some(&generation)
    }

    fn cancel(&mut self, key: &K) -> bool {
        match self.live.remove(key) {
            Some(flight) => {
                self.bump(key);
                flight.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

/// Tracks live flights per key.
///
/// Clone is cheap and clones share the same table. The table lock is never
/// held across an await.
pub struct RequestCoordinator<K, T: Clone> {
    flights: Arc<Mutex<Flights<K, T>>>,
}

impl<K, T: Clone> Clone for RequestCoordinator<K, T> {
    fn clone(&self) -> Self {
        Self {
            flights: Arc::clone(&self.flights),
        }
    }
}

impl<K, T> Default for RequestCoordinator<K, T>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> RequestCoordinator<K, T>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            flights: Arc::new(Mutex::new(Flights {
                live: HashMap::new(),
                generations: HashMap::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Flights<K, T>> {
        self.flights.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the live flight for `key`, or start one with `producer`.
    ///
    /// A new flight is driven by its own task, so it settles (and frees its
    /// slot) even if every handle is dropped. The producer runs on that task,
    /// never under the table lock. Must be called inside a tokio runtime.
    pub fn fetch_once<F, Fut>(&self, key: K, producer: F) -> FlightHandle<T>
    where
        F: FnOnce(Ticket) -> Fut + Send + 'static,
        Fut: Future<Output = FlightResult<T>> + Send + 'static,
    {
        let mut flights = self.lock();

        if let Some(flight) = flights.live.get_mut(&key) {
            flight.interest += 1;
            debug!(key = ?key, generation = flight.generation, interest = flight.interest, "Joined in-flight request");
            return FlightHandle {
                generation: flight.generation,
                joined: true,
                future: flight.future.clone(),
            };
        }

        let generation = flights.bump(&key);
        let (handle, signal) = cancel_pair();

        let table = Arc::clone(&self.flights);
        let settle_key = key.clone();
        let future = async move {
            let result = if signal.is_cancelled() {
                Err(FetchError::Cancelled)
            } else {
                let work = producer(Ticket {
                    generation,
                    cancel: signal.clone(),
                });
                tokio::select! {
                    biased;
                    _ = signal.cancelled() => Err(FetchError::Cancelled),
                    result = work => result,
                }
            };
            let mut flights = table.lock().unwrap_or_else(PoisonError::into_inner);
            let owns_slot = flights
                .live
                .get(&settle_key)
                .is_some_and(|f| f.generation == generation);
            if owns_slot {
                flights.live.remove(&settle_key);
            }
            result
        }
        .boxed()
        .shared();

        flights.live.insert(
            key.clone(),
            InFlight {
                generation,
                cancel: handle,
                interest: 1,
                future: future.clone(),
            },
        );
        drop(flights);

        tokio::spawn(future.clone().map(|_| ()));
        debug!(key = ?key, generation, "Started request");

        FlightHandle {
            generation,
            joined: false,
            future,
        }
    }

    /// Abort the live flight for `key`. Its result, whenever it arrives, is no
    /// longer current. Returns false (and does nothing) if there was no flight.
    pub fn cancel(&self, key: &K) -> bool {
        let cancelled = self.lock().cancel(key);
        if cancelled {
            debug!(key = ?key, "Cancelled in-flight request");
        }
        cancelled
    }

    /// Drop one caller's interest in a flight. The flight is cancelled once
    /// nobody is left waiting on it. Stale generations are ignored.
    pub fn release(&self, key: &K, generation: u64) -> bool {
        let mut flights = self.lock();
        let Some(flight) = flights.live.get_mut(key) else {
            return false;
        };
        if flight.generation != generation {
            return false;
        }
        flight.interest = flight.interest.saturating_sub(1);
        if flight.interest > 0 {
            return false;
        }
        flights.cancel(key);
        debug!(key = ?key, generation, "Released last interest; request cancelled");
        true
    }

    /// Cancel everything. Returns how many flights were live.
    pub fn cancel_all(&self) -> usize {
        let mut flights = self.lock();
        let keys: Vec<K> = flights.live.keys().cloned().collect();
        for key in &keys {
            flights.cancel(key);
        }
        keys.len()
    }

    pub fn is_current(&self, key: &K, generation: u64) -> bool {
        self.lock().is_current(key, generation)
    }

    /// Run `apply` only if `generation` is still current for `key`. The check
    /// and `apply` happen under the table lock, so a concurrent `cancel`
    /// cannot slip in between.
    pub fn if_current(&self, key: &K, generation: u64, apply: impl FnOnce()) -> bool {
        let flights = self.lock();
        if flights.is_current(key, generation) {
            apply();
            true
        } else {
            false
        }
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.lock().live.contains_key(key)
    }

    /// True while the flight started as `generation` has not settled.
    pub fn is_live(&self, key: &K, generation: u64) -> bool {
        self.lock()
            .live
            .get(key)
            .is_some_and(|flight| flight.generation == generation)
    }

    pub fn in_flight(&self) -> usize {
        self.lock().live.len()
    }
}
