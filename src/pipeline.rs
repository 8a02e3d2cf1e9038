//! Couples the receiver's producer thread to any number of consumer threads.
//!
//! The producer fills the [`CircularSampleStore`], bumps the generation
//! counter and wakes everyone parked in [`Pipeline::barrier`]. The barrier is
//! a rendezvous on the generation counter, not a counting semaphore: a waiter
//! remembers the generation it arrived in and sleeps until that changes, so
//! one release frees every current waiter and a late arrival waits for the
//! next one. The producer never waits on consumers; a slow consumer just
//! misses generations.

use crate::receiver::{Receiver, ReceiverError};
use crate::ring_buffer::CircularSampleStore;
use crate::snapshot::{self, SnapshotError};

use log::{debug, info, warn};
use std::{
    error::Error,
    fmt,
    path::Path,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
    time::Duration,
};

// How long the producer backs off after a failed pull
const PULL_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Errors surfaced by [`Pipeline::connect`] and [`Pipeline::disconnect`].
/// None of them is fatal; the caller decides whether to try again.
#[derive(Debug)]
pub enum PipelineError {
    /// `connect` was called on a running pipeline
    AlreadyConnected,
    /// `disconnect` was called on a stopped pipeline
    NotConnected,
    /// The receiver failed to initialise
    ReceiverInit(ReceiverError),
    /// The receiver is still held by a producer thread that has not been
    /// joined yet, or was lost when that thread panicked
    ReceiverUnavailable,
    /// The producer thread panicked
    ProducerPanicked,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyConnected => write!(f, "beamformer is already connected"),
            Self::NotConnected => write!(f, "beamformer is not connected"),
            Self::ReceiverInit(error) => {
                write!(f, "unable to establish a connection to the array: {}", error)
            }
            Self::ReceiverUnavailable => write!(f, "receiver is not available"),
            Self::ProducerPanicked => write!(f, "producer thread panicked"),
        }
    }
}

impl Error for PipelineError {}

#[derive(Debug, Default)]
struct BarrierState {
    generation: u64,
    // false while disconnected: waiters return straight away
    open: bool,
    waiting: usize,
}

#[derive(Debug)]
struct Shared {
    connected: Mutex<bool>,
    barrier: Mutex<BarrierState>,
    released: Condvar,
    store: CircularSampleStore,
}

// The guarded values are plain flags and counters, always consistent, so a
// poisoned lock is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn is_running(&self) -> bool {
        *lock(&self.connected)
    }

    /// Publishes one producer cycle. A batch that lands after the barrier
    /// was closed is dropped, so the generation only counts cycles
    /// published while connected.
    fn publish(&self) -> bool {
        let mut state = lock(&self.barrier);
        if !state.open {
            return false;
        }
        state.generation += 1;
        self.released.notify_all();
        true
    }

    /// Wakes every waiter without publishing anything.
    fn close(&self) {
        let mut state = lock(&self.barrier);
        state.open = false;
        self.released.notify_all();
    }
}

/// The synchronisation pipeline between one receiver and its consumers.
///
/// Share it between threads with an [`Arc`]; every method takes `&self`.
pub struct Pipeline<R: Receiver + 'static> {
    shared: Arc<Shared>,
    receiver: Mutex<Option<R>>,
    connection: Mutex<Option<JoinHandle<R>>>,
}

impl<R: Receiver + 'static> Pipeline<R> {
    /// A disconnected pipeline over a zeroed store of `channels` lanes of
    /// `buffer_length` samples.
    pub fn new(receiver: R, channels: usize, buffer_length: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                connected: Mutex::new(false),
                barrier: Mutex::new(BarrierState::default()),
                released: Condvar::new(),
                store: CircularSampleStore::new(channels, buffer_length),
            }),
            receiver: Mutex::new(Some(receiver)),
            connection: Mutex::new(None),
        }
    }

    /// Initialises the receiver and starts the producer thread.
    pub fn connect(&self) -> Result<(), PipelineError> {
        let mut connected = lock(&self.shared.connected);
        if *connected {
            warn!("beamformer is already connected");
            return Err(PipelineError::AlreadyConnected);
        }

        let mut receiver = lock(&self.receiver)
            .take()
            .ok_or(PipelineError::ReceiverUnavailable)?;

        if let Err(error) = receiver.init() {
            warn!("unable to establish a connection to the array: {}", error);
            *lock(&self.receiver) = Some(receiver);
            return Err(PipelineError::ReceiverInit(error));
        }

        *connected = true;
        lock(&self.shared.barrier).open = true;

        let shared = self.shared.clone();
        *lock(&self.connection) = Some(thread::spawn(move || producer(shared, receiver)));

        info!("pipeline connected");
        Ok(())
    }

    /// Stops the producer, frees every thread parked in [`Self::barrier`]
    /// and stops the receiver. Safe to call from any thread.
    pub fn disconnect(&self) -> Result<(), PipelineError> {
        {
            let mut connected = lock(&self.shared.connected);
            if !*connected {
                warn!("beamformer is not connected");
                return Err(PipelineError::NotConnected);
            }
            *connected = false;
            self.shared.close();
        }

        let handle = lock(&self.connection).take();
        if let Some(handle) = handle {
            let mut receiver = handle
                .join()
                .map_err(|_| PipelineError::ProducerPanicked)?;
            receiver.stop();
            *lock(&self.receiver) = Some(receiver);
        }

        info!("pipeline disconnected");
        Ok(())
    }

    /// Whether the producer is (supposed to be) running.
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// The number of producer cycles published so far. Consumers compare
    /// successive values to tell whether new data has arrived.
    pub fn current_generation(&self) -> u64 {
        lock(&self.shared.barrier).generation
    }

    /// Blocks until the producer publishes the next generation, or until
    /// the pipeline disconnects. Returns immediately when disconnected, so
    /// callers should re-check [`Self::is_running`] after waking.
    pub fn barrier(&self) {
        let mut state = lock(&self.shared.barrier);
        if !state.open {
            return;
        }

        let arrived_in = state.generation;
        state.waiting += 1;
        let mut state = self
            .shared
            .released
            .wait_while(state, |s| s.open && s.generation == arrived_in)
            .unwrap_or_else(PoisonError::into_inner);
        state.waiting -= 1;
    }

    /// Number of threads currently parked in [`Self::barrier`].
    pub fn waiters(&self) -> usize {
        lock(&self.shared.barrier).waiting
    }

    /// The sample store filled by the producer.
    pub fn store(&self) -> &CircularSampleStore {
        &self.shared.store
    }

    /// Dumps the raw sample store to `path`; see [`crate::snapshot`].
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        snapshot::save_snapshot(&self.shared.store, path)
    }
}

impl<R: Receiver + 'static> Drop for Pipeline<R> {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(error) = self.disconnect() {
                warn!("error while disconnecting on drop: {}", error);
            }
        }
    }
}

/// The producer loop: fill and publish until disconnected. Hands the
/// receiver back through the join handle.
fn producer<R: Receiver>(shared: Arc<Shared>, mut receiver: R) -> R {
    debug!("producer started");
    while shared.is_running() {
        match receiver.pull_batch(&shared.store) {
            Ok(()) => {
                if !shared.publish() {
                    debug!("dropping a batch that finished after disconnect");
                }
            }
            Err(error) => {
                warn!("failed to pull a batch: {}", error);
                thread::sleep(PULL_RETRY_DELAY);
            }
        }
    }
    debug!("producer stopped");
    receiver
}
