//! Dataset generator — a fixed pool of worker threads filling one sample
//! store per in-flight request.
//!
//! Workers spin continuously with no blocking wait, drawing a small batch
//! of samples per instance per cycle so concurrently active requests on
//! the same worker make even progress. New requests go to the worker with
//! the fewest in-flight instances at call time; there is no rebalancing
//! afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

use cascade_core::store::{Dataset, UniqueSampleStore};

/// Invoked exactly once with the finished dataset — from a worker thread,
/// not the caller's context. Anything it touches must be thread-safe.
pub type SubmitCallback = Box<dyn FnOnce(Dataset) + Send + 'static>;

struct Instance {
    spawn: Uniform<f64>,
    store: UniqueSampleStore,
    started: Instant,
    ready: SubmitCallback,
}

#[derive(Default)]
struct Worker {
    /// Contended between the worker's own spin loop and placement calls.
    instances: Mutex<Vec<Instance>>,
}

/// Pool of generator workers.
///
/// Dropping the pool signals every worker to exit and joins them.
pub struct Generator {
    workers: Vec<Arc<Worker>>,
    handles: Vec<std::thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    target: usize,
}

impl Generator {
    /// `workers` threads, each instance generating until `target` distinct
    /// samples, drawing `batch_size` samples per instance per cycle.
    pub fn new(workers: usize, target: usize, batch_size: u32) -> Self {
        let workers = workers.max(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let pool: Vec<Arc<Worker>> = (0..workers).map(|_| Arc::new(Worker::default())).collect();

        let handles = pool
            .iter()
            .enumerate()
            .map(|(i, worker)| {
                let worker = worker.clone();
                let shutdown = shutdown.clone();
                std::thread::Builder::new()
                    .name(format!("generator-{i}"))
                    .spawn(move || spin(worker, shutdown, target, batch_size))
                    .expect("failed to spawn generator worker")
            })
            .collect();

        Self {
            workers: pool,
            handles,
            shutdown,
            target,
        }
    }

    /// Schedule generation of one dataset for `seed`, sampled uniformly
    /// from [-seed, seed]. Placement is least-loaded at call time.
    pub fn add_instance(&self, seed: f64, ready: SubmitCallback) {
        let least_loaded = self
            .workers
            .iter()
            .min_by_key(|w| w.instances.lock().len())
            .expect("generator has at least one worker");

        least_loaded.instances.lock().push(Instance {
            spawn: Uniform::new_inclusive(-seed, seed),
            store: UniqueSampleStore::new(self.target),
            started: Instant::now(),
            ready,
        });
    }

    /// In-flight instance count, across all workers.
    pub fn load(&self) -> usize {
        self.workers.iter().map(|w| w.instances.lock().len()).sum()
    }
}

impl Drop for Generator {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn spin(worker: Arc<Worker>, shutdown: Arc<AtomicBool>, target: usize, batch_size: u32) {
    let mut rng = StdRng::from_entropy();

    while !shutdown.load(Ordering::Relaxed) {
        let mut finished = Vec::new();
        {
            let mut instances = worker.instances.lock();
            let mut i = 0;
            while i < instances.len() {
                let instance = &mut instances[i];
                for _ in 0..batch_size {
                    instance.store.insert(instance.spawn.sample(&mut rng));
                }
                if instance.store.len() >= target {
                    finished.push(instances.remove(i));
                } else {
                    i += 1;
                }
            }
        }

        // Callbacks run outside the worker lock so they may add instances.
        for instance in finished {
            // Start times are tracked but do not influence scheduling.
            tracing::debug!(elapsed = ?instance.started.elapsed(), "dataset complete");
            let Instance { store, ready, .. } = instance;
            ready(store.into_dataset());
        }
    }
}
