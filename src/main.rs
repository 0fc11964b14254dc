use clap::{Parser, ValueEnum};
use rand::Rng;
use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    thread,
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use unbounded_queues::{
    ArrayQueue, ConcurrentQueue, CountingQueue, Handle, LockFreeQueue, TwoLockQueue,
};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

fn main() -> Result<(), BenchError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .init();

    let config = BenchConfig::parse();
    config.validate()?;
    info!(
        queue = ?config.queue,
        prefill = config.prefill,
        producers = config.producer_threads,
        consumers = config.consumer_threads,
        mixed = config.mixed_threads,
        duration = config.duration,
        "starting benchmark"
    );

    let report = match config.queue {
        QueueKind::LockFree => benchmark::<LockFreeQueue<i32>>(&config),
        QueueKind::TwoLock => benchmark::<TwoLockQueue<i32>>(&config),
        QueueKind::Array => benchmark::<ArrayQueue<i32>>(&config),
        QueueKind::SegQueue => benchmark::<crossbeam_queue::SegQueue<i32>>(&config),
        QueueKind::LockfreeCrate => benchmark::<lockfree::queue::Queue<i32>>(&config),
        QueueKind::ConcurrentQueue => {
            benchmark::<concurrent_queue::ConcurrentQueue<i32>>(&config)
        }
    };

    info!(
        throughput = report.throughput(),
        enqueues = report.enqueues,
        dequeues = report.dequeues,
        empty_dequeues = report.empty_dequeues,
        "benchmark finished"
    );
    println!("throughput: {}", report.throughput());
    println!("number of enqueues: {}", report.enqueues);
    println!("number of dequeues: {}", report.dequeues);
    println!("number of empty dequeues: {}", report.empty_dequeues);
    Ok(())
}

#[derive(Debug, Error, PartialEq, Eq)]
enum BenchError {
    #[error("at least one producer, consumer or mixed thread is required")]
    NoThreads,
    #[error("duration must be at least one second")]
    ZeroDuration,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum QueueKind {
    LockFree,
    TwoLock,
    Array,
    SegQueue,
    LockfreeCrate,
    ConcurrentQueue,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct BenchConfig {
    /// queue implementation to benchmark.
    #[arg(long, value_enum, default_value_t = QueueKind::LockFree)]
    queue: QueueKind,
    /// number of elements to add to the queue before starting the main
    /// threaded test.
    #[arg(long, default_value_t = 0)]
    prefill: usize,
    /// number of threads pushing elements onto the queue.
    #[arg(long, default_value_t = 0)]
    producer_threads: usize,
    /// number of threads popping elements off the queue.
    #[arg(long, default_value_t = 0)]
    consumer_threads: usize,
    /// number of threads randomly choosing between a push and a pop for
    /// every operation.
    #[arg(long, default_value_t = 0)]
    mixed_threads: usize,
    /// duration in seconds to run the test
    #[arg(long)]
    duration: usize,
    /// pin every worker thread to its own core.
    #[arg(long)]
    pin_threads: bool,
}

impl BenchConfig {
    fn validate(&self) -> Result<(), BenchError> {
        if self.producer_threads + self.consumer_threads + self.mixed_threads == 0 {
            return Err(BenchError::NoThreads);
        }
        if self.duration == 0 {
            return Err(BenchError::ZeroDuration);
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Report {
    enqueues: usize,
    dequeues: usize,
    empty_dequeues: usize,
    duration: usize,
}

impl Report {
    fn throughput(&self) -> f64 {
        (self.enqueues + self.dequeues + self.empty_dequeues) as f64 / self.duration as f64
    }
}

#[derive(Clone, Copy)]
enum Role {
    Producer,
    Consumer,
    Mixed,
}

fn benchmark<Q>(config: &BenchConfig) -> Report
where
    Q: ConcurrentQueue<i32> + Sync,
{
    let queue = CountingQueue::<Q, i32>::new(Q::new());
    {
        let mut handle = queue.register();
        for i in 0..config.prefill {
            handle.enqueue(i as i32);
        }
    }

    let cores = if config.pin_threads {
        let cores = core_affinity::get_core_ids();
        if cores.is_none() {
            warn!("could not query core ids, running without pinning");
        }
        cores.unwrap_or_default()
    } else {
        Vec::new()
    };

    let roles = std::iter::repeat(Role::Producer)
        .take(config.producer_threads)
        .chain(std::iter::repeat(Role::Consumer).take(config.consumer_threads))
        .chain(std::iter::repeat(Role::Mixed).take(config.mixed_threads));

    let done = AtomicBool::new(false);
    let empty_dequeues = AtomicUsize::new(0);

    thread::scope(|s| {
        for (index, role) in roles.enumerate() {
            let core = (!cores.is_empty()).then(|| cores[index % cores.len()]);
            let (queue, done, empty_dequeues) = (&queue, &done, &empty_dequeues);
            s.spawn(move || {
                if let Some(core) = core {
                    if !core_affinity::set_for_current(core) {
                        warn!(index, "failed to pin worker thread");
                    }
                }
                let mut handle = queue.register();
                let mut local_empty = 0;
                let mut rng = rand::thread_rng();
                while !done.load(Ordering::Relaxed) {
                    let enqueue = match role {
                        Role::Producer => true,
                        Role::Consumer => false,
                        Role::Mixed => rng.gen_bool(0.5),
                    };
                    if enqueue {
                        handle.enqueue(405);
                    } else if handle.dequeue().is_none() {
                        local_empty += 1;
                    }
                }
                debug!(index, empty_dequeues = local_empty, "worker stopped");
                empty_dequeues.fetch_add(local_empty, Ordering::Relaxed);
            });
        }

        thread::sleep(Duration::from_secs(config.duration as u64));
        done.store(true, Ordering::Relaxed);
    });

    Report {
        enqueues: queue.enq_count() - config.prefill,
        dequeues: queue.deq_count(),
        empty_dequeues: empty_dequeues.into_inner(),
        duration: config.duration,
    }
}
