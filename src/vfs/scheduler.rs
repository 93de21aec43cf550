//! Two worker pools driving artifact builds.
//!
//! Container reads go through a small I/O pool so decode never thrashes the
//! source file, while processing and encoding run on a CPU-sized pool. The
//! pools are independent queues; an I/O task hands its payload to the CPU
//! pool explicitly. Saturating one pool therefore cannot starve the other.

use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn new(name: &str, threads: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let workers = (0..threads.max(1))
            .map(|index| {
                let receiver: Receiver<Job> = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("{name}-{index}"))
                    .spawn(move || {
                        while let Ok(job) = receiver.recv() {
                            job();
                        }
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
        }
    }

    fn execute(&self, job: Job) {
        if let Some(sender) = &self.sender {
            // Receivers only disappear on shutdown.
            let _ = sender.send(job);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel lets workers drain and exit.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// The shared scheduler: one I/O pool, one CPU pool.
pub struct Scheduler {
    io: WorkerPool,
    cpu: WorkerPool,
}

/// Container reads stay narrow regardless of core count.
const IO_THREADS: usize = 2;

impl Scheduler {
    pub fn new() -> Self {
        Self::with_threads(IO_THREADS, num_cpus::get())
    }

    pub fn with_threads(io_threads: usize, cpu_threads: usize) -> Self {
        debug!(io_threads, cpu_threads, "starting scheduler pools");
        Self {
            io: WorkerPool::new("mcraw-io", io_threads),
            cpu: WorkerPool::new("mcraw-cpu", cpu_threads),
        }
    }

    /// Queue a container read.
    pub fn spawn_io(&self, job: impl FnOnce() + Send + 'static) {
        self.io.execute(Box::new(job));
    }

    /// Queue processing/encoding work.
    pub fn spawn_cpu(&self, job: impl FnOnce() + Send + 'static) {
        self.cpu.execute(Box::new(job));
    }

    /// A cloneable handle onto the CPU pool, for I/O tasks that hand their
    /// payload over without keeping the whole scheduler alive.
    pub fn cpu_handle(&self) -> CpuHandle {
        CpuHandle {
            sender: self
                .cpu
                .sender
                .clone()
                .expect("scheduler pools are alive while the scheduler exists"),
        }
    }
}

/// Entry point into the CPU pool, detached from the scheduler's lifetime.
/// Jobs sent after shutdown are silently dropped.
#[derive(Clone)]
pub struct CpuHandle {
    sender: Sender<Job>,
}

impl CpuHandle {
    pub fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        let _ = self.sender.send(Box::new(job));
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
