// worker thread stuff
use super::task::Task;
use super::thread_pool::PoolShared;
use crossbeam_deque::{Steal, Stealer, Worker as WorkerQueue};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

pub(crate) type WorkerId = usize;

pub(crate) struct Worker {
    pub id: WorkerId,
    pub local_queue: WorkerQueue<Task>,
}

impl Worker {
    pub fn new(id: WorkerId) -> Self {
        Self {
            id,
            local_queue: WorkerQueue::new_fifo(),
        }
    }

    // main loop
    pub fn run(&self, shared: &PoolShared) {
        let mut backoff_cnt = 0;

        loop {
            if shared.shutdown.load(Ordering::Acquire) {
                break;
            }

            // local -> global -> steal
            if let Some(task) = self.find_task(shared) {
                backoff_cnt = 0;
                shared.run_task(task);
            } else {
                self.backoff(&mut backoff_cnt);
            }
        }
    }

    fn find_task(&self, shared: &PoolShared) -> Option<Task> {
        if let Some(task) = self.local_queue.pop() {
            return Some(task);
        }

        loop {
            match shared.injector.steal_batch_and_pop(&self.local_queue) {
                Steal::Success(task) => return Some(task),
                Steal::Empty => break,
                Steal::Retry => continue,
            }
        }

        self.try_steal_from_workers(&shared.stealers, shared)
    }

    fn try_steal_from_workers(&self, stealers: &[Stealer<Task>], shared: &PoolShared) -> Option<Task> {
        use rand::seq::SliceRandom;
        use rand::thread_rng;

        if stealers.len() <= 1 {
            return None;
        }

        let mut indices: Vec<usize> = (0..stealers.len()).collect();
        indices.shuffle(&mut thread_rng());

        for &idx in &indices {
            if idx == self.id {
                continue;
            }

            loop {
                match stealers[idx].steal_batch_and_pop(&self.local_queue) {
                    Steal::Success(task) => {
                        shared.metrics.record_task_stolen();
                        return Some(task);
                    }
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
        }

        None
    }

    fn backoff(&self, count: &mut u32) {
        const MAX_SPINS: u32 = 10;
        const MAX_YIELDS: u32 = 20;

        *count += 1;

        if *count <= MAX_SPINS {
            let spins = (*count).min(6);
            for _ in 0..(1 << spins) {
                std::hint::spin_loop();
            }
        } else if *count <= MAX_YIELDS {
            thread::yield_now();
        } else {
            thread::park_timeout(Duration::from_micros(100));
        }
    }
}
