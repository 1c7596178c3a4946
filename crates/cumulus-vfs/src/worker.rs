//! Hydration/dehydration worker pool.
//!
//! Placeholder content transfers are slow and must never run on the
//! filesystem-event path, so they are queued here and drained by
//! dedicated OS threads. Two queues, one per direction, each with its
//! own thread team; queue order is an explicit policy, oldest-first by
//! default so paths are served in the order the sync engine requested
//! them.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::Vfs;

pub const NB_WORKERS: usize = 2;
pub const WORKER_HYDRATION: usize = 0;
pub const WORKER_DEHYDRATION: usize = 1;

/// How long `stop` waits for in-flight jobs before detaching the
/// threads.
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Order in which queued paths are handed to worker threads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueuePolicy {
    /// Newest first: the most recently requested file is served next.
    Lifo,
    /// Oldest first: paths are served in the order they were queued.
    #[default]
    Fifo,
}

struct QueueState {
    jobs: VecDeque<PathBuf>,
    stop: bool,
}

/// One direction's queue, shared between the event path (producers) and
/// a team of worker threads (consumers).
struct WorkerInfo {
    state: Mutex<QueueState>,
    wakeup: Condvar,
    policy: QueuePolicy,
}

impl WorkerInfo {
    fn new(policy: QueuePolicy) -> Self {
        Self {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                stop: false,
            }),
            wakeup: Condvar::new(),
            policy,
        }
    }

    /// Duplicates are accepted; the provider operation is idempotent so
    /// a redundant job is a cheap no-op, not a correctness problem.
    fn enqueue(&self, path: PathBuf) {
        let mut state = self.state.lock().unwrap();
        if state.stop {
            return;
        }
        state.jobs.push_back(path);
        drop(state);
        self.wakeup.notify_one();
    }

    /// Stop is one-way; queued jobs that never ran are dropped.
    fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.stop = true;
        state.jobs.clear();
        drop(state);
        self.wakeup.notify_all();
    }

    /// Block until a job is available or stop is requested. `None`
    /// means the thread should exit.
    fn next(&self) -> Option<PathBuf> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.stop {
                return None;
            }
            let job = match self.policy {
                QueuePolicy::Lifo => state.jobs.pop_back(),
                QueuePolicy::Fifo => state.jobs.pop_front(),
            };
            if let Some(path) = job {
                return Some(path);
            }
            state = self.wakeup.wait(state).unwrap();
        }
    }
}

/// Thread teams draining the hydration and dehydration queues.
pub struct WorkerPool {
    queues: [Arc<WorkerInfo>; NB_WORKERS],
    threads: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(provider: Arc<dyn Vfs>, threads_per_queue: usize, policy: QueuePolicy) -> Self {
        let queues = [
            Arc::new(WorkerInfo::new(policy)),
            Arc::new(WorkerInfo::new(policy)),
        ];

        let mut threads = Vec::with_capacity(NB_WORKERS * threads_per_queue);
        for (queue_id, queue) in queues.iter().enumerate() {
            for thread_id in 0..threads_per_queue {
                let queue = queue.clone();
                let provider = provider.clone();
                let name = format!("vfs-worker-{queue_id}-{thread_id}");
                let handle = std::thread::Builder::new()
                    .name(name.clone())
                    .spawn(move || worker_loop(queue_id, queue, provider))
                    .unwrap_or_else(|e| {
                        // Thread spawn only fails on resource exhaustion.
                        panic!("failed to spawn {name}: {e}")
                    });
                threads.push(handle);
            }
        }

        Self { queues, threads }
    }

    pub fn enqueue(&self, queue_id: usize, path: PathBuf) {
        debug_assert!(queue_id < NB_WORKERS);
        self.queues[queue_id].enqueue(path);
    }

    /// Stop all threads with a bounded join; threads stuck in a
    /// provider call are detached and logged, never waited on forever.
    pub fn stop(&mut self) {
        for queue in &self.queues {
            queue.stop();
        }

        let deadline = Instant::now() + STOP_JOIN_TIMEOUT;
        for handle in self.threads.drain(..) {
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!(
                    thread = handle.thread().name().unwrap_or("?"),
                    "worker did not stop in time, detaching"
                );
            }
        }
        info!("vfs worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.threads.is_empty() {
            self.stop();
        }
    }
}

fn worker_loop(queue_id: usize, queue: Arc<WorkerInfo>, provider: Arc<dyn Vfs>) {
    while let Some(path) = queue.next() {
        let result = match queue_id {
            WORKER_HYDRATION => provider.hydrate(&path),
            WORKER_DEHYDRATION => provider.dehydrate(&path),
            _ => unreachable!("unknown worker queue {queue_id}"),
        };
        if let Err(info) = result {
            // The job is dropped; the file stays in its current state
            // until the next sync pass retries it.
            error!(path = %path.display(), %info, "vfs worker operation failed");
        }
    }
    debug!(queue_id, "vfs worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use cumulus_core::types::SyncTime;
    use cumulus_core::{
        ExitResult, NodeId, PinState, SyncFileItem, VfsStatus, VirtualFileMode,
    };

    use crate::{FetchProgress, StartReport, VfsSetupParams};

    /// Records hydrate/dehydrate calls; both operations are idempotent
    /// counters.
    struct RecordingVfs {
        params: VfsSetupParams,
        hydrated: StdMutex<Vec<PathBuf>>,
        dehydrated: StdMutex<Vec<PathBuf>>,
    }

    impl RecordingVfs {
        fn new() -> Self {
            Self {
                params: VfsSetupParams::default(),
                hydrated: StdMutex::new(Vec::new()),
                dehydrated: StdMutex::new(Vec::new()),
            }
        }
    }

    impl crate::Vfs for RecordingVfs {
        fn mode(&self) -> VirtualFileMode {
            VirtualFileMode::Off
        }
        fn params(&self) -> &VfsSetupParams {
            &self.params
        }
        fn start_impl(&self, _report: &mut StartReport) -> ExitResult<()> {
            Ok(())
        }
        fn stop_impl(&self, _unregister: bool) {}
        fn update_metadata(
            &self,
            _path: &Path,
            _creation_time: SyncTime,
            _modification_time: SyncTime,
            _size: i64,
            _file_id: &NodeId,
        ) -> ExitResult<()> {
            Ok(())
        }
        fn create_placeholder(&self, _path: &Path, _item: &SyncFileItem) -> ExitResult<()> {
            Ok(())
        }
        fn dehydrate_placeholder(&self, _path: &Path) -> ExitResult<()> {
            Ok(())
        }
        fn convert_to_placeholder(&self, _path: &Path, _item: &SyncFileItem) -> ExitResult<()> {
            Ok(())
        }
        fn update_fetch_status(
            &self,
            _tmp: &Path,
            _path: &Path,
            _received: i64,
        ) -> ExitResult<FetchProgress> {
            Ok(FetchProgress::default())
        }
        fn force_status(&self, _path: &Path, _status: &VfsStatus) -> ExitResult<()> {
            Ok(())
        }
        fn is_dehydrated_placeholder(&self, _path: &Path) -> ExitResult<bool> {
            Ok(false)
        }
        fn set_pin_state(&self, _path: &Path, _state: PinState) -> ExitResult<()> {
            Ok(())
        }
        fn pin_state(&self, _path: &Path) -> PinState {
            PinState::AlwaysLocal
        }
        fn status(&self, _path: &Path) -> ExitResult<VfsStatus> {
            Ok(VfsStatus::default())
        }
        fn set_thumbnail(&self, _path: &Path, _picture: &[u8]) -> ExitResult<()> {
            Ok(())
        }
        fn set_app_exclude_list(&self, _list: &str) -> ExitResult<()> {
            Ok(())
        }
        fn fetching_app_list(&self) -> ExitResult<HashMap<String, String>> {
            Ok(HashMap::new())
        }
        fn exclude(&self, _path: &Path) -> ExitResult<()> {
            Ok(())
        }
        fn is_excluded(&self, _path: &Path) -> bool {
            false
        }
        fn clear_file_attributes(&self, _path: &Path) {}
        fn hydrate(&self, path: &Path) -> ExitResult<()> {
            self.hydrated.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
        fn dehydrate(&self, path: &Path) -> ExitResult<()> {
            self.dehydrated.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
        fn cancel_hydrate(&self, _path: &Path) {}
    }

    fn wait_for<F: Fn() -> bool>(cond: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn lifo_queue_serves_newest_first() {
        let info = WorkerInfo::new(QueuePolicy::Lifo);
        info.enqueue(PathBuf::from("first"));
        info.enqueue(PathBuf::from("second"));
        info.enqueue(PathBuf::from("third"));

        assert_eq!(info.next(), Some(PathBuf::from("third")));
        assert_eq!(info.next(), Some(PathBuf::from("second")));
        assert_eq!(info.next(), Some(PathBuf::from("first")));
    }

    #[test]
    fn fifo_queue_serves_oldest_first() {
        let info = WorkerInfo::new(QueuePolicy::Fifo);
        info.enqueue(PathBuf::from("first"));
        info.enqueue(PathBuf::from("second"));

        assert_eq!(info.next(), Some(PathBuf::from("first")));
        assert_eq!(info.next(), Some(PathBuf::from("second")));
    }

    #[test]
    fn default_policy_serves_oldest_first() {
        assert_eq!(QueuePolicy::default(), QueuePolicy::Fifo);

        let info = WorkerInfo::new(QueuePolicy::default());
        info.enqueue(PathBuf::from("first"));
        info.enqueue(PathBuf::from("second"));
        assert_eq!(info.next(), Some(PathBuf::from("first")));
        assert_eq!(info.next(), Some(PathBuf::from("second")));
    }

    #[test]
    fn stop_is_terminal() {
        let info = WorkerInfo::new(QueuePolicy::Lifo);
        info.enqueue(PathBuf::from("pending"));
        info.stop();

        assert_eq!(info.next(), None);
        // Enqueues after stop are ignored.
        info.enqueue(PathBuf::from("late"));
        assert_eq!(info.next(), None);
    }

    #[test]
    fn pool_routes_jobs_to_the_right_operation() {
        let vfs = Arc::new(RecordingVfs::new());
        let mut pool = WorkerPool::start(vfs.clone(), 2, QueuePolicy::Lifo);

        pool.enqueue(WORKER_HYDRATION, PathBuf::from("a.txt"));
        pool.enqueue(WORKER_DEHYDRATION, PathBuf::from("b.txt"));

        wait_for(|| {
            vfs.hydrated.lock().unwrap().len() == 1 && vfs.dehydrated.lock().unwrap().len() == 1
        });
        assert_eq!(vfs.hydrated.lock().unwrap()[0], PathBuf::from("a.txt"));
        assert_eq!(vfs.dehydrated.lock().unwrap()[0], PathBuf::from("b.txt"));

        pool.stop();
    }

    #[test]
    fn duplicate_jobs_run_the_idempotent_operation_twice() {
        // A file hydrated then re-queued is processed again;
        // dedup is the provider's job via idempotency, not the queue's.
        let vfs = Arc::new(RecordingVfs::new());
        let mut pool = WorkerPool::start(vfs.clone(), 1, QueuePolicy::Lifo);

        pool.enqueue(WORKER_HYDRATION, PathBuf::from("dup.txt"));
        wait_for(|| vfs.hydrated.lock().unwrap().len() == 1);
        pool.enqueue(WORKER_HYDRATION, PathBuf::from("dup.txt"));
        wait_for(|| vfs.hydrated.lock().unwrap().len() == 2);

        pool.stop();
    }

    #[test]
    fn stop_drops_unprocessed_jobs() {
        let vfs = Arc::new(RecordingVfs::new());
        let mut pool = WorkerPool::start(vfs.clone(), 1, QueuePolicy::Lifo);
        pool.stop();

        pool.enqueue(WORKER_HYDRATION, PathBuf::from("late.txt"));
        std::thread::sleep(Duration::from_millis(50));
        assert!(vfs.hydrated.lock().unwrap().is_empty());
    }
}
