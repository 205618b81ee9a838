use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashSet;
use tracing::trace;

use crate::model::VertexId;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum VertexState {
    /// Not owned by any worker.
    Free,
    /// Claimed from the active set; the worker has not yet acquired
    /// neighbourhood exclusion.
    Scheduled,
    /// Executing gather/apply/scatter.
    Running,
}

struct SchedState {
    active: FxHashSet<VertexId>,
    states: Box<[VertexState]>,
    /// True while some worker holds the vertex as part of an acquired
    /// neighbourhood (the forks of the dining-philosophers analogy).
    in_use: Box<[bool]>,
    num_idle: usize,
    aborted: bool,
}

/// Asynchronous scheduler: active set, worker idle/wake protocol and
/// dining-philosophers exclusion over closed neighbourhoods.
///
/// Everything lives under one scheduling mutex. Workers block on `cv_no_jobs`
/// while the active set is empty and on `cv_exclusive[w]` while vertex `w`
/// blocks their neighbourhood acquisition; both condvars pair with the same
/// mutex.
pub(crate) struct Scheduler {
    state: Mutex<SchedState>,
    cv_no_jobs: Condvar,
    cv_exclusive: Box<[Condvar]>,
    num_threads: usize,
}

impl Scheduler {
    pub fn new(num_vertices: usize, num_threads: usize) -> Self {
        Self {
            state: Mutex::new(SchedState {
                active: FxHashSet::default(),
                states: vec![VertexState::Free; num_vertices].into_boxed_slice(),
                in_use: vec![false; num_vertices].into_boxed_slice(),
                num_idle: 0,
                aborted: false,
            }),
            cv_no_jobs: Condvar::new(),
            cv_exclusive: (0..num_vertices).map(|_| Condvar::new()).collect(),
            num_threads,
        }
    }

    /// Delivers a signal for `vid`.
    ///
    /// A vertex already active or already claimed by a worker is skipped: the
    /// assigned worker reads the freshest data when it runs. A signal for a
    /// RUNNING vertex means neighbourhood exclusion failed to isolate it; that
    /// is fatal, so the scheduler drains the pool and panics.
    pub fn signal(&self, vid: VertexId) {
        let mut s = self.state.lock();
        if s.active.contains(&vid) {
            return;
        }
        match s.states[vid] {
            VertexState::Free => {
                s.active.insert(vid);
                self.cv_no_jobs.notify_one();
            }
            VertexState::Scheduled => {}
            VertexState::Running => {
                s.aborted = true;
                self.cv_no_jobs.notify_all();
                for cv in self.cv_exclusive.iter() {
                    cv.notify_all();
                }
                drop(s);
                panic!("signalled vertex {vid} while it is running; neighbourhood exclusion is broken");
            }
        }
    }

    /// Resets per-run worker accounting. Called once before spawning workers.
    pub fn begin_run(&self) {
        self.state.lock().num_idle = 0;
    }

    /// Claims the next active vertex, blocking while other workers may still
    /// produce signals. Returns `None` once the engine is quiescent (or
    /// aborted): every worker idle and nothing active.
    pub fn next_job(&self) -> Option<VertexId> {
        let mut s = self.state.lock();
        s.num_idle += 1;
        while s.active.is_empty() && s.num_idle < self.num_threads && !s.aborted {
            self.cv_no_jobs.wait(&mut s);
        }
        if s.aborted || s.active.is_empty() {
            // the idle count stays raised so every remaining waiter also
            // observes quiescence and exits
            self.cv_no_jobs.notify_all();
            return None;
        }
        let vid = s.active.iter().next().copied()?;
        s.active.remove(&vid);
        s.states[vid] = VertexState::Scheduled;
        s.num_idle -= 1;
        trace!(vid, "job claimed");
        Some(vid)
    }

    /// Blocks until no vertex of the closed neighbourhood is held by another
    /// worker, then claims them all and marks `vid` running. Returns false if
    /// the engine aborted while waiting.
    pub fn acquire(&self, vid: VertexId, neighbourhood: &[VertexId]) -> bool {
        let mut s = self.state.lock();
        loop {
            if s.aborted {
                s.states[vid] = VertexState::Free;
                return false;
            }
            match neighbourhood.iter().copied().find(|&w| s.in_use[w]) {
                None => break,
                Some(w) => {
                    self.cv_exclusive[w].wait(&mut s);
                }
            }
        }
        for &w in neighbourhood {
            s.in_use[w] = true;
        }
        s.states[vid] = VertexState::Running;
        true
    }

    /// Releases a previously acquired neighbourhood, waking every waiter that
    /// may now be able to proceed.
    pub fn release(&self, vid: VertexId, neighbourhood: &[VertexId]) {
        let mut s = self.state.lock();
        s.states[vid] = VertexState::Free;
        for &w in neighbourhood {
            s.in_use[w] = false;
            self.cv_exclusive[w].notify_all();
        }
    }

    /// Drains the pool after a fatal error: wakes every waiter so blocked
    /// workers observe the abort and exit.
    pub fn abort(&self) {
        let mut s = self.state.lock();
        s.aborted = true;
        self.cv_no_jobs.notify_all();
        for cv in self.cv_exclusive.iter() {
            cv.notify_all();
        }
    }

    /// True when nothing is active, nothing is claimed and no vertex is held.
    pub fn is_quiescent(&self) -> bool {
        let s = self.state.lock();
        s.active.is_empty()
            && s.states.iter().all(|&st| st == VertexState::Free)
            && s.in_use.iter().all(|&u| !u)
    }
}
