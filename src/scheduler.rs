//! Tag-indexed job table.
//!
//! Every piece of deferred work in the bridge (the recurring poll cycle,
//! ad-hoc polls, debounced setpoint writes) is a [`Job`] in one
//! [`JobTable`].  The table stores actions as plain data and never executes
//! anything itself: when jobs come due it hands each action to a
//! [`JobRunner`], the same delegate split the tick loop uses to stay
//! testable without hardware.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         JobTable                             │
//! │                                                              │
//! │  jobs:   JobId ──▶ Job { tag, kind, interval, next_due, A }  │
//! │  by_tag: Tag   ──▶ { JobId, … }                              │
//! │                                                              │
//! │  run_due(clock) ── due batch ──▶ JobRunner::run(&A, table)   │
//! │                                   │                          │
//! │                                   ▼                          │
//! │                        JobOutcome::{Keep, Remove}            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! "Restart the countdown" and "latest request wins" are both expressed as
//! clear-then-insert under one tag ([`JobTable::replace`]); there is no
//! in-place mutation of a job's due time.

use core::fmt;
use core::hash::Hash;
use core::time::Duration;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, info};

use crate::app::ports::Clock;

// ═══════════════════════════════════════════════════════════════
//  Job types
// ═══════════════════════════════════════════════════════════════

/// Identity of a job inside one table.  Allocated in insertion order,
/// which also fixes the execution order within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u64);

/// How a job behaves after it has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Kept after every run, next due `completion + interval`.
    Recurring,
    /// Removed after its first run.
    OneShot,
}

/// Returned by a [`JobRunner`] for each action it executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Keep,
    Remove,
}

/// A single scheduled unit of work.
#[derive(Debug, Clone)]
pub struct Job<T, A> {
    pub tag: T,
    pub kind: JobKind,
    /// Recurrence interval, or the initial delay for one-shot jobs.
    pub interval: Duration,
    /// Absolute time (on the [`Clock`] timeline) the job becomes eligible.
    pub next_due: Duration,
    pub action: A,
}

/// Executes job actions on behalf of the table.
///
/// The runner receives the table itself so an action can cancel or
/// reschedule tags while it runs (e.g. the poll cycle restarting its own
/// countdown).  Jobs cancelled that way are not run later in the batch.
pub trait JobRunner<T, A> {
    fn run(&mut self, action: &A, jobs: &mut JobTable<T, A>) -> JobOutcome;
}

// ═══════════════════════════════════════════════════════════════
//  Job table
// ═══════════════════════════════════════════════════════════════

pub struct JobTable<T, A> {
    jobs: BTreeMap<JobId, Job<T, A>>,
    by_tag: HashMap<T, BTreeSet<JobId>>,
    next_id: u64,
}

impl<T, A> Default for JobTable<T, A>
where
    T: Clone + Eq + Hash + fmt::Debug,
    A: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A> JobTable<T, A>
where
    T: Clone + Eq + Hash + fmt::Debug,
    A: Clone,
{
    pub fn new() -> Self {
        Self {
            jobs: BTreeMap::new(),
            by_tag: HashMap::new(),
            next_id: 0,
        }
    }

    /// Insert a job due at `now + interval`.
    pub fn schedule(
        &mut self,
        now: Duration,
        tag: T,
        kind: JobKind,
        interval: Duration,
        action: A,
    ) -> JobId {
        let id = JobId(self.next_id);
        self.next_id += 1;

        debug!(
            "JobTable: scheduled {:?} {:?} due in {:?}",
            tag, kind, interval
        );
        self.by_tag.entry(tag.clone()).or_default().insert(id);
        self.jobs.insert(
            id,
            Job {
                tag,
                kind,
                interval,
                next_due: now + interval,
                action,
            },
        );
        id
    }

    /// Remove every job carrying `tag`.  Returns how many were removed;
    /// zero is not an error.
    pub fn cancel_tag(&mut self, tag: &T) -> usize {
        let Some(ids) = self.by_tag.remove(tag) else {
            return 0;
        };
        for id in &ids {
            self.jobs.remove(id);
        }
        if !ids.is_empty() {
            debug!("JobTable: cancelled {} job(s) tagged {:?}", ids.len(), tag);
        }
        ids.len()
    }

    /// Clear-then-insert: afterwards exactly one job carries `tag`.
    pub fn replace(
        &mut self,
        now: Duration,
        tag: T,
        kind: JobKind,
        interval: Duration,
        action: A,
    ) -> JobId {
        self.cancel_tag(&tag);
        self.schedule(now, tag, kind, interval, action)
    }

    /// Run every job whose `next_due` is not after `clock.now()`.
    ///
    /// The due set is fixed when the call starts and executed exhaustively
    /// in insertion order; jobs inserted by actions during the batch wait
    /// for a later call.  Returns the number of actions executed.
    pub fn run_due<C, R>(&mut self, clock: &C, runner: &mut R) -> usize
    where
        C: Clock + ?Sized,
        R: JobRunner<T, A> + ?Sized,
    {
        let now = clock.now();
        let due: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|(_, job)| job.next_due <= now)
            .map(|(id, _)| *id)
            .collect();

        due.into_iter()
            .filter(|id| self.run_one(*id, clock, runner))
            .count()
    }

    /// Force every job to run once regardless of its due time, sleeping
    /// `stagger` between successive runs.
    pub fn run_all<C, R>(&mut self, stagger: Duration, clock: &C, runner: &mut R) -> usize
    where
        C: Clock + ?Sized,
        R: JobRunner<T, A> + ?Sized,
    {
        let ids: Vec<JobId> = self.jobs.keys().copied().collect();
        if ids.is_empty() {
            return 0;
        }
        info!("JobTable: running all {} job(s)", ids.len());

        let mut ran = 0;
        for id in ids {
            if !self.jobs.contains_key(&id) {
                continue;
            }
            if ran > 0 {
                clock.sleep(stagger);
            }
            if self.run_one(id, clock, runner) {
                ran += 1;
            }
        }
        ran
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, id: JobId) -> Option<&Job<T, A>> {
        self.jobs.get(&id)
    }

    /// Number of jobs currently carrying `tag`.
    pub fn count_tag(&self, tag: &T) -> usize {
        self.by_tag.get(tag).map_or(0, BTreeSet::len)
    }

    /// Jobs carrying `tag`, in insertion order.
    pub fn jobs_with_tag<'a>(&'a self, tag: &T) -> impl Iterator<Item = &'a Job<T, A>> + 'a {
        self.by_tag
            .get(tag)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.jobs.get(id))
    }

    /// Earliest `next_due` among jobs carrying `tag`.
    pub fn next_due(&self, tag: &T) -> Option<Duration> {
        self.jobs_with_tag(tag).map(|job| job.next_due).min()
    }

    // ── Internal ──────────────────────────────────────────────

    /// Run one job if it still exists.  Returns whether it ran.
    fn run_one<C, R>(&mut self, id: JobId, clock: &C, runner: &mut R) -> bool
    where
        C: Clock + ?Sized,
        R: JobRunner<T, A> + ?Sized,
    {
        let Some(action) = self.jobs.get(&id).map(|job| job.action.clone()) else {
            return false;
        };

        let outcome = runner.run(&action, self);
        let finished = clock.now();

        // The action may have cancelled its own tag.
        let Some(job) = self.jobs.get_mut(&id) else {
            return true;
        };
        match (outcome, job.kind) {
            (JobOutcome::Keep, JobKind::Recurring) => {
                job.next_due = finished + job.interval;
            }
            (JobOutcome::Keep, JobKind::OneShot) => {
                debug!("JobTable: one-shot {:?} asked to be kept, removing", job.tag);
                self.remove(id);
            }
            (JobOutcome::Remove, _) => self.remove(id),
        }
        true
    }

    fn remove(&mut self, id: JobId) {
        let Some(job) = self.jobs.remove(&id) else {
            return;
        };
        if let Some(ids) = self.by_tag.get_mut(&job.tag) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_tag.remove(&job.tag);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
