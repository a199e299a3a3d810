// Copyright 2020 by Michael Thies <mail@mhthies.de>
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except in compliance with
// the License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Per-course priority index of waitlisted students, ordered by composite score. See spec.md
//! §4.2. An external sorted-set service (e.g. Redis, which the Python reference models directly
//! via its `WaitlistManager`/`InMemoryRedis` sorted-set API) may stand in for this module; the
//! `WaitlistStore` contract is the only thing other components rely on.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use ordered_float::NotNan;

/// Default TTL for a course's advisory lock (spec.md §4.2).
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);

type Entry = (Reverse<NotNan<f64>>, u64, String);

/// One course's waitlist: a score-ordered set plus a student-id index for O(1) lookup, and the
/// per-course advisory lock.
struct CourseWaitlist {
    /// Ordered by `(-score, insertion_seq, student_id)` so highest score sorts first and ties
    /// break by insertion order, per spec.md §4.2's "balanced tree keyed by (-score, seq)".
    ordered: BTreeSet<Entry>,
    /// `student_id -> (score, insertion_seq)` for O(1) score lookup and O(log N) removal.
    by_student: HashMap<String, (NotNan<f64>, u64)>,
    /// Advisory lock: `Some(expiry)` while held.
    lock_expiry: Mutex<Option<Instant>>,
}

impl CourseWaitlist {
    fn new() -> Self {
        CourseWaitlist {
            ordered: BTreeSet::new(),
            by_student: HashMap::new(),
            lock_expiry: Mutex::new(None),
        }
    }

    fn entry_for(&self, student_id: &str) -> Option<Entry> {
        self.by_student
            .get(student_id)
            .map(|&(score, seq)| (Reverse(score), seq, student_id.to_owned()))
    }
}

/// A per-course priority index of waitlisted (student_id, score) pairs, supporting O(log N)
/// insert/update/remove and O(1) top-K/size lookups, plus a per-course advisory lock.
///
/// `add` on an unknown course lazily creates its waitlist; all lookups on an unknown course
/// return empty/`None` rather than failing (spec.md §4.2 "Failure").
pub struct WaitlistStore {
    courses: Mutex<HashMap<String, CourseWaitlist>>,
    insertion_seq: AtomicU64,
}

impl Default for WaitlistStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitlistStore {
    pub fn new() -> Self {
        WaitlistStore {
            courses: Mutex::new(HashMap::new()),
            insertion_seq: AtomicU64::new(0),
        }
    }

    fn next_seq(&self) -> u64 {
        self.insertion_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Insert or overwrite `student_id`'s score in `course_id`'s waitlist. Idempotent: an
    /// existing entry keeps its original insertion order for tie-breaking, matching the
    /// `update_score` semantics the reference's `zadd`-with-existing-member relies on.
    pub fn add(&self, course_id: &str, student_id: &str, score: f64) {
        let score = NotNan::new(score).expect("score must not be NaN");
        let mut courses = self.courses.lock().unwrap();
        let seq = self.next_seq();
        let waitlist = courses
            .entry(course_id.to_owned())
            .or_insert_with(CourseWaitlist::new);

        if let Some(old_entry) = waitlist.entry_for(student_id) {
            waitlist.ordered.remove(&old_entry);
            let (_, old_seq, _) = old_entry;
            waitlist
                .by_student
                .insert(student_id.to_owned(), (score, old_seq));
            waitlist
                .ordered
                .insert((Reverse(score), old_seq, student_id.to_owned()));
        } else {
            waitlist
                .by_student
                .insert(student_id.to_owned(), (score, seq));
            waitlist
                .ordered
                .insert((Reverse(score), seq, student_id.to_owned()));
        }
    }

    /// Remove `student_id` from `course_id`'s waitlist, if present.
    pub fn remove(&self, course_id: &str, student_id: &str) -> bool {
        let mut courses = self.courses.lock().unwrap();
        let Some(waitlist) = courses.get_mut(course_id) else {
            return false;
        };
        match waitlist.by_student.remove(student_id) {
            Some((score, seq)) => {
                waitlist.ordered.remove(&(Reverse(score), seq, student_id.to_owned()));
                true
            }
            None => false,
        }
    }

    /// Update `student_id`'s score, preserving their original insertion order. No-op, returns
    /// `false`, if the student is not currently waitlisted for this course.
    pub fn update_score(&self, course_id: &str, student_id: &str, new_score: f64) -> bool {
        let new_score = NotNan::new(new_score).expect("score must not be NaN");
        let mut courses = self.courses.lock().unwrap();
        let Some(waitlist) = courses.get_mut(course_id) else {
            return false;
        };
        let Some(&(old_score, seq)) = waitlist.by_student.get(student_id) else {
            return false;
        };
        waitlist
            .ordered
            .remove(&(Reverse(old_score), seq, student_id.to_owned()));
        waitlist
            .by_student
            .insert(student_id.to_owned(), (new_score, seq));
        waitlist
            .ordered
            .insert((Reverse(new_score), seq, student_id.to_owned()));
        true
    }

    /// Look up `student_id`'s current score in `course_id`'s waitlist.
    pub fn score(&self, course_id: &str, student_id: &str) -> Option<f64> {
        let courses = self.courses.lock().unwrap();
        courses
            .get(course_id)
            .and_then(|w| w.by_student.get(student_id))
            .map(|&(score, _)| score.into_inner())
    }

    /// 1-based rank of `student_id` (highest score = 1); ties break by insertion order.
    pub fn position(&self, course_id: &str, student_id: &str) -> Option<usize> {
        let courses = self.courses.lock().unwrap();
        let waitlist = courses.get(course_id)?;
        let entry = waitlist.entry_for(student_id)?;
        Some(waitlist.ordered.range(..=entry).count())
    }

    /// The highest-`k` (student_id, score) pairs, descending.
    pub fn top_k(&self, course_id: &str, k: usize) -> Vec<(String, f64)> {
        let courses = self.courses.lock().unwrap();
        let Some(waitlist) = courses.get(course_id) else {
            return Vec::new();
        };
        waitlist
            .ordered
            .iter()
            .take(k)
            .map(|(Reverse(score), _, student_id)| (student_id.clone(), score.into_inner()))
            .collect()
    }

    /// All (student_id, score) pairs for `course_id`, descending by score.
    pub fn all(&self, course_id: &str) -> Vec<(String, f64)> {
        self.top_k(course_id, usize::MAX)
    }

    /// Atomically remove and return the highest-scoring waitlisted student.
    pub fn pop_top(&self, course_id: &str) -> Option<(String, f64)> {
        let mut courses = self.courses.lock().unwrap();
        let waitlist = courses.get_mut(course_id)?;
        let top = waitlist.ordered.iter().next()?.clone();
        let (Reverse(score), _, ref student_id) = top;
        waitlist.by_student.remove(student_id);
        let student_id = student_id.clone();
        waitlist.ordered.remove(&top);
        Some((student_id, score.into_inner()))
    }

    /// Number of students currently waitlisted for `course_id`.
    pub fn size(&self, course_id: &str) -> usize {
        let courses = self.courses.lock().unwrap();
        courses.get(course_id).map_or(0, |w| w.ordered.len())
    }

    /// Try to acquire the non-reentrant advisory lock for `course_id`, with a TTL so a crashed
    /// holder cannot deadlock the store. Returns `false` if already held and unexpired.
    pub fn acquire_lock(&self, course_id: &str, ttl: Duration) -> bool {
        let mut courses = self.courses.lock().unwrap();
        let waitlist = courses
            .entry(course_id.to_owned())
            .or_insert_with(CourseWaitlist::new);
        let mut expiry = waitlist.lock_expiry.lock().unwrap();
        let now = Instant::now();
        if let Some(current_expiry) = *expiry {
            if current_expiry > now {
                return false;
            }
        }
        *expiry = Some(now + ttl);
        true
    }

    /// Release `course_id`'s advisory lock.
    pub fn release_lock(&self, course_id: &str) {
        let courses = self.courses.lock().unwrap();
        if let Some(waitlist) = courses.get(course_id) {
            *waitlist.lock_expiry.lock().unwrap() = None;
        }
    }
}
