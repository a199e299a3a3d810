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

//! Shared data model for the course auto-registration engine: the entities passed between the
//! scoring, waitlist, allocation and service layers.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel priority rank used for a course that does not appear in a student's preference list.
pub const UNLISTED_PRIORITY: u32 = 999;

/// A university student competing for course seats.
///
/// Immutable within a single batch run; `interests` and `completed_courses` are lowercased on
/// construction so the scoring engine can compare them case-insensitively without re-normalizing
/// on every call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Student {
    pub student_id: String,
    pub name: String,
    pub email: String,
    pub major: String,
    pub gpa: f64,
    pub year: u32,
    pub interests: HashSet<String>,
    pub completed_courses: HashSet<String>,
}

impl Student {
    pub fn new(
        student_id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        major: impl Into<String>,
        gpa: f64,
        year: u32,
        interests: impl IntoIterator<Item = String>,
        completed_courses: impl IntoIterator<Item = String>,
    ) -> Self {
        Student {
            student_id: student_id.into(),
            name: name.into(),
            email: email.into(),
            major: major.into(),
            gpa,
            year,
            interests: interests.into_iter().map(|s| s.to_lowercase()).collect(),
            completed_courses: completed_courses.into_iter().collect(),
        }
    }
}

/// A course offering competing students apply to.
///
/// `current_enrollment` and `booking_state`/`booking_opens_at` are the only fields that change
/// after construction; everything else is descriptive or gating data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Course {
    pub course_id: String,
    pub name: String,
    pub department: String,
    pub capacity: u32,
    pub current_enrollment: u32,
    pub prerequisites: HashSet<String>,
    pub tags: HashSet<String>,
    pub min_gpa: f64,
    pub preferred_years: HashSet<u32>,
    pub booking_state: CourseBookingState,
    pub booking_opens_at: Option<DateTime<Utc>>,
}

impl Course {
    pub fn new(
        course_id: impl Into<String>,
        name: impl Into<String>,
        department: impl Into<String>,
        capacity: u32,
        prerequisites: impl IntoIterator<Item = String>,
        tags: impl IntoIterator<Item = String>,
        min_gpa: f64,
        preferred_years: impl IntoIterator<Item = u32>,
    ) -> Self {
        Course {
            course_id: course_id.into(),
            name: name.into(),
            department: department.into(),
            capacity,
            current_enrollment: 0,
            prerequisites: prerequisites.into_iter().collect(),
            tags: tags.into_iter().map(|s| s.to_lowercase()).collect(),
            min_gpa,
            preferred_years: preferred_years.into_iter().collect(),
            booking_state: CourseBookingState::BookingClosed,
            booking_opens_at: None,
        }
    }

    /// Remaining seats at current (non-oversubscribed) capacity.
    pub fn available_seats(&self) -> i64 {
        self.capacity as i64 - self.current_enrollment as i64
    }

    pub fn has_vacancy(&self) -> bool {
        self.available_seats() > 0
    }

    /// Effective capacity including the configured oversubscription fraction, per
    /// `floor(capacity * (1 + oversubscription))`.
    pub fn effective_capacity(&self, oversubscription: f64) -> u32 {
        ((self.capacity as f64) * (1.0 + oversubscription)).floor() as u32
    }
}

/// A student's ordered list of desired courses, index 0 is the highest priority.
///
/// Produced externally by the recommendation front-end; the engine only reads it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StudentCoursePreferences {
    pub student_id: String,
    pub course_ids: Vec<String>,
}

impl StudentCoursePreferences {
    pub fn new(student_id: impl Into<String>, course_ids: Vec<String>) -> Self {
        StudentCoursePreferences {
            student_id: student_id.into(),
            course_ids,
        }
    }

    /// 1-based rank of `course_id` in the preference list, or [`UNLISTED_PRIORITY`] if absent.
    pub fn get_priority(&self, course_id: &str) -> u32 {
        self.course_ids
            .iter()
            .position(|c| c == course_id)
            .map(|idx| idx as u32 + 1)
            .unwrap_or(UNLISTED_PRIORITY)
    }
}

/// The scored record of one student's application to one course.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CourseApplication {
    pub application_id: String,
    pub student_id: String,
    pub course_id: String,
    pub priority_rank: u32,
    pub applied_at: DateTime<Utc>,
    pub gpa_score: f64,
    pub interest_score: f64,
    pub time_score: f64,
    pub year_score: f64,
    pub prereq_score: f64,
    pub composite_score: f64,
    pub status: RegistrationStatus,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Registered,
    Waitlisted,
    Rejected,
    Dropped,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CourseBookingState {
    BookingClosed,
    BookingOpen,
    CourseStarted,
    CourseCompleted,
}

/// Outcome of any apply/register/dropout operation, returned to callers instead of raising.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AllocationResult {
    pub student_id: String,
    pub course_id: String,
    pub success: bool,
    pub status: RegistrationStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waitlist_position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl AllocationResult {
    pub fn registered(student_id: &str, course_id: &str, message: impl Into<String>, score: Option<f64>) -> Self {
        AllocationResult {
            student_id: student_id.to_owned(),
            course_id: course_id.to_owned(),
            success: true,
            status: RegistrationStatus::Registered,
            message: message.into(),
            waitlist_position: None,
            score,
        }
    }

    pub fn waitlisted(
        student_id: &str,
        course_id: &str,
        message: impl Into<String>,
        waitlist_position: Option<usize>,
        score: Option<f64>,
    ) -> Self {
        AllocationResult {
            student_id: student_id.to_owned(),
            course_id: course_id.to_owned(),
            success: true,
            status: RegistrationStatus::Waitlisted,
            message: message.into(),
            waitlist_position,
            score,
        }
    }

    pub fn rejected(student_id: &str, course_id: &str, message: impl Into<String>, score: Option<f64>) -> Self {
        AllocationResult {
            student_id: student_id.to_owned(),
            course_id: course_id.to_owned(),
            success: false,
            status: RegistrationStatus::Rejected,
            message: message.into(),
            waitlist_position: None,
            score,
        }
    }
}
