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

//! Pure scoring function: computes a composite fit score for one (student, course, applied_at,
//! priority) tuple. No I/O, no mutation of inputs -- see spec.md §4.1.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::config::ScoringWeights;
use crate::model::{Course, CourseApplication, RegistrationStatus, Student};

/// Computes composite scores for student-course applications.
///
/// Holds the `course_id -> booking_opens_at` map the service propagates via
/// [`ScoringEngine::set_booking_open_time`], mirroring the Python `_booking_open_times` dict.
/// Wrapped in a `RwLock` since the registration service calls into the engine from multiple
/// request-handling threads while lifecycle transitions occasionally write a new open time.
pub struct ScoringEngine {
    weights: ScoringWeights,
    time_decay_hours: f64,
    max_time_bonus: f64,
    booking_open_times: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl ScoringEngine {
    pub fn new(weights: ScoringWeights, time_decay_hours: f64, max_time_bonus: f64) -> Self {
        ScoringEngine {
            weights,
            time_decay_hours,
            max_time_bonus,
            booking_open_times: RwLock::new(HashMap::new()),
        }
    }

    /// Record when booking opened for a course, for time-score calculation.
    pub fn set_booking_open_time(&self, course_id: &str, open_time: DateTime<Utc>) {
        self.booking_open_times
            .write()
            .unwrap()
            .insert(course_id.to_owned(), open_time);
    }

    /// Compute the composite score for one (student, course) application.
    pub fn compute_score(
        &self,
        student: &Student,
        course: &Course,
        applied_at: DateTime<Utc>,
        priority_rank: u32,
    ) -> CourseApplication {
        let gpa_score = self.gpa_score(student, course);
        let interest_score = self.interest_score(student, course);
        let time_score = self.time_score(&course.course_id, applied_at);
        let year_score = self.year_score(student, course);
        let prereq_score = self.prereq_score(student, course);

        let composite_score = self.weights.gpa_weight * gpa_score
            + self.weights.interest_weight * interest_score
            + self.weights.time_weight * time_score
            + self.weights.year_fit_weight * year_score
            + self.weights.prerequisite_weight * prereq_score;

        CourseApplication {
            application_id: format!("{}-{}-{}", student.student_id, course.course_id, applied_at.timestamp_nanos_opt().unwrap_or_default()),
            student_id: student.student_id.clone(),
            course_id: course.course_id.clone(),
            priority_rank,
            applied_at,
            gpa_score,
            interest_score,
            time_score,
            year_score,
            prereq_score,
            composite_score,
            status: RegistrationStatus::Waitlisted,
        }
    }

    /// Zero if below `min_gpa`; otherwise `gpa/4.0` plus up to a `0.1` bonus for exceeding the
    /// minimum.
    fn gpa_score(&self, student: &Student, course: &Course) -> f64 {
        if student.gpa < course.min_gpa {
            return 0.0;
        }
        let base = student.gpa / 4.0;
        let excess = student.gpa - course.min_gpa;
        let bonus = (excess * 0.05).min(0.1);
        (base + bonus).min(1.0)
    }

    /// Jaccard similarity between interests and tags; neutral 0.5 if either set is empty.
    fn interest_score(&self, student: &Student, course: &Course) -> f64 {
        if student.interests.is_empty() || course.tags.is_empty() {
            return 0.5;
        }
        let intersection = student.interests.intersection(&course.tags).count();
        let union = student.interests.union(&course.tags).count();
        if union == 0 {
            return 0.5;
        }
        intersection as f64 / union as f64
    }

    /// Exponential decay from the course's booking-open time; halves every `time_decay_hours`.
    fn time_score(&self, course_id: &str, applied_at: DateTime<Utc>) -> f64 {
        let booking_open = self
            .booking_open_times
            .read()
            .unwrap()
            .get(course_id)
            .copied()
            .unwrap_or(applied_at);

        let hours_since_open =
            (applied_at - booking_open).num_milliseconds() as f64 / 3_600_000.0;
        let hours_since_open = hours_since_open.max(0.0);

        let decay_rate = std::f64::consts::LN_2 / self.time_decay_hours;
        self.max_time_bonus * (-decay_rate * hours_since_open).exp()
    }

    /// 1.0 if the student's year is preferred, 0.5 if adjacent to a preferred year, else 0.25.
    fn year_score(&self, student: &Student, course: &Course) -> f64 {
        if course.preferred_years.contains(&student.year) {
            return 1.0;
        }
        let adjacent = course
            .preferred_years
            .iter()
            .any(|&preferred| (student.year as i64 - preferred as i64).abs() == 1);
        if adjacent {
            0.5
        } else {
            0.25
        }
    }

    /// 1.0 if no prerequisites are required; otherwise the completion ratio.
    fn prereq_score(&self, student: &Student, course: &Course) -> f64 {
        if course.prerequisites.is_empty() {
            return 1.0;
        }
        let completed = student
            .completed_courses
            .intersection(&course.prerequisites)
            .count();
        completed as f64 / course.prerequisites.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_float_eq::assert_float_absolute_eq;
    use chrono::Duration;
    use std::collections::HashSet;

    fn student() -> Student {
        Student::new(
            "S1",
            "Alice",
            "alice@example.edu",
            "CS",
            3.5,
            3,
            ["machine-learning", "ai", "python"].map(String::from),
            ["CS101", "CS201"].map(String::from),
        )
    }

    fn course() -> Course {
        Course::new(
            "ML301",
            "Machine Learning",
            "CS",
            30,
            ["CS101", "CS201"].map(String::from),
            ["machine-learning", "ai", "python", "data-science"].map(String::from),
            3.0,
            [3, 4],
        )
    }

    /// T1 -- scoring breakdown against the concrete example in spec.md §8.
    #[test]
    fn t1_scoring_breakdown() {
        let engine = ScoringEngine::new(ScoringWeights::default(), 168.0, 1.0);
        let s = student();
        let c = course();
        let applied_at = Utc::now();
        engine.set_booking_open_time(&c.course_id, applied_at - Duration::hours(1));

        let app = engine.compute_score(&s, &c, applied_at, 1);
        assert_float_absolute_eq!(app.gpa_score, 0.900, 1e-3);
        assert_float_absolute_eq!(app.interest_score, 0.750, 1e-3);
        assert_float_absolute_eq!(app.time_score, 0.9959, 1e-3);
        assert_float_absolute_eq!(app.year_score, 1.0, 1e-9);
        assert_float_absolute_eq!(app.prereq_score, 1.0, 1e-9);
        assert_float_absolute_eq!(app.composite_score, 0.8892, 1e-3);
    }

    /// T2 -- time decay halves exactly at `time_decay_hours`.
    #[test]
    fn t2_time_decay_halving() {
        let engine = ScoringEngine::new(ScoringWeights::default(), 168.0, 1.0);
        let applied_at = Utc::now();
        engine.set_booking_open_time("C1", applied_at - Duration::hours(168));
        let score = engine.time_score("C1", applied_at);
        assert_float_absolute_eq!(score, 0.5, 1e-9);
    }

    /// P4 -- composite score is the exact weighted sum of its components.
    #[test]
    fn p4_composite_is_weighted_sum() {
        let weights = ScoringWeights::default();
        let engine = ScoringEngine::new(weights, 168.0, 1.0);
        let s = student();
        let c = course();
        let applied_at = Utc::now();
        let app = engine.compute_score(&s, &c, applied_at, 1);
        let expected = weights.gpa_weight * app.gpa_score
            + weights.interest_weight * app.interest_score
            + weights.time_weight * app.time_score
            + weights.year_fit_weight * app.year_score
            + weights.prerequisite_weight * app.prereq_score;
        assert_float_absolute_eq!(app.composite_score, expected, 1e-9);
    }

    /// P6 -- scoring is deterministic for identical inputs and booking_opens_at.
    #[test]
    fn p6_deterministic() {
        let engine = ScoringEngine::new(ScoringWeights::default(), 168.0, 1.0);
        let s = student();
        let c = course();
        let applied_at = Utc::now();
        engine.set_booking_open_time(&c.course_id, applied_at - Duration::hours(3));
        let a = engine.compute_score(&s, &c, applied_at, 1);
        let b = engine.compute_score(&s, &c, applied_at, 1);
        assert_eq!(a.composite_score, b.composite_score);
    }

    #[test]
    fn gpa_below_minimum_scores_zero() {
        let engine = ScoringEngine::new(ScoringWeights::default(), 168.0, 1.0);
        let mut s = student();
        s.gpa = 2.4;
        let mut c = course();
        c.min_gpa = 2.5;
        assert_eq!(engine.gpa_score(&s, &c), 0.0);
    }

    #[test]
    fn interest_score_neutral_on_empty_sets() {
        let engine = ScoringEngine::new(ScoringWeights::default(), 168.0, 1.0);
        let mut s = student();
        s.interests = HashSet::new();
        let c = course();
        assert_eq!(engine.interest_score(&s, &c), 0.5);
    }

    #[test]
    fn year_score_adjacent_and_far() {
        let engine = ScoringEngine::new(ScoringWeights::default(), 168.0, 1.0);
        let mut s = student();
        let c = course();
        s.year = 2; // adjacent to preferred {3, 4}
        assert_eq!(engine.year_score(&s, &c), 0.5);
        s.year = 1; // distance 2
        assert_eq!(engine.year_score(&s, &c), 0.25);
    }
}
