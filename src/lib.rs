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

//! A course auto-registration and allocation engine for a university-style enrollment system.
//!
//! Four components, leaves-first:
//! - [`scoring`] computes a composite per-application fit score from GPA, interest overlap,
//!   application time, year fit and prerequisite completion.
//! - [`waitlist`] is a per-course priority index of waitlisted students ordered by score.
//! - [`allocation`] applies students to courses, runs periodic batch allocations, and fills
//!   single vacancies on dropout under a per-course lock.
//! - [`service`] is the coordinator: owns entities, routes apply/drop/register/query requests,
//!   drives the periodic batch timer, and manages course lifecycle transitions.
//!
//! The conversational recommendation front-end that produces per-student preference lists, the
//! HTTP/API surface, persistent storage, authentication and dashboards are external
//! collaborators, out of scope for this crate.

pub mod allocation;
pub mod config;
pub mod error;
pub mod model;
pub mod scoring;
pub mod service;
pub mod waitlist;

pub use config::{AllocationStrategy, BatchAllocationConfig, RegistrationConfig, ScoringWeights};
pub use error::ConfigError;
pub use model::{
    AllocationResult, Course, CourseApplication, CourseBookingState, RegistrationStatus, Student,
    StudentCoursePreferences,
};
pub use service::RegistrationService;
