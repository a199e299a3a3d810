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

//! Small CLI front-end for manual smoke-testing of the registration engine: loads a JSON
//! scenario file (students, courses, preferences), opens booking for every course, submits each
//! student's applications, runs one batch allocation pass and prints a human-readable summary.
//!
//! Not part of the scored core -- a thin ambient adapter over `registrar::service`, analogous to
//! the teacher's `cdecao` binary reading an input file and printing/writing the computed
//! assignment.

use std::fs::File;
use std::sync::Arc;

use log::{debug, error, info};
use serde::Deserialize;

use registrar::model::{Course, Student, StudentCoursePreferences};
use registrar::{
    AllocationStrategy, BatchAllocationConfig, RegistrationConfig, RegistrationService,
    ScoringWeights,
};

#[derive(Deserialize)]
struct Scenario {
    students: Vec<Student>,
    courses: Vec<Course>,
    #[serde(default)]
    preferences: Vec<StudentCoursePreferences>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!(
        "This is the course auto-registration engine (registrar), version {}",
        option_env!("CARGO_PKG_VERSION").unwrap_or("unknown")
    );
    let args = parse_cli_args();

    let inpath: &String = args.get_one("INPUT").unwrap();
    debug!("opening scenario file {} ...", inpath);
    let file = File::open(inpath).unwrap_or_else(|e| {
        error!("could not open scenario file {}: {}", inpath, e);
        std::process::exit(exitcode::NOINPUT)
    });
    let scenario: Scenario = serde_json::from_reader(file).unwrap_or_else(|e| {
        error!("could not parse scenario file: {}", e);
        std::process::exit(exitcode::DATAERR)
    });

    let strategy = match args.get_one::<String>("strategy").map(String::as_str) {
        Some("student-optimal") => AllocationStrategy::StudentOptimal,
        Some("course-optimal") => AllocationStrategy::CourseOptimal,
        Some("greedy") => AllocationStrategy::Greedy,
        _ => AllocationStrategy::Balanced,
    };

    let config = RegistrationConfig {
        scoring_weights: ScoringWeights::default(),
        allocation_config: BatchAllocationConfig {
            strategy,
            ..BatchAllocationConfig::default()
        },
        ..RegistrationConfig::default()
    };

    let service = Arc::new(RegistrationService::new(config).unwrap_or_else(|e| {
        error!("invalid configuration: {}", e);
        std::process::exit(exitcode::CONFIG)
    }));

    info!(
        "loaded {} students and {} courses from {}",
        scenario.students.len(),
        scenario.courses.len(),
        inpath
    );

    let course_ids: Vec<String> = scenario.courses.iter().map(|c| c.course_id.clone()).collect();
    let student_ids: Vec<String> = scenario.students.iter().map(|s| s.student_id.clone()).collect();

    for student in scenario.students {
        service.add_student(student);
    }
    for course in scenario.courses {
        service.add_course(course);
    }
    for preferences in scenario.preferences {
        service.set_preferences(preferences);
    }

    for course_id in &course_ids {
        service.open_booking(course_id);
    }
    for student_id in &student_ids {
        for result in service.apply_all(student_id, None) {
            debug!(
                "{} -> {}: {:?} ({})",
                student_id, result.course_id, result.status, result.message
            );
        }
    }

    let results = service.run_allocation(None);
    info!("batch allocation produced outcomes for {} students", results.len());

    if args.get_flag("print") {
        for course_id in &course_ids {
            if let Some(status) = service.get_course_status(course_id) {
                println!(
                    "{}: {}/{} enrolled, {} waitlisted, state {:?}",
                    status.course_id,
                    status.current_enrollment,
                    status.capacity,
                    status.waitlist_size,
                    status.booking_state
                );
            }
        }
        for (student_id, outcomes) in &results {
            for outcome in outcomes {
                println!(
                    "{} -> {}: {:?} ({})",
                    student_id, outcome.course_id, outcome.status, outcome.message
                );
            }
        }
    }
}

fn parse_cli_args() -> clap::ArgMatches {
    clap::command!()
        .arg(
            clap::Arg::new("strategy")
                .short('s')
                .long("strategy")
                .help("Batch allocation strategy to use")
                .value_parser(["balanced", "greedy", "student-optimal", "course-optimal"])
                .default_value("balanced"),
        )
        .arg(
            clap::Arg::new("print")
                .short('p')
                .long("print")
                .help("Print a human-readable summary of the allocation to stdout")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("INPUT")
                .help("JSON scenario file with \"students\", \"courses\" and \"preferences\"")
                .required(true)
                .index(1),
        )
        .get_matches()
}
