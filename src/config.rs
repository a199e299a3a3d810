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

//! Configuration structs for the scoring engine, allocation engine and registration service.
//!
//! Mirrors the Python reference's `ScoringWeights`, `BatchAllocationConfig` and
//! `RegistrationConfig` dataclasses, validated at construction instead of at use.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// Weights for the five scoring components, must sum to 1.0 within [`WEIGHT_SUM_TOLERANCE`].
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub gpa_weight: f64,
    pub interest_weight: f64,
    pub time_weight: f64,
    pub year_fit_weight: f64,
    pub prerequisite_weight: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        ScoringWeights {
            gpa_weight: 0.35,
            interest_weight: 0.30,
            time_weight: 0.20,
            year_fit_weight: 0.10,
            prerequisite_weight: 0.05,
        }
    }
}

impl ScoringWeights {
    pub fn new(
        gpa_weight: f64,
        interest_weight: f64,
        time_weight: f64,
        year_fit_weight: f64,
        prerequisite_weight: f64,
    ) -> Result<Self, ConfigError> {
        let weights = ScoringWeights {
            gpa_weight,
            interest_weight,
            time_weight,
            year_fit_weight,
            prerequisite_weight,
        };
        weights.validate()?;
        Ok(weights)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let sum = self.gpa_weight
            + self.interest_weight
            + self.time_weight
            + self.year_fit_weight
            + self.prerequisite_weight;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::WeightsNotNormalized(sum));
        }
        Ok(())
    }
}

/// Strategy selection for [`crate::allocation::AllocationEngine::run_batch_allocation`].
///
/// `Balanced` and `Greedy` share a single implementation (spec.md calls this out explicitly);
/// `CourseOptimal` is the course-proposing dual of `StudentOptimal`, left unimplemented in the
/// Python source and specified by the natural analogy (see DESIGN.md, Open Question 2).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum AllocationStrategy {
    Balanced,
    Greedy,
    StudentOptimal,
    CourseOptimal,
}

impl Default for AllocationStrategy {
    fn default() -> Self {
        AllocationStrategy::Balanced
    }
}

/// Configuration for a single batch allocation run.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct BatchAllocationConfig {
    pub strategy: AllocationStrategy,
    /// Informational cap only; the batch loop enforces "at most one new allocation per student
    /// per batch" unconditionally regardless of this value (spec.md §9, Open Question 1).
    pub max_courses_per_student: u32,
    /// Fraction of `capacity` courses may be filled beyond, e.g. 0.1 = 10% oversubscription.
    pub allow_oversubscription: f64,
    pub prioritize_student_top_choices: bool,
}

impl Default for BatchAllocationConfig {
    fn default() -> Self {
        BatchAllocationConfig {
            strategy: AllocationStrategy::default(),
            max_courses_per_student: 5,
            allow_oversubscription: 0.0,
            prioritize_student_top_choices: true,
        }
    }
}

impl BatchAllocationConfig {
    pub fn new(
        strategy: AllocationStrategy,
        max_courses_per_student: u32,
        allow_oversubscription: f64,
        prioritize_student_top_choices: bool,
    ) -> Result<Self, ConfigError> {
        if allow_oversubscription < 0.0 {
            return Err(ConfigError::NegativeOversubscription(allow_oversubscription));
        }
        Ok(BatchAllocationConfig {
            strategy,
            max_courses_per_student,
            allow_oversubscription,
            prioritize_student_top_choices,
        })
    }
}

/// Top-level configuration for the [`crate::service::RegistrationService`].
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct RegistrationConfig {
    pub scoring_weights: ScoringWeights,
    pub allocation_config: BatchAllocationConfig,
    pub batch_interval_seconds: u64,
    pub enable_auto_batch: bool,
    pub time_decay_hours: f64,
    pub max_time_bonus: f64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        RegistrationConfig {
            scoring_weights: ScoringWeights::default(),
            allocation_config: BatchAllocationConfig::default(),
            batch_interval_seconds: 300,
            enable_auto_batch: true,
            time_decay_hours: 168.0,
            max_time_bonus: 1.0,
        }
    }
}

impl RegistrationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scoring_weights.validate()?;
        if self.allocation_config.allow_oversubscription < 0.0 {
            return Err(ConfigError::NegativeOversubscription(
                self.allocation_config.allow_oversubscription,
            ));
        }
        if self.time_decay_hours <= 0.0 {
            return Err(ConfigError::NonPositiveTimeDecay(self.time_decay_hours));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        assert!(ScoringWeights::default().validate().is_ok());
    }

    #[test]
    fn rejects_unnormalized_weights() {
        let err = ScoringWeights::new(0.5, 0.5, 0.5, 0.0, 0.0).unwrap_err();
        assert!(matches!(err, ConfigError::WeightsNotNormalized(_)));
    }

    #[test]
    fn tolerates_small_rounding_error() {
        assert!(ScoringWeights::new(0.351, 0.30, 0.20, 0.10, 0.05).is_ok());
    }

    #[test]
    fn rejects_negative_oversubscription() {
        let err =
            BatchAllocationConfig::new(AllocationStrategy::Balanced, 5, -0.1, true).unwrap_err();
        assert!(matches!(err, ConfigError::NegativeOversubscription(_)));
    }
}
