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

//! Fatal configuration errors. Domain-level rejections (GPA gate, prerequisites, course state,
//! lock contention) are never raised as errors -- they are encoded as `AllocationResult` values
//! returned from the allocation engine (see `crate::model::AllocationResult`).

use std::fmt;

/// Raised when constructing a [`crate::config::ScoringWeights`] or
/// [`crate::config::BatchAllocationConfig`] with invalid parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The five scoring weights did not sum to 1.0 within tolerance.
    WeightsNotNormalized(f64),
    /// `allow_oversubscription` was negative.
    NegativeOversubscription(f64),
    /// `time_decay_hours` was not strictly positive.
    NonPositiveTimeDecay(f64),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::WeightsNotNormalized(sum) => {
                write!(f, "scoring weights must sum to 1.0 (+/- 0.01), got {}", sum)
            }
            ConfigError::NegativeOversubscription(v) => {
                write!(f, "allow_oversubscription must be >= 0.0, got {}", v)
            }
            ConfigError::NonPositiveTimeDecay(v) => {
                write!(f, "time_decay_hours must be > 0.0, got {}", v)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
