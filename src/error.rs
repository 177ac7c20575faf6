// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error type for receive window control operations.

use strum_macros::EnumIter;

/// Receive window control error.
///
/// Steady-state anomalies (invalid RTT samples, under-sampled cycles, an
/// exhausted growth quota) are never reported through this type. They
/// degrade to the default growth policy instead.
#[derive(Clone, Debug, Default, PartialEq, Eq, EnumIter)]
pub enum Error {
    /// There is no more work to do.
    #[default]
    Done,

    /// The configuration is invalid.
    InvalidConfig(String),

    /// The operation cannot be completed because it was attempted in an
    /// invalid state, e.g. releasing a flow that is not registered.
    InvalidState(String),

    /// The requested window control algorithm is unknown.
    UnknownAlgorithm,
}

impl Error {
    /// Return the error code, as a negative number.
    pub fn to_errno(&self) -> i32 {
        match self {
            Error::Done => -100,
            Error::InvalidConfig(_) => -101,
            Error::InvalidState(_) => -102,
            Error::UnknownAlgorithm => -103,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
