// Copyright 2025 The Ember Developers
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

//! The header chain itself: validates and accepts new headers, selects
//! the most-work branch, handles reorgs and invalidation, persists and
//! defensively reloads the index.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate bitflags;
extern crate failure;
#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate log;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;

use ember_core as core;

mod chain;
pub mod candidates;
pub mod error;
pub mod index;
pub mod orphans;
pub mod pipe;
pub mod store;
pub mod types;

// Re-export the base interface

pub use crate::chain::Chain;
pub use crate::error::{Error, ErrorKind};
pub use crate::index::{BlockStatus, FailureState, NodeId, ValidationLevel};
pub use crate::types::{ChainEvents, NoopEvents, Options, Tip};
