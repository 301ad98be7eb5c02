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

//! Core types: hashes, big integer arithmetic and the block header.

pub mod arith;
pub mod hash;
pub mod header;

pub use self::arith::{ArithUint256, ArithUint512};
pub use self::hash::{Hash, Hash160, Hashed, ZERO_HASH};
pub use self::header::{headers_are_continuous, BlockHeader, HEADER_SIZE};
