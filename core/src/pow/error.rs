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

//! Error types for proof-of-work verification.

/// Errors produced while verifying a header's proof of work.
#[derive(Debug, Clone, Eq, PartialEq, Fail)]
pub enum Error {
	/// The compact bits decode to a negative, overflowed or zero target
	#[fail(display = "Invalid difficulty target")]
	InvalidTarget,
	/// The RandomX hash field is all zero where a value is required
	#[fail(display = "Null RandomX hash")]
	NullRandomXHash,
	/// The commitment digest does not meet the target
	#[fail(display = "Commitment above target")]
	HighHash,
	/// The recomputed RandomX hash differs from the one in the header
	#[fail(display = "RandomX hash mismatch")]
	HashMismatch,
	/// The external hasher could not produce a hash
	#[fail(display = "RandomX hasher failure: {}", _0)]
	Hasher(String),
}
