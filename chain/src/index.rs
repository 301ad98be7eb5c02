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

//! Per-header index metadata: validation status, chain position and the
//! skip pointer enabling logarithmic ancestor walks. Nodes are addressed
//! by arena identifiers handed out by the block store; identifiers stay
//! valid for the lifetime of the store.

use crate::core::core::{ArithUint256, Hash, Hash160};

/// Stable handle to a `BlockIndex` inside the block store's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) u32);

/// How far a header has been validated. Monotonically non-decreasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValidationLevel {
	/// Not yet validated
	Unknown,
	/// Parsed, proof of work and timestamp look sane in isolation
	Header,
	/// All parents indexed, difficulty and timestamp checked in context.
	/// The highest level a headers-only chain reaches.
	Tree,
}

/// Whether a header has failed validation, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureState {
	/// Not failed
	NotFailed,
	/// This header itself failed validation
	ValidationFailed,
	/// Descends from a failed ancestor
	AncestorFailed,
}

/// Validation progress and failure state of one header. The two axes are
/// tracked separately: a failed header keeps the validation level it had
/// reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStatus {
	/// Validation progression
	pub validation: ValidationLevel,
	/// Failure state
	pub failure: FailureState,
}

impl Default for BlockStatus {
	fn default() -> BlockStatus {
		BlockStatus {
			validation: ValidationLevel::Unknown,
			failure: FailureState::NotFailed,
		}
	}
}

impl BlockStatus {
	/// Whether the header is failed, directly or through an ancestor.
	pub fn is_failed(&self) -> bool {
		self.failure != FailureState::NotFailed
	}

	/// Valid at the required level and not failed.
	pub fn is_valid(&self, required: ValidationLevel) -> bool {
		!self.is_failed() && self.validation >= required
	}

	/// Raises the validation level, returning true if it changed. A
	/// failed header cannot be raised.
	pub fn raise_validity(&mut self, level: ValidationLevel) -> bool {
		if self.is_failed() {
			return false;
		}
		if self.validation < level {
			self.validation = level;
			return true;
		}
		false
	}

	/// Marks this header as having failed validation itself.
	pub fn mark_failed(&mut self) {
		self.failure = FailureState::ValidationFailed;
	}

	/// Marks this header as descending from a failed ancestor.
	pub fn mark_ancestor_failed(&mut self) {
		self.failure = FailureState::AncestorFailed;
	}
}

/// Index metadata for a single header. Created once when the header is
/// accepted into the store and never moved or copied afterwards.
///
/// `height`, `chainwork` and `hash` are frozen at creation: the candidate
/// set orders by them, and mutating them under an ordered container would
/// silently corrupt it.
#[derive(Debug)]
pub struct BlockIndex {
	/// Hash of the header, fixed at insertion.
	pub(crate) hash: Hash,
	/// Parent node, `None` only for genesis.
	pub(crate) parent: Option<NodeId>,
	/// Skip pointer for the logarithmic ancestor walk.
	pub(crate) skip: Option<NodeId>,
	/// Height in the tree, genesis is zero.
	pub(crate) height: u64,
	/// Cumulative work from genesis up to and including this header.
	pub(crate) chainwork: ArithUint256,
	/// Validation status
	pub status: BlockStatus,

	// header fields, stored inline
	pub(crate) version: i32,
	pub(crate) miner_address: Hash160,
	pub(crate) time: u32,
	pub(crate) bits: u32,
	pub(crate) nonce: u32,
	pub(crate) randomx_hash: Hash,

	/// When we first learned about this header, for relay decisions.
	pub time_received: i64,
	/// Maximum of `time` along the ancestry, monotonic for binary search.
	pub(crate) time_max: i64,
}

impl BlockIndex {
	/// Hash of the header.
	pub fn hash(&self) -> Hash {
		self.hash
	}

	/// Parent node, `None` only for genesis.
	pub fn parent(&self) -> Option<NodeId> {
		self.parent
	}

	/// Skip pointer target.
	pub fn skip(&self) -> Option<NodeId> {
		self.skip
	}

	/// Height in the tree.
	pub fn height(&self) -> u64 {
		self.height
	}

	/// Cumulative work from genesis.
	pub fn chainwork(&self) -> ArithUint256 {
		self.chainwork
	}

	/// Header timestamp.
	pub fn time(&self) -> u32 {
		self.time
	}

	/// Compact difficulty target.
	pub fn bits(&self) -> u32 {
		self.bits
	}

	/// Header version.
	pub fn version(&self) -> i32 {
		self.version
	}

	/// Proof-of-work nonce.
	pub fn nonce(&self) -> u32 {
		self.nonce
	}

	/// Miner payout identifier.
	pub fn miner_address(&self) -> Hash160 {
		self.miner_address
	}

	/// RandomX output carried in the header.
	pub fn randomx_hash(&self) -> Hash {
		self.randomx_hash
	}

	/// Monotonic maximum timestamp along the ancestry.
	pub fn time_max(&self) -> i64 {
		self.time_max
	}

	/// Shorthand for `status.is_valid`.
	pub fn is_valid(&self, required: ValidationLevel) -> bool {
		self.status.is_valid(required)
	}
}

fn invert_lowest_one(n: u64) -> u64 {
	n & n.wrapping_sub(1)
}

/// Height of the ancestor a node's skip pointer targets. The pattern
/// forms a binary tree over heights so any ancestor is reachable in
/// O(log height) jumps.
pub(crate) fn skip_height(height: u64) -> u64 {
	if height < 2 {
		return 0;
	}
	if height & 1 == 1 {
		invert_lowest_one(invert_lowest_one(height - 1)) + 1
	} else {
		invert_lowest_one(height)
	}
}
