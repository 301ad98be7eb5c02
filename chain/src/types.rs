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

//! Base types that the header acceptance pipeline requires.

use crate::core::core::{ArithUint256, BlockHeader, Hash};

bitflags! {
	/// Options for header processing.
	pub struct Options: u32 {
		/// No flags
		const NONE = 0b0000_0000;
		/// The caller certifies the anti-DoS minimum-work gate for the
		/// branch this header extends
		const MIN_WORK_CHECKED = 0b0000_0001;
		/// Skip the commitment and full RandomX checks. Test seam only;
		/// contextual checks still run.
		const SKIP_POW = 0b0000_0010;
	}
}

/// The tip of a fork. A handle to the fork ancestry from its leaf in the
/// header tree, with the total work accumulated on that fork.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Tip {
	/// Height of the tip (max height of the fork)
	pub height: u64,
	/// Last header pushed to the fork
	pub last_block_h: Hash,
	/// Header previous to last
	pub prev_block_h: Hash,
	/// Total work accumulated on that fork
	pub total_work: ArithUint256,
}

/// Bridge between the chain and the rest of the system. Callbacks run
/// after the chain lock has been released, in the order the events were
/// produced; a subscriber observing the chain from a callback sees the
/// state the whole batch produced.
pub trait ChainEvents: Send + Sync {
	/// A header became part of the active chain. Enqueued after the tip
	/// advanced to it.
	fn block_connected(&self, header: &BlockHeader, height: u64);

	/// A header left the active chain during a reorganization. Enqueued
	/// before the tip rewound past it.
	fn block_disconnected(&self, header: &BlockHeader, height: u64);

	/// The active tip settled after an activation batch.
	fn chain_tip(&self, tip: &Tip);

	/// A reorganization at or beyond the configured depth was refused.
	fn suspicious_reorg(&self, depth: u64, max_allowed: u64);

	/// The network expiration height has been reached or exceeded.
	fn network_expired(&self, current_height: u64, expiration_height: u64);
}

/// Subscriber that ignores every event.
pub struct NoopEvents;

impl ChainEvents for NoopEvents {
	fn block_connected(&self, _: &BlockHeader, _: u64) {}
	fn block_disconnected(&self, _: &BlockHeader, _: u64) {}
	fn chain_tip(&self, _: &Tip) {}
	fn suspicious_reorg(&self, _: u64, _: u64) {}
	fn network_expired(&self, _: u64, _: u64) {}
}
