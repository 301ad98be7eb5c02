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

//! Work-ordered set of candidate tips. A candidate is a leaf validated to
//! tree level that could become the active tip if it accumulates enough
//! work. Ordering keys are copied from the node at insertion; the fields
//! they mirror are frozen at node creation, so the copies never go stale.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::core::core::{ArithUint256, Hash};

use crate::index::{NodeId, ValidationLevel};
use crate::store::BlockStore;

/// Ordering key for one candidate: most work first, then greatest height,
/// then smallest hash. The hash keeps tie-breaks deterministic across
/// nodes regardless of arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CandidateKey {
	chainwork: ArithUint256,
	height: u64,
	hash: Hash,
	id: NodeId,
}

impl Ord for CandidateKey {
	fn cmp(&self, other: &CandidateKey) -> Ordering {
		other
			.chainwork
			.cmp(&self.chainwork)
			.then(other.height.cmp(&self.height))
			.then(self.hash.cmp(&other.hash))
	}
}

impl PartialOrd for CandidateKey {
	fn partial_cmp(&self, other: &CandidateKey) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

/// The set of leaf nodes competing to be the active tip, plus the best
/// header ever observed (which need not be a viable candidate).
pub struct CandidateSet {
	candidates: BTreeSet<CandidateKey>,
	best_header: Option<NodeId>,
}

impl CandidateSet {
	/// An empty candidate set.
	pub fn new() -> CandidateSet {
		CandidateSet {
			candidates: BTreeSet::new(),
			best_header: None,
		}
	}

	fn key_of(store: &BlockStore, id: NodeId) -> CandidateKey {
		let node = store.get(id);
		CandidateKey {
			chainwork: node.chainwork(),
			height: node.height(),
			hash: node.hash(),
			id,
		}
	}

	/// Number of candidates.
	pub fn len(&self) -> usize {
		self.candidates.len()
	}

	/// Whether the set is empty.
	pub fn is_empty(&self) -> bool {
		self.candidates.is_empty()
	}

	/// Whether the node is currently in the set.
	pub fn contains(&self, store: &BlockStore, id: NodeId) -> bool {
		self.candidates.contains(&Self::key_of(store, id))
	}

	/// Candidate hashes in best-first order, for diagnostics and tests.
	pub fn hashes(&self) -> Vec<Hash> {
		self.candidates.iter().map(|k| k.hash).collect()
	}

	/// Adds a node if it is a viable tip: validated to tree level and a
	/// leaf. If the node extends a current candidate, the parent is
	/// removed in the same operation so the set only ever holds leaves.
	pub fn try_add(&mut self, store: &BlockStore, id: NodeId) {
		let node = store.get(id);

		if !node.is_valid(ValidationLevel::Tree) {
			trace!(
				"candidate {} not added: not validated to tree level",
				node.hash().short()
			);
			return;
		}

		// only leaves may be activated; an interior node as tip would
		// amputate part of the active chain
		if store.has_children(id) {
			trace!("candidate {} not added: has children", node.hash().short());
			return;
		}

		if let Some(parent) = node.parent() {
			let parent_key = Self::key_of(store, parent);
			if self.candidates.remove(&parent_key) {
				trace!(
					"removed extended parent from candidates: height={} hash={}",
					store.get(parent).height(),
					store.get(parent).hash().short()
				);
			}
		}

		self.candidates.insert(Self::key_of(store, id));
		trace!(
			"added candidate: height={} hash={} candidates={}",
			node.height(),
			node.hash().short(),
			self.candidates.len()
		);
	}

	/// Inserts without leaf or validity checks. Used during
	/// initialization, reload and the invalidation walk, where the
	/// caller re-establishes the invariants afterwards.
	pub fn add_unchecked(&mut self, store: &BlockStore, id: NodeId) {
		self.candidates.insert(Self::key_of(store, id));
	}

	/// Removes a node from the set.
	pub fn remove(&mut self, store: &BlockStore, id: NodeId) {
		self.candidates.remove(&Self::key_of(store, id));
	}

	/// Drops every candidate.
	pub fn clear(&mut self) {
		self.candidates.clear();
	}

	/// Best candidate that is still valid: walks from the front, evicting
	/// entries that have failed or lost tree validity since insertion.
	pub fn find_most_work(&mut self, store: &BlockStore) -> Option<NodeId> {
		while let Some(front) = self.candidates.iter().next().cloned() {
			let node = store.get(front.id);
			if node.status.is_failed() || !node.is_valid(ValidationLevel::Tree) {
				trace!(
					"erasing invalid candidate: height={} hash={}",
					front.height,
					front.hash.short()
				);
				self.candidates.remove(&front);
				continue;
			}
			return Some(front.id);
		}
		None
	}

	/// Removes candidates that can no longer become the tip: strictly
	/// less work than the active tip, the tip itself, anything on the
	/// active chain, anything that acquired children, anything failed.
	/// Equal-work competitors are kept.
	pub fn prune(&mut self, store: &BlockStore) {
		let tip = match store.tip() {
			Some(t) => t,
			None => return,
		};
		let tip_work = store.get(tip).chainwork();
		let with_children = store.nodes_with_children();

		let mut to_remove = vec![];
		for key in &self.candidates {
			let node = store.get(key.id);
			let remove = if node.chainwork() < tip_work {
				true
			} else if key.id == tip {
				true
			} else if store.contains_active(key.id) {
				true
			} else if with_children.contains(&key.id) {
				true
			} else {
				node.status.is_failed() || !node.is_valid(ValidationLevel::Tree)
			};
			if remove {
				to_remove.push(key.clone());
			}
		}
		let removed = to_remove.len();
		for key in to_remove {
			self.candidates.remove(&key);
		}
		if removed > 0 {
			trace!(
				"pruned {} stale candidates (remaining {})",
				removed,
				self.candidates.len()
			);
		}
	}

	/// The highest-work header ever observed, on or off the active chain.
	pub fn best_header(&self) -> Option<NodeId> {
		self.best_header
	}

	/// Overrides the best-header pointer (reload only).
	pub fn set_best_header(&mut self, id: Option<NodeId>) {
		self.best_header = id;
	}

	/// Moves the best-header pointer if this node has more work.
	pub fn update_best_header(&mut self, store: &BlockStore, id: NodeId) {
		let better = match self.best_header {
			None => true,
			Some(best) => store.get(id).chainwork() > store.get(best).chainwork(),
		};
		if better {
			self.best_header = Some(id);
		}
	}
}
