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

//! Pool of headers whose parent is not yet known. Bounded in total and
//! per peer, with time-based eviction, so a flood of disconnected headers
//! cannot pin memory.

use std::collections::HashMap;

use crate::core::consensus::{MAX_ORPHAN_HEADERS, MAX_ORPHAN_HEADERS_PER_PEER};
use crate::core::core::{BlockHeader, Hash, Hashed};

/// A parked header waiting for its parent.
#[derive(Debug, Clone)]
struct Orphan {
	header: BlockHeader,
	time_received: i64,
	peer_id: u64,
}

/// Map of orphan headers with per-peer accounting.
pub struct OrphanPool {
	orphans: HashMap<Hash, Orphan>,
	peer_counts: HashMap<u64, usize>,
	/// Seconds an entry may sit in the pool before expiry eviction.
	expire_time: i64,
}

impl OrphanPool {
	/// An empty pool expiring entries after `expire_time` seconds.
	pub fn new(expire_time: i64) -> OrphanPool {
		OrphanPool {
			orphans: HashMap::new(),
			peer_counts: HashMap::new(),
			expire_time,
		}
	}

	/// Number of parked headers.
	pub fn len(&self) -> usize {
		self.orphans.len()
	}

	/// Whether the pool is empty.
	pub fn is_empty(&self) -> bool {
		self.orphans.is_empty()
	}

	/// Number of entries attributed to a peer.
	pub fn peer_count(&self, peer_id: u64) -> usize {
		self.peer_counts.get(&peer_id).cloned().unwrap_or(0)
	}

	/// Whether a header is parked.
	pub fn contains(&self, hash: &Hash) -> bool {
		self.orphans.contains_key(hash)
	}

	/// Tries to park a header for a peer. Idempotent for a header already
	/// present. Refused when the peer is at its cap, or when the pool is
	/// full and eviction frees nothing.
	pub fn try_add(&mut self, header: &BlockHeader, peer_id: u64, now: i64) -> bool {
		let hash = header.hash();

		if self.orphans.contains_key(&hash) {
			trace!("orphan {} already in pool", hash.short());
			return true;
		}

		let peer_count = self.peer_count(peer_id);
		if peer_count >= MAX_ORPHAN_HEADERS_PER_PEER {
			debug!(
				"peer {} exceeded orphan limit ({}/{}), rejecting {}",
				peer_id,
				peer_count,
				MAX_ORPHAN_HEADERS_PER_PEER,
				hash.short()
			);
			return false;
		}

		if self.orphans.len() >= MAX_ORPHAN_HEADERS {
			debug!(
				"orphan pool full ({}/{}), evicting",
				self.orphans.len(),
				MAX_ORPHAN_HEADERS
			);
			if self.evict(now) == 0 {
				warn!("failed to evict any orphans, pool stuck at max size");
				return false;
			}
		}

		self.orphans.insert(
			hash,
			Orphan {
				header: header.clone(),
				time_received: now,
				peer_id,
			},
		);
		*self.peer_counts.entry(peer_id).or_insert(0) += 1;

		trace!(
			"parked orphan {}: peer={} pool={} peer_orphans={}",
			hash.short(),
			peer_id,
			self.orphans.len(),
			self.peer_count(peer_id)
		);
		true
	}

	fn forget_peer_entry(peer_counts: &mut HashMap<u64, usize>, peer_id: u64) {
		if let Some(count) = peer_counts.get_mut(&peer_id) {
			*count -= 1;
			if *count == 0 {
				peer_counts.remove(&peer_id);
			}
		}
	}

	/// Evicts every entry older than the expiry window; if nothing
	/// expired and the pool is still full, evicts the single oldest
	/// entry. Returns how many were removed.
	pub fn evict(&mut self, now: i64) -> usize {
		if self.orphans.is_empty() {
			return 0;
		}

		let expire_time = self.expire_time;
		let expired: Vec<Hash> = self
			.orphans
			.iter()
			.filter(|(_, o)| now - o.time_received > expire_time)
			.map(|(h, _)| *h)
			.collect();

		let mut evicted = 0;
		for hash in expired {
			if let Some(orphan) = self.orphans.remove(&hash) {
				trace!(
					"evicting expired orphan {}: age={}s",
					hash.short(),
					now - orphan.time_received
				);
				Self::forget_peer_entry(&mut self.peer_counts, orphan.peer_id);
				evicted += 1;
			}
		}

		if evicted == 0 && self.orphans.len() >= MAX_ORPHAN_HEADERS {
			let oldest = self
				.orphans
				.iter()
				.min_by_key(|(_, o)| o.time_received)
				.map(|(h, _)| *h);
			if let Some(hash) = oldest {
				if let Some(orphan) = self.orphans.remove(&hash) {
					trace!(
						"evicting oldest orphan {}: age={}s",
						hash.short(),
						now - orphan.time_received
					);
					Self::forget_peer_entry(&mut self.peer_counts, orphan.peer_id);
					evicted += 1;
				}
			}
		}

		if evicted > 0 {
			debug!("evicted {} orphans (pool now {})", evicted, self.orphans.len());
		}
		evicted
	}

	/// Removes and returns every parked header whose parent is
	/// `parent_hash`, so the caller can feed them back through the
	/// acceptance pipeline. Entries leave the pool before re-processing,
	/// so a header re-parked during processing is a fresh entry.
	pub fn drain_children_of(&mut self, parent_hash: &Hash) -> Vec<BlockHeader> {
		let matches: Vec<Hash> = self
			.orphans
			.iter()
			.filter(|(_, o)| o.header.prev_hash == *parent_hash)
			.map(|(h, _)| *h)
			.collect();

		let mut drained = vec![];
		for hash in matches {
			if let Some(orphan) = self.orphans.remove(&hash) {
				Self::forget_peer_entry(&mut self.peer_counts, orphan.peer_id);
				drained.push(orphan.header);
			}
		}
		if !drained.is_empty() {
			debug!(
				"drained {} orphans waiting on parent {}",
				drained.len(),
				parent_hash.short()
			);
		}
		drained
	}
}
