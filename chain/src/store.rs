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

//! The block store: owns every `BlockIndex` in an arena keyed by hash,
//! maintains the active chain as a height-indexed vector, and persists
//! the whole index as a versioned snapshot. Reload recomputes chain work
//! and structural invariants from scratch; the on-disk metadata is
//! treated as an untrusted hint.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::core::consensus::MEDIAN_TIME_SPAN;
use crate::core::core::{ArithUint256, BlockHeader, Hash, Hash160, Hashed, ZERO_HASH};
use crate::core::pow;

use crate::error::{Error, ErrorKind};
use crate::index::{skip_height, BlockIndex, BlockStatus, NodeId};

/// Snapshot format version written and accepted by this build.
const SNAPSHOT_VERSION: u32 = 1;

/// Owns every known header's index node. Node identifiers are indices
/// into an arena that never shrinks, so they stay valid for the store's
/// lifetime; parent and skip links are identifiers, never references.
pub struct BlockStore {
	nodes: Vec<BlockIndex>,
	index: HashMap<Hash, NodeId>,
	/// `active[i]` is the node at height `i` of the active chain.
	active: Vec<NodeId>,
	genesis_hash: Option<Hash>,
}

/// One header's entry in the snapshot file.
#[derive(Serialize, Deserialize)]
struct SnapshotBlock {
	hash: Hash,
	version: i32,
	miner_address: Hash160,
	time: u32,
	bits: u32,
	nonce: u32,
	hash_randomx: Hash,
	height: u64,
	chainwork: ArithUint256,
	status: BlockStatus,
	prev_hash: Hash,
}

/// The versioned snapshot record, blocks sorted by height.
#[derive(Serialize, Deserialize)]
struct Snapshot {
	version: u32,
	block_count: usize,
	tip_hash: Hash,
	genesis_hash: Hash,
	blocks: Vec<SnapshotBlock>,
}

impl BlockStore {
	/// An empty store. Populate through `initialize` or `load`.
	pub fn new() -> BlockStore {
		BlockStore {
			nodes: vec![],
			index: HashMap::new(),
			active: vec![],
			genesis_hash: None,
		}
	}

	/// Installs the genesis header and makes it the active tip.
	pub fn initialize(&mut self, genesis: &BlockHeader) -> Result<NodeId, Error> {
		if !self.nodes.is_empty() {
			return Err(ErrorKind::StoreErr("store already initialized".to_owned()).into());
		}
		if !genesis.is_genesis() {
			return Err(ErrorKind::StoreErr("genesis header has a parent".to_owned()).into());
		}
		let id = self.add_header(genesis)?;
		let genesis_hash = self.get(id).hash();
		self.genesis_hash = Some(genesis_hash);
		self.set_active_tip(id);
		self.verify_continuity(id, &genesis_hash)?;
		Ok(id)
	}

	/// Node id for a header hash, if indexed.
	pub fn lookup(&self, hash: &Hash) -> Option<NodeId> {
		self.index.get(hash).cloned()
	}

	/// The node for an id. Ids are handed out by this store and stay
	/// valid for its lifetime.
	pub fn get(&self, id: NodeId) -> &BlockIndex {
		&self.nodes[id.0 as usize]
	}

	pub(crate) fn get_mut(&mut self, id: NodeId) -> &mut BlockIndex {
		&mut self.nodes[id.0 as usize]
	}

	/// Number of indexed headers.
	pub fn block_count(&self) -> usize {
		self.nodes.len()
	}

	/// All node ids, in insertion order.
	pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
		(0..self.nodes.len() as u32).map(NodeId)
	}

	/// The hash of the configured genesis, once initialized or loaded.
	pub fn genesis_hash(&self) -> Option<Hash> {
		self.genesis_hash
	}

	/// Adds a header to the index, wiring height, cumulative work,
	/// monotonic max time and the skip pointer. The parent must already
	/// be present unless the header is genesis; handing an orphan to the
	/// store is a caller bug and is rejected rather than silently
	/// indexed as a bogus genesis.
	pub fn add_header(&mut self, header: &BlockHeader) -> Result<NodeId, Error> {
		let hash = header.hash();
		if let Some(existing) = self.lookup(&hash) {
			trace!("add_header: {} already indexed", hash.short());
			return Ok(existing);
		}

		let parent = self.lookup(&header.prev_hash);
		let (height, chainwork, time_max) = match parent {
			Some(p) => {
				let parent_node = self.get(p);
				(
					parent_node.height() + 1,
					parent_node.chainwork() + pow::block_proof(header.bits),
					::std::cmp::max(parent_node.time_max(), header.time as i64),
				)
			}
			None => {
				if !header.prev_hash.is_zero() {
					// an orphan must never reach the store; indexing it
					// would freeze a wrong height and chainwork forever
					error!(
						"add_header: orphan {} reached the store, parent {} unknown",
						hash.short(),
						header.prev_hash.short()
					);
					return Err(ErrorKind::StoreErr(format!(
						"parent {} not found for header {}",
						header.prev_hash.short(),
						hash.short()
					))
					.into());
				}
				(0, pow::block_proof(header.bits), header.time as i64)
			}
		};

		let id = NodeId(self.nodes.len() as u32);
		self.nodes.push(BlockIndex {
			hash,
			parent,
			skip: None,
			height,
			chainwork,
			status: BlockStatus::default(),
			version: header.version,
			miner_address: header.miner_address,
			time: header.time,
			bits: header.bits,
			nonce: header.nonce,
			randomx_hash: header.randomx_hash,
			time_received: 0,
			time_max,
		});
		self.index.insert(hash, id);
		self.build_skip(id);

		trace!(
			"add_header: indexed {} at height {} work {}",
			hash.short(),
			height,
			chainwork
		);
		Ok(id)
	}

	fn build_skip(&mut self, id: NodeId) {
		let (parent, height) = {
			let node = self.get(id);
			(node.parent(), node.height())
		};
		if let Some(parent) = parent {
			let skip = self.ancestor(parent, skip_height(height));
			self.get_mut(id).skip = skip;
		}
	}

	/// The active tip, `None` before initialization.
	pub fn tip(&self) -> Option<NodeId> {
		self.active.last().cloned()
	}

	/// The genesis node of the active chain.
	pub fn genesis(&self) -> Option<NodeId> {
		self.active.first().cloned()
	}

	/// Height of the active tip.
	pub fn chain_height(&self) -> Option<u64> {
		self.tip().map(|id| self.get(id).height())
	}

	/// The active node at the given height.
	pub fn at_height(&self, height: u64) -> Option<NodeId> {
		self.active.get(height as usize).cloned()
	}

	/// Whether the node lies on the active chain.
	pub fn contains_active(&self, id: NodeId) -> bool {
		let height = self.get(id).height();
		self.at_height(height) == Some(id)
	}

	/// The active successor of a node, if it has one.
	pub fn next_in_chain(&self, id: NodeId) -> Option<NodeId> {
		if self.contains_active(id) {
			self.at_height(self.get(id).height() + 1)
		} else {
			None
		}
	}

	/// Rebuilds the active chain vector to end at the given node, by
	/// walking parents back to genesis. O(height), but only the suffix
	/// past the fork actually changes on connect and disconnect.
	pub fn set_active_tip(&mut self, id: NodeId) {
		let mut chain = Vec::with_capacity(self.get(id).height() as usize + 1);
		let mut cursor = Some(id);
		while let Some(c) = cursor {
			chain.push(c);
			cursor = self.get(c).parent();
		}
		chain.reverse();
		self.active = chain;
	}

	/// Ancestor of `id` at the given height, riding skip pointers where
	/// they advance fastest. O(log height).
	pub fn ancestor(&self, id: NodeId, height: u64) -> Option<NodeId> {
		let node_height = self.get(id).height();
		if height > node_height {
			return None;
		}
		let mut walk = id;
		let mut height_walk = node_height;
		while height_walk > height {
			let height_skip = skip_height(height_walk);
			let height_skip_prev = skip_height(height_walk - 1);
			let node = self.get(walk);
			let use_skip = match node.skip() {
				Some(_) => {
					height_skip == height
						|| (height_skip > height
							&& !((height_skip_prev as i128) < (height_skip as i128) - 2
								&& height_skip_prev >= height))
				}
				None => false,
			};
			if use_skip {
				walk = self.get(walk).skip()?;
				height_walk = height_skip;
			} else {
				walk = self.get(walk).parent()?;
				height_walk -= 1;
			}
		}
		Some(walk)
	}

	/// The deepest node that is an ancestor of both inputs, or `None` if
	/// they descend from different roots.
	pub fn last_common_ancestor(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
		let height_a = self.get(a).height();
		let height_b = self.get(b).height();
		let (mut a, mut b) = if height_a > height_b {
			(self.ancestor(a, height_b)?, b)
		} else if height_b > height_a {
			(a, self.ancestor(b, height_a)?)
		} else {
			(a, b)
		};
		while a != b {
			match (self.get(a).parent(), self.get(b).parent()) {
				(Some(pa), Some(pb)) => {
					a = pa;
					b = pb;
				}
				// ran past two distinct roots
				_ => return None,
			}
		}
		Some(a)
	}

	/// Median timestamp of the last `MEDIAN_TIME_SPAN` headers ending at
	/// `id`, or of as many as exist near genesis.
	pub fn median_time_past(&self, id: NodeId) -> i64 {
		let mut times = Vec::with_capacity(MEDIAN_TIME_SPAN);
		let mut cursor = Some(id);
		for _ in 0..MEDIAN_TIME_SPAN {
			match cursor {
				Some(c) => {
					let node = self.get(c);
					times.push(node.time() as i64);
					cursor = node.parent();
				}
				None => break,
			}
		}
		times.sort();
		times[times.len() / 2]
	}

	/// Reconstructs the full header for a node.
	pub fn header_of(&self, id: NodeId) -> BlockHeader {
		let node = self.get(id);
		let prev_hash = match node.parent() {
			Some(p) => self.get(p).hash(),
			None => ZERO_HASH,
		};
		BlockHeader {
			version: node.version(),
			prev_hash,
			miner_address: node.miner_address(),
			time: node.time(),
			bits: node.bits(),
			nonce: node.nonce(),
			randomx_hash: node.randomx_hash(),
		}
	}

	/// Ids of every node that some other node claims as parent.
	pub fn nodes_with_children(&self) -> HashSet<NodeId> {
		let mut with_children = HashSet::new();
		for node in &self.nodes {
			if let Some(parent) = node.parent() {
				with_children.insert(parent);
			}
		}
		with_children
	}

	/// Whether any indexed node has `id` as parent. O(n).
	pub fn has_children(&self, id: NodeId) -> bool {
		self.nodes.iter().any(|n| n.parent() == Some(id))
	}

	/// All leaves: nodes without children.
	pub fn leaves(&self) -> Vec<NodeId> {
		let with_children = self.nodes_with_children();
		self.node_ids()
			.filter(|id| !with_children.contains(id))
			.collect()
	}

	/// Node ids sorted by ascending height, parents always before
	/// children.
	pub fn ids_by_height(&self) -> Vec<NodeId> {
		let mut ids: Vec<NodeId> = self.node_ids().collect();
		ids.sort_by_key(|id| self.get(*id).height());
		ids
	}

	/// Exponentially spaced locator hashes walking back from `from` to
	/// genesis, for compact chain synchronization handshakes.
	pub fn locator_entries(&self, from: NodeId) -> Vec<Hash> {
		let mut entries = vec![];
		let mut step = 1u64;
		let mut cursor = from;
		loop {
			let node = self.get(cursor);
			entries.push(node.hash());
			if node.height() == 0 {
				break;
			}
			if entries.len() >= 10 {
				step *= 2;
			}
			let next_height = node.height().saturating_sub(step);
			match self.ancestor(cursor, next_height) {
				Some(a) => cursor = a,
				None => break,
			}
		}
		entries
	}

	/// Walks `tip` back to its root and checks the walk agrees with the
	/// recorded heights and ends at the configured genesis.
	pub fn verify_continuity(&self, tip: NodeId, expected_genesis: &Hash) -> Result<(), Error> {
		let mut walk = tip;
		let mut blocks_walked = 0u64;
		while let Some(parent) = self.get(walk).parent() {
			walk = parent;
			blocks_walked += 1;
		}
		let root = self.get(walk);
		if root.hash() != *expected_genesis {
			return Err(ErrorKind::StoreErr(format!(
				"chain does not descend from expected genesis (found {}, expected {})",
				root.hash().short(),
				expected_genesis.short()
			))
			.into());
		}
		if root.height() != 0 {
			return Err(ErrorKind::StoreErr(format!(
				"genesis has non-zero height {}",
				root.height()
			))
			.into());
		}
		if self.get(tip).height() != blocks_walked {
			return Err(ErrorKind::StoreErr(format!(
				"height mismatch: tip height {} but walked {} blocks",
				self.get(tip).height(),
				blocks_walked
			))
			.into());
		}
		Ok(())
	}

	/// Serializes the whole index, blocks in height order, and writes it
	/// to `path` as a versioned snapshot.
	pub fn save(&self, path: &Path) -> Result<(), Error> {
		let tip = self
			.tip()
			.ok_or_else(|| ErrorKind::StoreErr("no tip to save".to_owned()))?;
		let genesis_hash = self
			.genesis_hash
			.ok_or_else(|| ErrorKind::StoreErr("no genesis to save".to_owned()))?;

		debug!("saving {} headers to {:?}", self.nodes.len(), path);

		let mut blocks = Vec::with_capacity(self.nodes.len());
		for id in self.ids_by_height() {
			let node = self.get(id);
			blocks.push(SnapshotBlock {
				hash: node.hash(),
				version: node.version(),
				miner_address: node.miner_address(),
				time: node.time(),
				bits: node.bits(),
				nonce: node.nonce(),
				hash_randomx: node.randomx_hash(),
				height: node.height(),
				chainwork: node.chainwork(),
				status: node.status,
				prev_hash: match node.parent() {
					Some(p) => self.get(p).hash(),
					None => ZERO_HASH,
				},
			});
		}

		let snapshot = Snapshot {
			version: SNAPSHOT_VERSION,
			block_count: blocks.len(),
			tip_hash: self.get(tip).hash(),
			genesis_hash,
			blocks,
		};

		let json = serde_json::to_string_pretty(&snapshot)
			.map_err(|e| ErrorKind::SerErr(e.to_string()))?;
		fs::write(path, json)?;

		debug!("saved {} headers", self.nodes.len());
		Ok(())
	}

	/// Loads a snapshot written by `save`. Structural invariants are
	/// re-verified and cumulative work is recomputed from the header
	/// bits; stored chainwork is ignored. Validation status is restored
	/// as a hint for the caller to re-derive.
	pub fn load(path: &Path, expected_genesis: &Hash) -> Result<BlockStore, Error> {
		debug!("loading headers from {:?}", path);

		let json = fs::read_to_string(path)?;
		let snapshot: Snapshot =
			serde_json::from_str(&json).map_err(|e| ErrorKind::SerErr(e.to_string()))?;

		if snapshot.version != SNAPSHOT_VERSION {
			return Err(ErrorKind::StoreErr(format!(
				"unsupported snapshot version {}",
				snapshot.version
			))
			.into());
		}

		// a snapshot from another network must never be grafted in
		if snapshot.genesis_hash != *expected_genesis {
			return Err(ErrorKind::StoreErr(format!(
				"genesis mismatch: snapshot has {}, expected {}",
				snapshot.genesis_hash.short(),
				expected_genesis.short()
			))
			.into());
		}

		if snapshot.blocks.len() != snapshot.block_count {
			warn!(
				"snapshot block count mismatch: header says {}, array has {}",
				snapshot.block_count,
				snapshot.blocks.len()
			);
		}

		let mut store = BlockStore::new();

		// first pass: materialize all nodes without parent links
		let mut parent_hashes: Vec<Hash> = Vec::with_capacity(snapshot.blocks.len());
		for block in &snapshot.blocks {
			let header = BlockHeader {
				version: block.version,
				prev_hash: block.prev_hash,
				miner_address: block.miner_address,
				time: block.time,
				bits: block.bits,
				nonce: block.nonce,
				randomx_hash: block.hash_randomx,
			};

			// every header must round-trip to its stored hash
			let recomputed = header.hash();
			if recomputed != block.hash {
				return Err(ErrorKind::StoreErr(format!(
					"corruption: stored hash {} does not match recomputed {} at height {}",
					block.hash.short(),
					recomputed.short(),
					block.height
				))
				.into());
			}

			if store.index.contains_key(&block.hash) {
				return Err(ErrorKind::StoreErr(format!(
					"duplicate block {} in snapshot",
					block.hash.short()
				))
				.into());
			}

			let id = NodeId(store.nodes.len() as u32);
			store.nodes.push(BlockIndex {
				hash: block.hash,
				parent: None,
				skip: None,
				height: block.height,
				// untrusted; recomputed below
				chainwork: ArithUint256::zero(),
				status: block.status,
				version: block.version,
				miner_address: block.miner_address,
				time: block.time,
				bits: block.bits,
				nonce: block.nonce,
				randomx_hash: block.hash_randomx,
				time_received: 0,
				time_max: 0,
			});
			store.index.insert(block.hash, id);
			parent_hashes.push(block.prev_hash);
		}

		// second pass: wire parent links by hash
		let mut genesis_count = 0;
		let mut found_genesis = None;
		for (i, prev_hash) in parent_hashes.iter().enumerate() {
			let id = NodeId(i as u32);
			if prev_hash.is_zero() {
				genesis_count += 1;
				found_genesis = Some(id);
			} else {
				let parent = store.lookup(prev_hash).ok_or_else(|| {
					ErrorKind::StoreErr(format!(
						"parent {} not found for block {}",
						prev_hash.short(),
						store.get(id).hash().short()
					))
				})?;
				store.get_mut(id).parent = Some(parent);
			}
		}

		// exactly one root, and it must be the expected genesis
		if genesis_count == 0 {
			return Err(ErrorKind::StoreErr("no genesis block in snapshot".to_owned()).into());
		}
		if genesis_count > 1 {
			return Err(ErrorKind::StoreErr(format!(
				"{} genesis blocks in snapshot, expected exactly one",
				genesis_count
			))
			.into());
		}
		let found_genesis = found_genesis.expect("genesis_count > 0");
		if store.get(found_genesis).hash() != *expected_genesis {
			return Err(ErrorKind::StoreErr(format!(
				"root block {} is not the expected genesis {}",
				store.get(found_genesis).hash().short(),
				expected_genesis.short()
			))
			.into());
		}

		// height-ordered pass: verify parent/child heights, recompute
		// chainwork and monotonic time, build skip pointers
		for id in store.ids_by_height() {
			match store.get(id).parent() {
				Some(parent) => {
					let (parent_height, parent_work, parent_time_max) = {
						let p = store.get(parent);
						(p.height(), p.chainwork(), p.time_max())
					};
					if parent_height + 1 != store.get(id).height() {
						return Err(ErrorKind::StoreErr(format!(
							"height mismatch: block {} at height {} has parent at height {}",
							store.get(id).hash().short(),
							store.get(id).height(),
							parent_height
						))
						.into());
					}
					let bits = store.get(id).bits();
					let time = store.get(id).time() as i64;
					let node = store.get_mut(id);
					node.chainwork = parent_work + pow::block_proof(bits);
					node.time_max = ::std::cmp::max(parent_time_max, time);
				}
				None => {
					if store.get(id).height() != 0 {
						return Err(ErrorKind::StoreErr(format!(
							"genesis block has non-zero height {}",
							store.get(id).height()
						))
						.into());
					}
					let bits = store.get(id).bits();
					let time = store.get(id).time() as i64;
					let node = store.get_mut(id);
					node.chainwork = pow::block_proof(bits);
					node.time_max = time;
				}
			}
			store.build_skip(id);
		}

		// the saved tip is the initial active tip; the caller re-selects
		// the best chain after re-deriving validity
		let tip = store.lookup(&snapshot.tip_hash).ok_or_else(|| {
			ErrorKind::StoreErr(format!(
				"saved tip {} not found in snapshot",
				snapshot.tip_hash.short()
			))
		})?;
		if store.get(tip).status.is_failed() {
			return Err(ErrorKind::StoreErr(format!(
				"saved tip {} is marked failed",
				snapshot.tip_hash.short()
			))
			.into());
		}

		store.genesis_hash = Some(snapshot.genesis_hash);
		store.set_active_tip(tip);
		store.verify_continuity(tip, expected_genesis)?;

		debug!("loaded {} headers", store.nodes.len());
		Ok(store)
	}
}
