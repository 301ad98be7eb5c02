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

//! Facade and handler for the rest of the header chain implementation,
//! mostly the acceptance pipeline, the activation loop with transactional
//! reorganization, and the invalidation cascade. A single mutex
//! serializes every index-touching operation; locked private helpers keep
//! composite operations atomic, and subscriber callbacks are dispatched
//! only after the lock has been released.

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::consensus::{self, STALE_TIP_AGE};
use crate::core::core::{ArithUint256, BlockHeader, Hash, Hashed};
use crate::core::global::ChainParams;
use crate::core::pow::{self, RandomXHasher};

use crate::candidates::CandidateSet;
use crate::error::{Error, ErrorKind};
use crate::index::{BlockStatus, NodeId, ValidationLevel};
use crate::orphans::OrphanPool;
use crate::pipe::{self, Accepted};
use crate::store::BlockStore;
use crate::types::{ChainEvents, Options, Tip};

/// State guarded by the chain mutex. Every mutating operation runs
/// against this as one critical section.
struct ChainInner {
	store: BlockStore,
	candidates: CandidateSet,
	orphans: OrphanPool,
	/// Headers that failed validation directly; used to propagate
	/// ancestor failures onto late-arriving descendants.
	failed: HashSet<NodeId>,
}

/// Notification buffered under the lock, dispatched FIFO after release.
enum Event {
	BlockConnected { header: BlockHeader, height: u64 },
	BlockDisconnected { header: BlockHeader, height: u64 },
	ChainTip(Tip),
	SuspiciousReorg { depth: u64, max_allowed: u64 },
	NetworkExpired { current_height: u64, expiration_height: u64 },
}

/// Outcome of one activation attempt for a specific candidate.
enum ActivateStep {
	/// Activation complete or nothing to do.
	Ok,
	/// Refused by local policy (suspicious reorg); try the next
	/// candidate.
	PolicyRefused,
	/// The candidate's branch is consensus-invalid; mark it failed and
	/// try the next candidate.
	ConsensusInvalid,
}

/// Facade to the header chain: the acceptance pipeline, the work-ordered
/// candidate selection, activation with rollback, invalidation, orphan
/// management and persistence.
pub struct Chain {
	params: ChainParams,
	inner: Mutex<ChainInner>,
	events: Arc<dyn ChainEvents>,
	hasher: Arc<dyn RandomXHasher>,
	/// One-way latch: once initial block download has been left it is
	/// never re-entered for the process lifetime.
	ibd_latch: AtomicBool,
	/// Test seam: bypass commitment and full PoW checks. Contextual
	/// checks still run.
	skip_pow: AtomicBool,
}

impl Chain {
	/// Creates a chain for the given network and installs its genesis as
	/// the active tip.
	pub fn init(
		params: ChainParams,
		events: Arc<dyn ChainEvents>,
		hasher: Arc<dyn RandomXHasher>,
	) -> Result<Chain, Error> {
		let orphan_expire = params.orphan_expire_time;
		let chain = Chain {
			params,
			inner: Mutex::new(ChainInner {
				store: BlockStore::new(),
				candidates: CandidateSet::new(),
				orphans: OrphanPool::new(orphan_expire),
				failed: HashSet::new(),
			}),
			events,
			hasher,
			ibd_latch: AtomicBool::new(false),
			skip_pow: AtomicBool::new(false),
		};

		{
			let mut guard = chain.inner.lock().unwrap();
			let inner = &mut *guard;
			let genesis_id = inner.store.initialize(&chain.params.genesis)?;
			inner
				.store
				.get_mut(genesis_id)
				.status
				.raise_validity(ValidationLevel::Tree);
			inner.candidates.add_unchecked(&inner.store, genesis_id);
			inner.candidates.set_best_header(Some(genesis_id));
			info!(
				"chain initialized: genesis {} ({})",
				chain.params.genesis_hash.short(),
				chain.params.chain_type
			);
		}

		Ok(chain)
	}

	/// The chain parameters this instance validates against.
	pub fn params(&self) -> &ChainParams {
		&self.params
	}

	/// Accepts a header into the index without running activation.
	/// Returns the header's hash on success; orphans of an accepted
	/// header are drained and accepted recursively.
	pub fn accept_header(&self, header: &BlockHeader, opts: Options) -> Result<Hash, Error> {
		let result = {
			let mut guard = self.inner.lock().unwrap();
			let inner = &mut *guard;
			self.accept_header_locked(inner, header, opts)
				.map(|accepted| inner.store.get(accepted.id()).hash())
		};
		if let Err(ref e) = result {
			self.notify_expired(e);
		}
		result
	}

	/// Accept, register as candidate, then activate the best chain. The
	/// composite runs as one critical section; notifications fire after
	/// it ends.
	pub fn process_new_block_header(
		&self,
		header: &BlockHeader,
		opts: Options,
	) -> Result<(), Error> {
		let mut events = vec![];
		let result = {
			let mut guard = self.inner.lock().unwrap();
			let inner = &mut *guard;
			match self.accept_header_locked(inner, header, opts) {
				Ok(accepted) => {
					inner.candidates.try_add(&inner.store, accepted.id());
					self.activate_locked(inner, None, &mut events)
				}
				Err(e) => Err(e),
			}
		};
		self.dispatch(events);
		if let Err(ref e) = result {
			self.notify_expired(e);
		}
		result
	}

	/// Walks candidates best-first until the active tip is the most-work
	/// valid leaf, reorganizing as needed.
	pub fn activate_best_chain(&self) -> Result<(), Error> {
		let mut events = vec![];
		let result = {
			let mut guard = self.inner.lock().unwrap();
			let inner = &mut *guard;
			self.activate_locked(inner, None, &mut events)
		};
		self.dispatch(events);
		if let Err(ref e) = result {
			self.notify_expired(e);
		}
		result
	}

	/// Marks a header and all its descendants invalid, unwinding the
	/// active chain off the failed branch and promoting competing forks
	/// into the candidate set. Does not itself activate; the next
	/// `activate_best_chain` selects the new tip.
	pub fn invalidate_block(&self, hash: &Hash) -> Result<(), Error> {
		let mut events = vec![];
		let result = {
			let mut guard = self.inner.lock().unwrap();
			let inner = &mut *guard;
			self.invalidate_locked(inner, hash, &mut events)
		};
		self.dispatch(events);
		result
	}

	/// Parks a header whose parent is unknown, subject to DoS caps.
	pub fn add_orphan_header(&self, header: &BlockHeader, peer_id: u64) -> bool {
		let mut guard = self.inner.lock().unwrap();
		let now = consensus::adjusted_time();
		guard.orphans.try_add(header, peer_id, now)
	}

	/// Evicts expired orphans; returns how many were removed.
	pub fn evict_orphan_headers(&self) -> usize {
		let mut guard = self.inner.lock().unwrap();
		let now = consensus::adjusted_time();
		guard.orphans.evict(now)
	}

	/// Number of headers in the orphan pool.
	pub fn orphan_header_count(&self) -> usize {
		self.inner.lock().unwrap().orphans.len()
	}

	/// Number of orphans attributed to one peer.
	pub fn peer_orphan_count(&self, peer_id: u64) -> usize {
		self.inner.lock().unwrap().orphans.peer_count(peer_id)
	}

	/// Writes the whole index to `path` as a versioned snapshot.
	pub fn save(&self, path: &Path) -> Result<(), Error> {
		let guard = self.inner.lock().unwrap();
		guard.store.save(path)
	}

	/// Replaces the in-memory state with a snapshot from `path`. The
	/// snapshot's chain work and validity are re-derived from scratch;
	/// the active tip is re-selected by the candidate order afterwards,
	/// which may differ from the saved tip.
	pub fn load(&self, path: &Path) -> Result<(), Error> {
		let mut guard = self.inner.lock().unwrap();
		let inner = &mut *guard;

		let mut store = BlockStore::load(path, &self.params.genesis_hash)?;
		let mut failed = HashSet::new();
		let adjusted_time = consensus::adjusted_time();
		let skip_pow = self.skip_pow.load(Ordering::Acquire);

		// on-disk status is a hint: every non-genesis header is checked
		// again (commitment gate plus contextual checks) before its tree
		// validity is restored
		for id in store.ids_by_height() {
			match store.get(id).parent() {
				None => {
					store
						.get_mut(id)
						.status
						.raise_validity(ValidationLevel::Tree);
				}
				Some(parent) => {
					let header = store.header_of(id);
					let pow_ok = skip_pow || pow::check_commitment(&header, header.bits);
					let valid = pow_ok
						&& pipe::contextual_check(
							&header,
							parent,
							&store,
							&self.params,
							adjusted_time,
						)
						.is_ok();
					if valid {
						store
							.get_mut(id)
							.status
							.raise_validity(ValidationLevel::Tree);
					} else {
						debug!(
							"load: header {} failed re-validation",
							store.get(id).hash().short()
						);
						store.get_mut(id).status.mark_failed();
						failed.insert(id);
					}
				}
			}
		}

		// candidates come back from the leaves of the reloaded tree
		let mut candidates = CandidateSet::new();
		for leaf in store.leaves() {
			if store.get(leaf).is_valid(ValidationLevel::Tree) {
				candidates.add_unchecked(&store, leaf);
				candidates.update_best_header(&store, leaf);
			}
		}

		// with chain work recomputed, the best candidate wins over the
		// saved tip
		if let Some(best) = candidates.find_most_work(&store) {
			if store.tip() != Some(best) {
				info!(
					"load: active tip moved to best candidate: height={} hash={}",
					store.get(best).height(),
					store.get(best).hash().short()
				);
				store.set_active_tip(best);
			}
		}

		info!(
			"loaded chain state: {} headers, tip height {:?}",
			store.block_count(),
			store.chain_height()
		);

		inner.store = store;
		inner.candidates = candidates;
		inner.failed = failed;
		inner.orphans = OrphanPool::new(self.params.orphan_expire_time);
		Ok(())
	}

	/// Whether the node is still in initial block download: no tip, a
	/// genesis-only chain, a stale tip, or less than the configured
	/// minimum work. Latches false permanently once left.
	pub fn is_in_ibd(&self) -> bool {
		if self.ibd_latch.load(Ordering::Relaxed) {
			return false;
		}
		let guard = self.inner.lock().unwrap();
		self.is_in_ibd_locked(&guard)
	}

	/// Test seam: bypass the commitment and full PoW checks. Contextual
	/// checks still run.
	pub fn set_skip_pow_checks(&self, enabled: bool) {
		self.skip_pow.store(enabled, Ordering::Release);
	}

	/// Whether the PoW bypass seam is active.
	pub fn skip_pow_checks(&self) -> bool {
		self.skip_pow.load(Ordering::Acquire)
	}

	/// Minimum cumulative work a batch of headers must prove before the
	/// caller may certify the anti-DoS gate: the configured minimum
	/// chain work, or the tip's work less a few blocks of buffer,
	/// whichever is greater.
	pub fn anti_dos_work_threshold(&self) -> ArithUint256 {
		let guard = self.inner.lock().unwrap();
		match guard.store.tip() {
			None => self.params.min_chain_work,
			Some(tip) => {
				let node = guard.store.get(tip);
				let buffer =
					pow::block_proof(node.bits()) * self.params.antidos_work_buffer_blocks;
				let near_tip = node.chainwork().saturating_sub(buffer);
				::std::cmp::max(self.params.min_chain_work, near_tip)
			}
		}
	}

	// read-only queries

	/// The active tip.
	pub fn head(&self) -> Option<Tip> {
		let guard = self.inner.lock().unwrap();
		guard.store.tip().map(|id| tip_of(&guard.store, id))
	}

	/// The highest-work header ever observed, on or off the active
	/// chain.
	pub fn best_header(&self) -> Option<Tip> {
		let guard = self.inner.lock().unwrap();
		guard
			.candidates
			.best_header()
			.map(|id| tip_of(&guard.store, id))
	}

	/// Number of indexed headers.
	pub fn block_count(&self) -> usize {
		self.inner.lock().unwrap().store.block_count()
	}

	/// Height of the active tip.
	pub fn chain_height(&self) -> Option<u64> {
		self.inner.lock().unwrap().store.chain_height()
	}

	/// Whether a header is indexed.
	pub fn exists(&self, hash: &Hash) -> bool {
		self.inner.lock().unwrap().store.lookup(hash).is_some()
	}

	/// Full header for a hash, if indexed.
	pub fn get_header(&self, hash: &Hash) -> Option<BlockHeader> {
		let guard = self.inner.lock().unwrap();
		guard.store.lookup(hash).map(|id| guard.store.header_of(id))
	}

	/// Validation status of a header, if indexed.
	pub fn status_of(&self, hash: &Hash) -> Option<BlockStatus> {
		let guard = self.inner.lock().unwrap();
		guard.store.lookup(hash).map(|id| guard.store.get(id).status)
	}

	/// Cumulative work of a header, if indexed.
	pub fn chainwork_of(&self, hash: &Hash) -> Option<ArithUint256> {
		let guard = self.inner.lock().unwrap();
		guard
			.store
			.lookup(hash)
			.map(|id| guard.store.get(id).chainwork())
	}

	/// Height of a header, if indexed.
	pub fn height_of(&self, hash: &Hash) -> Option<u64> {
		let guard = self.inner.lock().unwrap();
		guard
			.store
			.lookup(hash)
			.map(|id| guard.store.get(id).height())
	}

	/// Whether a header lies on the active chain.
	pub fn is_on_active_chain(&self, hash: &Hash) -> bool {
		let guard = self.inner.lock().unwrap();
		match guard.store.lookup(hash) {
			Some(id) => guard.store.contains_active(id),
			None => false,
		}
	}

	/// Header at a height of the active chain.
	pub fn header_at_height(&self, height: u64) -> Option<BlockHeader> {
		let guard = self.inner.lock().unwrap();
		guard
			.store
			.at_height(height)
			.map(|id| guard.store.header_of(id))
	}

	/// Hash at a height of the active chain.
	pub fn hash_at_height(&self, height: u64) -> Option<Hash> {
		let guard = self.inner.lock().unwrap();
		guard
			.store
			.at_height(height)
			.map(|id| guard.store.get(id).hash())
	}

	/// Locator for the active tip: exponentially spaced hashes back to
	/// genesis.
	pub fn get_locator(&self) -> Vec<Hash> {
		let guard = self.inner.lock().unwrap();
		match guard.store.tip() {
			Some(tip) => guard.store.locator_entries(tip),
			None => vec![],
		}
	}

	/// Locator starting from an arbitrary indexed header.
	pub fn get_locator_from(&self, hash: &Hash) -> Option<Vec<Hash>> {
		let guard = self.inner.lock().unwrap();
		guard
			.store
			.lookup(hash)
			.map(|id| guard.store.locator_entries(id))
	}

	/// Current candidate hashes, best first. Diagnostics and tests.
	pub fn candidate_hashes(&self) -> Vec<Hash> {
		self.inner.lock().unwrap().candidates.hashes()
	}

	/// Number of candidate tips.
	pub fn candidate_count(&self) -> usize {
		self.inner.lock().unwrap().candidates.len()
	}

	// locked helpers; all assume the chain mutex is held

	fn effective_opts(&self, opts: Options) -> Options {
		if self.skip_pow.load(Ordering::Acquire) {
			opts | Options::SKIP_POW
		} else {
			opts
		}
	}

	fn accept_header_locked(
		&self,
		inner: &mut ChainInner,
		header: &BlockHeader,
		opts: Options,
	) -> Result<Accepted, Error> {
		let opts = self.effective_opts(opts);
		let ctx = pipe::HeaderContext {
			params: &self.params,
			opts,
			adjusted_time: consensus::adjusted_time(),
		};
		let accepted =
			pipe::process_header(header, &mut inner.store, &inner.failed, &ctx, &*self.hasher)?;

		if let Accepted::New(id) = accepted {
			inner.candidates.update_best_header(&inner.store, id);

			let hash = inner.store.get(id).hash();
			let height = inner.store.get(id).height();
			// kept at info outside of sync: near-simultaneous competing
			// headers across the network hint at selfish mining
			if self.is_in_ibd_locked(inner) {
				debug!("saw new header {} at height {}", hash, height);
			} else {
				info!("saw new header {} at height {}", hash, height);
			}

			// drain any orphans that were waiting on this header, and
			// their own descendants in turn; entries leave the pool
			// before re-processing
			let mut queue: VecDeque<BlockHeader> =
				inner.orphans.drain_children_of(&hash).into_iter().collect();
			while let Some(orphan) = queue.pop_front() {
				let orphan_hash = orphan.hash();
				let orphan_ctx = pipe::HeaderContext {
					params: &self.params,
					opts: opts | Options::MIN_WORK_CHECKED,
					adjusted_time: consensus::adjusted_time(),
				};
				match pipe::process_header(
					&orphan,
					&mut inner.store,
					&inner.failed,
					&orphan_ctx,
					&*self.hasher,
				) {
					Ok(Accepted::New(orphan_id)) => {
						inner.candidates.update_best_header(&inner.store, orphan_id);
						inner.candidates.try_add(&inner.store, orphan_id);
						queue.extend(inner.orphans.drain_children_of(&orphan_hash));
					}
					Ok(Accepted::Existing(_)) => {}
					Err(e) => {
						// invalid orphans are simply dropped, they were
						// never on the index
						debug!("orphan header {} dropped: {}", orphan_hash.short(), e);
					}
				}
			}
		}

		Ok(accepted)
	}

	fn activate_locked(
		&self,
		inner: &mut ChainInner,
		mut most_work: Option<NodeId>,
		events: &mut Vec<Event>,
	) -> Result<(), Error> {
		loop {
			let candidate = match most_work.take() {
				Some(c) => c,
				None => match inner.candidates.find_most_work(&inner.store) {
					Some(c) => c,
					None => {
						trace!("activate: no candidates");
						return Ok(());
					}
				},
			};

			if inner.store.tip() == Some(candidate) {
				return Ok(());
			}

			// blocks beyond the expiration height are refused outright;
			// the block at the height itself still activates below. The
			// notification fires in the public wrapper once the lock is
			// released.
			if self.params.expiration_interval > 0 {
				let height = inner.store.get(candidate).height();
				if height > self.params.expiration_interval {
					error!(
						"network expired at block {} (candidate at height {}), refusing activation",
						self.params.expiration_interval, height
					);
					return Err(ErrorKind::NetworkExpired(height).into());
				}
			}

			match self.activate_step(inner, candidate, events)? {
				ActivateStep::Ok => return Ok(()),
				ActivateStep::PolicyRefused => {
					inner.candidates.remove(&inner.store, candidate);
					continue;
				}
				ActivateStep::ConsensusInvalid => {
					inner.store.get_mut(candidate).status.mark_failed();
					inner.failed.insert(candidate);
					inner.candidates.remove(&inner.store, candidate);
					continue;
				}
			}
		}
	}

	/// One activation attempt for one candidate. Events are buffered
	/// locally and appended to `events` only if the attempt lands.
	fn activate_step(
		&self,
		inner: &mut ChainInner,
		candidate: NodeId,
		events: &mut Vec<Event>,
	) -> Result<ActivateStep, Error> {
		let old_tip = inner.store.tip();
		if old_tip == Some(candidate) {
			return Ok(ActivateStep::Ok);
		}

		// strictly more work is required to displace the tip; on equal
		// work the first seen wins
		if let Some(tip) = old_tip {
			if inner.store.get(candidate).chainwork() <= inner.store.get(tip).chainwork() {
				trace!(
					"activate: candidate {} has insufficient work, keeping tip",
					inner.store.get(candidate).hash().short()
				);
				return Ok(ActivateStep::Ok);
			}
		}

		let fork = match old_tip {
			Some(tip) => match inner.store.last_common_ancestor(tip, candidate) {
				Some(f) => Some(f),
				None => {
					error!(
						"activate: no common ancestor between tip and candidate {}",
						inner.store.get(candidate).hash().short()
					);
					return Ok(ActivateStep::ConsensusInvalid);
				}
			},
			None => None,
		};

		// policy guard: deep reorgs are refused, not performed
		if let (Some(tip), Some(fork_id)) = (old_tip, fork) {
			let reorg_depth =
				inner.store.get(tip).height() - inner.store.get(fork_id).height();
			if self.params.suspicious_reorg_depth > 0
				&& reorg_depth >= self.params.suspicious_reorg_depth
			{
				error!(
					"suspicious reorg of {} blocks (policy max {}), refusing; tip {} candidate {}",
					reorg_depth,
					self.params.suspicious_reorg_depth - 1,
					inner.store.get(tip).hash().short(),
					inner.store.get(candidate).hash().short()
				);
				events.push(Event::SuspiciousReorg {
					depth: reorg_depth,
					max_allowed: self.params.suspicious_reorg_depth - 1,
				});
				return Ok(ActivateStep::PolicyRefused);
			}
		}

		let mut local_events = vec![];

		// disconnect from the old tip down to the fork point
		let mut disconnected = vec![];
		if let Some(fork_id) = fork {
			while let Some(tip) = inner.store.tip() {
				if tip == fork_id {
					break;
				}
				disconnected.push(tip);
				self.disconnect_tip(inner, &mut local_events)?;
			}
		}

		// forward list from the candidate back to the fork, reversed on
		// connect
		let mut connect = vec![];
		let mut walk = Some(candidate);
		while let Some(w) = walk {
			if Some(w) == fork {
				break;
			}
			connect.push(w);
			walk = inner.store.get(w).parent();
		}

		for id in connect.iter().rev() {
			if let Err(e) = self.connect_tip(inner, *id, &mut local_events) {
				error!(
					"failed to connect header at height {} during reorg: {}",
					inner.store.get(*id).height(),
					e
				);

				// roll back to the fork and restore the original chain;
				// a rollback failure leaves the state inconsistent and
				// is fatal to the whole call
				while inner.store.tip() != fork {
					self.disconnect_tip(inner, &mut local_events)?;
				}
				for orig in disconnected.iter().rev() {
					self.connect_tip(inner, *orig, &mut local_events)?;
				}
				if inner.store.tip().is_none() {
					return Err(
						ErrorKind::StoreErr("rollback left no active tip".to_owned()).into()
					);
				}
				debug!(
					"rollback successful, restored tip at height {:?}",
					inner.store.chain_height()
				);
				return Ok(ActivateStep::ConsensusInvalid);
			}
		}

		if !disconnected.is_empty() {
			info!(
				"reorganize: disconnected {} headers, connected {}; fork height {:?}",
				disconnected.len(),
				connect.len(),
				fork.map(|f| inner.store.get(f).height())
			);
		} else {
			info!(
				"new best chain: height {} hash {} work {}",
				inner.store.get(candidate).height(),
				inner.store.get(candidate).hash().short(),
				inner.store.get(candidate).chainwork()
			);
		}

		local_events.push(Event::ChainTip(tip_of(&inner.store, candidate)));

		// stale candidates go now that the tip advanced
		inner.candidates.prune(&inner.store);

		events.extend(local_events);

		// connecting the block exactly at the expiration height succeeds
		// but tells the host, so it can begin a graceful shutdown
		if self.params.expiration_interval > 0 {
			let height = inner.store.get(candidate).height();
			if height == self.params.expiration_interval {
				error!(
					"network reached expiration height {}, no further blocks will be accepted",
					self.params.expiration_interval
				);
				events.push(Event::NetworkExpired {
					current_height: height,
					expiration_height: self.params.expiration_interval,
				});
			}
		}

		Ok(ActivateStep::Ok)
	}

	fn connect_tip(
		&self,
		inner: &mut ChainInner,
		id: NodeId,
		events: &mut Vec<Event>,
	) -> Result<(), Error> {
		// a connected header must extend the current tip
		if inner.store.get(id).parent() != inner.store.tip() {
			return Err(ErrorKind::StoreErr(format!(
				"cannot connect {}: does not extend the active tip",
				inner.store.get(id).hash().short()
			))
			.into());
		}

		// state moves first; the event then records the new tip, so a
		// subscriber looking at the chain sees the header connected
		inner.store.set_active_tip(id);

		let height = inner.store.get(id).height();
		info!(
			"update tip: new best={} height={} version={:#010x} work={}",
			inner.store.get(id).hash().short(),
			height,
			inner.store.get(id).version(),
			inner.store.get(id).chainwork()
		);

		let header = inner.store.header_of(id);
		events.push(Event::BlockConnected { header, height });
		Ok(())
	}

	fn disconnect_tip(
		&self,
		inner: &mut ChainInner,
		events: &mut Vec<Event>,
	) -> Result<(), Error> {
		let tip = inner
			.store
			.tip()
			.ok_or_else(|| ErrorKind::StoreErr("no tip to disconnect".to_owned()))?;
		let parent = inner
			.store
			.get(tip)
			.parent()
			.ok_or_else(|| ErrorKind::StoreErr("cannot disconnect genesis".to_owned()))?;

		// the event records the outgoing tip before the state rewinds,
		// the mirror image of connect
		let header = inner.store.header_of(tip);
		let height = inner.store.get(tip).height();
		events.push(Event::BlockDisconnected { header, height });

		inner.store.set_active_tip(parent);
		Ok(())
	}

	fn invalidate_locked(
		&self,
		inner: &mut ChainInner,
		hash: &Hash,
		events: &mut Vec<Event>,
	) -> Result<(), Error> {
		let target = inner
			.store
			.lookup(hash)
			.ok_or_else(|| ErrorKind::Other(format!("block {} not found", hash.short())))?;
		if inner.store.get(target).height() == 0 {
			return Err(ErrorKind::Other("cannot invalidate genesis".to_owned()).into());
		}

		info!("invalidate block {}", hash);

		let target_height = inner.store.get(target).height();
		let target_parent = inner
			.store
			.get(target)
			.parent()
			.ok_or_else(|| ErrorKind::StoreErr("non-genesis node without parent".to_owned()))?;
		let parent_work = inner.store.get(target_parent).chainwork();

		// pre-scan the forks that could become viable as the active
		// chain unwinds: off-chain, tree-valid, at least as much work as
		// where the unwind will leave us
		let mut promotable: Vec<NodeId> = {
			let store = &inner.store;
			store
				.node_ids()
				.filter(|id| {
					let node = store.get(*id);
					!store.contains_active(*id)
						&& node.chainwork() >= parent_work
						&& node.is_valid(ValidationLevel::Tree)
				})
				.collect()
		};

		// unwind one tip at a time until the target is off the active
		// chain, promoting forks as they reach the shrinking tip work
		while let Some(walk_tip) = inner.store.tip() {
			if !inner.store.contains_active(target) {
				break;
			}
			self.disconnect_tip(inner, events)?;
			inner.candidates.remove(&inner.store, walk_tip);

			if let Some(parent) = inner.store.get(walk_tip).parent() {
				inner.candidates.add_unchecked(&inner.store, parent);
				let new_tip_work = inner.store.get(parent).chainwork();
				let store = &inner.store;
				let (promote, keep): (Vec<NodeId>, Vec<NodeId>) = promotable
					.into_iter()
					.partition(|id| store.get(*id).chainwork() >= new_tip_work);
				for id in promote {
					trace!(
						"promoting competing fork to candidate: height={} hash={}",
						inner.store.get(id).height(),
						inner.store.get(id).hash().short()
					);
					inner.candidates.add_unchecked(&inner.store, id);
				}
				promotable = keep;
			}
		}

		if inner.store.contains_active(target) {
			return Err(ErrorKind::StoreErr(
				"block still on active chain after disconnect".to_owned(),
			)
			.into());
		}

		// single marking pass: only the requested block is failed
		// directly, every descendant carries the ancestor failure
		inner.store.get_mut(target).status.mark_failed();
		inner.failed.insert(target);
		inner.candidates.remove(&inner.store, target);

		let all: Vec<NodeId> = inner.store.node_ids().collect();
		for id in all {
			if id == target {
				continue;
			}
			if inner.store.ancestor(id, target_height) == Some(target) {
				inner.store.get_mut(id).status.mark_ancestor_failed();
				inner.failed.insert(id);
				inner.candidates.remove(&inner.store, id);
			}
		}

		// final sweep: any valid leaf with at least the current tip's
		// work re-enters, covering headers that arrived while the unwind
		// was in progress
		if let Some(tip) = inner.store.tip() {
			let tip_work = inner.store.get(tip).chainwork();
			let with_children = inner.store.nodes_with_children();
			let ids: Vec<NodeId> = inner.store.node_ids().collect();
			for id in ids {
				let node = inner.store.get(id);
				if node.is_valid(ValidationLevel::Tree)
					&& node.chainwork() >= tip_work
					&& !with_children.contains(&id)
				{
					inner.candidates.add_unchecked(&inner.store, id);
				}
			}
		}

		Ok(())
	}

	fn is_in_ibd_locked(&self, inner: &ChainInner) -> bool {
		if self.ibd_latch.load(Ordering::Relaxed) {
			return false;
		}
		let tip = match inner.store.tip() {
			Some(t) => t,
			None => return true,
		};
		let node = inner.store.get(tip);
		// a genesis-only chain is always syncing, whatever the clock says
		if node.height() == 0 {
			return true;
		}
		let now = consensus::adjusted_time();
		if (node.time() as i64) < now - STALE_TIP_AGE {
			return true;
		}
		// eclipse protection: a low-work chain cannot end the download
		if node.chainwork() < self.params.min_chain_work {
			return true;
		}
		info!("leaving initial block download (latching)");
		self.ibd_latch.store(true, Ordering::Relaxed);
		false
	}

	/// The network-expiration reject doubles as a notification so the
	/// host can begin a graceful shutdown. Called outside the lock.
	fn notify_expired(&self, e: &Error) {
		if let ErrorKind::NetworkExpired(height) = e.kind() {
			self.events
				.network_expired(height, self.params.expiration_interval);
		}
	}

	fn dispatch(&self, events: Vec<Event>) {
		for event in events {
			match event {
				Event::BlockConnected { header, height } => {
					self.events.block_connected(&header, height)
				}
				Event::BlockDisconnected { header, height } => {
					self.events.block_disconnected(&header, height)
				}
				Event::ChainTip(tip) => self.events.chain_tip(&tip),
				Event::SuspiciousReorg { depth, max_allowed } => {
					self.events.suspicious_reorg(depth, max_allowed)
				}
				Event::NetworkExpired {
					current_height,
					expiration_height,
				} => self.events.network_expired(current_height, expiration_height),
			}
		}
	}
}

fn tip_of(store: &BlockStore, id: NodeId) -> Tip {
	let node = store.get(id);
	let prev_block_h = match node.parent() {
		Some(p) => store.get(p).hash(),
		None => node.hash(),
	};
	Tip {
		height: node.height(),
		last_block_h: node.hash(),
		prev_block_h,
		total_work: node.chainwork(),
	}
}
