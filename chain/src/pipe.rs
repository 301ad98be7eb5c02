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

//! Implementation of the header acceptance (or refusal) pipeline. The
//! checks are arranged by order of cost to keep the DoS surface as small
//! as possible: the cheap commitment gate runs before anything touches
//! the index, the full RandomX check only after the contextual checks
//! have pinned down the epoch.

use std::collections::HashSet;

use crate::core::consensus::{self, MAX_FUTURE_BLOCK_TIME};
use crate::core::core::{BlockHeader, Hashed};
use crate::core::global::ChainParams;
use crate::core::pow::{self, RandomXHasher, VerifyMode};

use crate::error::{Error, ErrorKind};
use crate::index::{NodeId, ValidationLevel};
use crate::store::BlockStore;
use crate::types::Options;

/// Contextual information required to process a new header and either
/// reject or accept it.
pub struct HeaderContext<'a> {
	/// Chain parameters of the network being validated against.
	pub params: &'a ChainParams,
	/// Per-call processing options.
	pub opts: Options,
	/// Adjusted wall-clock time the future-timestamp bound is checked
	/// against.
	pub adjusted_time: i64,
}

/// Outcome of a successful run through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
	/// The header was already indexed and valid; nothing changed.
	Existing(NodeId),
	/// The header was installed and raised to tree validity.
	New(NodeId),
}

impl Accepted {
	/// The node the header maps to, new or not.
	pub fn id(&self) -> NodeId {
		match self {
			Accepted::Existing(id) | Accepted::New(id) => *id,
		}
	}
}

/// Runs a header through the full acceptance pipeline. On success the
/// header is indexed and tree-valid; the first failing check aborts with
/// its typed reason. Orphan handling is the caller's concern: a missing
/// parent surfaces as `PrevBlockNotFound`.
pub fn process_header(
	header: &BlockHeader,
	store: &mut BlockStore,
	failed: &HashSet<NodeId>,
	ctx: &HeaderContext<'_>,
	hasher: &dyn RandomXHasher,
) -> Result<Accepted, Error> {
	let hash = header.hash();
	trace!(
		"pipe: process_header {} prev {}",
		hash.short(),
		header.prev_hash.short()
	);

	// 1. duplicate: a known valid header is a no-op, a known invalid one
	// a hard reject
	if let Some(existing) = store.lookup(&hash) {
		if store.get(existing).status.is_failed() {
			debug!("pipe: header {} known invalid, re-announced", hash.short());
			return Err(ErrorKind::Duplicate.into());
		}
		trace!("pipe: header {} already known and valid", hash.short());
		return Ok(Accepted::Existing(existing));
	}

	// 2. cheap commitment gate before any index work
	if !ctx.opts.contains(Options::SKIP_POW) && !pow::check_commitment(header, header.bits) {
		debug!("pipe: header {} failed commitment check", hash.short());
		return Err(ErrorKind::HighHash.into());
	}

	// 3. a parentless header must be our genesis, and genesis only
	// enters through initialization
	if header.is_genesis() {
		if hash != ctx.params.genesis_hash {
			warn!(
				"pipe: rejected fake genesis {} (expected {})",
				hash.short(),
				ctx.params.genesis_hash.short()
			);
			return Err(ErrorKind::BadGenesis.into());
		}
		return Err(ErrorKind::GenesisViaAccept.into());
	}

	// 4. parent must be indexed; otherwise the caller may park the
	// header in the orphan pool
	let parent = match store.lookup(&header.prev_hash) {
		Some(p) => p,
		None => {
			debug!(
				"pipe: header {} parent {} not found",
				hash.short(),
				header.prev_hash.short()
			);
			return Err(ErrorKind::PrevBlockNotFound.into());
		}
	};

	// 5. parent must not be failed
	if store.get(parent).status.is_failed() {
		debug!(
			"pipe: header {} extends invalid parent {}",
			hash.short(),
			header.prev_hash.short()
		);
		return Err(ErrorKind::BadPrevBlock.into());
	}

	// 6. a parent below tree validity may hide a failed ancestor; walk
	// the known failed set and propagate the failure down the path
	if !store.get(parent).is_valid(ValidationLevel::Tree) {
		let failed_ancestor = failed.iter().cloned().find(|f| {
			store.ancestor(parent, store.get(*f).height()) == Some(*f)
		});
		if let Some(failed_ancestor) = failed_ancestor {
			let mut walk = parent;
			while walk != failed_ancestor {
				store.get_mut(walk).status.mark_ancestor_failed();
				match store.get(walk).parent() {
					Some(p) => walk = p,
					None => break,
				}
			}
			debug!("pipe: header {} descends from invalid block", hash.short());
			return Err(ErrorKind::BadPrevBlock.into());
		}
	}

	// 7. contextual checks against the parent
	contextual_check(header, parent, store, ctx.params, ctx.adjusted_time)?;

	// 8. full RandomX verification, now that the contextual checks have
	// validated the timestamp the epoch derives from
	if !ctx.opts.contains(Options::SKIP_POW) {
		pow::check_proof_of_work(
			header,
			header.bits,
			VerifyMode::Full,
			hasher,
			ctx.params.randomx_epoch_duration,
		)
		.map_err(map_pow_error)?;
	}

	// 9. anti-DoS gate: the caller must have certified sufficient
	// branch work before we are willing to grow the index
	if !ctx.opts.contains(Options::MIN_WORK_CHECKED) {
		debug!(
			"pipe: header {} missing anti-DoS work certification",
			hash.short()
		);
		return Err(ErrorKind::TooLittleChainwork.into());
	}

	// 10. install
	let id = store.add_header(header)?;

	// 11. tree validity and receive time
	store.get_mut(id).status.raise_validity(ValidationLevel::Tree);
	store.get_mut(id).time_received = consensus::adjusted_time();

	trace!(
		"pipe: accepted header {} at height {} work {}",
		hash.short(),
		store.get(id).height(),
		store.get(id).chainwork()
	);
	Ok(Accepted::New(id))
}

/// Contextual validity of a header against its parent: timestamp past the
/// ancestor median, not too far in the future, difficulty bits matching
/// the retarget, and the network-expiration guard. Also used to re-derive
/// validity on reload.
pub fn contextual_check(
	header: &BlockHeader,
	parent: NodeId,
	store: &BlockStore,
	params: &ChainParams,
	adjusted_time: i64,
) -> Result<(), Error> {
	let mtp = store.median_time_past(parent);
	if (header.time as i64) <= mtp {
		debug!(
			"pipe: header time {} not past median {}",
			header.time, mtp
		);
		return Err(ErrorKind::TimeTooOld.into());
	}

	if (header.time as i64) > adjusted_time + MAX_FUTURE_BLOCK_TIME {
		debug!(
			"pipe: header time {} too far past adjusted time {}",
			header.time, adjusted_time
		);
		return Err(ErrorKind::TimeTooNew.into());
	}

	let parent_view = pow::HeaderView {
		height: store.get(parent).height(),
		time: store.get(parent).time(),
		bits: store.get(parent).bits(),
	};
	let expected_bits = pow::next_work_required(Some(parent_view), params, |anchor_height| {
		store.ancestor(parent, anchor_height).map(|a| {
			let node = store.get(a);
			pow::HeaderView {
				height: node.height(),
				time: node.time(),
				bits: node.bits(),
			}
		})
	});
	if header.bits != expected_bits {
		debug!(
			"pipe: header bits {:#x} do not match required {:#x}",
			header.bits, expected_bits
		);
		return Err(ErrorKind::BadDiffBits.into());
	}

	if params.expiration_interval > 0 {
		let height = store.get(parent).height() + 1;
		if height > params.expiration_interval {
			error!(
				"network expired at height {} (header at height {})",
				params.expiration_interval, height
			);
			return Err(ErrorKind::NetworkExpired(height).into());
		}
	}

	Ok(())
}

fn map_pow_error(e: pow::Error) -> Error {
	match e {
		pow::Error::NullRandomXHash => ErrorKind::BadHeaderNull.into(),
		pow::Error::Hasher(msg) => ErrorKind::Other(format!("randomx hasher: {}", msg)).into(),
		// invalid target, commitment or hash mismatch all reject the
		// proof of work itself
		_ => ErrorKind::HighHash.into(),
	}
}
