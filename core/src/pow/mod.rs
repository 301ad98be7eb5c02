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

//! The proof-of-work rules. The actual RandomX computation is owned by the
//! host process and reached through the `RandomXHasher` seam; everything
//! else lives here: the cheap commitment gate that filters DoS traffic
//! before any expensive hashing, per-header work, and the ASERT retarget
//! driving the required difficulty.

pub mod asert;
pub mod error;

pub use self::error::Error;

use crate::core::arith::ArithUint256;
use crate::core::hash::{sha256d, Hash};
use crate::core::header::BlockHeader;
use crate::global::{ChainParams, ChainTypes};

/// How thoroughly to verify a header's proof of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
	/// Commitment gate plus full RandomX recomputation.
	Full,
	/// Commitment gate only, for cheap pre-filtering of batches.
	CommitmentOnly,
	/// Compute the RandomX hash for a candidate header and check the
	/// commitment against the target. Used by the miner.
	Mining,
}

/// Seam to the external RandomX implementation. The host process owns the
/// per-epoch VM cache; the engine only hands it a pre-image and an epoch.
pub trait RandomXHasher: Send + Sync {
	/// Hash the given pre-image with the VM for the given epoch.
	fn hash(&self, epoch: u32, data: &[u8]) -> Result<Hash, Error>;
}

/// The RandomX epoch a timestamp falls into. Epochs rotate the VM key.
pub fn epoch(time: u32, epoch_duration: i64) -> u32 {
	if epoch_duration <= 0 {
		return 0;
	}
	(time as i64 / epoch_duration) as u32
}

/// Decodes compact bits into a target, or `None` when the encoding is
/// negative, overflowed or zero.
pub fn target_from_bits(bits: u32) -> Option<ArithUint256> {
	let (target, negative, overflow) = ArithUint256::set_compact(bits);
	if negative || overflow || target.is_zero() {
		None
	} else {
		Some(target)
	}
}

/// Work proven by a single header with the given compact target:
/// `2^256 / (target + 1)`, computed as `(!target) / (target + 1) + 1`.
/// Invalid targets prove zero work.
pub fn block_proof(bits: u32) -> ArithUint256 {
	let target = match target_from_bits(bits) {
		Some(t) => t,
		None => return ArithUint256::zero(),
	};
	// an all-ones target would make target+1 wrap to zero
	if target == !ArithUint256::zero() {
		return ArithUint256::one();
	}
	(!target / (target + ArithUint256::one())) + ArithUint256::one()
}

/// Total work proven by a batch of headers. Headers with invalid compact
/// targets contribute nothing.
pub fn headers_work(headers: &[BlockHeader]) -> ArithUint256 {
	let mut work = ArithUint256::zero();
	for header in headers {
		work = work + block_proof(header.bits);
	}
	work
}

/// The commitment digest for a header and a RandomX result: double
/// SHA-256 over the 100-byte pre-image followed by the RandomX hash. Must
/// be at or below the target for the header to stand a chance of being
/// valid, which lets us drop garbage before ever touching a RandomX VM.
pub fn commitment(header: &BlockHeader, randomx_hash: &Hash) -> ArithUint256 {
	let mut data = header.pow_preimage();
	data.extend_from_slice(randomx_hash.as_bytes());
	ArithUint256::from_hash(&sha256d(&data))
}

/// Cheap anti-DoS gate: the commitment of the header's claimed RandomX
/// hash must meet the target. Requires a non-null RandomX hash.
pub fn check_commitment(header: &BlockHeader, bits: u32) -> bool {
	let target = match target_from_bits(bits) {
		Some(t) => t,
		None => return false,
	};
	if header.randomx_hash.is_zero() {
		return false;
	}
	commitment(header, &header.randomx_hash) <= target
}

/// Verifies a header's proof of work at the requested level. Returns the
/// RandomX hash that satisfied the target: the header's own hash for
/// `Full` and `CommitmentOnly`, the freshly computed one for `Mining`.
pub fn check_proof_of_work(
	header: &BlockHeader,
	bits: u32,
	mode: VerifyMode,
	hasher: &dyn RandomXHasher,
	epoch_duration: i64,
) -> Result<Hash, Error> {
	let target = target_from_bits(bits).ok_or(Error::InvalidTarget)?;

	if mode == VerifyMode::Mining {
		let epoch = epoch(header.time, epoch_duration);
		let computed = hasher.hash(epoch, &header.pow_preimage())?;
		if commitment(header, &computed) > target {
			return Err(Error::HighHash);
		}
		return Ok(computed);
	}

	// cheaper commitment verification first
	if header.randomx_hash.is_zero() {
		return Err(Error::NullRandomXHash);
	}
	if commitment(header, &header.randomx_hash) > target {
		return Err(Error::HighHash);
	}

	if mode == VerifyMode::Full {
		let epoch = epoch(header.time, epoch_duration);
		let computed = hasher.hash(epoch, &header.pow_preimage())?;
		if computed != header.randomx_hash {
			return Err(Error::HashMismatch);
		}
	}

	Ok(header.randomx_hash)
}

/// Minimal view of an indexed header, enough to drive the retarget
/// without depending on the index representation.
#[derive(Debug, Clone, Copy)]
pub struct HeaderView {
	/// Height of the header in its chain.
	pub height: u64,
	/// Timestamp in Unix seconds.
	pub time: u32,
	/// Compact difficulty target.
	pub bits: u32,
}

/// Required compact target for the block following `prev`. Genesis,
/// regtest and heights below the ASERT anchor all mine at the proof-of-
/// work limit; everything else follows the ASERT schedule anchored at
/// `params.asert_anchor_height`, resolved through `anchor_lookup` (an
/// ancestor walk on the caller's index).
pub fn next_work_required<F>(prev: Option<HeaderView>, params: &ChainParams, anchor_lookup: F) -> u32
where
	F: FnOnce(u64) -> Option<HeaderView>,
{
	let pow_limit_bits = params.pow_limit.get_compact();

	let prev = match prev {
		Some(p) => p,
		None => return pow_limit_bits,
	};

	// regtest never retargets
	if params.chain_type == ChainTypes::Regtest {
		return pow_limit_bits;
	}

	if prev.height < params.asert_anchor_height {
		return pow_limit_bits;
	}

	let anchor = match anchor_lookup(params.asert_anchor_height) {
		Some(a) => a,
		None => {
			// an indexed header always has its anchor ancestor; treat a
			// miss as a corrupt index and fall back to the limit
			error!(
				"next_work_required: no ancestor at anchor height {} below height {}",
				params.asert_anchor_height, prev.height
			);
			return pow_limit_bits;
		}
	};

	let (ref_target, negative, overflow) = ArithUint256::set_compact(anchor.bits);
	if negative || overflow {
		return pow_limit_bits;
	}

	let time_diff = prev.time as i64 - anchor.time as i64;
	let height_diff = prev.height as i64 - anchor.height as i64;

	trace!(
		"next_work_required: anchor_height={} anchor_bits={:#x} time_diff={}s height_diff={}",
		anchor.height,
		anchor.bits,
		time_diff,
		height_diff
	);

	asert::calculate_asert(
		&ref_target,
		params.pow_target_spacing,
		time_diff,
		height_diff,
		&params.pow_limit,
		params.asert_half_life,
	)
	.get_compact()
}

/// Difficulty of a compact target as a floating point multiple of the
/// conventional baseline (exponent 29). Display only, never consensus.
pub fn difficulty(bits: u32, pow_limit: &ArithUint256) -> f64 {
	let target = match target_from_bits(bits) {
		Some(t) => t,
		None => return 0.0,
	};
	if target > *pow_limit {
		return 0.0;
	}
	let mut shift = ((bits >> 24) & 0xff) as i32;
	let mut diff = f64::from(0xffffu32) / (bits & 0x00ff_ffff) as f64;
	while shift < 29 {
		diff *= 256.0;
		shift += 1;
	}
	while shift > 29 {
		diff /= 256.0;
		shift -= 1;
	}
	diff
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::core::hash::ZERO_HASH;

	/// Deterministic stand-in for the external RandomX library.
	struct TestHasher;

	impl RandomXHasher for TestHasher {
		fn hash(&self, epoch: u32, data: &[u8]) -> Result<Hash, Error> {
			let mut seeded = data.to_vec();
			seeded.extend_from_slice(&epoch.to_le_bytes());
			Ok(sha256d(&seeded))
		}
	}

	fn easy_header() -> BlockHeader {
		BlockHeader {
			bits: 0x207f_ffff,
			time: 1_234_567_890,
			..Default::default()
		}
	}

	#[test]
	fn epochs() {
		assert_eq!(epoch(0, 3600), 0);
		assert_eq!(epoch(1000, 3600), 0);
		assert_eq!(epoch(3599, 3600), 0);
		assert_eq!(epoch(3600, 3600), 1);
		assert_eq!(epoch(7199, 3600), 1);
		assert_eq!(epoch(7200, 3600), 2);
		assert_eq!(epoch(86400, 86400), 1);
		assert_eq!(epoch(172_800, 86400), 2);
		assert_eq!(epoch(1000, 0), 0);
	}

	#[test]
	fn proof_known_values() {
		// work for the classic minimum difficulty: 2^256 / (0xffff * 2^208 + 1)
		assert_eq!(
			block_proof(0x1d00ffff),
			ArithUint256::from_u64(0x0001_0001_0001)
		);
		// near-limit regtest target proves two units of work
		assert_eq!(block_proof(0x207fffff), ArithUint256::from_u64(2));
	}

	#[test]
	fn proof_of_invalid_bits_is_zero() {
		// negative flag set
		assert_eq!(block_proof(0x0080_0000 | 0x0034_5600), ArithUint256::zero());
		// zero target
		assert_eq!(block_proof(0), ArithUint256::zero());
		// zero mantissa
		assert_eq!(block_proof(0x0100_0000), ArithUint256::zero());
		// overflow
		assert_eq!(block_proof(0xff12_3456), ArithUint256::zero());
	}

	#[test]
	fn batch_work_skips_invalid_headers() {
		let valid = BlockHeader {
			bits: 0x1d00ffff,
			..Default::default()
		};
		let invalid = BlockHeader {
			bits: 0,
			..Default::default()
		};
		let work = headers_work(&[valid.clone(), invalid, valid.clone()]);
		assert_eq!(work, block_proof(0x1d00ffff) * 2u64);
		assert_eq!(headers_work(&[]), ArithUint256::zero());
	}

	#[test]
	fn commitment_requires_randomx_hash() {
		let header = easy_header();
		assert!(header.randomx_hash.is_zero());
		assert!(!check_commitment(&header, header.bits));
	}

	#[test]
	fn commitment_changes_with_inputs() {
		let header = easy_header();
		let a = commitment(&header, &Hash([1; 32]));
		let b = commitment(&header, &Hash([2; 32]));
		assert_ne!(a, b);
		let mut other = header.clone();
		other.nonce += 1;
		assert_ne!(commitment(&header, &Hash([1; 32])), commitment(&other, &Hash([1; 32])));
	}

	#[test]
	fn mining_round_trips_through_full_verify() {
		let hasher = TestHasher;
		let mut header = easy_header();
		// mine: search nonces until the commitment of the computed hash
		// meets the (very easy) target
		loop {
			match check_proof_of_work(&header, header.bits, VerifyMode::Mining, &hasher, 3600) {
				Ok(hash) => {
					header.randomx_hash = hash;
					break;
				}
				Err(Error::HighHash) => header.nonce += 1,
				Err(e) => panic!("unexpected mining error: {:?}", e),
			}
		}
		// the mined header passes commitment-only and full verification
		assert!(check_commitment(&header, header.bits));
		check_proof_of_work(&header, header.bits, VerifyMode::CommitmentOnly, &hasher, 3600)
			.unwrap();
		let hash =
			check_proof_of_work(&header, header.bits, VerifyMode::Full, &hasher, 3600).unwrap();
		assert_eq!(hash, header.randomx_hash);

		// tampering with the stored hash fails the full check
		let mut bad = header.clone();
		bad.randomx_hash = Hash([0xee; 32]);
		assert!(
			check_proof_of_work(&bad, bad.bits, VerifyMode::Full, &hasher, 3600).is_err()
		);
	}

	#[test]
	fn full_verify_rejects_null_hash() {
		let hasher = TestHasher;
		let mut header = easy_header();
		header.randomx_hash = ZERO_HASH;
		assert_eq!(
			check_proof_of_work(&header, header.bits, VerifyMode::Full, &hasher, 3600),
			Err(Error::NullRandomXHash)
		);
	}

	#[test]
	fn invalid_bits_rejected_up_front() {
		let hasher = TestHasher;
		let header = easy_header();
		assert_eq!(
			check_proof_of_work(&header, 0, VerifyMode::CommitmentOnly, &hasher, 3600),
			Err(Error::InvalidTarget)
		);
	}

	#[test]
	fn difficulty_display() {
		let limit = ArithUint256::set_compact(0x1d00ffff).0;
		let base = difficulty(0x1d00ffff, &limit);
		assert!((base - 1.0).abs() < 0.01);
		// a harder target reads as higher difficulty
		let harder = difficulty(0x1c00ffff, &limit);
		assert!(harder > base);
		// invalid bits read as zero
		assert_eq!(difficulty(0, &limit), 0.0);
	}

	#[test]
	fn next_work_at_genesis_and_regtest_is_limit() {
		let regtest = ChainParams::regtest();
		let limit_bits = regtest.pow_limit.get_compact();
		assert_eq!(next_work_required(None, &regtest, |_| None), limit_bits);
		let prev = HeaderView {
			height: 100,
			time: 1_234_567_890,
			bits: limit_bits,
		};
		assert_eq!(
			next_work_required(Some(prev), &regtest, |_| panic!("regtest must not retarget")),
			limit_bits
		);
	}

	#[test]
	fn next_work_follows_asert_past_anchor() {
		let mut params = ChainParams::mainnet();
		params.asert_anchor_height = 1;
		let limit_bits = params.pow_limit.get_compact();
		let anchor = HeaderView {
			height: 1,
			time: 1_000_000,
			bits: limit_bits,
		};
		// parent exactly on schedule (ideal time spans height_diff + 1
		// blocks): target stays at the limit
		let prev = HeaderView {
			height: 100,
			time: (1_000_000 + params.pow_target_spacing * 100) as u32,
			bits: limit_bits,
		};
		let bits = next_work_required(Some(prev), &params, |h| {
			assert_eq!(h, 1);
			Some(anchor)
		});
		assert_eq!(bits, limit_bits);

		// parent far ahead of schedule: difficulty rises
		let rushed = HeaderView {
			height: 100,
			time: 1_000_000 + 99,
			bits: limit_bits,
		};
		let bits = next_work_required(Some(rushed), &params, |_| Some(anchor));
		let (target, _, _) = ArithUint256::set_compact(bits);
		assert!(target < params.pow_limit);
	}
}
