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

//! Definition of the genesis block of each network. Genesis is the unique
//! header whose parent hash is all zero; it enters the index through
//! initialization, never through the acceptance pipeline.

use crate::core::hash::{Hash160, ZERO_HASH};
use crate::core::header::BlockHeader;

/// Builds a genesis header from its defining fields. The parent hash,
/// miner address and RandomX hash of a genesis block are all null.
pub fn create_genesis_header(time: u32, nonce: u32, bits: u32, version: i32) -> BlockHeader {
	BlockHeader {
		version,
		prev_hash: ZERO_HASH,
		miner_address: Hash160::default(),
		time,
		bits,
		nonce,
		randomx_hash: ZERO_HASH,
	}
}

lazy_static! {
	static ref GENESIS_MAIN: BlockHeader =
		create_genesis_header(1_735_689_600, 2_085_142_444, 0x1d00ffff, 1);
	static ref GENESIS_TEST: BlockHeader =
		create_genesis_header(1_735_689_600, 414_098_458, 0x1d00ffff, 1);
	static ref GENESIS_REG: BlockHeader = create_genesis_header(1_704_067_200, 0, 0x207fffff, 1);
}

/// The mainnet genesis header.
pub fn genesis_main() -> BlockHeader {
	GENESIS_MAIN.clone()
}

/// The testnet genesis header.
pub fn genesis_test() -> BlockHeader {
	GENESIS_TEST.clone()
}

/// The regtest genesis header.
pub fn genesis_reg() -> BlockHeader {
	GENESIS_REG.clone()
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::core::hash::Hashed;

	#[test]
	fn genesis_headers_are_genesis() {
		for g in &[genesis_main(), genesis_test(), genesis_reg()] {
			assert!(g.is_genesis());
			assert!(g.miner_address.is_zero());
			assert!(g.randomx_hash.is_zero());
			assert_eq!(g.version, 1);
		}
	}

	#[test]
	fn networks_have_distinct_genesis_hashes() {
		let main = genesis_main().hash();
		let test = genesis_test().hash();
		let reg = genesis_reg().hash();
		assert_ne!(main, test);
		assert_ne!(main, reg);
		assert_ne!(test, reg);
	}
}
