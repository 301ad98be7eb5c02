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

//! Per-network chain parameters. The engine consumes a `ChainParams`
//! value; it never reaches for a global. Factories cover the production
//! network, the public test network and the local regression network.

use std::fmt;

use crate::core::arith::ArithUint256;
use crate::core::hash::{Hash, Hashed};
use crate::core::header::BlockHeader;
use crate::genesis;

/// The networks this node can run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainTypes {
	/// The production network
	Mainnet,
	/// The public test network
	Testnet,
	/// Local regression testing: no retarget, trivial difficulty
	Regtest,
}

impl ChainTypes {
	/// Short name used in datadir paths and log lines.
	pub fn shortname(&self) -> &'static str {
		match self {
			ChainTypes::Mainnet => "main",
			ChainTypes::Testnet => "test",
			ChainTypes::Regtest => "regtest",
		}
	}
}

impl fmt::Display for ChainTypes {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.shortname())
	}
}

/// Everything chain-specific the engine consumes. Built once by the host
/// and handed to the chain by value; fields are public so tests can dial
/// individual knobs.
#[derive(Debug, Clone)]
pub struct ChainParams {
	/// Which network these parameters describe.
	pub chain_type: ChainTypes,
	/// Wire magic identifying the network in message framing.
	pub magic: u32,
	/// The genesis header, the unique header with a null parent.
	pub genesis: BlockHeader,
	/// Hash of the genesis header.
	pub genesis_hash: Hash,
	/// Easiest permitted target.
	pub pow_limit: ArithUint256,
	/// Target seconds between blocks.
	pub pow_target_spacing: i64,
	/// Seconds per RandomX epoch (VM key rotation).
	pub randomx_epoch_duration: i64,
	/// Seconds of schedule drift that double or halve the target.
	pub asert_half_life: i64,
	/// Height of the ASERT anchor block.
	pub asert_anchor_height: u64,
	/// Minimum cumulative work before the node leaves initial block
	/// download. Zero disables the check.
	pub min_chain_work: ArithUint256,
	/// Height at which the network expires and stops accepting blocks.
	/// Zero disables expiration.
	pub expiration_interval: u64,
	/// Blocks before expiration at which warnings begin.
	pub expiration_grace_period: u64,
	/// Seconds an orphan header may sit in the pool before eviction.
	pub orphan_expire_time: i64,
	/// Reorg depth at or beyond which activation is refused by policy.
	/// Zero disables the guard.
	pub suspicious_reorg_depth: u64,
	/// Blocks of work-buffer allowed behind the tip when computing the
	/// anti-DoS threshold for header batches.
	pub antidos_work_buffer_blocks: u64,
}

impl ChainParams {
	/// Production network parameters.
	pub fn mainnet() -> ChainParams {
		let genesis = genesis::genesis_main();
		let genesis_hash = genesis.hash();
		ChainParams {
			chain_type: ChainTypes::Mainnet,
			magic: 0x454d_4252,
			genesis,
			genesis_hash,
			pow_limit: ArithUint256::set_compact(0x1d00ffff).0,
			pow_target_spacing: 3600,
			randomx_epoch_duration: 7 * 24 * 60 * 60,
			asert_half_life: 2 * 24 * 60 * 60,
			asert_anchor_height: 1,
			min_chain_work: ArithUint256::from_u64(1) << 32,
			expiration_interval: 0,
			expiration_grace_period: 720,
			orphan_expire_time: 20 * 60,
			suspicious_reorg_depth: 100,
			antidos_work_buffer_blocks: 6,
		}
	}

	/// Public test network parameters.
	pub fn testnet() -> ChainParams {
		let genesis = genesis::genesis_test();
		let genesis_hash = genesis.hash();
		ChainParams {
			chain_type: ChainTypes::Testnet,
			magic: 0xa3f8_d412,
			genesis,
			genesis_hash,
			pow_limit: ArithUint256::set_compact(0x1d00ffff).0,
			pow_target_spacing: 600,
			randomx_epoch_duration: 7 * 24 * 60 * 60,
			asert_half_life: 2 * 24 * 60 * 60,
			asert_anchor_height: 1,
			min_chain_work: ArithUint256::from_u64(1) << 20,
			expiration_interval: 0,
			expiration_grace_period: 720,
			orphan_expire_time: 20 * 60,
			suspicious_reorg_depth: 100,
			antidos_work_buffer_blocks: 144,
		}
	}

	/// Local regression test parameters: trivial difficulty, no retarget,
	/// no minimum work, short orphan expiry.
	pub fn regtest() -> ChainParams {
		let genesis = genesis::genesis_reg();
		let genesis_hash = genesis.hash();
		ChainParams {
			chain_type: ChainTypes::Regtest,
			magic: 0x4b7c_2e91,
			genesis,
			genesis_hash,
			pow_limit: ArithUint256::set_compact(0x207fffff).0,
			pow_target_spacing: 60,
			randomx_epoch_duration: 3600,
			asert_half_life: 2 * 24 * 60 * 60,
			asert_anchor_height: 0,
			min_chain_work: ArithUint256::zero(),
			expiration_interval: 0,
			expiration_grace_period: 144,
			orphan_expire_time: 600,
			suspicious_reorg_depth: 0,
			antidos_work_buffer_blocks: 144,
		}
	}

	/// Parameters for the given network.
	pub fn for_chain(chain_type: ChainTypes) -> ChainParams {
		match chain_type {
			ChainTypes::Mainnet => ChainParams::mainnet(),
			ChainTypes::Testnet => ChainParams::testnet(),
			ChainTypes::Regtest => ChainParams::regtest(),
		}
	}

	/// The proof-of-work limit in compact form.
	pub fn pow_limit_bits(&self) -> u32 {
		self.pow_limit.get_compact()
	}
}
