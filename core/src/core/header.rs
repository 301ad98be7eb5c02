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

//! The block header and its canonical 100-byte serialization. Every stored
//! hash commits to this exact layout; changing field order, width or
//! endianness would fork the network.

use crate::core::hash::{Hash, Hash160, Hashed, ZERO_HASH};
use crate::ser::{self, Readable, Reader, Writeable, Writer};

/// Size in bytes of the canonical header serialization.
pub const HEADER_SIZE: usize = 100;

/// A block header. Headers are the only consensus object in this chain;
/// there is no block body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
	/// Header version, currently 1.
	pub version: i32,
	/// Hash of the parent header, all zero only for genesis.
	pub prev_hash: Hash,
	/// Opaque miner payout identifier.
	pub miner_address: Hash160,
	/// Timestamp in Unix seconds.
	pub time: u32,
	/// Compact difficulty target.
	pub bits: u32,
	/// Proof-of-work search nonce.
	pub nonce: u32,
	/// Final RandomX output, zero only while the header is being mined.
	pub randomx_hash: Hash,
}

impl Default for BlockHeader {
	fn default() -> BlockHeader {
		BlockHeader {
			version: 1,
			prev_hash: ZERO_HASH,
			miner_address: Hash160::default(),
			time: 0,
			bits: 0,
			nonce: 0,
			randomx_hash: ZERO_HASH,
		}
	}
}

impl Writeable for BlockHeader {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_i32(self.version)?;
		writer.write_fixed_bytes(self.prev_hash.as_bytes())?;
		writer.write_fixed_bytes(self.miner_address.as_bytes())?;
		writer.write_u32(self.time)?;
		writer.write_u32(self.bits)?;
		writer.write_u32(self.nonce)?;
		writer.write_fixed_bytes(self.randomx_hash.as_bytes())?;
		Ok(())
	}
}

impl Readable for BlockHeader {
	fn read<R: Reader>(reader: &mut R) -> Result<BlockHeader, ser::Error> {
		let version = reader.read_i32()?;
		let prev_hash = Hash::from_vec(&reader.read_fixed_bytes(32)?);
		let miner_bytes = reader.read_fixed_bytes(20)?;
		let mut miner_address = Hash160::default();
		miner_address.0.copy_from_slice(&miner_bytes);
		let time = reader.read_u32()?;
		let bits = reader.read_u32()?;
		let nonce = reader.read_u32()?;
		let randomx_hash = Hash::from_vec(&reader.read_fixed_bytes(32)?);
		Ok(BlockHeader {
			version,
			prev_hash,
			miner_address,
			time,
			bits,
			nonce,
			randomx_hash,
		})
	}
}

impl Hashed for BlockHeader {
	fn hash_bytes(&self) -> Vec<u8> {
		ser::ser_vec(self).expect("serialize header to memory")
	}
}

impl BlockHeader {
	/// Whether this header claims to be genesis (no parent).
	pub fn is_genesis(&self) -> bool {
		self.prev_hash.is_zero()
	}

	/// The 100-byte pre-image the external RandomX hasher runs over: the
	/// canonical serialization with `randomx_hash` cleared.
	pub fn pow_preimage(&self) -> Vec<u8> {
		let mut cleared = self.clone();
		cleared.randomx_hash = ZERO_HASH;
		ser::ser_vec(&cleared).expect("serialize header to memory")
	}
}

/// Checks that each header in the slice links to the hash of the one
/// before it. Used by callers batching headers for the anti-DoS gate.
pub fn headers_are_continuous(headers: &[BlockHeader]) -> bool {
	for pair in headers.windows(2) {
		if pair[1].prev_hash != pair[0].hash() {
			return false;
		}
	}
	true
}
