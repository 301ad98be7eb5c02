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

//! Hash types and the primary hash function (double SHA-256) used to
//! identify headers throughout the chain.

use std::fmt;

use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// A 32-byte hash uniquely identifying a block header. The bytes are kept
/// in serialization order; hex rendering reverses them so that the string
/// reads like the big-endian number the hash encodes.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash(pub [u8; 32]);

/// The all-zero hash. Marks a missing parent (genesis) and an unset
/// RandomX result.
pub const ZERO_HASH: Hash = Hash([0; 32]);

impl Hash {
	/// Creates a hash from a byte slice, which must be exactly 32 bytes.
	pub fn from_vec(v: &[u8]) -> Hash {
		let mut a = [0; 32];
		a.copy_from_slice(&v[..32]);
		Hash(a)
	}

	/// The hash as a byte slice.
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	/// Converts the hash to an owned byte vector.
	pub fn to_vec(&self) -> Vec<u8> {
		self.0.to_vec()
	}

	/// Whether every byte is zero.
	pub fn is_zero(&self) -> bool {
		self.0.iter().all(|b| *b == 0)
	}

	/// Hex string in the conventional reverse-byte rendering.
	pub fn to_hex(&self) -> String {
		let mut s = String::with_capacity(64);
		for b in self.0.iter().rev() {
			s.push_str(&format!("{:02x}", b));
		}
		s
	}

	/// Parses the reverse-byte hex rendering produced by `to_hex`.
	pub fn from_hex(hex: &str) -> Result<Hash, String> {
		if hex.len() != 64 {
			return Err(format!("invalid hash hex length {}", hex.len()));
		}
		let mut a = [0u8; 32];
		for i in 0..32 {
			let byte = u8::from_str_radix(&hex[2 * i..2 * i + 2], 16)
				.map_err(|e| format!("invalid hash hex: {}", e))?;
			a[31 - i] = byte;
		}
		Ok(Hash(a))
	}

	/// Abbreviated hex form for log lines.
	pub fn short(&self) -> String {
		let h = self.to_hex();
		h[..16].to_string()
	}
}

impl fmt::Display for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_hex())
	}
}

impl Serialize for Hash {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.to_hex())
	}
}

impl<'de> Deserialize<'de> for Hash {
	fn deserialize<D>(deserializer: D) -> Result<Hash, D::Error>
	where
		D: Deserializer<'de>,
	{
		deserializer.deserialize_str(HashVisitor)
	}
}

struct HashVisitor;

impl<'de> de::Visitor<'de> for HashVisitor {
	type Value = Hash;

	fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
		formatter.write_str("a 64 character hex string")
	}

	fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
	where
		E: de::Error,
	{
		Hash::from_hex(s).map_err(|_| de::Error::invalid_value(de::Unexpected::Str(s), &self))
	}
}

/// A 20-byte identifier, used for the miner payout address carried in each
/// header. Opaque to consensus.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash160(pub [u8; 20]);

impl Hash160 {
	/// The address as a byte slice.
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	/// Whether every byte is zero.
	pub fn is_zero(&self) -> bool {
		self.0.iter().all(|b| *b == 0)
	}

	/// Hex string in reverse-byte rendering, matching `Hash`.
	pub fn to_hex(&self) -> String {
		let mut s = String::with_capacity(40);
		for b in self.0.iter().rev() {
			s.push_str(&format!("{:02x}", b));
		}
		s
	}

	/// Parses the reverse-byte hex rendering produced by `to_hex`.
	pub fn from_hex(hex: &str) -> Result<Hash160, String> {
		if hex.len() != 40 {
			return Err(format!("invalid hash160 hex length {}", hex.len()));
		}
		let mut a = [0u8; 20];
		for i in 0..20 {
			let byte = u8::from_str_radix(&hex[2 * i..2 * i + 2], 16)
				.map_err(|e| format!("invalid hash160 hex: {}", e))?;
			a[19 - i] = byte;
		}
		Ok(Hash160(a))
	}
}

impl fmt::Display for Hash160 {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_hex())
	}
}

impl Serialize for Hash160 {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.to_hex())
	}
}

impl<'de> Deserialize<'de> for Hash160 {
	fn deserialize<D>(deserializer: D) -> Result<Hash160, D::Error>
	where
		D: Deserializer<'de>,
	{
		struct V;
		impl<'de> de::Visitor<'de> for V {
			type Value = Hash160;
			fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
				formatter.write_str("a 40 character hex string")
			}
			fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
			where
				E: de::Error,
			{
				Hash160::from_hex(s)
					.map_err(|_| de::Error::invalid_value(de::Unexpected::Str(s), &self))
			}
		}
		deserializer.deserialize_str(V)
	}
}

/// Double SHA-256 over a byte slice.
pub fn sha256d(data: &[u8]) -> Hash {
	let first = Sha256::digest(data);
	let second = Sha256::digest(&first);
	let mut a = [0u8; 32];
	a.copy_from_slice(&second);
	Hash(a)
}

/// A trait for types identified by the double SHA-256 of their canonical
/// byte serialization.
pub trait Hashed {
	/// The canonical bytes the hash commits to.
	fn hash_bytes(&self) -> Vec<u8>;

	/// Double SHA-256 of the canonical bytes.
	fn hash(&self) -> Hash {
		sha256d(&self.hash_bytes())
	}
}

impl Hashed for [u8] {
	fn hash_bytes(&self) -> Vec<u8> {
		self.to_owned()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn hex_round_trip() {
		let mut a = [0u8; 32];
		for (i, b) in a.iter_mut().enumerate() {
			*b = i as u8;
		}
		let h = Hash(a);
		let hex = h.to_hex();
		assert_eq!(hex.len(), 64);
		// reverse-byte rendering puts the last byte first
		assert!(hex.starts_with("1f1e1d"));
		assert_eq!(Hash::from_hex(&hex).unwrap(), h);
	}

	#[test]
	fn zero_hash() {
		assert!(ZERO_HASH.is_zero());
		assert_eq!(ZERO_HASH.to_hex(), "0".repeat(64));
	}

	#[test]
	fn sha256d_known_value() {
		// double SHA-256 of the empty string, rendered byte-reversed
		let h = sha256d(b"");
		assert_eq!(
			h.to_hex(),
			"56944c5d3f98413ef45cf54545538103cc9f298e0575820ad3591376e2e0f65d"
		);
	}

	#[test]
	fn serde_uses_reverse_byte_hex() {
		let h = sha256d(b"serde");
		let json = serde_json::to_string(&h).unwrap();
		assert_eq!(json, format!("\"{}\"", h.to_hex()));
		let back: Hash = serde_json::from_str(&json).unwrap();
		assert_eq!(back, h);
	}

	#[test]
	fn ordering_is_bytewise() {
		let mut lo = [0u8; 32];
		let mut hi = [0u8; 32];
		lo[0] = 1;
		hi[0] = 2;
		assert!(Hash(lo) < Hash(hi));
	}
}
