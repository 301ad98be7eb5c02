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

//! Error types for chain

use failure::{Backtrace, Context, Fail};
use std::fmt::{self, Display};
use std::io;

use crate::core::ser;

/// Error definition
#[derive(Debug)]
pub struct Error {
	inner: Context<ErrorKind>,
}

/// Chain error definitions
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
	/// A known-invalid header was re-announced
	#[fail(display = "Duplicate of known invalid header")]
	Duplicate,
	/// The proof of work commitment does not meet the target
	#[fail(display = "Commitment above target")]
	HighHash,
	/// A header claiming to be genesis does not match the pinned genesis
	#[fail(display = "Genesis hash mismatch")]
	BadGenesis,
	/// Genesis can only enter the index through initialization
	#[fail(display = "Genesis must be added via initialization")]
	GenesisViaAccept,
	/// The header's parent is not in the index (may be stashed as orphan)
	#[fail(display = "Previous header not found")]
	PrevBlockNotFound,
	/// The header's parent is invalid or descends from an invalid block
	#[fail(display = "Previous header is invalid")]
	BadPrevBlock,
	/// A required hash field is null
	#[fail(display = "Null hash in header")]
	BadHeaderNull,
	/// Header timestamp is not past the median time of its ancestors
	#[fail(display = "Header time too old")]
	TimeTooOld,
	/// Header timestamp is too far in the future
	#[fail(display = "Header time too far in the future")]
	TimeTooNew,
	/// Header difficulty bits differ from the required retarget value
	#[fail(display = "Wrong difficulty bits")]
	BadDiffBits,
	/// Activation past the network expiration height
	#[fail(display = "Network expired at height {}", _0)]
	NetworkExpired(u64),
	/// The caller has not certified the anti-DoS minimum-work gate
	#[fail(display = "Missing anti-DoS work validation")]
	TooLittleChainwork,
	/// Internal issue when reading or writing the block store
	#[fail(display = "Store error: {}", _0)]
	StoreErr(String),
	/// Error serializing or deserializing a type
	#[fail(display = "Serialization error: {}", _0)]
	SerErr(String),
	/// Wrapped I/O failure
	#[fail(display = "I/O error: {}", _0)]
	IOErr(String),
	/// Anything else
	#[fail(display = "Other error: {}", _0)]
	Other(String),
}

impl ErrorKind {
	/// The reject reason surfaced verbatim over RPC and to peers.
	pub fn reject_reason(&self) -> &'static str {
		match self {
			ErrorKind::Duplicate => "duplicate",
			ErrorKind::HighHash => "high-hash",
			ErrorKind::BadGenesis => "bad-genesis",
			ErrorKind::GenesisViaAccept => "genesis-via-accept",
			ErrorKind::PrevBlockNotFound => "prev-blk-not-found",
			ErrorKind::BadPrevBlock => "bad-prevblk",
			ErrorKind::BadHeaderNull => "bad-header-null",
			ErrorKind::TimeTooOld => "time-too-old",
			ErrorKind::TimeTooNew => "time-too-new",
			ErrorKind::BadDiffBits => "bad-diffbits",
			ErrorKind::NetworkExpired(_) => "network-expired",
			ErrorKind::TooLittleChainwork => "too-little-chainwork",
			ErrorKind::StoreErr(_) | ErrorKind::SerErr(_) | ErrorKind::IOErr(_)
			| ErrorKind::Other(_) => "internal-error",
		}
	}

	/// Whether the header is permanently rejected; an installed node with
	/// such a failure is marked failed.
	pub fn is_consensus_invalid(&self) -> bool {
		match self {
			ErrorKind::Duplicate
			| ErrorKind::HighHash
			| ErrorKind::BadGenesis
			| ErrorKind::BadPrevBlock
			| ErrorKind::BadHeaderNull
			| ErrorKind::TimeTooOld
			| ErrorKind::TimeTooNew
			| ErrorKind::BadDiffBits
			| ErrorKind::NetworkExpired(_) => true,
			_ => false,
		}
	}

	/// Whether a retry of the same header may succeed later (missing
	/// parent, missing work certification).
	pub fn is_soft_reject(&self) -> bool {
		match self {
			ErrorKind::PrevBlockNotFound
			| ErrorKind::TooLittleChainwork
			| ErrorKind::GenesisViaAccept => true,
			_ => false,
		}
	}
}

impl Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		Display::fmt(&self.inner, f)
	}
}

impl Error {
	/// get kind
	pub fn kind(&self) -> ErrorKind {
		self.inner.get_context().clone()
	}
	/// get cause
	pub fn cause(&self) -> Option<&dyn Fail> {
		self.inner.cause()
	}
	/// get backtrace
	pub fn backtrace(&self) -> Option<&Backtrace> {
		self.inner.backtrace()
	}
	/// The reject reason surfaced verbatim over RPC and to peers.
	pub fn reject_reason(&self) -> &'static str {
		self.inner.get_context().reject_reason()
	}
}

impl From<ErrorKind> for Error {
	fn from(kind: ErrorKind) -> Error {
		Error {
			inner: Context::new(kind),
		}
	}
}

impl From<Context<ErrorKind>> for Error {
	fn from(inner: Context<ErrorKind>) -> Error {
		Error { inner }
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error {
			inner: Context::new(ErrorKind::IOErr(e.to_string())),
		}
	}
}

impl From<ser::Error> for Error {
	fn from(e: ser::Error) -> Error {
		Error {
			inner: Context::new(ErrorKind::SerErr(format!("{:?}", e))),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn reject_reasons_are_wire_strings() {
		assert_eq!(ErrorKind::HighHash.reject_reason(), "high-hash");
		assert_eq!(ErrorKind::PrevBlockNotFound.reject_reason(), "prev-blk-not-found");
		assert_eq!(ErrorKind::BadDiffBits.reject_reason(), "bad-diffbits");
		assert_eq!(ErrorKind::NetworkExpired(7).reject_reason(), "network-expired");
	}

	#[test]
	fn classification() {
		assert!(ErrorKind::HighHash.is_consensus_invalid());
		assert!(!ErrorKind::HighHash.is_soft_reject());
		assert!(ErrorKind::PrevBlockNotFound.is_soft_reject());
		assert!(!ErrorKind::PrevBlockNotFound.is_consensus_invalid());
		assert!(!ErrorKind::StoreErr("io".to_owned()).is_consensus_invalid());
		assert!(!ErrorKind::StoreErr("io".to_owned()).is_soft_reject());
	}
}
