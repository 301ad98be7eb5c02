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

//! Serialization and deserialization layer specialized for binary encoding.
//! Ensures consistency of the canonical header layout, which every stored
//! hash commits to.
//!
//! To use it simply implement `Writeable` or `Readable` and then use the
//! `serialize` or `deserialize` functions on them as appropriate.

use std::io;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Possible errors deriving from serializing or deserializing.
#[derive(Debug)]
pub enum Error {
	/// Wraps an io error produced when reading or writing
	IOErr(io::Error),
	/// Data wasn't in a consumable format
	CorruptedData,
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::IOErr(e)
	}
}

/// Implementations defined how different numbers and binary structures are
/// written to an underlying stream or container.
pub trait Writer {
	/// Writes a u8 as bytes
	fn write_u8(&mut self, n: u8) -> Result<(), Error>;
	/// Writes a u32 as little-endian bytes
	fn write_u32(&mut self, n: u32) -> Result<(), Error>;
	/// Writes an i32 as little-endian bytes
	fn write_i32(&mut self, n: i32) -> Result<(), Error>;
	/// Writes a u64 as little-endian bytes
	fn write_u64(&mut self, n: u64) -> Result<(), Error>;
	/// Writes an i64 as little-endian bytes
	fn write_i64(&mut self, n: i64) -> Result<(), Error>;
	/// Writes a fixed number of bytes. The reader is expected to know the
	/// actual length on read.
	fn write_fixed_bytes(&mut self, bytes: &[u8]) -> Result<(), Error>;
}

/// Implementations defined how different numbers and binary structures are
/// read from an underlying stream or container.
pub trait Reader {
	/// Read a u8 from the underlying Read
	fn read_u8(&mut self) -> Result<u8, Error>;
	/// Read a little-endian u32 from the underlying Read
	fn read_u32(&mut self) -> Result<u32, Error>;
	/// Read a little-endian i32 from the underlying Read
	fn read_i32(&mut self) -> Result<i32, Error>;
	/// Read a little-endian u64 from the underlying Read
	fn read_u64(&mut self) -> Result<u64, Error>;
	/// Read a little-endian i64 from the underlying Read
	fn read_i64(&mut self) -> Result<i64, Error>;
	/// Read a fixed number of bytes from the underlying reader.
	fn read_fixed_bytes(&mut self, length: usize) -> Result<Vec<u8>, Error>;
}

/// Trait that every type that can be serialized as binary must implement.
/// Writes directly to a Writer, a utility type thinly wrapping an
/// underlying Write implementation.
pub trait Writeable {
	/// Write the data held by this Writeable to the provided writer
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error>;
}

/// Trait that every type that can be deserialized from binary must
/// implement. Reads directly from a Reader, a utility type thinly wrapping
/// an underlying Read implementation.
pub trait Readable: Sized {
	/// Reads the data necessary to this Readable from the provided reader
	fn read<R: Reader>(reader: &mut R) -> Result<Self, Error>;
}

/// Deserializes a Readable from any std::io::Read implementation.
pub fn deserialize<T: Readable>(source: &mut dyn Read) -> Result<T, Error> {
	let mut reader = BinReader { source };
	T::read(&mut reader)
}

/// Serializes a Writeable into any std::io::Write implementation.
pub fn serialize<W: Writeable>(sink: &mut dyn Write, thing: &W) -> Result<(), Error> {
	let mut writer = BinWriter { sink };
	thing.write(&mut writer)
}

/// Utility function to serialize a writeable directly in memory.
pub fn ser_vec<W: Writeable>(thing: &W) -> Result<Vec<u8>, Error> {
	let mut vec = Vec::new();
	serialize(&mut vec, thing)?;
	Ok(vec)
}

/// Utility wrapper for an underlying byte Writer. Defines higher level
/// methods to write numbers, byte vectors, etc.
struct BinWriter<'a> {
	sink: &'a mut dyn Write,
}

impl<'a> Writer for BinWriter<'a> {
	fn write_u8(&mut self, n: u8) -> Result<(), Error> {
		self.sink.write_u8(n).map_err(From::from)
	}

	fn write_u32(&mut self, n: u32) -> Result<(), Error> {
		self.sink.write_u32::<LittleEndian>(n).map_err(From::from)
	}

	fn write_i32(&mut self, n: i32) -> Result<(), Error> {
		self.sink.write_i32::<LittleEndian>(n).map_err(From::from)
	}

	fn write_u64(&mut self, n: u64) -> Result<(), Error> {
		self.sink.write_u64::<LittleEndian>(n).map_err(From::from)
	}

	fn write_i64(&mut self, n: i64) -> Result<(), Error> {
		self.sink.write_i64::<LittleEndian>(n).map_err(From::from)
	}

	fn write_fixed_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
		self.sink.write_all(bytes)?;
		Ok(())
	}
}

/// Utility wrapper for an underlying byte Reader. Defines higher level
/// methods to read numbers, byte vectors, etc.
struct BinReader<'a> {
	source: &'a mut dyn Read,
}

impl<'a> Reader for BinReader<'a> {
	fn read_u8(&mut self) -> Result<u8, Error> {
		self.source.read_u8().map_err(From::from)
	}

	fn read_u32(&mut self) -> Result<u32, Error> {
		self.source.read_u32::<LittleEndian>().map_err(From::from)
	}

	fn read_i32(&mut self) -> Result<i32, Error> {
		self.source.read_i32::<LittleEndian>().map_err(From::from)
	}

	fn read_u64(&mut self) -> Result<u64, Error> {
		self.source.read_u64::<LittleEndian>().map_err(From::from)
	}

	fn read_i64(&mut self) -> Result<i64, Error> {
		self.source.read_i64::<LittleEndian>().map_err(From::from)
	}

	fn read_fixed_bytes(&mut self, length: usize) -> Result<Vec<u8>, Error> {
		let mut buf = vec![0; length];
		self.source.read_exact(&mut buf)?;
		Ok(buf)
	}
}
