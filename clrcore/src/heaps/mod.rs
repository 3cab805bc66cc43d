//! Component D — heap accessors (`#Strings`, `#US`, `#Blob`, `#GUID`) plus the `#~` table heap.

pub mod blob;
pub mod guid;
pub mod string;
pub mod tables;

use std::fmt::{Debug, Formatter};
use std::io::{Cursor, Error, ErrorKind, Read};

pub use blob::BlobHeap;
pub use guid::GuidHeap;
pub use string::{StringHeap, UserStringHeap};
pub use tables::TableHeap;

use crate::indices::sizes::IndexSizes;
use crate::utilities::{read_ascii_name_from_stream, FromByteStream};

/// One of the five named streams a metadata root may carry.
#[derive(Debug)]
pub enum MetadataHeap<'l> {
	Blob(BlobHeap<'l>),
	Guid(GuidHeap<'l>),
	Table(TableHeap<'l>),
	String(StringHeap<'l>),
	UserString(UserStringHeap<'l>),
}

impl<'l> MetadataHeap<'l> {
	#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
	pub fn read(stream: &mut Cursor<&[u8]>, root: &'l [u8]) -> std::io::Result<Self> {
		let offset = u32::read(stream, &())? as usize;
		let size = u32::read(stream, &())? as usize;

		let mut name_buf = [0u8; 32];
		let name = read_ascii_name_from_stream::<4>(stream, &mut name_buf)?.to_owned();
		let data = root
			.get(offset..offset + size)
			.ok_or_else(|| Error::new(ErrorKind::InvalidData, "Stream out of bounds"))?;

		match name.as_str() {
			"#Blob" => Ok(Self::Blob(BlobHeap::from(data))),
			"#US" => Ok(Self::UserString(UserStringHeap::from(data))),
			"#~" => Ok(Self::Table(TableHeap::try_from(data)?)),
			"#GUID" => Ok(Self::Guid(GuidHeap::try_from(data)?)),
			"#Strings" => Ok(Self::String(StringHeap::try_from(data)?)),
			other => Err(Error::new(ErrorKind::InvalidData, format!("Unknown metadata heap {other:?}"))),
		}
	}
}

#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct StringIndex(pub usize);

impl FromByteStream for StringIndex {
	type Deps = IndexSizes;
	fn read(stream: &mut Cursor<&[u8]>, sizes: &Self::Deps) -> std::io::Result<Self> {
		Ok(Self(read_sized_index(stream, sizes.string)?))
	}
}

#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct BlobIndex(pub usize);

impl FromByteStream for BlobIndex {
	type Deps = IndexSizes;
	fn read(stream: &mut Cursor<&[u8]>, sizes: &Self::Deps) -> std::io::Result<Self> {
		Ok(Self(read_sized_index(stream, sizes.blob)?))
	}
}

#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct GuidIndex(pub usize);

impl FromByteStream for GuidIndex {
	type Deps = IndexSizes;
	fn read(stream: &mut Cursor<&[u8]>, sizes: &Self::Deps) -> std::io::Result<Self> {
		Ok(Self(read_sized_index(stream, sizes.guid)?))
	}
}

fn read_sized_index(stream: &mut Cursor<&[u8]>, size: usize) -> std::io::Result<usize> {
	let mut bytes = 0usize.to_ne_bytes();
	stream.read_exact(&mut bytes[..size])?;
	Ok(usize::from_le_bytes(bytes))
}

pub(crate) struct SizeDebugWrapper(pub usize);
impl Debug for SizeDebugWrapper {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "[u8; {:#X}]", self.0)
	}
}
