use std::fmt::{Debug, Formatter};
use std::io::Cursor;

use crate::heaps::{BlobIndex, SizeDebugWrapper};
use crate::utilities::read_compressed_u32;

/// The `#Blob` heap: variable-length, length-prefixed byte arrays.
#[derive(Copy, Clone)]
pub struct BlobHeap<'l> {
	data: &'l [u8],
}

impl<'l> From<&'l [u8]> for BlobHeap<'l> {
	fn from(data: &'l [u8]) -> Self {
		Self { data }
	}
}

impl<'l> BlobHeap<'l> {
	/// Decodes the compressed length prefix at `idx` and returns the blob bytes that follow.
	/// Index `0` conventionally denotes the empty blob.
	pub fn get(&self, idx: BlobIndex) -> Option<&'l [u8]> {
		let slice = self.data.get(idx.0..)?;
		let mut cursor = Cursor::new(slice);
		let len = read_compressed_u32(&mut cursor).ok()? as usize;
		let start = cursor.position() as usize;
		slice.get(start..start + len)
	}
}

impl Debug for BlobHeap<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BlobHeap").field("data", &SizeDebugWrapper(self.data.len())).finish()
	}
}
