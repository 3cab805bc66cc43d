use std::fmt::{Debug, Formatter};
use std::io::{Error, ErrorKind};
use std::mem::size_of;

use uuid::Uuid;

use crate::heaps::GuidIndex;

/// The `#GUID` heap: fixed 16-byte entries, 1-based index.
#[derive(Copy, Clone)]
pub struct GuidHeap<'l> {
	data: &'l [u8],
}

impl<'l> TryFrom<&'l [u8]> for GuidHeap<'l> {
	type Error = Error;
	fn try_from(data: &'l [u8]) -> Result<Self, Self::Error> {
		match data.len().is_multiple_of(size_of::<Uuid>()) {
			true => Ok(Self { data }),
			false => Err(ErrorKind::InvalidData.into()),
		}
	}
}

impl GuidHeap<'_> {
	#[allow(clippy::len_without_is_empty)]
	pub fn len(&self) -> usize {
		self.data.len() / size_of::<Uuid>()
	}

	/// `idx == 0` conventionally denotes the nil GUID and returns `None`.
	pub fn get(&self, idx: GuidIndex) -> Option<Uuid> {
		if idx.0 == 0 {
			return None;
		}
		let offset = (idx.0 - 1) * size_of::<Uuid>();
		let bytes = self.data.get(offset..offset + size_of::<Uuid>())?;
		Uuid::from_slice_le(bytes).ok()
	}
}

impl Debug for GuidHeap<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		let mut dbg = f.debug_list();
		for i in 1..=self.len() {
			dbg.entry(&self.get(GuidIndex(i)));
		}
		dbg.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn zero_index_is_nil() {
		let data = [0u8; 16];
		let heap = GuidHeap::try_from(&data[..]).unwrap();
		assert_eq!(heap.get(GuidIndex(0)), None);
	}

	#[test]
	fn one_based_indexing() {
		let mut data = [0u8; 32];
		data[16..].copy_from_slice(Uuid::nil().as_bytes());
		let heap = GuidHeap::try_from(&data[..]).unwrap();
		assert!(heap.get(GuidIndex(2)).is_some());
	}
}
