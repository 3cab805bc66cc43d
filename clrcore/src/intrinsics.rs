//! Component K — intrinsic surface contracts for Array/String/Buffer/Math/Monitor/Thread/
//! Environment internal calls.

use crate::errors::{Error, Result};
use crate::runtime::{array, string, Heap, InvocationList, VTable};

pub mod array_intrinsics {
	use super::*;

	/// `Array.GetLength(a, dim)`: only dimension `0` is valid in this single-dimension-only
	/// runtime.
	///
	/// # Safety
	/// `ptr` must point to an initialized array object.
	pub unsafe fn get_length(ptr: *const u8, dim: i32) -> Result<usize> {
		match dim {
			0 => Ok(array::count(ptr)),
			_ => Err(Error::IndexOutOfRange { index: dim as i64, length: 1 }),
		}
	}

	/// `Array.get_Rank` — always `1`.
	pub fn get_rank() -> i32 {
		1
	}

	/// `Array.GetLowerBound(a, dim)`.
	///
	/// # Safety
	/// `ptr` must point to an initialized array object.
	pub unsafe fn get_lower_bound(_ptr: *const u8, dim: i32) -> Result<i32> {
		match dim {
			0 => Ok(0),
			_ => Err(Error::IndexOutOfRange { index: dim as i64, length: 1 }),
		}
	}

	/// `Array._s_GetRawArrayGeometry`: raw element pointer plus count/size/lower-bound/GC-pointer
	/// metadata for the caller to interpret directly.
	pub struct RawArrayGeometry {
		pub data: *const u8,
		pub count: usize,
		pub element_size: u32,
		pub lower_bound: i32,
		pub contains_gc_pointers: bool,
	}

	/// # Safety
	/// `ptr` must point to an initialized array object whose vtable is `vtable`.
	pub unsafe fn get_raw_array_geometry(ptr: *const u8, vtable: &VTable) -> RawArrayGeometry {
		RawArrayGeometry {
			data: array::payload::<'_>(ptr, vtable.element_size as usize).as_ptr(),
			count: array::count(ptr),
			element_size: vtable.element_size,
			lower_bound: 0,
			contains_gc_pointers: vtable.contains_gc_pointers,
		}
	}

	/// `Array._s_Copy` is unimplemented in source; always throws.
	pub fn copy() -> Result<()> {
		Err(Error::InvalidOperation("Array.Copy is not implemented in this core"))
	}
}

pub mod buffer_intrinsics {
	/// `Buffer._s_Memcpy`: byte-wise copy, non-overlapping regions assumed.
	///
	/// # Safety
	/// `dest` and `src` must each be valid for `len` bytes and must not overlap.
	pub unsafe fn memcpy(dest: *mut u8, src: *const u8, len: usize) {
		std::ptr::copy_nonoverlapping(src, dest, len);
	}

	/// `Buffer._s_Memmove`: overlap-safe byte-wise copy.
	///
	/// # Safety
	/// `dest` and `src` must each be valid for `len` bytes.
	pub unsafe fn memmove(dest: *mut u8, src: *const u8, len: usize) {
		std::ptr::copy(src, dest, len);
	}
}

pub mod string_intrinsics {
	use super::*;

	/// `String.get_Chars(s, i)`: unsigned bounds check against `_stringLength` rejects negative
	/// indices via the same comparison as an out-of-range one.
	///
	/// # Safety
	/// `ptr` must point to an initialized string object.
	pub unsafe fn get_chars(ptr: *const u8, index: i32) -> Result<u16> {
		let units = string::code_units::<'_>(ptr);
		let length = string::length(ptr) as usize;
		match (index as u32 as usize) < units.len() {
			true if (index as u32 as usize) <= length => Ok(units[index as u32 as usize]),
			_ => Err(Error::IndexOutOfRange { index: index as i64, length }),
		}
	}

	/// `String._s_FastAllocateString(n)`.
	pub fn fast_allocate_string(heap: &mut Heap, vtable: *const VTable, length: usize) -> *mut u8 {
		string::fast_allocate(heap, vtable, length)
	}
}

pub mod math_intrinsics {
	/// `Math.*`: deterministic IEEE-754 semantics, delegated to the platform's `f64` ops.
	pub fn sqrt(x: f64) -> f64 {
		x.sqrt()
	}

	pub fn sin(x: f64) -> f64 {
		x.sin()
	}

	pub fn cos(x: f64) -> f64 {
		x.cos()
	}

	pub fn pow(x: f64, y: f64) -> f64 {
		x.powf(y)
	}

	pub fn abs(x: f64) -> f64 {
		x.abs()
	}

	pub fn floor(x: f64) -> f64 {
		x.floor()
	}

	pub fn ceiling(x: f64) -> f64 {
		x.ceil()
	}
}

pub mod delegate_intrinsics {
	use super::*;

	/// `MulticastDelegate._s_CreateDelegateLike(proto, list)`.
	pub fn create_delegate_like(list: &[*const u8]) -> InvocationList {
		match list {
			[] => InvocationList::Empty,
			[single] => InvocationList::Single(*single),
			multiple => InvocationList::Multi(multiple.to_vec()),
		}
	}
}

pub mod monitor_intrinsics {
	/// Single-threaded cooperative stubs.
	pub fn enter(_obj: *const u8) {}

	pub fn try_enter(_obj: *const u8) -> bool {
		true
	}

	pub fn is_entered(_obj: *const u8) -> bool {
		true
	}

	pub fn wait(_obj: *const u8) -> bool {
		true
	}

	pub fn pulse(_obj: *const u8) {}

	pub fn pulse_all(_obj: *const u8) {}
}

pub mod thread_intrinsics {
	/// `Thread.Yield` always succeeds in a single-threaded core.
	pub fn yield_now() -> bool {
		true
	}
}

pub mod environment_intrinsics {
	/// `Environment._s__Exit`: terminates the process with the given code.
	pub fn exit(code: i32) -> ! {
		std::process::exit(code);
	}

	/// `Environment._s_get_TickCount64`: delegates to a caller-supplied scheduler.
	pub fn get_tick_count64(scheduler_tick_count: impl FnOnce() -> u64) -> u64 {
		scheduler_tick_count()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn array_get_length_rejects_nonzero_dim() {
		let mut heap = Heap::new();
		let ptr = heap.alloc(array::layout_size(4, 4));
		unsafe {
			array::init(ptr, std::ptr::null(), 4);
			assert_eq!(array_intrinsics::get_length(ptr, 0).unwrap(), 4);
			assert!(array_intrinsics::get_length(ptr, 1).is_err());
		}
	}

	#[test]
	fn string_get_chars_bounds_and_terminator() {
		let mut heap = Heap::new();
		let ptr = string_intrinsics::fast_allocate_string(&mut heap, std::ptr::null(), 4);
		unsafe {
			for i in 0..4 {
				assert_eq!(string_intrinsics::get_chars(ptr, i).unwrap(), 0);
			}
			assert_eq!(string_intrinsics::get_chars(ptr, 4).unwrap(), 0);
			assert!(string_intrinsics::get_chars(ptr, 5).is_err());
			assert!(string_intrinsics::get_chars(ptr, -1).is_err());
		}
	}

	#[test]
	fn buffer_memmove_handles_overlap() {
		let mut data = [1u8, 2, 3, 4, 5];
		unsafe {
			buffer_intrinsics::memmove(data.as_mut_ptr(), data.as_ptr().add(1), 4);
		}
		assert_eq!(data, [2, 3, 4, 5, 5]);
	}

	#[test]
	fn delegate_combine_scenarios() {
		assert!(matches!(delegate_intrinsics::create_delegate_like(&[]), InvocationList::Empty));
		let d = 0x1000 as *const u8;
		assert!(matches!(delegate_intrinsics::create_delegate_like(&[d]), InvocationList::Single(_)));
		assert!(matches!(delegate_intrinsics::create_delegate_like(&[d, d]), InvocationList::Multi(_)));
	}

	#[test]
	fn array_copy_is_unimplemented() {
		assert!(array_intrinsics::copy().is_err());
	}
}
