//! Component F (method bodies) — tiny and fat method header decode.

use std::io::{Cursor, Error, ErrorKind};

use crate::utilities::{read_bytes_slice_from_stream, FromByteStream};

bitflags::bitflags! {
	#[derive(Debug, Copy, Clone, Eq, PartialEq)]
	struct FatFlags: u16 {
		const INIT_LOCALS = 0x10;
	}
}

/// A decoded method body: header fields plus the borrowed IL byte stream.
#[derive(Debug, Clone)]
pub struct MethodBody<'l> {
	pub max_stack_size: u16,
	pub init_locals: bool,
	pub local_var_sig_tok: u32,
	pub code: &'l [u8],
}

impl<'l> MethodBody<'l> {
	/// Parses the method body found at `rva`. `resolve_rva` translates an RVA into the PE image
	/// bytes that back it.
	pub fn read(data: &'l [u8]) -> std::io::Result<Self> {
		let header = *data.first().ok_or(ErrorKind::UnexpectedEof)?;
		match header & 0x3 {
			0x2 => Self::read_tiny(data, header),
			0x3 => Self::read_fat(data),
			_ => Err(Error::new(ErrorKind::InvalidData, "Invalid method header flags")),
		}
	}

	fn read_tiny(data: &'l [u8], header: u8) -> std::io::Result<Self> {
		let code_size = (header >> 2) as usize;
		let code = data.get(1..1 + code_size).ok_or(ErrorKind::UnexpectedEof)?;
		Ok(Self { max_stack_size: 8, init_locals: false, local_var_sig_tok: 0, code })
	}

	fn read_fat(data: &'l [u8]) -> std::io::Result<Self> {
		let mut stream = Cursor::new(data);
		let flags_and_size = u16::read(&mut stream, &())?;
		let header_size_dwords = flags_and_size >> 12;
		let flags = FatFlags::from_bits_truncate(flags_and_size & 0xFFF);

		let max_stack_size = u16::read(&mut stream, &())?;
		let code_size = u32::read(&mut stream, &())? as usize;
		let local_var_sig_tok = u32::read(&mut stream, &())?;

		// BodyBegin sits `header_size_dwords` 4-byte words past the header's start, not
		// necessarily right after the four fields just read.
		stream.set_position(u64::from(header_size_dwords) * 4);
		let code = read_bytes_slice_from_stream(&mut stream, code_size)?;
		Ok(Self { max_stack_size, init_locals: flags.contains(FatFlags::INIT_LOCALS), local_var_sig_tok, code })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decodes_tiny_header() {
		// header byte: code_size=3 << 2 | flags=0x2
		let data = [0x0Eu8, 0x00, 0x01, 0x2A];
		let body = MethodBody::read(&data).unwrap();
		assert_eq!(body.max_stack_size, 8);
		assert_eq!(body.code, &[0x00, 0x01, 0x2A]);
	}

	#[test]
	fn decodes_fat_header() {
		let mut data = Vec::new();
		let flags_and_size: u16 = (3 << 12) | 0x13; // header_size=3, INIT_LOCALS|bit2
		data.extend_from_slice(&flags_and_size.to_le_bytes());
		data.extend_from_slice(&8u16.to_le_bytes()); // max stack
		data.extend_from_slice(&2u32.to_le_bytes()); // code size
		data.extend_from_slice(&0u32.to_le_bytes()); // local var sig tok
		data.extend_from_slice(&[0x2A, 0x2A]);

		let body = MethodBody::read(&data).unwrap();
		assert_eq!(body.max_stack_size, 8);
		assert!(body.init_locals);
		assert_eq!(body.code, &[0x2A, 0x2A]);
	}

	#[test]
	fn decodes_fat_header_with_more_sects_bit_set() {
		// Literal header bytes, as they appear in a method carrying exception-handler data
		// sections: flags|size = 0x303B (size=3, MORE_SECTS|INIT_LOCALS set), max_stack=8,
		// code_size=5, local_var_sig_tok=0.
		let mut data = vec![0x3B, 0x30, 0x08, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
		data.extend_from_slice(&[0x2A; 5]);

		let body = MethodBody::read(&data).unwrap();
		assert_eq!(body.max_stack_size, 8);
		assert!(body.init_locals);
		assert_eq!(body.code, &[0x2A; 5]);
	}
}
