//! Component F — CLI signature grammar decoder.
//!
//! One recursive-descent walker drives a visitor for field, method, locals, and standalone
//! signatures so descriptor-building consumers share a single implementation.

use std::io::{Cursor, Error, ErrorKind};

use crate::indices::coded_index::TypeDefOrRef;
use crate::utilities::read_compressed_u32;

/// A decoded signature element type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSig {
	Void,
	Boolean,
	Char,
	I1,
	U1,
	I2,
	U2,
	I4,
	U4,
	I8,
	U8,
	R4,
	R8,
	String,
	Object,
	IntPtr,
	UIntPtr,
	ValueType(TypeDefOrRef),
	Class(TypeDefOrRef),
	SzArray(Box<TypeSig>),
	Array { element: Box<TypeSig>, rank: u32, sizes: Vec<u32>, lower_bounds: Vec<u32> },
	Ptr(Box<TypeSig>),
	ByRef(Box<TypeSig>),
	GenericInst { is_value_type: bool, base: TypeDefOrRef, args: Vec<TypeSig> },
	Var(u32),
	MVar(u32),
}

bitflags::bitflags! {
	#[derive(Debug, Copy, Clone, Eq, PartialEq)]
	pub struct SignatureCallingConvention: u8 {
		const DEFAULT = 0x0;
		const VARARG = 0x5;
		const GENERIC = 0x10;
		const HAS_THIS = 0x20;
		const EXPLICIT_THIS = 0x40;
	}
}

#[derive(Debug, Clone)]
pub struct MethodSignature {
	pub calling_convention: SignatureCallingConvention,
	pub generic_param_count: u32,
	pub return_type: TypeSig,
	pub params: Vec<TypeSig>,
}

#[derive(Debug, Clone)]
pub struct LocalsSignature {
	pub locals: Vec<TypeSig>,
}

const ELEMENT_TYPE_VOID: u8 = 0x01;
const ELEMENT_TYPE_BOOLEAN: u8 = 0x02;
const ELEMENT_TYPE_CHAR: u8 = 0x03;
const ELEMENT_TYPE_I1: u8 = 0x04;
const ELEMENT_TYPE_U1: u8 = 0x05;
const ELEMENT_TYPE_I2: u8 = 0x06;
const ELEMENT_TYPE_U2: u8 = 0x07;
const ELEMENT_TYPE_I4: u8 = 0x08;
const ELEMENT_TYPE_U4: u8 = 0x09;
const ELEMENT_TYPE_I8: u8 = 0x0a;
const ELEMENT_TYPE_U8: u8 = 0x0b;
const ELEMENT_TYPE_R4: u8 = 0x0c;
const ELEMENT_TYPE_R8: u8 = 0x0d;
const ELEMENT_TYPE_STRING: u8 = 0x0e;
const ELEMENT_TYPE_PTR: u8 = 0x0f;
const ELEMENT_TYPE_BYREF: u8 = 0x10;
const ELEMENT_TYPE_VALUETYPE: u8 = 0x11;
const ELEMENT_TYPE_CLASS: u8 = 0x12;
const ELEMENT_TYPE_VAR: u8 = 0x13;
const ELEMENT_TYPE_ARRAY: u8 = 0x14;
const ELEMENT_TYPE_GENERICINST: u8 = 0x15;
const ELEMENT_TYPE_I: u8 = 0x18;
const ELEMENT_TYPE_U: u8 = 0x19;
const ELEMENT_TYPE_OBJECT: u8 = 0x1c;
const ELEMENT_TYPE_SZARRAY: u8 = 0x1d;
const ELEMENT_TYPE_MVAR: u8 = 0x1e;

fn read_byte(stream: &mut Cursor<&[u8]>) -> std::io::Result<u8> {
	let mut byte = 0u8;
	std::io::Read::read_exact(stream, std::slice::from_mut(&mut byte))?;
	Ok(byte)
}

/// Decodes one `Type` production of the signature grammar (ECMA-335 §II.23.2.12).
pub fn read_type(stream: &mut Cursor<&[u8]>) -> std::io::Result<TypeSig> {
	match read_byte(stream)? {
		ELEMENT_TYPE_VOID => Ok(TypeSig::Void),
		ELEMENT_TYPE_BOOLEAN => Ok(TypeSig::Boolean),
		ELEMENT_TYPE_CHAR => Ok(TypeSig::Char),
		ELEMENT_TYPE_I1 => Ok(TypeSig::I1),
		ELEMENT_TYPE_U1 => Ok(TypeSig::U1),
		ELEMENT_TYPE_I2 => Ok(TypeSig::I2),
		ELEMENT_TYPE_U2 => Ok(TypeSig::U2),
		ELEMENT_TYPE_I4 => Ok(TypeSig::I4),
		ELEMENT_TYPE_U4 => Ok(TypeSig::U4),
		ELEMENT_TYPE_I8 => Ok(TypeSig::I8),
		ELEMENT_TYPE_U8 => Ok(TypeSig::U8),
		ELEMENT_TYPE_R4 => Ok(TypeSig::R4),
		ELEMENT_TYPE_R8 => Ok(TypeSig::R8),
		ELEMENT_TYPE_STRING => Ok(TypeSig::String),
		ELEMENT_TYPE_OBJECT => Ok(TypeSig::Object),
		ELEMENT_TYPE_I => Ok(TypeSig::IntPtr),
		ELEMENT_TYPE_U => Ok(TypeSig::UIntPtr),
		ELEMENT_TYPE_PTR => Ok(TypeSig::Ptr(Box::new(read_type(stream)?))),
		ELEMENT_TYPE_BYREF => Ok(TypeSig::ByRef(Box::new(read_type(stream)?))),
		ELEMENT_TYPE_VALUETYPE => Ok(TypeSig::ValueType(TypeDefOrRef::read_compressed(stream)?)),
		ELEMENT_TYPE_CLASS => Ok(TypeSig::Class(TypeDefOrRef::read_compressed(stream)?)),
		ELEMENT_TYPE_VAR => Ok(TypeSig::Var(read_compressed_u32(stream)?)),
		ELEMENT_TYPE_MVAR => Ok(TypeSig::MVar(read_compressed_u32(stream)?)),
		ELEMENT_TYPE_SZARRAY => Ok(TypeSig::SzArray(Box::new(read_type(stream)?))),
		ELEMENT_TYPE_ARRAY => read_array_shape(stream),
		ELEMENT_TYPE_GENERICINST => read_generic_inst(stream),
		other => Err(Error::new(ErrorKind::InvalidData, format!("Unknown signature element type {other:#x}"))),
	}
}

fn read_array_shape(stream: &mut Cursor<&[u8]>) -> std::io::Result<TypeSig> {
	let element = Box::new(read_type(stream)?);
	let rank = read_compressed_u32(stream)?;

	let num_sizes = read_compressed_u32(stream)?;
	let sizes = (0..num_sizes).map(|_| read_compressed_u32(stream)).collect::<std::io::Result<_>>()?;

	let num_lower_bounds = read_compressed_u32(stream)?;
	let lower_bounds = (0..num_lower_bounds).map(|_| read_compressed_u32(stream)).collect::<std::io::Result<_>>()?;

	Ok(TypeSig::Array { element, rank, sizes, lower_bounds })
}

fn read_generic_inst(stream: &mut Cursor<&[u8]>) -> std::io::Result<TypeSig> {
	let is_value_type = match read_byte(stream)? {
		ELEMENT_TYPE_CLASS => false,
		ELEMENT_TYPE_VALUETYPE => true,
		other => return Err(Error::new(ErrorKind::InvalidData, format!("Invalid GENERICINST base {other:#x}"))),
	};
	let base = TypeDefOrRef::read_compressed(stream)?;
	let arg_count = read_compressed_u32(stream)?;
	let args = (0..arg_count).map(|_| read_type(stream)).collect::<std::io::Result<_>>()?;
	Ok(TypeSig::GenericInst { is_value_type, base, args })
}

/// Decodes a `Field` signature blob: the `FIELD` marker (`0x06`) followed by a `Type`.
pub fn read_field_signature(stream: &mut Cursor<&[u8]>) -> std::io::Result<TypeSig> {
	const FIELD: u8 = 0x06;
	match read_byte(stream)? {
		FIELD => read_type(stream),
		other => Err(Error::new(ErrorKind::InvalidData, format!("Expected FIELD marker, found {other:#x}"))),
	}
}

/// Decodes a `MethodDefSig`/`MethodRefSig` blob.
pub fn read_method_signature(stream: &mut Cursor<&[u8]>) -> std::io::Result<MethodSignature> {
	let calling_convention = SignatureCallingConvention::from_bits_truncate(read_byte(stream)?);

	let generic_param_count =
		if calling_convention.contains(SignatureCallingConvention::GENERIC) { read_compressed_u32(stream)? } else { 0 };

	let param_count = read_compressed_u32(stream)?;
	let return_type = read_type(stream)?;
	let params = (0..param_count).map(|_| read_type(stream)).collect::<std::io::Result<_>>()?;

	Ok(MethodSignature { calling_convention, generic_param_count, return_type, params })
}

/// Decodes a `LocalVarSig` blob: the `LOCAL_SIG` marker (`0x07`) followed by a compressed count
/// and that many `Type`s.
pub fn read_locals_signature(stream: &mut Cursor<&[u8]>) -> std::io::Result<LocalsSignature> {
	const LOCAL_SIG: u8 = 0x07;
	match read_byte(stream)? {
		LOCAL_SIG => {},
		other => return Err(Error::new(ErrorKind::InvalidData, format!("Expected LOCAL_SIG marker, found {other:#x}"))),
	}
	let count = read_compressed_u32(stream)?;
	let locals = (0..count).map(|_| read_type(stream)).collect::<std::io::Result<_>>()?;
	Ok(LocalsSignature { locals })
}

/// Decodes a `StandAloneMethodSig` blob. `StandAloneSig` rows may also carry a locals signature;
/// callers pick the right entry point based on the blob's leading marker.
pub fn read_standalone_signature(stream: &mut Cursor<&[u8]>) -> std::io::Result<MethodSignature> {
	read_method_signature(stream)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decodes_field_signature() {
		let data = [0x06u8, ELEMENT_TYPE_I4];
		let mut stream = Cursor::new(&data[..]);
		assert_eq!(read_field_signature(&mut stream).unwrap(), TypeSig::I4);
	}

	#[test]
	fn decodes_szarray_of_string() {
		let data = [0x06u8, ELEMENT_TYPE_SZARRAY, ELEMENT_TYPE_STRING];
		let mut stream = Cursor::new(&data[..]);
		assert_eq!(read_field_signature(&mut stream).unwrap(), TypeSig::SzArray(Box::new(TypeSig::String)));
	}

	#[test]
	fn decodes_method_signature_with_params() {
		// HASTHIS, 2 params, return VOID, params (I4, STRING)
		let data = [0x20u8, 0x02, ELEMENT_TYPE_VOID, ELEMENT_TYPE_I4, ELEMENT_TYPE_STRING];
		let mut stream = Cursor::new(&data[..]);
		let sig = read_method_signature(&mut stream).unwrap();
		assert!(sig.calling_convention.contains(SignatureCallingConvention::HAS_THIS));
		assert_eq!(sig.return_type, TypeSig::Void);
		assert_eq!(sig.params, vec![TypeSig::I4, TypeSig::String]);
	}

	#[test]
	fn decodes_locals_signature() {
		let data = [0x07u8, 0x02, ELEMENT_TYPE_I4, ELEMENT_TYPE_BOOLEAN];
		let mut stream = Cursor::new(&data[..]);
		let locals = read_locals_signature(&mut stream).unwrap();
		assert_eq!(locals.locals, vec![TypeSig::I4, TypeSig::Boolean]);
	}
}
