//! The `#~` (table) heap: row counts, per-row decode, and the full CLI table set.

use std::fmt::{Debug, Formatter};
use std::io::{Cursor, Error, ErrorKind, Read};
use std::marker::PhantomData;

use bitflags::bitflags;

use crate::heaps::{BlobIndex, GuidIndex, StringIndex};
use crate::indices::coded_index::{
	CustomAttributeType, HasConstant, HasCustomAttribute, HasDeclSecurity, HasFieldMarshal, HasSemantics,
	Implementation, MemberForwarded, MemberRefParent, MethodDefOrRef, ResolutionScope, TypeDefOrRef, TypeOrMethodDef,
};
use crate::indices::sizes::{IndexSizes, SizeOf};
use crate::utilities::{enumerate_set_bits, FromByteStream};

macro_rules! define_table_kind {
	($($id: ident = $discriminant: literal),* $(,)?) => {
		#[repr(u8)]
		#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
		pub enum TableKind {
			$($id = $discriminant),*
		}

		impl TryFrom<u8> for TableKind {
			type Error = ();
			fn try_from(value: u8) -> Result<Self, Self::Error> {
				match value {
					$($discriminant => Ok(Self::$id),)*
					_ => Err(()),
				}
			}
		}
	};
}

define_table_kind! {
	Module = 0x00,
	TypeRef = 0x01,
	TypeDef = 0x02,
	Field = 0x04,
	MethodDef = 0x06,
	Param = 0x08,
	InterfaceImpl = 0x09,
	MemberRef = 0x0a,
	Constant = 0x0b,
	CustomAttribute = 0x0c,
	FieldMarshal = 0x0d,
	DeclSecurity = 0x0e,
	ClassLayout = 0x0f,
	FieldLayout = 0x10,
	StandAloneSig = 0x11,
	EventMap = 0x12,
	Event = 0x14,
	PropertyMap = 0x15,
	Property = 0x17,
	MethodSemantics = 0x18,
	MethodImpl = 0x19,
	ModuleRef = 0x1a,
	TypeSpec = 0x1b,
	ImplMap = 0x1c,
	FieldRVA = 0x1d,
	Assembly = 0x20,
	AssemblyRef = 0x23,
	File = 0x26,
	ExportedType = 0x27,
	ManifestResource = 0x28,
	NestedClass = 0x29,
	GenericParam = 0x2a,
	MethodSpec = 0x2b,
	GenericParamConstraint = 0x2c,
}

/// A typed metadata table row, keyed to its table id.
pub trait Table: Sized {
	const KIND: TableKind;
}

/// A 1-based row number into some other table `T`, sized per [`IndexSizes`].
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct TableIndex<T>(pub usize, PhantomData<T>);

impl<T> Debug for TableIndex<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "TableIndex({})", self.0)
	}
}

impl<T: Table> FromByteStream for TableIndex<T> {
	type Deps = IndexSizes;
	fn read(stream: &mut Cursor<&[u8]>, sizes: &Self::Deps) -> std::io::Result<Self> {
		let size = sizes.tables[T::KIND as usize];
		let mut bytes = 0usize.to_ne_bytes();
		stream.read_exact(&mut bytes[..size])?;
		Ok(Self(usize::from_le_bytes(bytes), PhantomData))
	}
}

impl<T: Table> SizeOf<TableIndex<T>> for IndexSizes {
	fn size_of(&self) -> usize {
		self.tables[T::KIND as usize]
	}
}

macro_rules! define_row {
	($name: ident = $kind: ident { $($field: ident : $ty: ty),* $(,)? }) => {
		#[derive(Debug, Clone)]
		pub struct $name {
			$(pub $field: $ty),*
		}

		impl Table for $name {
			const KIND: TableKind = TableKind::$kind;
		}

		impl FromByteStream for $name {
			type Deps = IndexSizes;
			fn read(stream: &mut Cursor<&[u8]>, sizes: &Self::Deps) -> std::io::Result<Self> {
				Ok(Self { $($field: <$ty as FromByteStream>::read(stream, sizes.as_ref())?),* })
			}
		}

		impl $name {
			pub fn row_size(sizes: &IndexSizes) -> usize {
				0 $(+ <IndexSizes as SizeOf<$ty>>::size_of(sizes))*
			}
		}
	};
}

bitflags! {
	#[derive(Debug, Copy, Clone, Eq, PartialEq)]
	pub struct TypeAttributes: u32 {
		const PUBLIC = 0x1;
		const NESTED_PUBLIC = 0x2;
		const NESTED_PRIVATE = 0x3;
		const SEALED = 0x100;
		const INTERFACE = 0x20;
		const ABSTRACT = 0x80;
		const SPECIAL_NAME = 0x400;
		const IMPORT = 0x1000;
		const SERIALIZABLE = 0x2000;
		const BEFORE_FIELD_INIT = 0x00100000;
	}

	#[derive(Debug, Copy, Clone, Eq, PartialEq)]
	pub struct FieldAttributes: u16 {
		const PRIVATE = 0x1;
		const FAM_AND_ASSEM = 0x2;
		const ASSEMBLY = 0x3;
		const FAMILY = 0x4;
		const FAM_OR_ASSEM = 0x5;
		const PUBLIC = 0x6;
		const STATIC = 0x10;
		const INIT_ONLY = 0x20;
		const LITERAL = 0x40;
		const NOT_SERIALIZED = 0x80;
		const SPECIAL_NAME = 0x200;
		const PINVOKE_IMPL = 0x2000;
		const HAS_FIELD_RVA = 0x100;
	}

	#[derive(Debug, Copy, Clone, Eq, PartialEq)]
	pub struct MethodAttributes: u16 {
		const PRIVATE = 0x1;
		const FAM_AND_ASSEM = 0x2;
		const ASSEMBLY = 0x3;
		const FAMILY = 0x4;
		const FAM_OR_ASSEM = 0x5;
		const PUBLIC = 0x6;
		const STATIC = 0x10;
		const FINAL = 0x20;
		const VIRTUAL = 0x40;
		const HIDE_BY_SIG = 0x80;
		const NEW_SLOT = 0x100;
		const ABSTRACT = 0x400;
		const SPECIAL_NAME = 0x800;
		const PINVOKE_IMPL = 0x2000;
		const RT_SPECIAL_NAME = 0x1000;
		const STATIC_INIT = 0x0;
	}

	#[derive(Debug, Copy, Clone, Eq, PartialEq)]
	pub struct MethodImplAttributes: u16 {
		const IL = 0x0;
		const NATIVE = 0x1;
		const RUNTIME = 0x3;
		const INTERNAL_CALL = 0x1000;
		const SYNCHRONIZED = 0x20;
		const NO_INLINING = 0x8;
		const FORWARD_REF = 0x10;
		const PRESERVE_SIG = 0x80;
	}

	#[derive(Debug, Copy, Clone, Eq, PartialEq)]
	pub struct ParamAttributes: u16 {
		const IN = 0x1;
		const OUT = 0x2;
		const OPTIONAL = 0x10;
		const HAS_DEFAULT = 0x1000;
	}

	#[derive(Debug, Copy, Clone, Eq, PartialEq)]
	pub struct PInvokeAttributes: u16 {
		const NO_MANGLE = 0x1;
		const CHAR_SET_ANSI = 0x2;
		const CHAR_SET_UNICODE = 0x4;
		const SUPPORTS_LAST_ERROR = 0x40;
		const CALL_CONV_WINAPI = 0x100;
		const CALL_CONV_CDECL = 0x200;
		const CALL_CONV_STDCALL = 0x300;
	}

	#[derive(Debug, Copy, Clone, Eq, PartialEq)]
	pub struct AssemblyFlags: u32 {
		const PUBLIC_KEY = 0x1;
		const RETARGETABLE = 0x100;
	}

	#[derive(Debug, Copy, Clone, Eq, PartialEq)]
	pub struct ManifestResourceAttributes: u32 {
		const PUBLIC = 0x1;
		const PRIVATE = 0x2;
	}

	#[derive(Debug, Copy, Clone, Eq, PartialEq)]
	pub struct GenericParamAttributes: u16 {
		const COVARIANT = 0x1;
		const CONTRAVARIANT = 0x2;
		const REFERENCE_TYPE_CONSTRAINT = 0x4;
		const NOT_NULLABLE_VALUE_TYPE_CONSTRAINT = 0x8;
		const DEFAULT_CONSTRUCTOR_CONSTRAINT = 0x10;
	}
}

crate::utilities::impl_from_byte_stream_pod!(TypeAttributes);
crate::utilities::impl_from_byte_stream_pod!(FieldAttributes);
crate::utilities::impl_from_byte_stream_pod!(MethodAttributes);
crate::utilities::impl_from_byte_stream_pod!(MethodImplAttributes);
crate::utilities::impl_from_byte_stream_pod!(ParamAttributes);
crate::utilities::impl_from_byte_stream_pod!(PInvokeAttributes);
crate::utilities::impl_from_byte_stream_pod!(AssemblyFlags);
crate::utilities::impl_from_byte_stream_pod!(ManifestResourceAttributes);
crate::utilities::impl_from_byte_stream_pod!(GenericParamAttributes);

impl SizeOf<TypeAttributes> for IndexSizes {
	fn size_of(&self) -> usize {
		4
	}
}
impl SizeOf<AssemblyFlags> for IndexSizes {
	fn size_of(&self) -> usize {
		4
	}
}
impl SizeOf<ManifestResourceAttributes> for IndexSizes {
	fn size_of(&self) -> usize {
		4
	}
}
macro_rules! impl_size_of_u16_flags {
	($($ty: ty),*) => {$(impl SizeOf<$ty> for IndexSizes {
		fn size_of(&self) -> usize { 2 }
	})*};
}
impl_size_of_u16_flags!(FieldAttributes, MethodAttributes, MethodImplAttributes, ParamAttributes, PInvokeAttributes, GenericParamAttributes);

define_row!(Module = Module {
	generation: u16,
	name: StringIndex,
	mvid: GuidIndex,
	enc_id: GuidIndex,
	enc_base_id: GuidIndex,
});

define_row!(TypeRef = TypeRef {
	resolution_scope: ResolutionScope,
	type_name: StringIndex,
	type_namespace: StringIndex,
});

define_row!(TypeDef = TypeDef {
	flags: TypeAttributes,
	type_name: StringIndex,
	type_namespace: StringIndex,
	extends: TypeDefOrRef,
	field_list: TableIndex<Field>,
	method_list: TableIndex<MethodDef>,
});

define_row!(Field = Field {
	flags: FieldAttributes,
	name: StringIndex,
	signature: BlobIndex,
});

define_row!(MethodDef = MethodDef {
	rva: u32,
	impl_flags: MethodImplAttributes,
	flags: MethodAttributes,
	name: StringIndex,
	signature: BlobIndex,
	param_list: TableIndex<Param>,
});

define_row!(Param = Param {
	flags: ParamAttributes,
	sequence: u16,
	name: StringIndex,
});

define_row!(InterfaceImpl = InterfaceImpl {
	class: TableIndex<TypeDef>,
	interface: TypeDefOrRef,
});

define_row!(MemberRef = MemberRef {
	class: MemberRefParent,
	name: StringIndex,
	signature: BlobIndex,
});

define_row!(Constant = Constant {
	kind: u8,
	padding: u8,
	parent: HasConstant,
	value: BlobIndex,
});

define_row!(CustomAttribute = CustomAttribute {
	parent: HasCustomAttribute,
	attribute_type: CustomAttributeType,
	value: BlobIndex,
});

define_row!(FieldMarshal = FieldMarshal {
	parent: HasFieldMarshal,
	native_type: BlobIndex,
});

define_row!(DeclSecurity = DeclSecurity {
	action: u16,
	parent: HasDeclSecurity,
	permission_set: BlobIndex,
});

define_row!(ClassLayout = ClassLayout {
	packing_size: u16,
	class_size: u32,
	parent: TableIndex<TypeDef>,
});

define_row!(FieldLayout = FieldLayout {
	offset: u32,
	field: TableIndex<Field>,
});

define_row!(StandAloneSig = StandAloneSig { signature: BlobIndex });

define_row!(EventMap = EventMap {
	parent: TableIndex<TypeDef>,
	event_list: TableIndex<Event>,
});

define_row!(Event = Event {
	event_flags: u16,
	name: StringIndex,
	event_type: TypeDefOrRef,
});

define_row!(PropertyMap = PropertyMap {
	parent: TableIndex<TypeDef>,
	property_list: TableIndex<Property>,
});

define_row!(Property = Property {
	flags: u16,
	name: StringIndex,
	kind: BlobIndex,
});

define_row!(MethodSemantics = MethodSemantics {
	semantics: u16,
	method: TableIndex<MethodDef>,
	association: HasSemantics,
});

define_row!(MethodImpl = MethodImpl {
	class: TableIndex<TypeDef>,
	method_body: MethodDefOrRef,
	method_declaration: MethodDefOrRef,
});

define_row!(ModuleRef = ModuleRef { name: StringIndex });

define_row!(TypeSpec = TypeSpec { signature: BlobIndex });

define_row!(ImplMap = ImplMap {
	mapping_flags: PInvokeAttributes,
	member_forwarded: MemberForwarded,
	import_name: StringIndex,
	import_scope: TableIndex<ModuleRef>,
});

define_row!(FieldRVA = FieldRVA {
	rva: u32,
	field: TableIndex<Field>,
});

define_row!(Assembly = Assembly {
	hash_alg_id: u32,
	major_version: u16,
	minor_version: u16,
	build_number: u16,
	revision_number: u16,
	flags: AssemblyFlags,
	public_key: BlobIndex,
	name: StringIndex,
	culture: StringIndex,
});

define_row!(AssemblyRef = AssemblyRef {
	major_version: u16,
	minor_version: u16,
	build_number: u16,
	revision_number: u16,
	flags: AssemblyFlags,
	public_key_or_token: BlobIndex,
	name: StringIndex,
	culture: StringIndex,
	hash_value: BlobIndex,
});

define_row!(File = File {
	flags: u32,
	name: StringIndex,
	hash_value: BlobIndex,
});

define_row!(ExportedType = ExportedType {
	flags: TypeAttributes,
	type_def_id: u32,
	type_name: StringIndex,
	type_namespace: StringIndex,
	implementation: Implementation,
});

define_row!(ManifestResource = ManifestResource {
	offset: u32,
	flags: ManifestResourceAttributes,
	name: StringIndex,
	implementation: Implementation,
});

define_row!(NestedClass = NestedClass {
	nested_class: TableIndex<TypeDef>,
	enclosing_class: TableIndex<TypeDef>,
});

define_row!(GenericParam = GenericParam {
	number: u16,
	flags: GenericParamAttributes,
	owner: TypeOrMethodDef,
	name: StringIndex,
});

define_row!(MethodSpec = MethodSpec {
	method: MethodDefOrRef,
	instantiation: BlobIndex,
});

define_row!(GenericParamConstraint = GenericParamConstraint {
	owner: TableIndex<GenericParam>,
	constraint: TypeDefOrRef,
});

fn row_size_of(kind: TableKind, sizes: &IndexSizes) -> usize {
	macro_rules! dispatch {
		($($id: ident),* $(,)?) => {
			match kind {
				$(TableKind::$id => $id::row_size(sizes),)*
				TableKind::GenericParamConstraint => GenericParamConstraint::row_size(sizes),
			}
		};
	}
	dispatch!(
		Module, TypeRef, TypeDef, Field, MethodDef, Param, InterfaceImpl, MemberRef, Constant, CustomAttribute,
		FieldMarshal, DeclSecurity, ClassLayout, FieldLayout, StandAloneSig, EventMap, Event, PropertyMap, Property,
		MethodSemantics, MethodImpl, ModuleRef, TypeSpec, ImplMap, FieldRVA, Assembly, AssemblyRef, File,
		ExportedType, ManifestResource, NestedClass, GenericParam, MethodSpec
	)
}

/// The `#~` stream: header, per-table row counts, index-size contract, and typed row decode.
pub struct TableHeap<'l> {
	sizes: IndexSizes,
	row_counts: [u32; 55],
	slices: [Option<&'l [u8]>; 55],
}

impl<'l> TryFrom<&'l [u8]> for TableHeap<'l> {
	type Error = Error;
	fn try_from(data: &'l [u8]) -> Result<Self, Self::Error> {
		let mut stream = Cursor::new(data);
		let _reserved = u32::read(&mut stream, &())?;
		let _major_version = u8::read(&mut stream, &())?;
		let _minor_version = u8::read(&mut stream, &())?;
		let heap_sizes = u8::read(&mut stream, &())?;
		let _reserved2 = u8::read(&mut stream, &())?;
		let valid = u64::read(&mut stream, &())?;
		let _sorted = u64::read(&mut stream, &())?;

		// Bit position in `Valid` equals the table id (ECMA-335 §II.24.2.6), not a sequential index.
		let present: Vec<TableKind> = enumerate_set_bits(valid)
			.map(|bit| TableKind::try_from(bit as u8).map_err(|_| Error::new(ErrorKind::InvalidData, "Unsupported table id")))
			.collect::<Result<_, _>>()?;

		let mut row_counts = [0u32; 55];
		for kind in &present {
			row_counts[*kind as usize] = u32::read(&mut stream, &())?;
		}

		let sizes = IndexSizes::new(heap_sizes, &row_counts);

		let mut slices = [None; 55];
		for kind in present {
			let row_size = row_size_of(kind, &sizes);
			let byte_len = row_size * row_counts[kind as usize] as usize;
			let start = stream.position() as usize;
			let end = start + byte_len;
			let slice = data.get(start..end).ok_or_else(|| Error::new(ErrorKind::InvalidData, "Table out of bounds"))?;
			slices[kind as usize] = Some(slice);
			stream.set_position(end as u64);
		}

		Ok(Self { sizes, row_counts, slices })
	}
}

impl<'l> TableHeap<'l> {
	pub fn row_count(&self, kind: TableKind) -> u32 {
		self.row_counts[kind as usize]
	}

	pub fn index_sizes(&self) -> &IndexSizes {
		&self.sizes
	}

	/// Decodes every row of table `T`. Tables absent from `Valid` decode to an empty vec.
	pub fn rows<T: Table + FromByteStream<Deps = IndexSizes>>(&self) -> std::io::Result<Vec<T>> {
		let count = self.row_counts[T::KIND as usize] as usize;
		let Some(data) = self.slices[T::KIND as usize] else {
			return Ok(Vec::new());
		};
		let mut stream = Cursor::new(data);
		let mut rows = Vec::with_capacity(count);
		for _ in 0..count {
			rows.push(T::read(&mut stream, &self.sizes)?);
		}
		Ok(rows)
	}

	/// Decodes a single 1-based row of table `T` without materializing the whole table.
	pub fn row<T: Table + FromByteStream<Deps = IndexSizes>>(&self, index: TableIndex<T>) -> std::io::Result<T> {
		if index.0 == 0 {
			return Err(Error::new(ErrorKind::InvalidData, "Row index 0 is not addressable"));
		}
		let row_size = row_size_of(T::KIND, &self.sizes);
		let data = self.slices[T::KIND as usize].ok_or_else(|| Error::new(ErrorKind::InvalidData, "Table absent"))?;
		let start = (index.0 - 1) * row_size;
		let slice = data.get(start..start + row_size).ok_or(ErrorKind::UnexpectedEof)?;
		let mut stream = Cursor::new(slice);
		T::read(&mut stream, &self.sizes)
	}
}

impl Debug for TableHeap<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TableHeap").field("row_counts", &self.row_counts).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_data() -> Vec<u8> {
		let mut data = vec![0u8; 4 + 1 + 1 + 1 + 1 + 8 + 8];
		// heapSizes = 0 (all 2-byte heap indices)
		data[6] = 0;
		// Valid bitvector: only Module (bit 0)
		let valid: u64 = 1;
		data[8..16].copy_from_slice(&valid.to_le_bytes());

		// row count for Module: 1
		data.extend_from_slice(&1u32.to_le_bytes());
		// Module row: generation(u16)=0, name(u16)=1, mvid(u16)=1, enc_id(u16)=0, enc_base_id(u16)=0
		data.extend_from_slice(&0u16.to_le_bytes());
		data.extend_from_slice(&1u16.to_le_bytes());
		data.extend_from_slice(&1u16.to_le_bytes());
		data.extend_from_slice(&0u16.to_le_bytes());
		data.extend_from_slice(&0u16.to_le_bytes());
		data
	}

	#[test]
	fn parses_module_only_heap() {
		let data = sample_data();
		let heap = TableHeap::try_from(&data[..]).unwrap();
		assert_eq!(heap.row_count(TableKind::Module), 1);
		assert_eq!(heap.row_count(TableKind::TypeDef), 0);

		let rows = heap.rows::<Module>().unwrap();
		assert_eq!(rows.len(), 1);
		assert_eq!(rows[0].name, StringIndex(1));
	}

	#[test]
	fn absent_table_decodes_empty() {
		let data = sample_data();
		let heap = TableHeap::try_from(&data[..]).unwrap();
		assert!(heap.rows::<TypeDef>().unwrap().is_empty());
	}
}
