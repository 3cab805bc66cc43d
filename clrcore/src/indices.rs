//! Component E (widths) — metadata tokens, coded indices, and the resolution-widths contract.

pub mod metadata_token {
	use paste::paste;
	use std::fmt::{Debug, Formatter};
	use std::io::{Cursor, ErrorKind};

	use crate::utilities::FromByteStream;

	macro_rules! define_metadata_token {
		($($id: ident = $discriminant: literal),* $(,)?) => {
			#[repr(u32)]
			#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
			pub enum MetadataTokenKind {
				$($id = $discriminant),*
			}

			#[repr(transparent)]
			#[derive(Copy, Clone, Eq, PartialEq, Hash)]
			pub struct MetadataToken(u32);

			impl MetadataToken {
				pub fn kind(&self) -> MetadataTokenKind {
					let discriminant = (self.0 & 0xFF000000) >> 24;
					match discriminant {
						$($discriminant => MetadataTokenKind::$id,)*
						_ => unreachable!(),
					}
				}

				#[inline]
				pub fn index(&self) -> usize {
					(self.0 & 0x00FFFFFF) as usize
				}

				#[inline]
				pub fn raw(&self) -> u32 {
					self.0
				}
			}

			impl TryFrom<u32> for MetadataToken {
				type Error = ();
				fn try_from(value: u32) -> Result<Self, Self::Error> {
					let discriminant = (value & 0xFF000000) >> 24;
					match discriminant {
						$($discriminant => Ok(Self(value)),)*
						_ => Err(()),
					}
				}
			}

			paste! {
				$(
					#[repr(transparent)]
					#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
					pub struct [<$id Token>](pub usize);

					impl From<[<$id Token>]> for MetadataToken {
						fn from(value: [<$id Token>]) -> Self {
							MetadataToken(((MetadataTokenKind::$id as u32) << 24) | value.0 as u32)
						}
					}

					impl TryFrom<MetadataToken> for [<$id Token>] {
						type Error = ();
						fn try_from(value: MetadataToken) -> Result<Self, Self::Error> {
							match value.kind() {
								MetadataTokenKind::$id => Ok(Self(value.index())),
								_ => Err(()),
							}
						}
					}
				)*
			}
		};
	}

	impl Debug for MetadataToken {
		fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
			write!(f, "MetadataToken::{:?}({})", self.kind(), self.index())
		}
	}

	impl FromByteStream for MetadataToken {
		type Deps = ();
		fn read(stream: &mut Cursor<&[u8]>, _: &Self::Deps) -> std::io::Result<Self> {
			let value = u32::read(stream, &())?;
			MetadataToken::try_from(value).map_err(|_| ErrorKind::InvalidData.into())
		}
	}

	define_metadata_token! {
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
		StandAloneSig = 0x11,
		EventMap = 0x12,
		Event = 0x14,
		PropertyMap = 0x15,
		Property = 0x17,
		ModuleRef = 0x1a,
		TypeSpec = 0x1b,
		ImplMap = 0x1c,
		Assembly = 0x20,
		AssemblyRef = 0x23,
		File = 0x26,
		ExportedType = 0x27,
		ManifestResource = 0x28,
		NestedClass = 0x29,
		GenericParam = 0x2a,
		MethodSpec = 0x2b,
		GenericParamConstraint = 0x2c,

		Document = 0x30,
		MethodDebugInformation = 0x31,
		LocalScope = 0x32,
		LocalVariable = 0x33,
		LocalConstant = 0x34,
		ImportScope = 0x35,
		StateMachineMethod = 0x36,
		CustomDebugInformation = 0x37,

		String = 0x70,
	}
}

pub mod coded_index {
	use std::fmt::{Debug, Formatter};
	use std::io::{Cursor, ErrorKind, Read};

	use crate::heaps::tables::TableKind;
	use crate::indices::metadata_token::{MetadataToken, MetadataTokenKind};
	use crate::indices::sizes::{IndexSizes, SizeOf};
	use crate::utilities::{read_compressed_u32, FromByteStream};

	macro_rules! define_coded_index {
		($($id: ident: [$($variant: ident),*]),* $(,)?) => {
			#[repr(usize)]
			#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
			pub enum CodedIndexKind {
				$($id),*
			}

			$(
				/// A packed `(tag, rid)` coded index.
				#[repr(transparent)]
				#[derive(Copy, Clone, Eq, PartialEq, Hash)]
				pub struct $id(u32);

				impl Debug for $id {
					fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
						let token: MetadataToken = (*self).into();
						write!(f, "{}({:?})", stringify!($id), token)
					}
				}

				impl TryFrom<u32> for $id {
					type Error = ();
					fn try_from(value: u32) -> Result<Self, Self::Error> {
						match CodedIndexKind::$id.is_valid(value) {
							false => Err(()),
							true => Ok(Self(value)),
						}
					}
				}

				impl FromByteStream for $id {
					type Deps = IndexSizes;
					fn read(stream: &mut Cursor<&[u8]>, sizes: &Self::Deps) -> std::io::Result<Self> {
						let size = <IndexSizes as SizeOf<$id>>::size_of(sizes);
						let mut bytes = 0u32.to_ne_bytes();
						stream.read_exact(&mut bytes[..size])?;
						let value = u32::from_le_bytes(bytes);
						Self::try_from(value).map_err(|_| ErrorKind::InvalidData.into())
					}
				}

				impl SizeOf<$id> for IndexSizes {
					fn size_of(&self) -> usize {
						self.coded[CodedIndexKind::$id as usize]
					}
				}

				impl $id {
					/// Decodes a coded index written inline in a signature blob.
					pub fn read_compressed(stream: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
						let value = read_compressed_u32(stream)?;
						Self::try_from(value).map_err(|_| ErrorKind::InvalidData.into())
					}

					pub fn row_id(&self) -> usize {
						let bits = CodedIndexKind::$id.mask_bits();
						(self.0 >> bits) as usize
					}
				}

				impl From<$id> for MetadataToken {
					fn from(value: $id) -> Self {
						let bits = CodedIndexKind::$id.mask_bits();
						let token_kind = CodedIndexKind::$id.token_kind(value.0);
						let val = ((token_kind as u32) << 24) | (value.0 >> bits);
						MetadataToken::try_from(val).unwrap()
					}
				}
			)*

			const TABLES: &[&[TableKind]] = &[$(&[$(TableKind::$variant),*]),*];
			const TOKENS: &[&[MetadataTokenKind]] = &[$(&[$(MetadataTokenKind::$variant),*]),*];
		};
	}

	define_coded_index! {
		TypeDefOrRef: [TypeDef, TypeRef, TypeSpec],
		HasConstant: [Field, Param, Property],
		HasCustomAttribute: [
			MethodDef, Field, TypeRef, TypeDef, Param, InterfaceImpl, MemberRef,
			Module, DeclSecurity, Property, Event, StandAloneSig, ModuleRef,
			TypeSpec, Assembly, AssemblyRef, File, ExportedType,
			ManifestResource, GenericParam, GenericParamConstraint, MethodSpec
		],
		HasFieldMarshal: [Field, Param],
		HasDeclSecurity: [TypeDef, MethodDef, Assembly],
		MemberRefParent: [TypeDef, TypeRef, ModuleRef, MethodDef, TypeSpec],
		HasSemantics: [Event, Property],
		MethodDefOrRef: [MethodDef, MemberRef],
		MemberForwarded: [Field, MethodDef],
		Implementation: [File, AssemblyRef, ExportedType],
		CustomAttributeType: [MethodDef, MemberRef],
		ResolutionScope: [Module, ModuleRef, AssemblyRef, TypeRef],
		TypeOrMethodDef: [TypeDef, MethodDef],
	}

	impl CodedIndexKind {
		pub(crate) const COUNT: usize = TABLES.len();

		pub fn get_size(&self, table_row_counts: &[u32; 55]) -> usize {
			let bits = self.mask_bits();
			let max = TABLES[*self as usize].iter().map(|t| table_row_counts[*t as usize]).max().unwrap_or(0);
			2 + 2 * (max as usize > (1 << (16 - bits))) as usize
		}

		pub const fn mask_bits(&self) -> u32 {
			match self {
				CodedIndexKind::CustomAttributeType => 3,
				_ => {
					let tables = TABLES[*self as usize];
					32 - (tables.len() as u32 - 1).leading_zeros()
				},
			}
		}

		pub const fn mask(&self) -> u32 {
			match self {
				CodedIndexKind::CustomAttributeType => 0x7,
				_ => {
					let tables = TABLES[*self as usize];
					match tables.len() {
						0 | 1 => 0,
						_ => u32::MAX >> (32 - (32 - (tables.len() as u32 - 1).leading_zeros())),
					}
				},
			}
		}

		pub const fn is_valid(&self, value: u32) -> bool {
			let discriminant = value & self.mask();
			match self {
				CodedIndexKind::CustomAttributeType => matches!(discriminant, 2 | 3),
				_ => (discriminant as usize) < TABLES[*self as usize].len(),
			}
		}

		pub const fn token_kind(&self, value: u32) -> MetadataTokenKind {
			let discriminant = value & self.mask();
			match self {
				CodedIndexKind::CustomAttributeType => match discriminant {
					2 => MetadataTokenKind::MethodDef,
					3 => MetadataTokenKind::MemberRef,
					_ => unreachable!(),
				},
				_ => TOKENS[*self as usize][discriminant as usize],
			}
		}
	}

	pub(crate) const CODED_INDEX_KIND_COUNT: usize = CodedIndexKind::COUNT;
}

pub(crate) mod sizes {
	use crate::heaps::{BlobIndex, GuidIndex, StringIndex};
	use crate::indices::coded_index::{CodedIndexKind, CODED_INDEX_KIND_COUNT};

	/// The resolution-widths contract: index sizes computed once per stream and
	/// propagated into every row decode, never recomputed per row.
	#[derive(Debug)]
	pub struct IndexSizes {
		pub guid: usize,
		pub blob: usize,
		pub string: usize,
		pub coded: [usize; CODED_INDEX_KIND_COUNT],
		pub tables: [usize; 55],
	}

	pub trait SizeOf<T> {
		fn size_of(&self) -> usize;
	}

	impl IndexSizes {
		pub fn new(heap_sizes: u8, table_row_counts: &[u32; 55]) -> Self {
			let tables = {
				let mut tables = [0usize; 55];
				for (size, len) in tables.iter_mut().zip(table_row_counts) {
					*size = 2 + 2 * (*len >= 1 << 16) as usize;
				}
				tables
			};

			let kinds = [
				CodedIndexKind::TypeDefOrRef,
				CodedIndexKind::HasConstant,
				CodedIndexKind::HasCustomAttribute,
				CodedIndexKind::HasFieldMarshal,
				CodedIndexKind::HasDeclSecurity,
				CodedIndexKind::MemberRefParent,
				CodedIndexKind::HasSemantics,
				CodedIndexKind::MethodDefOrRef,
				CodedIndexKind::MemberForwarded,
				CodedIndexKind::Implementation,
				CodedIndexKind::CustomAttributeType,
				CodedIndexKind::ResolutionScope,
				CodedIndexKind::TypeOrMethodDef,
			];
			let coded = {
				let mut coded = [0usize; CODED_INDEX_KIND_COUNT];
				for (i, kind) in kinds.iter().enumerate() {
					coded[i] = kind.get_size(table_row_counts);
				}
				coded
			};

			Self {
				blob: 2 + 2 * ((heap_sizes & 0x4) != 0) as usize,
				guid: 2 + 2 * ((heap_sizes & 0x2) != 0) as usize,
				string: 2 + 2 * ((heap_sizes & 0x1) != 0) as usize,
				tables,
				coded,
			}
		}
	}

	impl AsRef<()> for IndexSizes {
		fn as_ref(&self) -> &() {
			&()
		}
	}
	impl AsRef<IndexSizes> for IndexSizes {
		fn as_ref(&self) -> &Self {
			self
		}
	}
	impl SizeOf<()> for IndexSizes {
		fn size_of(&self) -> usize {
			0
		}
	}
	impl<const S: usize> SizeOf<[u8; S]> for IndexSizes {
		fn size_of(&self) -> usize {
			S
		}
	}
	impl SizeOf<u8> for IndexSizes {
		fn size_of(&self) -> usize {
			1
		}
	}
	impl SizeOf<u16> for IndexSizes {
		fn size_of(&self) -> usize {
			2
		}
	}
	impl SizeOf<u32> for IndexSizes {
		fn size_of(&self) -> usize {
			4
		}
	}
	impl SizeOf<GuidIndex> for IndexSizes {
		fn size_of(&self) -> usize {
			self.guid
		}
	}
	impl SizeOf<BlobIndex> for IndexSizes {
		fn size_of(&self) -> usize {
			self.blob
		}
	}
	impl SizeOf<StringIndex> for IndexSizes {
		fn size_of(&self) -> usize {
			self.string
		}
	}
}

#[cfg(test)]
mod tests {
	use super::coded_index::*;
	use crate::heaps::tables::TableKind;

	#[test]
	fn type_def_or_ref_needs_2_bits() {
		assert_eq!(CodedIndexKind::TypeDefOrRef.mask_bits(), 2);
	}

	#[test]
	fn small_row_counts_fit_in_two_bytes() {
		let mut counts = [0u32; 55];
		counts[TableKind::TypeDef as usize] = 10;
		counts[TableKind::TypeRef as usize] = 10;
		counts[TableKind::TypeSpec as usize] = 10;
		assert_eq!(CodedIndexKind::TypeDefOrRef.get_size(&counts), 2);
	}

	#[test]
	fn large_row_counts_need_four_bytes() {
		let mut counts = [0u32; 55];
		counts[TableKind::TypeDef as usize] = 1 << 15;
		assert_eq!(CodedIndexKind::TypeDefOrRef.get_size(&counts), 4);
	}
}
