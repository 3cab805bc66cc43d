//! Component C — metadata stream directory, plus the top-level `Assembly` entry point.

use std::fmt::Debug;
use std::io::{Cursor, Error, ErrorKind};

use crate::errors::{Error as ClrError, Result};
use crate::heaps::{BlobHeap, GuidHeap, MetadataHeap, StringHeap, TableHeap, UserStringHeap};
use crate::loader::LoadedAssembly;
use crate::pe::PEFile;
use crate::utilities::FromByteStream;

/// Data Directory entry 14 of the PE optional header: the CLI header (ECMA-335 §II.25.3.3).
const CLI_HEADER_DIRECTORY: usize = 14;

#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CLIHeader {
	pub size_bytes: u32,
	pub major_runtime_version: u16,
	pub minor_runtime_version: u16,
	pub metadata_rva: u32,
	pub metadata_size: u32,
	pub flags: u32,
	pub entry_point_token: u32,
	pub resources_rva: u32,
	pub resources_size: u32,
	pub strong_name_signature_rva: u32,
	pub strong_name_signature_size: u32,
	pub code_manager_table_rva: u32,
	pub code_manager_table_size: u32,
	pub vtable_fixups_rva: u32,
	pub vtable_fixups_size: u32,
	pub export_address_table_jumps_rva: u32,
	pub export_address_table_jumps_size: u32,
	pub managed_native_header_rva: u32,
	pub managed_native_header_size: u32,
}

crate::utilities::impl_from_byte_stream_pod!(CLIHeader);

/// The parsed metadata root: magic-validated header plus the five named streams.
pub struct MetadataRoot<'l> {
	pub major_version: u16,
	pub minor_version: u16,
	pub version: String,
	pub blob: Option<BlobHeap<'l>>,
	pub guid: Option<GuidHeap<'l>>,
	pub table: Option<TableHeap<'l>>,
	pub string: Option<StringHeap<'l>>,
	pub user_string: Option<UserStringHeap<'l>>,
}

impl<'l> MetadataRoot<'l> {
	#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
	pub fn read(root: &'l [u8]) -> std::io::Result<Self> {
		let mut stream = Cursor::new(root);

		let magic = <[u8; 4]>::read(&mut stream, &())?;
		if magic != *b"BSJB" {
			return Err(Error::new(ErrorKind::InvalidData, "Missing metadata root magic"));
		}

		let major_version = u16::read(&mut stream, &())?;
		let minor_version = u16::read(&mut stream, &())?;
		let _reserved = u32::read(&mut stream, &())?;

		let version_length = u32::read(&mut stream, &())? as usize;
		let mut version_buf = vec![0u8; version_length];
		version_buf.copy_from_slice(&root[stream.position() as usize..stream.position() as usize + version_length]);
		let version = String::from_utf8_lossy(&version_buf).trim_end_matches('\0').to_owned();
		stream.set_position(stream.position() + version_length as u64);

		let _flags = u16::read(&mut stream, &())?;
		let stream_count = u16::read(&mut stream, &())?;

		let mut this = Self { major_version, minor_version, version, blob: None, guid: None, table: None, string: None, user_string: None };

		for _ in 0..stream_count {
			match MetadataHeap::read(&mut stream, root)? {
				MetadataHeap::Blob(heap) => this.blob = Some(heap),
				MetadataHeap::Guid(heap) => this.guid = Some(heap),
				MetadataHeap::Table(heap) => this.table = Some(heap),
				MetadataHeap::String(heap) => this.string = Some(heap),
				MetadataHeap::UserString(heap) => this.user_string = Some(heap),
			}
		}

		Ok(this)
	}

	pub fn table(&self) -> std::io::Result<&TableHeap<'l>> {
		self.table.as_ref().ok_or_else(|| Error::new(ErrorKind::InvalidData, "Metadata root has no #~ stream"))
	}
}

/// Fetches one of the metadata root's heaps by type, for generic code that only cares about a
/// single heap kind.
pub trait GetHeap<'l, T> {
	fn get_heap(&self) -> Option<&T>;
}

macro_rules! impl_get_heap {
	($field: ident : $ty: ty) => {
		impl<'l> GetHeap<'l, $ty> for MetadataRoot<'l> {
			fn get_heap(&self) -> Option<&$ty> {
				self.$field.as_ref()
			}
		}
	};
}

impl_get_heap!(blob: BlobHeap<'l>);
impl_get_heap!(guid: GuidHeap<'l>);
impl_get_heap!(table: TableHeap<'l>);
impl_get_heap!(string: StringHeap<'l>);
impl_get_heap!(user_string: UserStringHeap<'l>);

/// The top-level handle: a parsed PE image, its metadata root, and the resolved descriptor
/// arrays produced by the loader.
pub struct Assembly<'l> {
	pub pe: PEFile<'l>,
	pub cli_header: CLIHeader,
	pub metadata: MetadataRoot<'l>,
	pub loaded: LoadedAssembly,
}

impl<'l> Assembly<'l> {
	#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
	pub fn load_from_bytes(data: &'l [u8]) -> Result<Self> {
		let pe = PEFile::read(data).map_err(|e| ClrError::bad_image(e.to_string()))?;

		let directory = pe
			.data_directory(CLI_HEADER_DIRECTORY)
			.filter(|d| d.virtual_address != 0)
			.ok_or_else(|| ClrError::bad_image("Missing CLI header directory entry"))?;

		let cli_header_bytes =
			pe.resolve_rva(directory.virtual_address).ok_or_else(|| ClrError::bad_image("CLI header RVA out of range"))?;
		let mut cli_stream = Cursor::new(cli_header_bytes);
		let cli_header = CLIHeader::read(&mut cli_stream, &()).map_err(|e| ClrError::bad_image(e.to_string()))?;

		let metadata_root_bytes = pe
			.resolve_rva(cli_header.metadata_rva)
			.and_then(|s| s.get(..cli_header.metadata_size as usize))
			.ok_or_else(|| ClrError::bad_image("Metadata root RVA out of range"))?;
		let metadata = MetadataRoot::read(metadata_root_bytes).map_err(|e| ClrError::bad_image(e.to_string()))?;

		let loaded = LoadedAssembly::load(&metadata, &pe)?;

		Ok(Self { pe, cli_header, metadata, loaded })
	}

	/// Memory-maps `path` and returns the mapping. The caller keeps it alive and passes
	/// `&mapping[..]` to [`Assembly::load_from_bytes`]: the image outlives every descriptor
	/// derived from it, so there is no owning, self-referential assembly type here.
	#[cfg(feature = "memmap2")]
	pub fn map_file(path: impl AsRef<std::path::Path>) -> Result<memmap2::Mmap> {
		let file = std::fs::File::open(path).map_err(ClrError::from)?;
		unsafe { memmap2::Mmap::map(&file) }.map_err(ClrError::from)
	}
}
