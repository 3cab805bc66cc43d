//! Hand-assembled PE+CLI+metadata images exercising end-to-end load scenarios.
//!
//! Scenarios 3 (fat method header), 5 (string intrinsics) and 6 (delegate combine) are covered
//! by unit tests in `il.rs` and `intrinsics.rs`, which exercise the same decode paths without
//! needing a full synthetic PE image.

use std::collections::HashMap;

use clrcore::internal_calls::InternalCallRegistry;
use clrcore::loader::{LoadedAssembly, MethodBodyKind};
use clrcore::Assembly;

const SECTION_VA: u32 = 0x2000;
const OPTIONAL_HEADER_SIZE: u16 = 224;
const CLI_HEADER_SIZE: u32 = 72;

fn u16le(v: u16) -> [u8; 2] {
	v.to_le_bytes()
}
fn u32le(v: u32) -> [u8; 4] {
	v.to_le_bytes()
}

fn padded_name(name: &str) -> Vec<u8> {
	let mut bytes = name.as_bytes().to_vec();
	bytes.push(0);
	while !bytes.len().is_multiple_of(4) {
		bytes.push(0);
	}
	bytes
}

fn pad4(bytes: &mut Vec<u8>) {
	while !bytes.len().is_multiple_of(4) {
		bytes.push(0);
	}
}

/// Builds the `#~` stream body for a fixed table set: `Module` (optional), exactly one `TypeDef`,
/// and the given `MethodDef`/`Field` rows. All heap indices are 2 bytes (`heapSizes = 0`).
#[derive(Default)]
struct TablesFixture {
	include_module: bool,
	type_name: u32,
	method_defs: Vec<MethodDefFixture>,
	field_defs: Vec<FieldDefFixture>,
}

struct MethodDefFixture {
	rva: u32,
	impl_flags: u16,
	flags: u16,
	name: u32,
	signature: u32,
}

struct FieldDefFixture {
	flags: u16,
	name: u32,
	signature: u32,
}

impl TablesFixture {
	fn build(&self) -> Vec<u8> {
		let mut out = Vec::new();
		out.extend_from_slice(&u32le(0)); // reserved
		out.push(1);
		out.push(0);
		out.push(0); // heapSizes
		out.push(1); // reserved

		let mut valid: u64 = (1 << 0x02) | (1 << 0x06) | (1 << 0x04);
		if self.include_module {
			valid |= 1 << 0x00;
		}
		out.extend_from_slice(&valid.to_le_bytes());
		out.extend_from_slice(&0u64.to_le_bytes());

		// Row counts follow ascending table-id order: TypeDef(0x02) < Field(0x04) < MethodDef(0x06).
		if self.include_module {
			out.extend_from_slice(&u32le(1));
		}
		out.extend_from_slice(&u32le(1)); // TypeDef rows
		out.extend_from_slice(&u32le(self.field_defs.len() as u32));
		out.extend_from_slice(&u32le(self.method_defs.len() as u32));

		if self.include_module {
			out.extend_from_slice(&[0u8; 10]); // generation, name, mvid, enc_id, enc_base_id
		}

		// TypeDef: flags(u32), name(u16), namespace(u16), extends(u16), field_list(u16), method_list(u16)
		out.extend_from_slice(&u32le(0x00100001));
		out.extend_from_slice(&u16le(self.type_name as u16));
		out.extend_from_slice(&u16le(0));
		out.extend_from_slice(&u16le(0));
		out.extend_from_slice(&u16le(1));
		out.extend_from_slice(&u16le(1));

		for f in &self.field_defs {
			out.extend_from_slice(&u16le(f.flags));
			out.extend_from_slice(&u16le(f.name as u16));
			out.extend_from_slice(&u16le(f.signature as u16));
		}

		for m in &self.method_defs {
			out.extend_from_slice(&u32le(m.rva));
			out.extend_from_slice(&u16le(m.impl_flags));
			out.extend_from_slice(&u16le(m.flags));
			out.extend_from_slice(&u16le(m.name as u16));
			out.extend_from_slice(&u16le(m.signature as u16));
			out.extend_from_slice(&u16le(1)); // param_list
		}

		out
	}
}

#[derive(Default)]
struct StringHeapFixture {
	data: Vec<u8>,
	offsets: HashMap<String, u32>,
}

impl StringHeapFixture {
	fn new() -> Self {
		Self { data: vec![0], offsets: HashMap::new() }
	}

	fn intern(&mut self, s: &str) -> u32 {
		if let Some(offset) = self.offsets.get(s) {
			return *offset;
		}
		let offset = self.data.len() as u32;
		self.data.extend_from_slice(s.as_bytes());
		self.data.push(0);
		self.offsets.insert(s.to_owned(), offset);
		offset
	}
}

#[derive(Default)]
struct BlobHeapFixture {
	data: Vec<u8>,
}

impl BlobHeapFixture {
	fn new() -> Self {
		Self { data: vec![0] }
	}

	fn push(&mut self, bytes: &[u8]) -> u32 {
		let offset = self.data.len() as u32;
		self.data.push(bytes.len() as u8);
		self.data.extend_from_slice(bytes);
		offset
	}
}

/// Assembles a full PE image: one `.text` section containing, in order, the method code bodies
/// (so their RVAs are known before the tables stream references them), the CLI header, and the
/// BSJB metadata root.
struct ImageFixture {
	code: Vec<u8>,
}

impl ImageFixture {
	fn new() -> Self {
		Self { code: Vec::new() }
	}

	fn push_code(&mut self, bytes: &[u8]) -> u32 {
		let rva = SECTION_VA + self.code.len() as u32;
		self.code.extend_from_slice(bytes);
		pad4(&mut self.code);
		rva
	}

	fn build(self, tables: Vec<u8>, strings: Vec<u8>, blobs: Vec<u8>) -> Vec<u8> {
		let streams: Vec<(&str, Vec<u8>)> = {
			let mut v = vec![("#~", tables), ("#Strings", strings)];
			if blobs.len() > 1 {
				v.push(("#Blob", blobs));
			}
			v
		};

		let mut root = Vec::new();
		root.extend_from_slice(b"BSJB");
		root.extend_from_slice(&u16le(1));
		root.extend_from_slice(&u16le(1));
		root.extend_from_slice(&u32le(0));
		let version = padded_name("v4.0.30319");
		root.extend_from_slice(&u32le(version.len() as u32));
		root.extend_from_slice(&version);
		root.extend_from_slice(&u16le(0));
		root.extend_from_slice(&u16le(streams.len() as u16));

		let prefix_len = root.len();
		let directory_entry_size = |name: &str| 8 + padded_name(name).len();
		let directory_size: usize = streams.iter().map(|(n, _)| directory_entry_size(n)).sum();
		let directory_start = prefix_len + directory_size;

		let mut body_cursor = 0usize;
		for (name, body) in &streams {
			root.extend_from_slice(&u32le((directory_start + body_cursor) as u32));
			root.extend_from_slice(&u32le(body.len() as u32));
			root.extend_from_slice(&padded_name(name));
			let mut padded_len = body.len();
			while padded_len % 4 != 0 {
				padded_len += 1;
			}
			body_cursor += padded_len;
		}
		for (_, body) in &streams {
			let mut padded = body.clone();
			pad4(&mut padded);
			root.extend_from_slice(&padded);
		}

		let mut section = self.code;
		let cli_header_rva = SECTION_VA + section.len() as u32;
		let metadata_rva = cli_header_rva + CLI_HEADER_SIZE;

		let mut cli_header = Vec::new();
		cli_header.extend_from_slice(&u32le(CLI_HEADER_SIZE));
		cli_header.extend_from_slice(&u16le(2));
		cli_header.extend_from_slice(&u16le(5));
		cli_header.extend_from_slice(&u32le(metadata_rva));
		cli_header.extend_from_slice(&u32le(root.len() as u32));
		cli_header.extend_from_slice(&u32le(1));
		cli_header.resize(CLI_HEADER_SIZE as usize, 0);

		section.extend_from_slice(&cli_header);
		section.extend_from_slice(&root);
		pad4(&mut section);

		build_pe(section, cli_header_rva)
	}
}

fn build_pe(mut section_data: Vec<u8>, cli_header_rva: u32) -> Vec<u8> {
	pad4(&mut section_data);

	let mut image = vec![0u8; 64];
	image[0] = b'M';
	image[1] = b'Z';
	image[60..64].copy_from_slice(&u32le(64));

	image.extend_from_slice(b"PE\0\0");
	image.extend_from_slice(&u16le(0x14c));
	image.extend_from_slice(&u16le(1));
	image.extend_from_slice(&u32le(0));
	image.extend_from_slice(&u32le(0));
	image.extend_from_slice(&u32le(0));
	image.extend_from_slice(&u16le(OPTIONAL_HEADER_SIZE));
	image.extend_from_slice(&u16le(0x0102));

	let optional_header_start = image.len();
	image.extend_from_slice(&u16le(0x010B));
	image.push(0);
	image.push(0);
	image.extend_from_slice(&u32le(0));
	image.extend_from_slice(&u32le(0));
	image.extend_from_slice(&u32le(0));
	image.extend_from_slice(&u32le(0));
	image.extend_from_slice(&u32le(0));
	image.extend_from_slice(&u32le(0));
	image.extend_from_slice(&u32le(0x400000));
	image.extend_from_slice(&u32le(0x1000));
	image.extend_from_slice(&u32le(0x200));
	image.extend_from_slice(&u16le(4));
	image.extend_from_slice(&u16le(0));
	image.extend_from_slice(&u16le(0));
	image.extend_from_slice(&u16le(0));
	image.extend_from_slice(&u16le(4));
	image.extend_from_slice(&u16le(0));
	image.extend_from_slice(&u32le(0));
	image.extend_from_slice(&u32le(SECTION_VA + section_data.len() as u32));
	image.extend_from_slice(&u32le(0x200));
	image.extend_from_slice(&u32le(0));
	image.extend_from_slice(&u16le(3));
	image.extend_from_slice(&u16le(0));
	image.extend_from_slice(&u32le(0x100000));
	image.extend_from_slice(&u32le(0x1000));
	image.extend_from_slice(&u32le(0x100000));
	image.extend_from_slice(&u32le(0x1000));
	image.extend_from_slice(&u32le(0));
	image.extend_from_slice(&u32le(16));

	for i in 0..16u32 {
		if i == 14 {
			image.extend_from_slice(&u32le(cli_header_rva));
			image.extend_from_slice(&u32le(CLI_HEADER_SIZE));
		} else {
			image.extend_from_slice(&u32le(0));
			image.extend_from_slice(&u32le(0));
		}
	}
	assert_eq!((image.len() - optional_header_start) as u16, OPTIONAL_HEADER_SIZE);

	let mut name = [0u8; 8];
	name[..5].copy_from_slice(b".text");
	image.extend_from_slice(&name);
	image.extend_from_slice(&u32le(section_data.len() as u32));
	image.extend_from_slice(&u32le(SECTION_VA));
	image.extend_from_slice(&u32le(section_data.len() as u32));

	let section_header_raw_data_field = image.len();
	image.extend_from_slice(&u32le(0)); // pointer_to_raw_data, patched below
	image.extend_from_slice(&u32le(0));
	image.extend_from_slice(&u32le(0));
	image.extend_from_slice(&u16le(0));
	image.extend_from_slice(&u16le(0));
	image.extend_from_slice(&u32le(0x60000020));

	while !image.len().is_multiple_of(0x200) {
		image.push(0);
	}
	let raw_data_ptr = image.len() as u32;
	image[section_header_raw_data_field..section_header_raw_data_field + 4].copy_from_slice(&u32le(raw_data_ptr));

	image.extend_from_slice(&section_data);
	image
}

#[test]
fn empty_assembly_with_only_module_row() {
	let mut strings = StringHeapFixture::new();
	strings.intern("M");

	let tables = TablesFixture { include_module: true, ..Default::default() }.build();
	let image = ImageFixture::new().build(tables, strings.data, vec![]);

	let assembly = Assembly::load_from_bytes(&image).expect("valid minimal image");
	assert_eq!(assembly.loaded.classes.len(), 1);
	assert_eq!(assembly.loaded.methods.len(), 0);
	assert_eq!(assembly.loaded.fields.len(), 0);
}

#[test]
fn tiny_method_body_decodes_single_instruction() {
	let mut strings = StringHeapFixture::new();
	let name = strings.intern("M");
	let mut blobs = BlobHeapFixture::new();
	let signature = blobs.push(&[0x00, 0x01, 0x00]); // placeholder signature bytes

	let mut fixture = ImageFixture::new();
	let rva = fixture.push_code(&[0x06, 0x2A]); // tiny header: len=1, body=RET

	let tables = TablesFixture {
		method_defs: vec![MethodDefFixture { rva, impl_flags: 0, flags: 0, name, signature }],
		..Default::default()
	}
	.build();

	let image = fixture.build(tables, strings.data, blobs.data);
	let assembly = Assembly::load_from_bytes(&image).expect("valid image with a tiny method");

	assert_eq!(assembly.loaded.methods.len(), 1);
	let method = &assembly.loaded.methods[0];
	assert_eq!(method.max_stack_size, 8);
	assert_eq!(method.name, "M");
	match &method.body {
		MethodBodyKind::Il { code } => assert_eq!(code, &vec![0x2A]),
		MethodBodyKind::ECall(_) => panic!("expected an IL body"),
	}
}

#[test]
fn internal_call_binds_to_registry_entry() {
	const INTERNAL_CALL: u16 = 0x1000;

	let mut strings = StringHeapFixture::new();
	let type_name = strings.intern("Math");
	let method_name = strings.intern("Sqrt");
	let mut blobs = BlobHeapFixture::new();
	let signature = blobs.push(&[0x00]);

	let mut fixture = ImageFixture::new();
	let _ = fixture.push_code(&[0x00, 0x00, 0x00, 0x00]); // unused padding section

	let tables = TablesFixture {
		type_name,
		method_defs: vec![MethodDefFixture { rva: 0, impl_flags: INTERNAL_CALL, flags: 0, name: method_name, signature }],
		..Default::default()
	}
	.build();

	let image = fixture.build(tables, strings.data, blobs.data);

	let mut registry = InternalCallRegistry::new();
	registry.register(".Math::Sqrt", std::ptr::null(), 1);

	let pe = clrcore::pe::PEFile::read(&image).unwrap();
	let directory = pe.data_directory(14).unwrap();
	let cli_header_bytes = pe.resolve_rva(directory.virtual_address).unwrap();
	let mut cursor = std::io::Cursor::new(cli_header_bytes);
	let cli_header = <clrcore::assembly::CLIHeader as clrcore::utilities::FromByteStream>::read(&mut cursor, &()).unwrap();
	let metadata_root_bytes = pe.resolve_rva(cli_header.metadata_rva).unwrap();
	let metadata = clrcore::assembly::MetadataRoot::read(&metadata_root_bytes[..cli_header.metadata_size as usize]).unwrap();

	let loaded = LoadedAssembly::load_with_registry(&metadata, &pe, &registry).expect("internal call resolves");
	assert_eq!(loaded.methods.len(), 1);
	assert!(loaded.methods[0].is_ecall());
}
