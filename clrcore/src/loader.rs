//! Component G — the assembly loader: materializes `EEClass`/`MethodDesc`/`FieldDesc` arrays
//! from the metadata table set.

use std::io::Cursor;

use crate::assembly::MetadataRoot;
use crate::errors::{Error, Result};
use crate::heaps::tables::{self as table_rows, MethodImplAttributes};
use crate::il::MethodBody;
use crate::internal_calls::{InternalCallEntry, InternalCallRegistry};
use crate::pe::PEFile;
use crate::signature::{read_field_signature, TypeSig};

/// The resolved, in-memory descriptor for a type definition.
#[derive(Debug, Clone)]
pub struct EEClass {
	pub namespace: String,
	pub name: String,
	pub first_method: usize,
	pub last_method: usize,
	pub first_field: usize,
	pub last_field: usize,
}

impl EEClass {
	pub fn methods(&self) -> std::ops::Range<usize> {
		self.first_method..self.last_method
	}

	pub fn fields(&self) -> std::ops::Range<usize> {
		self.first_field..self.last_field
	}
}

/// Either a raw IL body or an internal-call binding; exactly one is populated.
#[derive(Debug, Clone)]
pub enum MethodBodyKind {
	Il { code: Vec<u8> },
	ECall(InternalCallEntry),
}

#[derive(Debug, Clone)]
pub struct MethodDesc {
	pub owning_class: usize,
	pub name: String,
	pub max_stack_size: u16,
	pub body: MethodBodyKind,
}

impl MethodDesc {
	pub fn is_ecall(&self) -> bool {
		matches!(self.body, MethodBodyKind::ECall(_))
	}
}

#[derive(Debug, Clone)]
pub struct FieldDesc {
	pub owning_class: usize,
	pub name: String,
	pub signature: TypeSig,
}

/// The three parallel descriptor arrays produced by [`LoadedAssembly::load`].
#[derive(Debug, Clone, Default)]
pub struct LoadedAssembly {
	pub classes: Vec<EEClass>,
	pub methods: Vec<MethodDesc>,
	pub fields: Vec<FieldDesc>,
}

impl LoadedAssembly {
	#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
	pub fn load(metadata: &MetadataRoot<'_>, pe: &PEFile<'_>) -> Result<Self> {
		Self::load_with_registry(metadata, pe, &InternalCallRegistry::new())
	}

	#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
	pub fn load_with_registry(metadata: &MetadataRoot<'_>, pe: &PEFile<'_>, registry: &InternalCallRegistry) -> Result<Self> {
		let table = metadata.table()?;
		let strings = metadata.string.as_ref().ok_or_else(|| Error::bad_image("Metadata root has no #Strings stream"))?;
		let blobs = metadata.blob.as_ref();

		let type_defs = table.rows::<table_rows::TypeDef>().map_err(|e| Error::bad_image(e.to_string()))?;
		let method_defs = table.rows::<table_rows::MethodDef>().map_err(|e| Error::bad_image(e.to_string()))?;
		let fields = table.rows::<table_rows::Field>().map_err(|e| Error::bad_image(e.to_string()))?;

		let total_methods = method_defs.len();
		let total_fields = fields.len();

		// Pass 1: TypeDef -> class ranges. Each class's range runs up to the next class's
		// MethodList/FieldList rid, except the last, which extends to the descriptor array end.
		let mut classes = Vec::with_capacity(type_defs.len());
		for (i, row) in type_defs.iter().enumerate() {
			let type_name = strings.get(row.type_name).ok_or_else(|| Error::bad_image("TypeDef name out of range"))?;
			let type_namespace = strings.get(row.type_namespace).unwrap_or("");

			let first_method = row.method_list.0.saturating_sub(1);
			let first_field = row.field_list.0.saturating_sub(1);

			let (last_method, last_field) = match type_defs.get(i + 1) {
				Some(next) => (next.method_list.0.saturating_sub(1), next.field_list.0.saturating_sub(1)),
				None => (total_methods, total_fields),
			};

			classes.push(EEClass {
				namespace: type_namespace.to_owned(),
				name: type_name.to_owned(),
				first_method,
				last_method,
				first_field,
				last_field,
			});
		}

		// Pass 2: MethodDef -> method descriptors, bound to their owning class by range lookup.
		let mut methods = Vec::with_capacity(total_methods);
		for (i, row) in method_defs.iter().enumerate() {
			let owning_class = classes.iter().position(|c| c.methods().contains(&i)).unwrap_or(0);
			let name = strings.get(row.name).ok_or_else(|| Error::bad_image("MethodDef name out of range"))?;

			let (body, max_stack_size) = if row.impl_flags.contains(MethodImplAttributes::INTERNAL_CALL) {
				let class = &classes[owning_class];
				let qualified = format!("{}.{}::{}", class.namespace, class.name, name);
				let entry = registry
					.lookup(&qualified)
					.ok_or_else(|| Error::fatal(format!("Unresolved internal call {qualified}")))?;
				(MethodBodyKind::ECall(entry), 0)
			} else {
				let code_bytes =
					pe.resolve_rva(row.rva).ok_or_else(|| Error::bad_image("MethodDef RVA out of range"))?;
				let parsed = MethodBody::read(code_bytes).map_err(|e| Error::bad_image(e.to_string()))?;
				(MethodBodyKind::Il { code: parsed.code.to_vec() }, parsed.max_stack_size)
			};

			methods.push(MethodDesc { owning_class, name: name.to_owned(), max_stack_size, body });
		}

		// Pass 3: Field -> field descriptors, with the decoded signature type.
		let mut field_descs = Vec::with_capacity(total_fields);
		for (i, row) in fields.iter().enumerate() {
			let owning_class = classes.iter().position(|c| c.fields().contains(&i)).unwrap_or(0);
			let name = strings.get(row.name).ok_or_else(|| Error::bad_image("Field name out of range"))?;

			let signature = blobs
				.and_then(|blob_heap| blob_heap.get(row.signature))
				.ok_or_else(|| Error::bad_image("Field signature blob out of range"))
				.and_then(|bytes| {
					let mut cursor = Cursor::new(bytes);
					read_field_signature(&mut cursor).map_err(|e| Error::bad_image(e.to_string()))
				})?;

			field_descs.push(FieldDesc { owning_class, name: name.to_owned(), signature });
		}

		Ok(Self { classes, methods, fields: field_descs })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_load_produces_empty_arrays() {
		let loaded = LoadedAssembly::default();
		assert!(loaded.classes.is_empty());
		assert!(loaded.methods.is_empty());
		assert!(loaded.fields.is_empty());
	}
}
