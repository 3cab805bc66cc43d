//! Component N — CLI front door: loads an assembly path from argv and prints a load summary.

use std::process::ExitCode;

use clrcore::heaps::tables::TableKind;
use clrcore::Assembly;

fn main() -> ExitCode {
	let Some(path) = std::env::args().nth(1) else {
		eprintln!("usage: clrcore-inspect <path-to-assembly>");
		return ExitCode::FAILURE;
	};

	#[cfg(feature = "memmap2")]
	let data = match Assembly::map_file(&path) {
		Ok(mapping) => mapping,
		Err(err) => {
			eprintln!("failed to map {path}: {err}");
			return ExitCode::FAILURE;
		},
	};
	#[cfg(not(feature = "memmap2"))]
	let data = match std::fs::read(&path) {
		Ok(data) => data,
		Err(err) => {
			eprintln!("failed to read {path}: {err}");
			return ExitCode::FAILURE;
		},
	};

	match Assembly::load_from_bytes(&data) {
		Ok(assembly) => {
			print_summary(&assembly);
			ExitCode::SUCCESS
		},
		Err(err) => {
			eprintln!("failed to load {path}: {err}");
			ExitCode::FAILURE
		},
	}
}

fn print_summary(assembly: &Assembly<'_>) {
	println!("metadata version: {}", assembly.metadata.version);

	if let Ok(table) = assembly.metadata.table() {
		for kind in [TableKind::TypeDef, TableKind::MethodDef, TableKind::Field, TableKind::MemberRef, TableKind::CustomAttribute] {
			println!("{kind:?}: {} rows", table.row_count(kind));
		}
	}

	println!(
		"loaded: {} classes, {} methods ({} internal calls), {} fields",
		assembly.loaded.classes.len(),
		assembly.loaded.methods.len(),
		assembly.loaded.methods.iter().filter(|m| m.is_ecall()).count(),
		assembly.loaded.fields.len(),
	);
}
