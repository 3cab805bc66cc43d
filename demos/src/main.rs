//! Mirrors the teacher's `experiments` member: installs a tracing subscriber and loads an
//! assembly so the core's instrumentation points fire end to end.

use clrcore::Assembly;

fn main() {
	tracing_subscriber::fmt::init();

	let Some(path) = std::env::args().nth(1) else {
		eprintln!("usage: demos <path-to-assembly>");
		std::process::exit(1);
	};

	let mapping = Assembly::map_file(&path).expect("failed to map assembly file");
	let assembly = Assembly::load_from_bytes(&mapping).expect("failed to load assembly");

	tracing::info!(
		classes = assembly.loaded.classes.len(),
		methods = assembly.loaded.methods.len(),
		fields = assembly.loaded.fields.len(),
		"assembly loaded",
	);
}
