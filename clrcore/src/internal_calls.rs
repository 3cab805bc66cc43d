//! Component H — internal-call (ECall) registry: name → native entry-point binding.

use fxhash::FxHashMap;

/// A native entry point bound to an internal-call method, plus its declared parameter count.
#[derive(Debug, Copy, Clone)]
pub struct InternalCallEntry {
	pub entry_point: *const (),
	pub params_count: u32,
}

// Raw pointers aren't `Send`/`Sync` by default; the registry is built once at startup and only
// ever read afterward.
unsafe impl Send for InternalCallEntry {}
unsafe impl Sync for InternalCallEntry {}

/// Keyed by the fully qualified `Namespace.Type::Method` identifier.
#[derive(Debug, Default)]
pub struct InternalCallRegistry {
	entries: FxHashMap<String, InternalCallEntry>,
}

impl InternalCallRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&mut self, qualified_name: impl Into<String>, entry_point: *const (), params_count: u32) {
		self.entries.insert(qualified_name.into(), InternalCallEntry { entry_point, params_count });
	}

	/// Exact-match lookup; a miss for a method marked `InternalCall` is fatal at load time.
	pub fn lookup(&self, qualified_name: &str) -> Option<InternalCallEntry> {
		self.entries.get(qualified_name).copied()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exact_match_lookup() {
		let mut registry = InternalCallRegistry::new();
		registry.register("System.Math::Sqrt", std::ptr::null(), 1);
		assert!(registry.lookup("System.Math::Sqrt").is_some());
		assert!(registry.lookup("System.Math::Sin").is_none());
	}
}
