//! Component L — the error taxonomy shared by the importer, loader and intrinsic surface.

use std::borrow::Cow;
use std::fmt::{Display, Formatter};

/// Unified error type for every fallible operation in this crate.
///
/// Load-time failures (`BadImage`, `Fatal`) are meant to abort loading outright; run-time
/// failures (`IndexOutOfRange`, `InvalidOperation`) are what an interpreter would turn into a
/// managed exception thrown into the executing method.
#[derive(Debug)]
pub enum Error {
	/// Structural corruption of the image: bad stream directory, out-of-range RVA, unknown
	/// method header format, and the like.
	BadImage(Cow<'static, str>),
	/// Runtime bounds violation on array/string indexing or a non-zero dimension argument on a
	/// single-dimensional array.
	IndexOutOfRange { index: i64, length: usize },
	/// An intrinsic was invoked in a configuration this core does not support (e.g. `Array.Copy`).
	InvalidOperation(&'static str),
	/// A POSIX shim was called for a syscall this core does not service.
	Enosys(&'static str),
	/// A terminal error in the load path; the caller should treat this as a process abort.
	Fatal(Cow<'static, str>),
}

impl Error {
	pub fn bad_image(msg: impl Into<Cow<'static, str>>) -> Self {
		Self::BadImage(msg.into())
	}

	pub fn fatal(msg: impl Into<Cow<'static, str>>) -> Self {
		Self::Fatal(msg.into())
	}
}

impl Display for Error {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Error::BadImage(msg) => write!(f, "bad image: {msg}"),
			Error::IndexOutOfRange { index, length } => write!(f, "index out of range: {index} (length {length})"),
			Error::InvalidOperation(msg) => write!(f, "invalid operation: {msg}"),
			Error::Enosys(msg) => write!(f, "ENOSYS: {msg}"),
			Error::Fatal(msg) => write!(f, "fatal: {msg}"),
		}
	}
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
	fn from(value: std::io::Error) -> Self {
		Self::BadImage(Cow::Owned(value.to_string()))
	}
}

pub type Result<T> = std::result::Result<T, Error>;
