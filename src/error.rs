use core::fmt::{self, Display, Formatter};
use thiserror::Error;

/// Everything that can abort a render, refresh or strict write.
///
/// Inner routines raise one of the leaf variants and each caller layer re-wraps it in [`Error::Context`],
/// so the chain reads from the outermost operation down to the root cause.
/// [`Error::report`] prints the whole chain on one line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
	/// A strict write hit a missing intermediate segment.
	#[error("cannot set {path:?}: segment {segment:?} does not exist")]
	PathNotFound { path: String, segment: String },
	/// A write went through a [`Computed`](`crate::Computed`) value without a write-back mapping.
	#[error("cannot set {path:?}: it is computed")]
	ReadOnly { path: String },
	/// A control node is malformed or resolved to data of the wrong shape.
	#[error("invalid template: {0}")]
	InvalidTemplate(String),
	/// A `TEMPLATE-USE` node names a template that was never defined.
	#[error("template with id {id:?} not found")]
	TemplateNotFound { id: String },
	/// A `mount-id` names no node of the output tree.
	#[error("mount node with id {id:?} not found")]
	MountNotFound { id: String },
	/// An `action-*` attribute resolved to something that can't be called.
	#[error("{attribute} {key:?} must resolve to a function")]
	MissingFunctionBinding { attribute: String, key: String },
	/// A list operation targeted something else.
	#[error("{path:?} is a {kind}, not a list")]
	NotAList { path: String, kind: &'static str },
	/// The output tree rejected an operation.
	#[error("output tree error: {0}")]
	Output(String),
	/// A render was requested while another render or refresh of the same engine is in progress.
	#[error("the engine is busy rendering")]
	Busy,
	/// A change was requested while a render or refresh of the same engine is in progress.
	///
	/// It was queued and is applied before the outermost call into the engine returns,
	/// but its outcome isn't known yet.
	#[error("change at {path:?} deferred until the render in progress finishes")]
	Deferred { path: String },
	#[error("{context}")]
	Context {
		context: String,
		#[source]
		source: Box<Error>,
	},
}

impl Error {
	pub(crate) fn invalid_template(reason: impl Into<String>) -> Self {
		Self::InvalidTemplate(reason.into())
	}

	/// Iterates from this error down to its root cause.
	pub fn chain(&self) -> impl Iterator<Item = &Error> {
		core::iter::successors(Some(self), |&current| match current {
			Error::Context { source, .. } => Some(&**source),
			_ => None,
		})
	}

	/// The innermost error, with all [`Error::Context`] layers stripped.
	#[must_use]
	pub fn root_cause(&self) -> &Error {
		self.chain().last().unwrap_or(self)
	}

	/// Displays the whole chain, outermost first, separated by `": "`.
	#[must_use]
	pub fn report(&self) -> Report<'_> {
		Report(self)
	}
}

/// See [`Error::report`].
#[derive(Debug, Clone, Copy)]
pub struct Report<'a>(&'a Error);

impl Display for Report<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		for (i, layer) in self.0.chain().enumerate() {
			if i > 0 {
				f.write_str(": ")?;
			}
			Display::fmt(layer, f)?;
		}
		Ok(())
	}
}

pub trait ResultExt<T> {
	/// Wraps the error, if any, in one more [`Error::Context`] layer.
	///
	/// # Errors
	///
	/// Iff `self` is an error.
	fn context<C: Into<String>>(self, context: impl FnOnce() -> C) -> Result<T, Error>;
}

impl<T> ResultExt<T> for Result<T, Error> {
	fn context<C: Into<String>>(self, context: impl FnOnce() -> C) -> Result<T, Error> {
		self.map_err(|source| Error::Context {
			context: context().into(),
			source: Box::new(source),
		})
	}
}
