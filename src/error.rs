//! Errors raised while resolving, evaluating and fetching modules, unified
//! under a common trait object.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Errors produced by the module tree or by the code it hosts. Implement this
/// and [ModuleError::pack] the value to return it from a factory or a hook.
pub trait ModuleError: Sized + Send + Sync + 'static {
  /// General description of the error condition
  const DESCRIPTION: &'static str;
  /// Specific description of the error including the identifiers involved
  #[must_use]
  fn message(&self) -> String { Self::DESCRIPTION.to_string() }
  /// Convert the error into a type-erased object that can be cloned across
  /// every future of a batch
  #[must_use]
  fn pack(self) -> ModuleErrorObj { Arc::new(self) }
}

/// Object-safe version of [ModuleError]. Implement that instead of this.
pub trait DynModuleError: Any + Send + Sync {
  /// Allow downcasting the erased error. The main intended purpose is to
  /// recognise [NotFound] in a fallback, but the possibilities are not limited
  /// to that.
  #[must_use]
  fn as_any(&self) -> &dyn Any;
  /// General description of the error condition
  #[must_use]
  fn description(&self) -> &str;
  /// Specific description of this particular error
  #[must_use]
  fn message(&self) -> String;
}

impl<T: ModuleError> DynModuleError for T {
  fn as_any(&self) -> &dyn Any { self }
  fn description(&self) -> &str { T::DESCRIPTION }
  fn message(&self) -> String { ModuleError::message(self) }
}

impl dyn DynModuleError {
  /// Check whether the erased error is of a given type
  #[must_use]
  pub fn is<T: ModuleError>(&self) -> bool { self.as_any().is::<T>() }
  /// Access the erased error as a concrete type
  #[must_use]
  pub fn downcast_ref<T: ModuleError>(&self) -> Option<&T> { self.as_any().downcast_ref() }
}

impl fmt::Display for dyn DynModuleError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.description(), self.message())
  }
}

impl fmt::Debug for dyn DynModuleError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{self}") }
}

/// Type-erased [ModuleError] implementor through the [DynModuleError]
/// object-trait
pub type ModuleErrorObj = Arc<dyn DynModuleError>;
/// Result of any operation that can fail with a [ModuleError]
pub type ModuleResult<T> = Result<T, ModuleErrorObj>;

/// An identifier did not resolve after every strategy was exhausted
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotFound {
  /// The identifier as it was requested
  pub id: String,
  /// Identity of the requesting unit, [None] for anonymous entry points
  pub requester: Option<String>,
}
impl NotFound {
  /// Construct the error from the parameters of a failed lookup
  pub fn new(id: impl Into<String>, requester: Option<&str>) -> Self {
    Self { id: id.into(), requester: requester.map(str::to_string) }
  }
}
impl ModuleError for NotFound {
  const DESCRIPTION: &'static str = "Cannot find module";
  fn message(&self) -> String {
    match &self.requester {
      Some(req) => format!("Cannot find module '{}' from '{req}'", self.id),
      None => format!("Cannot find module '{}'", self.id),
    }
  }
}

/// A free-form failure raised by a factory or a host hook
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Thrown(pub String);
impl Thrown {
  /// Pack a message as a [ModuleErrorObj] in one step
  pub fn new(message: impl Into<String>) -> ModuleErrorObj { Self(message.into()).pack() }
}
impl ModuleError for Thrown {
  const DESCRIPTION: &'static str = "A module raised an error";
  fn message(&self) -> String { self.0.clone() }
}

/// A prefetch batch was dropped before its futures could settle, usually
/// because the executor driving the installer stopped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Abandoned {
  /// The identifier that was being prefetched
  pub id: String,
}
impl ModuleError for Abandoned {
  const DESCRIPTION: &'static str = "Prefetch abandoned";
  fn message(&self) -> String { format!("The batch fetching '{}' was dropped", self.id) }
}
