//! Installer-wide configuration, per-subtree options and host hooks

use std::fmt;
use std::rc::Rc;

use trait_set::trait_set;

use crate::error::{ModuleErrorObj, ModuleResult};
use crate::evaluate::Module;
use crate::scheduler::Defer;
use crate::value::Value;

/// Extensions tried in order on the last segment of an identifier
pub const DEFAULT_EXTENSIONS: &[&str] = &[".js", ".json"];
/// Name of the per-directory manifest
pub const MANIFEST: &str = "package.json";
/// Name of the directory searched for bare identifiers
pub const DEPENDENCY_DIR: &str = "node_modules";
/// Unit picked from a directory when no main field applies
pub const INDEX: &str = "index";

trait_set! {
  /// Rewrites or vetoes a bare identifier. Receives the identifier and the
  /// identity of the requesting unit; [None] vetoes the lookup.
  pub trait OverrideFn = Fn(&str, Option<&str>) -> Option<String>;
  /// Runs before a factory. Returning true means the hook has taken care of
  /// the exports and the factory is skipped.
  pub trait BeforeEvaluateFn = Fn(&Module) -> bool;
  /// Receives errors that have no caller to propagate to, such as those of
  /// queued entry points.
  pub trait ErrorHandler = Fn(ModuleErrorObj);
}

/// Substitutes for identifiers that did not resolve. Both methods receive the
/// identifier, the requesting unit's identity and the
/// [crate::error::NotFound] error; the defaults propagate the error.
pub trait Fallback {
  /// Supply a substitute exports value for [crate::Require::require]
  fn value(&self, id: &str, requester: Option<&str>, err: ModuleErrorObj) -> ModuleResult<Value> {
    let _ = (id, requester);
    Err(err)
  }
  /// Supply a substitute identity for [crate::Require::resolve]
  fn resolve(&self, id: &str, requester: Option<&str>, err: ModuleErrorObj) -> ModuleResult<String> {
    let _ = (id, requester);
    Err(err)
  }
}

/// Options scoped to the subtree installed with
/// [crate::Installer::install_with]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
  /// Extension list replacing the installer default within the subtree
  pub extensions: Option<Vec<String>>,
}
impl Options {
  /// Options overriding the extension list
  #[must_use]
  pub fn extensions<S: Into<String>>(exts: impl IntoIterator<Item = S>) -> Self {
    Self { extensions: Some(exts.into_iter().map(Into::into).collect()) }
  }
}

/// Configuration of an [crate::Installer]
pub struct Config {
  pub(crate) defer: Rc<dyn Defer>,
  pub(crate) extensions: Vec<String>,
  pub(crate) main_fields: Vec<String>,
  pub(crate) manifest: String,
  pub(crate) dependency_dir: String,
  pub(crate) index: String,
  pub(crate) override_fn: Option<Box<dyn OverrideFn>>,
  pub(crate) fallback: Option<Box<dyn Fallback>>,
  pub(crate) before_evaluate: Option<Box<dyn BeforeEvaluateFn>>,
  pub(crate) on_error: Option<Box<dyn ErrorHandler>>,
}
impl Config {
  /// Default configuration around the primitive that runs deferred work
  #[must_use]
  pub fn new(defer: impl Defer + 'static) -> Self {
    Self {
      defer: Rc::new(defer),
      extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
      main_fields: vec!["main".to_string()],
      manifest: MANIFEST.to_string(),
      dependency_dir: DEPENDENCY_DIR.to_string(),
      index: INDEX.to_string(),
      override_fn: None,
      fallback: None,
      before_evaluate: None,
      on_error: None,
    }
  }

  /// Replace the default extension list
  #[must_use]
  pub fn with_extensions<S: Into<String>>(mut self, exts: impl IntoIterator<Item = S>) -> Self {
    self.extensions = exts.into_iter().map(Into::into).collect();
    self
  }

  /// Replace the manifest fields consulted when resolving a directory, in
  /// priority order
  #[must_use]
  pub fn with_main_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
    self.main_fields = fields.into_iter().map(Into::into).collect();
    self
  }

  /// Rename the manifest, the dependency directory and the index unit
  #[must_use]
  pub fn with_names(
    mut self,
    manifest: impl Into<String>,
    dependency_dir: impl Into<String>,
    index: impl Into<String>,
  ) -> Self {
    self.manifest = manifest.into();
    self.dependency_dir = dependency_dir.into();
    self.index = index.into();
    self
  }

  /// Register a hook that rewrites or vetoes bare identifiers
  #[must_use]
  pub fn with_override(
    mut self,
    f: impl Fn(&str, Option<&str>) -> Option<String> + 'static,
  ) -> Self {
    self.override_fn = Some(Box::new(f));
    self
  }

  /// Register substitutes for identifiers that don't resolve
  #[must_use]
  pub fn with_fallback(mut self, fallback: impl Fallback + 'static) -> Self {
    self.fallback = Some(Box::new(fallback));
    self
  }

  /// Register a hook that may take over evaluation from a factory
  #[must_use]
  pub fn with_before_evaluate(mut self, f: impl Fn(&Module) -> bool + 'static) -> Self {
    self.before_evaluate = Some(Box::new(f));
    self
  }

  /// Register a receiver for errors raised by queued entry points
  #[must_use]
  pub fn on_error(mut self, f: impl Fn(ModuleErrorObj) + 'static) -> Self {
    self.on_error = Some(Box::new(f));
    self
  }
}
impl fmt::Debug for Config {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Config")
      .field("extensions", &self.extensions)
      .field("main_fields", &self.main_fields)
      .field("manifest", &self.manifest)
      .field("dependency_dir", &self.dependency_dir)
      .field("index", &self.index)
      .finish_non_exhaustive()
  }
}
