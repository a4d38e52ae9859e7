//! Resolution of identifiers to nodes of the live tree.
//!
//! Absolute identifiers start at the root, relative ones at the requester's
//! directory, and bare ones are searched for in the dependency directories of
//! every ancestor. A directory found along the way is resolved through its
//! manifest or its index unit, and an alias is resolved from its own location.
//! Every node visited by one attempt is recorded so that circular manifests
//! and aliases terminate. Extension fallback uses the list in effect at the
//! requester for the whole attempt.
mod path;

use hashbrown::HashSet;
use tracing::debug;

pub use path::absolute_id;
pub(crate) use path::{is_absolute, is_bare, is_relative};

use crate::error::ModuleResult;
use crate::evaluate::evaluate;
use crate::installer::Installer;
use crate::tree::node::Node;
use crate::utils::unwrap_or::unwrap_or;

/// Resolve an identifier on behalf of `requester`, starting from `from`. A
/// missing node is `Ok(None)`; errors only come from evaluating manifests.
pub(crate) fn resolve(
  inst: &Installer,
  from: &Node,
  id: &str,
  requester: Option<&Node>,
) -> ModuleResult<Option<Node>> {
  let exts = extensions(inst, requester.unwrap_or(from));
  Lookup { inst, requester, exts, seen: HashSet::new() }.resolve(from, id)
}

/// State shared by every step of one resolution attempt
struct Lookup<'a> {
  inst: &'a Installer,
  requester: Option<&'a Node>,
  exts: Vec<String>,
  seen: HashSet<Node>,
}
impl<'a> Lookup<'a> {
  fn resolve(&mut self, from: &Node, id: &str) -> ModuleResult<Option<Node>> {
    let start = if is_absolute(id) {
      append_id(&from.root_of(), id, &self.exts)
    } else if is_relative(id) {
      append_id(from, id, &self.exts)
    } else {
      return self.resolve_bare(from, id);
    };
    match start {
      Some(node) => self.resolve_node(node),
      None => Ok(None),
    }
  }

  /// Run the override hook, then search the dependency directories from
  /// `from` upwards. The first ancestor that contains the path wins.
  fn resolve_bare(&mut self, from: &Node, id: &str) -> ModuleResult<Option<Node>> {
    let inst = self.inst;
    let config = inst.config();
    let id = match &config.override_fn {
      None => id.to_string(),
      Some(override_fn) => {
        let requester_id = self.requester.and_then(Node::id);
        let rewritten = override_fn(id, requester_id);
        let new_id = unwrap_or!(rewritten; {
          debug!(id, requester = requester_id, "lookup vetoed by override");
          return Ok(None)
        });
        if !is_bare(&new_id) {
          return self.resolve(from, &new_id);
        }
        new_id
      },
    };
    let dep_path = format!("{}/{id}", config.dependency_dir);
    let mut cur = Some(from.clone());
    while let Some(node) = cur {
      if node.is_dir() {
        if let Some(found) = append_id(&node, &dep_path, &self.exts) {
          return self.resolve_node(found);
        }
      }
      cur = node.parent();
    }
    Ok(None)
  }

  /// Turn the node a path led to into a unit: directories go through their
  /// manifest or index, aliases are followed.
  fn resolve_node(&mut self, mut node: Node) -> ModuleResult<Option<Node>> {
    while node.is_dir() {
      let via_manifest = match self.seen.insert(node.clone()) {
        true => self.resolve_manifest(&node)?,
        false => None,
      };
      node = match via_manifest {
        Some(next) => next,
        None => {
          let index = &self.inst.config().index;
          unwrap_or!(append_part(&node, index, true, &self.exts); return Ok(None))
        },
      };
    }
    if let Some(target) = node.alias() {
      if !self.seen.insert(node.clone()) {
        debug!(node = ?node, "alias cycle");
        return Ok(None);
      }
      return self.resolve(&node, &target);
    }
    Ok(Some(node))
  }

  /// Follow the configured main fields of a directory's manifest. A missing
  /// manifest or one whose exports are not a record behaves as empty.
  fn resolve_manifest(&mut self, dir: &Node) -> ModuleResult<Option<Node>> {
    let inst = self.inst;
    let config = inst.config();
    let manifest = unwrap_or!(dir.child(&config.manifest); return Ok(None));
    let pkg = unwrap_or!(evaluate(inst, &manifest, self.requester)?; return Ok(None));
    for field in &config.main_fields {
      let main = pkg.get(field);
      let main = unwrap_or!(main.as_ref().and_then(|v| v.as_str()); continue);
      if let Some(found) = append_id(dir, main, &self.exts) {
        return Ok(Some(found));
      }
      if let Some(found) = self.resolve(dir, main)? {
        return Ok(Some(found));
      }
    }
    Ok(None)
  }
}

/// Walk the segments of an identifier starting from the directory of `from`,
/// without resolving directories or aliases at the end.
fn append_id(from: &Node, id: &str, exts: &[String]) -> Option<Node> {
  let parts = id.split('/').collect::<Vec<_>>();
  let last = parts.len() - 1;
  let mut cur = from.clone();
  for (i, part) in parts.into_iter().enumerate() {
    cur = append_part(&cur, part, i == last, exts)?;
  }
  Some(cur)
}

fn append_part(from: &Node, part: &str, is_last: bool, exts: &[String]) -> Option<Node> {
  let dir = from.enclosing_dir()?;
  match part {
    "" | "." => return Some(dir),
    ".." => return dir.parent(),
    _ => (),
  }
  let exact = dir.child(part);
  if is_last && exact.as_ref().map_or(true, Node::is_dir) {
    for ext in exts {
      if let Some(child) = dir.child(&format!("{part}{ext}")) {
        return Some(child);
      }
    }
  }
  exact
}

/// The extension list in effect at a node
pub(crate) fn extensions(inst: &Installer, node: &Node) -> Vec<String> {
  match node.effective_options().and_then(|o| o.extensions.clone()) {
    Some(exts) => exts,
    None => inst.config().extensions.clone(),
  }
}
