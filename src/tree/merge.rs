use std::rc::Rc;

use tracing::warn;

use super::fragment::Fragment;
use super::node::{Contents, Directory, Node, Unit};
use crate::config::Options;

/// Merge a fragment into a live node. Directories merge recursively; a
/// placeholder ([Contents::Absent] or [Contents::Stub]) is replaced by any
/// definition; any other existing definition wins. Nodes created along the
/// way receive `options`. Entry names containing `/` describe nested
/// directories.
pub(crate) fn merge(node: &Node, fragment: Fragment, options: Option<&Rc<Options>>) {
  match fragment {
    Fragment::Dir(entries) => {
      if node.contents().is_placeholder() {
        node.replace_contents(Contents::Dir(Directory::default()));
      }
      if !node.is_dir() {
        warn!(node = ?node, "directory fragment conflicts with an installed unit");
        return;
      }
      for (name, frag) in entries {
        let Some((name, frag)) = nest(&name, frag) else {
          warn!(name = %name, "ignoring an entry that doesn't name a child");
          continue;
        };
        let child = node.child(&name).unwrap_or_else(|| {
          let child = Node::child_of(node, &name, options.cloned());
          node.with_contents_mut(|c| {
            if let Contents::Dir(dir) = c {
              dir.entries.insert(name.clone(), child.clone());
            }
          });
          child
        });
        merge(&child, frag, options);
      }
    },
    Fragment::Value(value) => {
      if node.contents().is_placeholder() {
        node.replace_contents(Contents::Unit(Unit::new(None, Vec::new())));
      }
      if node.exports().is_none() {
        node.set_exports(value);
      }
    },
    Fragment::Unit { deps, factory } => fill(node, Contents::Unit(Unit::new(factory, deps))),
    Fragment::Alias(target) => fill(node, Contents::Alias(target)),
    Fragment::Stub(value) =>
      if matches!(*node.contents(), Contents::Absent) {
        node.replace_contents(Contents::Stub(value));
      },
  }
}

/// Split a `/`-separated entry name into its first segment and a fragment of
/// nested directories holding `frag`
fn nest(name: &str, frag: Fragment) -> Option<(String, Fragment)> {
  let segments = name.split('/').filter(|s| !s.is_empty() && *s != ".").collect::<Vec<_>>();
  let (first, rest) = segments.split_first()?;
  if segments.contains(&"..") {
    return None;
  }
  let frag = rest.iter().rev().fold(frag, |inner, seg| Fragment::tree([(*seg, inner)]));
  Some((first.to_string(), frag))
}

fn fill(node: &Node, contents: Contents) {
  if node.contents().is_placeholder() {
    node.replace_contents(contents);
  } else {
    warn!(node = ?node, "ignoring a second definition");
  }
}
