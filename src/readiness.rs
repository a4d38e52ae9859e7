//! Whether a unit and everything it declares are installed.
//!
//! The check is a depth-first walk over declared dependencies. A unit being
//! walked is marked with its depth; meeting it again counts as ready, which is
//! what makes cycles terminate. Every verdict carries the shallowest mark it
//! relied on, so only verdicts that are independent of unfinished units are
//! cached in directories, pruned from pending lists, or made sticky.

use crate::installer::Installer;
use crate::resolver::resolve;
use crate::tree::node::{Contents, Node, Visit};

/// Verdict of a readiness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Verdict {
  ready: bool,
  /// Shallowest in-progress depth this verdict relied on, [usize::MAX] if
  /// none
  low: usize,
}
impl Verdict {
  const FALSE: Self = Self { ready: false, low: usize::MAX };
  const TRUE: Self = Self { ready: true, low: usize::MAX };
}

/// Whether a node is a unit whose declared dependencies are all installed
/// and ready, transitively
pub(crate) fn ready(inst: &Installer, node: &Node) -> bool { check(inst, node, 0).ready }

enum Shape {
  Unit(Vec<String>),
  Alias(String),
  Other,
}

fn check(inst: &Installer, node: &Node, depth: usize) -> Verdict {
  match node.visit() {
    Visit::Ready => return Verdict::TRUE,
    Visit::InProgress(d) => return Verdict { ready: true, low: d },
    Visit::Unknown => (),
  }
  let shape = match &*node.contents() {
    Contents::Unit(unit) => Shape::Unit(unit.pending.clone()),
    Contents::Alias(target) => Shape::Alias(target.clone()),
    _ => Shape::Other,
  };
  match shape {
    Shape::Other => Verdict::FALSE,
    Shape::Alias(target) => match resolve(inst, node, &target, None) {
      Ok(Some(target)) => check(inst, &target, depth),
      _ => Verdict::FALSE,
    },
    Shape::Unit(pending) if pending.is_empty() => {
      node.set_visit(Visit::Ready);
      Verdict::TRUE
    },
    Shape::Unit(pending) => check_unit(inst, node, pending, depth),
  }
}

fn check_unit(inst: &Installer, node: &Node, pending: Vec<String>, depth: usize) -> Verdict {
  node.set_visit(Visit::InProgress(depth));
  // Units with their own extension list may resolve differently from their
  // siblings, so they don't share the directory's verdicts
  let cache = node.parent().and_then(|p| p.enclosing_dir());
  let cache = cache.filter(|dir| dir.effective_options() == node.effective_options());
  let mut proven = Vec::new();
  let mut low = usize::MAX;
  let mut ready = true;
  for dep in pending {
    if cache.as_ref().is_some_and(|dir| cached(dir, &dep)) {
      proven.push((dep, usize::MAX));
      continue;
    }
    let verdict = match resolve(inst, node, &dep, Some(node)) {
      Ok(Some(target)) => check(inst, &target, depth + 1),
      _ => Verdict::FALSE,
    };
    low = low.min(verdict.low);
    if !verdict.ready {
      ready = false;
      break;
    }
    proven.push((dep, verdict.low));
  }
  let settled = ready && depth <= low;
  let keep = |dep_low: usize| dep_low == usize::MAX || (settled && dep_low >= depth);
  let pruned = proven.into_iter().filter(|(_, l)| keep(*l)).map(|(dep, _)| dep).collect::<Vec<_>>();
  if let Some(dir) = &cache {
    dir.with_contents_mut(|c| {
      if let Contents::Dir(dir) = c {
        dir.ready.extend(pruned.iter().map(|dep| (dep.clone(), true)));
      }
    });
  }
  node.with_contents_mut(|c| {
    if let Contents::Unit(unit) = c {
      unit.pending.retain(|p| !pruned.contains(p));
    }
  });
  node.set_visit(if settled { Visit::Ready } else { Visit::Unknown });
  match settled {
    true => Verdict::TRUE,
    false => Verdict { ready, low },
  }
}

fn cached(dir: &Node, dep: &str) -> bool {
  match &*dir.contents() {
    Contents::Dir(dir) => dir.ready.get(dep).copied().unwrap_or(false),
    _ => false,
  }
}

#[cfg(test)]
mod test {
  use futures::executor::LocalPool;

  use super::cached;
  use crate::config::Config;
  use crate::installer::Installer;
  use crate::tree::node::{Contents, Node};
  use crate::tree::Fragment;

  fn noop(deps: &[&str]) -> Fragment { Fragment::with_deps(deps.to_vec(), |_, _| Ok(())) }

  fn node(inst: &Installer, path: &[&str]) -> Node {
    path.iter().fold(inst.root().clone(), |n, name| n.child(name).expect("installed"))
  }

  fn pending(node: &Node) -> Vec<String> {
    match &*node.contents() {
      Contents::Unit(unit) => unit.pending.clone(),
      _ => panic!("{node:?} is not a unit"),
    }
  }

  #[test]
  fn transitive() {
    let pool = LocalPool::new();
    let inst = Installer::new(Config::new(pool.spawner()));
    let root = inst.install(Fragment::tree([("a.js", noop(&["./b"])), ("b.js", noop(&["./c"]))]));
    assert!(!root.ready("./a"));
    assert!(!root.ready("./b"));
    inst.install(Fragment::tree([("c.js", noop(&[]))]));
    assert!(root.ready("./a"));
    assert!(root.ready("./c"));
    assert!(!root.ready("./d"));
  }

  #[test]
  fn cycles_terminate() {
    let pool = LocalPool::new();
    let inst = Installer::new(Config::new(pool.spawner()));
    let root = inst.install(Fragment::tree([
      ("a.js", noop(&["./b"])),
      ("b.js", noop(&["./a", "./c"])),
    ]));
    assert!(!root.ready("./a"));
    assert!(!root.ready("./b"));
    inst.install(Fragment::tree([("c.js", noop(&["./a"]))]));
    assert!(root.ready("./b"));
    assert!(root.ready("./a"));
  }

  #[test]
  fn directories_and_stubs_are_not_ready() {
    let pool = LocalPool::new();
    let inst = Installer::new(Config::new(pool.spawner()));
    let root = inst.install(Fragment::tree([
      ("lib", Fragment::tree([("x.js", noop(&[]))])),
      ("s.js", Fragment::stub(crate::value::Value::Null)),
      ("al.js", Fragment::alias("./lib/x")),
    ]));
    assert!(!root.ready("./s"));
    assert!(!root.ready("./lib"));
    assert!(root.ready("./al"));
  }

  #[test]
  fn siblings_share_verdicts() {
    let pool = LocalPool::new();
    let inst = Installer::new(Config::new(pool.spawner()));
    let root = inst.install(Fragment::tree([(
      "lib",
      Fragment::tree([("a.js", noop(&["./c"])), ("b.js", noop(&["./c"])), ("c.js", noop(&[]))]),
    )]));
    assert!(root.ready("./lib/a"));
    assert!(cached(&node(&inst, &["lib"]), "./c"));
    // with c gone, only the directory's verdict can make b ready
    node(&inst, &["lib", "c.js"]).replace_contents(Contents::Absent);
    assert!(root.ready("./lib/b"));
    assert!(pending(&node(&inst, &["lib", "b.js"])).is_empty());
  }

  #[test]
  fn proven_dependencies_are_pruned() {
    let pool = LocalPool::new();
    let inst = Installer::new(Config::new(pool.spawner()));
    let root = inst.install(Fragment::tree([("a.js", noop(&["./b", "./c"])), ("b.js", noop(&[]))]));
    let a = node(&inst, &["a.js"]);
    assert_eq!(pending(&a), ["./b", "./c"]);
    assert!(!root.ready("./a"));
    assert_eq!(pending(&a), ["./c"]);
    inst.install(Fragment::tree([("c.js", noop(&[]))]));
    assert!(root.ready("./a"));
    assert!(pending(&a).is_empty());
  }

  #[test]
  fn cyclic_verdicts_are_not_cached() {
    let pool = LocalPool::new();
    let inst = Installer::new(Config::new(pool.spawner()));
    let root = inst.install(Fragment::tree([("a.js", noop(&["./b"])), ("b.js", noop(&["./a"]))]));
    assert!(root.ready("./a"));
    // b was only ready on the assumption that a was
    assert!(cached(inst.root(), "./b"));
    assert!(!cached(inst.root(), "./a"));
    assert_eq!(pending(&node(&inst, &["b.js"])), ["./a"]);
    assert!(pending(&node(&inst, &["a.js"])).is_empty());
    assert!(root.ready("./b"));
    assert!(cached(inst.root(), "./a"));
  }
}
