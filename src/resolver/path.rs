/// Identifiers starting with `/` resolve from the root
pub(crate) fn is_absolute(id: &str) -> bool { id.starts_with('/') }

/// Identifiers starting with `.` resolve from the requester's directory
pub(crate) fn is_relative(id: &str) -> bool { id.starts_with('.') }

/// Anything else is looked up in dependency directories
pub(crate) fn is_bare(id: &str) -> bool { !is_absolute(id) && !is_relative(id) }

/// Lexically join a relative or absolute identifier onto the identity of a
/// directory, producing an absolute identity. Bare identifiers are returned
/// unchanged. `..` above the root stays at the root.
pub fn absolute_id(base_dir: &str, id: &str) -> String {
  if is_bare(id) {
    return id.to_string();
  }
  let mut stack: Vec<&str> = Vec::new();
  if !is_absolute(id) {
    stack.extend(base_dir.split('/').filter(|s| !s.is_empty()));
  }
  for seg in id.split('/') {
    match seg {
      "" | "." => (),
      ".." => {
        stack.pop();
      },
      seg => stack.push(seg),
    }
  }
  let mut out = String::new();
  for seg in stack {
    out.push('/');
    out.push_str(seg);
  }
  out
}
