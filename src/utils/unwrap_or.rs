/// A macro version of [Option::unwrap_or_else] which supports flow
/// control statements such as `return` and `continue` in the "else" branch.
///
/// ```ignore
/// let dir = unwrap_or!(node.enclosing_dir(); return None);
/// ```
///
/// It also unwraps concrete variants of other enums
///
/// ```ignore
/// let unit = unwrap_or!(contents => Contents::Unit; return false);
/// ```
///
/// Note: this macro influences the control flow of the surrounding code
/// without an `if`, which can be misleading. It should only be used for small,
/// straightforward jumps.
macro_rules! unwrap_or {
  ($m:expr; $fail:expr) => {{ if let Some(res) = ($m) { res } else { $fail } }};
  ($m:expr => $pattern:path; $fail:expr) => {
    { if let $pattern(res) = ($m) { res } else { $fail } }
  };
}

pub(crate) use unwrap_or;
