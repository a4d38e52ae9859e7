pub(crate) mod unwrap_or;
