//! Response middleware for the static file stage.

pub(crate) mod headers;
pub(crate) mod inject;
