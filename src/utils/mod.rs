//! Internal utility helpers for slug building and markup text cleanup.

pub(crate) mod slug;
pub(crate) mod text;
