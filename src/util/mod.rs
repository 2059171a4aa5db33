//! Small cross-cutting helpers.

pub(crate) mod lock;
