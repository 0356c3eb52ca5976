//! Catalog entities and the invariants they carry.

pub mod books;
pub mod error;
pub mod users;
