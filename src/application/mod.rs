//! Application services: operations, their handlers, and the pipeline that
//! carries them.

pub mod auth;
pub mod books;
pub mod catalog;
pub mod error;
pub mod pipeline;
pub mod ports;
pub mod repos;
