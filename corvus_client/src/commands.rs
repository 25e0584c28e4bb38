//! Concrete [`RavenCommand`](crate::raven_command::RavenCommand)
//! implementations, grouped by the part of the server surface they target.

pub mod databases;
pub mod documents;
pub mod hilo;
