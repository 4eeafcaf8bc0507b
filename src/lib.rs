#![deny(clippy::nursery, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

pub mod channel;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod messages;
pub mod party;
pub mod server;
