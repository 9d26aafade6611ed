#![deny(warnings, clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

pub mod checkpoint;
pub mod config;
pub mod executor;
pub mod observability;
pub mod producer;
pub mod registry;
pub mod store;
pub mod util;
pub mod validate;
