#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod classification;
pub mod config;
pub mod evaluation;
pub mod observability;
pub mod pipeline;
pub mod store;
