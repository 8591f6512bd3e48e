#![deny(clippy::all, clippy::pedantic)]

pub mod audit;
pub mod files;
