#![deny(clippy::all)]

pub mod cancel;
pub mod rand_str;
