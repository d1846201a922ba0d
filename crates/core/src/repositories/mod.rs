//! File-backed repositories for samples, pathologist reviews and the morphology catalogue.

pub mod morphologies;
pub mod reviews;
pub mod samples;
pub(crate) mod shared;
