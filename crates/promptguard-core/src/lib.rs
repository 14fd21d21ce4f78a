//! PromptGuard Core
//!
//! Types shared by every PromptGuard crate. Currently this is the error
//! taxonomy: caller errors, missing local files, offline misses, download
//! failures and inference failures each have their own variant so callers can
//! tell "the model could not be obtained" apart from "the model failed to run".

pub mod error;

pub use error::{Error, Result};
