//! Kiln Path Utilities
//!
//! Pure path manipulation shared by every Kiln host. Nothing in this crate
//! touches the process environment: the platform flavor (`is_windows`) and the
//! working directory are passed in explicitly, so the same inputs always
//! produce the same outputs regardless of where the code runs.
//!
//! Every path returned by this crate uses `/` as its separator.

#![warn(missing_docs)]

mod normalize;
mod platform;

pub use normalize::{normalize_path, normalize_slashes, root_length};
pub use platform::{ParsedPath, PathUtils};
