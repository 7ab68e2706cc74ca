//! Projection of nested JSON documents onto flat rows.
//!
//! A document becomes one column per scalar leaf, named by its
//! underscore-joined path, plus a `_json_structure` column recording the
//! shape of every path. The structure is what makes the mapping
//! reversible: `_` is also legal inside property names, so a path is only
//! split where the recorded structure says a container ends.

mod document;
mod flatten;
mod rebuild;
mod structure;

pub use document::*;
pub use flatten::*;
pub use rebuild::*;
pub use structure::*;
