//! Metadata records flowing through the output pipeline.
//!
//! Extractors describe every downloadable item as a [`Record`]: a string-keyed
//! map of dynamically-typed [`Value`]s. Templates, filter expressions and the
//! download archive all read from the same record, so the value model here is
//! deliberately small and closed:
//!
//! | Variant    | Produced by                                        |
//! |------------|----------------------------------------------------|
//! | `Null`     | JSON `null`, missing optional data                 |
//! | `Bool`     | JSON booleans                                      |
//! | `Int`      | JSON integers                                      |
//! | `Float`    | JSON floats                                        |
//! | `String`   | JSON strings                                       |
//! | `List`     | JSON arrays                                        |
//! | `Map`      | JSON objects (nested metadata)                     |
//! | `DateTime` | timestamp conversions, the `datetime` expression   |
//!
//! Rendering follows the conventions users already write templates against:
//! `None`, `True`, `1.0`, `['a', 'b']`.

mod access;
mod record;
mod render;
mod value;

pub use crate::record::Record;
pub use crate::render::float_repr;
pub use crate::value::{Value, parse_timestamp};
