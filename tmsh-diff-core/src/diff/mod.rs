//! Field-level comparison of parsed configuration blocks.

pub mod engine;
pub mod result;

pub use engine::{
    diff_fields, diff_fields_with_options, fields_equal, fields_grow, value_grows, values_equal,
    DiffOptions,
};
pub use result::FieldChange;
