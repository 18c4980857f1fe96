//! Typed value adapter: three-state desired values and their wire forms.

pub mod convert;
pub mod field;

pub use convert::WireEnum;
pub use field::{list_of, set_of, Field, ListField, MapField, SetField};
