//! RFC 7047 value notation
//!
//! - `value`: atoms, sets and maps, UUIDs and named UUIDs
//! - `row`: column name to value objects
//! - `condition`: `where` clause entries
//! - `mutation`: `mutate` operation entries

pub mod condition;
pub mod mutation;
pub mod row;
pub mod value;

pub use condition::{Condition, Function};
pub use mutation::{Mutation, Mutator};
pub use row::Row;
pub use value::{Atom, NamedUuid, Value};
