//! SQL text helpers: identifiers are always quoted, values always bound as parameters.

mod ident;
pub use ident::*;
