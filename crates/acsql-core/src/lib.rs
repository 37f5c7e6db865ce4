//! Core engine for acsql: the filter language, algebraic normalization,
//! three-valued boolean minimization, document-store query compilation and
//! keyset pagination planning.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod error;
pub mod expr;
pub mod normalize;
pub mod obs;
pub mod paginate;
pub mod store;
pub mod synth;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, contexts, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        expr::{ArithOp, CaseFold, CompareOp, Expr, Literal, Row},
        paginate::{Bookmark, OrderDirection, OrderSpec},
        store::{Collection, PhysicalType, StoreConfig, StoreQuery},
    };
}
