use crate::{config::CompilerConfig, error::Error};
use acsql_core::{
    expr::{self, Expr, Row},
    paginate::{self, Bookmark, OrderSpec},
    store::{self, Collection, StoreQuery},
    synth,
};
use tracing::instrument;

///
/// Compiler
///
/// Configured entry point. The configuration only affects store
/// compilation; every other operation is pure.
///

#[derive(Clone, Debug, Default)]
pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    #[must_use]
    pub const fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        CompilerConfig::from_toml_str(text).map(Self::new)
    }

    #[must_use]
    pub const fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Store query for an already parsed filter.
    pub fn to_query(&self, filter: &Expr, collection: Collection) -> Result<StoreQuery, Error> {
        Ok(store::to_query(filter, collection, &self.config.store)?)
    }

    /// Store query with `NOW()` fixed to `now` (epoch milliseconds).
    pub fn to_query_at(
        &self,
        filter: &Expr,
        collection: Collection,
        now: f64,
    ) -> Result<StoreQuery, Error> {
        Ok(store::to_query_at(filter, collection, &self.config.store, now)?)
    }

    /// Parse `text` and compile it for `collection`.
    #[instrument(name = "compiler::compile", level = "debug", skip_all, fields(collection = %collection))]
    pub fn compile(&self, text: &str, collection: Collection) -> Result<StoreQuery, Error> {
        self.to_query(&parse(text)?, collection)
    }
}

///
/// Stateless operations
///

pub fn parse(text: &str) -> Result<Expr, Error> {
    Ok(expr::parse(text)?)
}

pub fn minimize(filter: &Expr, boolean: bool) -> Result<Expr, Error> {
    Ok(synth::minimize(filter, boolean)?)
}

pub fn union_diff(e1: &Expr, e2: &Expr) -> Result<(Expr, Expr), Error> {
    Ok(synth::union_diff(e1, e2)?)
}

pub fn covers(e1: &Expr, e2: &Expr) -> Result<bool, Error> {
    Ok(synth::covers(e1, e2)?)
}

/// Rows of `to_fetch` already covered by `fetched`, and the remainder.
pub fn paginate(fetched: &Expr, to_fetch: &Expr, order: &OrderSpec) -> Result<(Expr, Expr), Error> {
    Ok(paginate::paginate(fetched, to_fetch, order)?)
}

#[must_use]
pub fn bookmark<R: Row + ?Sized>(order: &OrderSpec, row: &R) -> Bookmark {
    paginate::to_bookmark(order, row)
}

/// Filter for the rows after `bookmark`.
pub fn bookmark_filter(bookmark: &Bookmark, order: &OrderSpec) -> Result<Expr, Error> {
    Ok(paginate::bookmark_to_expression(bookmark, order)?)
}
