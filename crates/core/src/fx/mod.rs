//! FX module - rate lookups consumed by the import pipeline.

mod fx_model;
mod fx_traits;

pub use fx_model::{RateKind, RateQuote};
pub use fx_traits::RateResolverTrait;
