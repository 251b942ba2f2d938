pub mod config;
pub mod errors;
pub mod fields;
pub mod filter;
pub mod project;
pub mod query;
pub mod util;

pub use config::*;
pub use errors::*;
pub use fields::{parse, stringify, Field, FieldTree};
pub use filter::{filter_all, filters_from_params, matches, Filter, Match};
pub use project::project;
pub use query::*;
