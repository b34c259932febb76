//! Domain concepts.
//!
//! Each concept owns exactly one kind of document (Friending owns two) and asserts its own
//! inputs before touching storage. Concepts never read each other's collections; anything
//! that spans concepts lives in the route layer.

mod authenticating;
mod friending;
mod graphing;
mod posting;
mod sessioning;
mod tagging;
mod webapping;

pub use authenticating::*;
pub use friending::*;
pub use graphing::*;
pub use posting::*;
pub use sessioning::*;
pub use tagging::*;
pub use webapping::*;

use serde_json::{Map, Value};

/// Build a partial-update object from the fields that were supplied.
fn patch<I>(fields: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (&'static str, Option<Value>)>,
{
    fields
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key.to_string(), v)))
        .collect()
}
