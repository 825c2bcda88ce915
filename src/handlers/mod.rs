//! Per-table business adapters.
//!
//! Each handler turns the untyped row image of its table into a typed entity
//! and calls the matching write path of a [`MembershipService`]. Service
//! errors are returned unchanged; retry policy belongs to the caller.
//!
//! [`MembershipService`]: crate::service::MembershipService

pub mod mapping;
pub mod member;
pub mod subscription;
pub mod token;

pub use member::MemberHandler;
pub use subscription::SubscriptionHandler;
pub use token::TokenHandler;

use crate::cdc::{Operation, Row};
use crate::{Error, Result};

/// The row image an operation must carry: `after` for create and update,
/// `before` for delete.
pub(crate) fn image_for<'a>(
    table: &'static str,
    operation: &Operation,
    after: Option<&'a Row>,
    before: Option<&'a Row>,
) -> Result<&'a Row> {
    let (image, name) = match operation {
        Operation::Delete => (before, "before"),
        _ => (after, "after"),
    };
    image.ok_or_else(|| {
        Error::mapping(
            table,
            format!("operation {} requires a non-null {} image", operation, name),
        )
    })
}
