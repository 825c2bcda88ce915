pub mod boot;
pub mod cdc;
pub mod config;
pub mod consumer;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod kafka;
pub mod registry;
pub mod service;
pub mod shutdown;
pub mod store;

#[doc(hidden)]
pub mod test_utils;

pub use boot::{start_consumers, ConsumerSet, Direction};
pub use cdc::{decode, CdcEvent, Operation, Row};
pub use config::Config;
pub use error::{Error, Result};
pub use registry::{build_registry, HandlerContext, Registry, TableHandler};
pub use service::{BootResources, MembershipService};
pub use shutdown::Shutdown;
