//! The service contract the CDC handlers write through.
//!
//! Handlers never touch a database directly. They call the same insert,
//! update and delete paths the CRUD backend exposes, bundled per environment
//! in [`BootResources`].

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Environment;
use crate::entity::{LoginToken, Member, Subscription};
use crate::registry::HandlerContext;
use crate::Result;

/// Write paths of the membership backend.
///
/// Deliveries are at-least-once, so every method must tolerate being called
/// again with identical input: inserts are expected to be idempotent on the
/// entity's primary key, deletes of a missing row are not errors.
#[async_trait]
pub trait MembershipService: Send + Sync {
    async fn insert_member(&self, ctx: &HandlerContext, member: &Member) -> Result<()>;

    async fn update_member(&self, ctx: &HandlerContext, member: &Member) -> Result<()>;

    async fn delete_member(&self, ctx: &HandlerContext, member: &Member) -> Result<()>;

    async fn insert_subscription(
        &self,
        ctx: &HandlerContext,
        subscription: &Subscription,
    ) -> Result<()>;

    async fn update_subscription(
        &self,
        ctx: &HandlerContext,
        subscription: &Subscription,
    ) -> Result<()>;

    async fn delete_subscription(
        &self,
        ctx: &HandlerContext,
        subscription: &Subscription,
    ) -> Result<()>;

    async fn upsert_token(&self, ctx: &HandlerContext, token: &LoginToken) -> Result<()>;

    async fn delete_token(&self, ctx: &HandlerContext, token: &LoginToken) -> Result<()>;
}

/// Every dependency a table handler may capture, one service per environment.
#[derive(Clone)]
pub struct BootResources {
    pub local: Arc<dyn MembershipService>,
    pub production: Arc<dyn MembershipService>,
}

impl BootResources {
    pub fn new(
        local: Arc<dyn MembershipService>,
        production: Arc<dyn MembershipService>,
    ) -> Self {
        Self { local, production }
    }

    pub fn service(&self, environment: Environment) -> Arc<dyn MembershipService> {
        match environment {
            Environment::Local => Arc::clone(&self.local),
            Environment::Production => Arc::clone(&self.production),
        }
    }
}
