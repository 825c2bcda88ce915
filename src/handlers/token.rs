use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::image_for;
use super::mapping::RowReader;
use crate::cdc::{Operation, Row};
use crate::entity::LoginToken;
use crate::registry::{HandlerContext, TableHandler};
use crate::service::MembershipService;
use crate::Result;

/// Replicates `data_token` rows. Creates and updates both upsert, since the
/// token row is keyed by email and simply overwritten on every login.
pub struct TokenHandler {
    service: Arc<dyn MembershipService>,
}

impl TokenHandler {
    pub const TABLE: &'static str = "data_token";

    pub fn new(service: Arc<dyn MembershipService>) -> Self {
        Self { service }
    }
}

pub fn decode_token(row: &Row) -> Result<LoginToken> {
    let r = RowReader::new(TokenHandler::TABLE, row);
    Ok(LoginToken {
        gold_email: r.required_string("gold_email")?,
        gold_token: r.string("gold_token")?,
    })
}

#[async_trait]
impl TableHandler for TokenHandler {
    async fn handle(
        &self,
        ctx: &HandlerContext,
        operation: &Operation,
        after: Option<&Row>,
        before: Option<&Row>,
    ) -> Result<()> {
        if let Operation::Unknown(code) = operation {
            warn!(table = Self::TABLE, op = %code, "Unknown CDC operation, ignoring");
            return Ok(());
        }

        let token = decode_token(image_for(Self::TABLE, operation, after, before)?)?;
        debug!(table = Self::TABLE, op = %operation, email = %token.gold_email, "Applying token change");

        match operation {
            Operation::Create | Operation::Update => self.service.upsert_token(ctx, &token).await,
            Operation::Delete => self.service.delete_token(ctx, &token).await,
            Operation::Unknown(_) => Ok(()),
        }
    }
}
