use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::image_for;
use super::mapping::RowReader;
use crate::cdc::{Operation, Row};
use crate::entity::Member;
use crate::registry::{HandlerContext, TableHandler};
use crate::service::MembershipService;
use crate::Result;

/// Replicates `data_peserta` rows.
pub struct MemberHandler {
    service: Arc<dyn MembershipService>,
}

impl MemberHandler {
    pub const TABLE: &'static str = "data_peserta";

    pub fn new(service: Arc<dyn MembershipService>) -> Self {
        Self { service }
    }
}

pub fn decode_member(row: &Row) -> Result<Member> {
    let r = RowReader::new(MemberHandler::TABLE, row);
    Ok(Member {
        gold_id: r.required_i64("gold_id")?,
        gold_email: r.string("gold_email")?,
        gold_password: r.string("gold_password")?,
        gold_nama: r.string("gold_nama")?,
        gold_nomorhp: r.string("gold_nomorhp")?,
        gold_nomorkartu: r.string("gold_nomorkartu")?,
        gold_cvv: r.string("gold_cvv")?,
        gold_expireddate: r.compact_date("gold_expireddate")?,
        gold_namapemegangkartu: r.string("gold_namapemegangkartu")?,
        gold_otp: r.optional_string("gold_otp")?,
    })
}

#[async_trait]
impl TableHandler for MemberHandler {
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

        let member = decode_member(image_for(Self::TABLE, operation, after, before)?)?;
        debug!(table = Self::TABLE, op = %operation, gold_id = member.gold_id, "Applying member change");

        match operation {
            Operation::Create => self.service.insert_member(ctx, &member).await,
            Operation::Update => self.service.update_member(ctx, &member).await,
            Operation::Delete => self.service.delete_member(ctx, &member).await,
            Operation::Unknown(_) => Ok(()),
        }
    }
}
