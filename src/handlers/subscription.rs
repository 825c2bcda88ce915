use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::image_for;
use super::mapping::RowReader;
use crate::cdc::{Operation, Row};
use crate::entity::Subscription;
use crate::registry::{HandlerContext, TableHandler};
use crate::service::MembershipService;
use crate::Result;

/// Replicates `subscription` header rows.
pub struct SubscriptionHandler {
    service: Arc<dyn MembershipService>,
}

impl SubscriptionHandler {
    pub const TABLE: &'static str = "subscription";

    pub fn new(service: Arc<dyn MembershipService>) -> Self {
        Self { service }
    }
}

pub fn decode_subscription(row: &Row) -> Result<Subscription> {
    let r = RowReader::new(SubscriptionHandler::TABLE, row);
    Ok(Subscription {
        gold_id: r.required_i64("gold_id")?,
        gold_totalharga: r.optional_f64("gold_totalharga")?,
        gold_validasipayment: r.string("gold_validasipayment")?,
        gold_otp: r.optional_string("gold_otp")?,
        gold_lastupdate: r.optional_datetime("gold_lastupdate")?,
    })
}

#[async_trait]
impl TableHandler for SubscriptionHandler {
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

        let subscription = decode_subscription(image_for(Self::TABLE, operation, after, before)?)?;
        debug!(
            table = Self::TABLE,
            op = %operation,
            gold_id = subscription.gold_id,
            "Applying subscription change"
        );

        match operation {
            Operation::Create => self.service.insert_subscription(ctx, &subscription).await,
            Operation::Update => self.service.update_subscription(ctx, &subscription).await,
            Operation::Delete => self.service.delete_subscription(ctx, &subscription).await,
            Operation::Unknown(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingService, ServiceCall};
    use crate::Error;
    use serde_json::json;

    #[test]
    fn test_decode_subscription() {
        let row = json!({
            "gold_id": 12,
            "gold_totalharga": 350000.0,
            "gold_validasipayment": "Y",
            "gold_otp": "884211",
            "gold_lastupdate": 1695859200000_i64,
        });

        let subscription = decode_subscription(row.as_object().unwrap()).unwrap();

        assert_eq!(subscription.gold_id, 12);
        assert_eq!(subscription.gold_totalharga, Some(350000.0));
        assert_eq!(subscription.gold_validasipayment, "Y");
        assert_eq!(subscription.gold_otp.as_deref(), Some("884211"));
        assert_eq!(
            subscription.gold_lastupdate.as_deref(),
            Some("2023-09-28 00:00:00")
        );
    }

    #[test]
    fn test_decode_subscription_requires_key() {
        let row = json!({"gold_validasipayment": "N"});
        let err = decode_subscription(row.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, Error::Mapping { ref table, .. } if table == "subscription"));
    }

    #[tokio::test]
    async fn test_routes_operations() {
        let service = Arc::new(RecordingService::new());
        let handler = SubscriptionHandler::new(service.clone());
        let ctx = HandlerContext::detached();
        let image = json!({"gold_id": 3, "gold_validasipayment": "N"});
        let image = image.as_object().unwrap();

        handler.handle(&ctx, &Operation::Create, Some(image), None).await.unwrap();
        handler.handle(&ctx, &Operation::Update, Some(image), Some(image)).await.unwrap();
        handler.handle(&ctx, &Operation::Delete, None, Some(image)).await.unwrap();

        assert_eq!(
            service.calls(),
            vec![
                ServiceCall::InsertSubscription(3),
                ServiceCall::UpdateSubscription(3),
                ServiceCall::DeleteSubscription(3),
            ]
        );
    }
}
