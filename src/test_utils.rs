//! In-memory stand-ins for the broker and the membership backend.

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::cdc::{Operation, Row};
use crate::entity::{LoginToken, Member, Subscription};
use crate::kafka::{BrokerMessage, MessageSource};
use crate::registry::{HandlerContext, TableHandler};
use crate::service::MembershipService;
use crate::shutdown::Shutdown;
use crate::{Error, Result};

/// A service call as observed by [`RecordingService`], with the entity key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    InsertMember(i64),
    UpdateMember(i64),
    DeleteMember(i64),
    InsertSubscription(i64),
    UpdateSubscription(i64),
    DeleteSubscription(i64),
    UpsertToken(String),
    DeleteToken(String),
}

#[derive(Default)]
struct Tables {
    members: BTreeMap<i64, Member>,
    subscriptions: BTreeMap<i64, Subscription>,
    tokens: BTreeMap<String, LoginToken>,
}

/// A [`MembershipService`] keeping rows in memory, keyed like the real
/// tables so repeated inserts overwrite instead of duplicating.
#[derive(Default)]
pub struct RecordingService {
    tables: Mutex<Tables>,
    calls: Mutex<Vec<ServiceCall>>,
    failure: Mutex<Option<String>>,
}

impl RecordingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with [`Error::Service`].
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn member(&self, gold_id: i64) -> Option<Member> {
        self.tables.lock().unwrap().members.get(&gold_id).cloned()
    }

    pub fn member_count(&self) -> usize {
        self.tables.lock().unwrap().members.len()
    }

    pub fn subscription(&self, gold_id: i64) -> Option<Subscription> {
        self.tables.lock().unwrap().subscriptions.get(&gold_id).cloned()
    }

    pub fn token(&self, email: &str) -> Option<String> {
        self.tables
            .lock()
            .unwrap()
            .tokens
            .get(email)
            .map(|t| t.gold_token.clone())
    }

    fn record(&self, ctx: &HandlerContext, call: ServiceCall) -> Result<()> {
        ctx.check_cancelled()?;
        self.calls.lock().unwrap().push(call);
        match self.failure.lock().unwrap().as_ref() {
            Some(message) => Err(Error::Service {
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MembershipService for RecordingService {
    async fn insert_member(&self, ctx: &HandlerContext, member: &Member) -> Result<()> {
        self.record(ctx, ServiceCall::InsertMember(member.gold_id))?;
        let mut tables = self.tables.lock().unwrap();
        tables.members.insert(member.gold_id, member.clone());
        Ok(())
    }

    async fn update_member(&self, ctx: &HandlerContext, member: &Member) -> Result<()> {
        self.record(ctx, ServiceCall::UpdateMember(member.gold_id))?;
        let mut tables = self.tables.lock().unwrap();
        tables.members.insert(member.gold_id, member.clone());
        Ok(())
    }

    async fn delete_member(&self, ctx: &HandlerContext, member: &Member) -> Result<()> {
        self.record(ctx, ServiceCall::DeleteMember(member.gold_id))?;
        self.tables.lock().unwrap().members.remove(&member.gold_id);
        Ok(())
    }

    async fn insert_subscription(
        &self,
        ctx: &HandlerContext,
        subscription: &Subscription,
    ) -> Result<()> {
        self.record(ctx, ServiceCall::InsertSubscription(subscription.gold_id))?;
        let mut tables = self.tables.lock().unwrap();
        tables
            .subscriptions
            .insert(subscription.gold_id, subscription.clone());
        Ok(())
    }

    async fn update_subscription(
        &self,
        ctx: &HandlerContext,
        subscription: &Subscription,
    ) -> Result<()> {
        self.record(ctx, ServiceCall::UpdateSubscription(subscription.gold_id))?;
        let mut tables = self.tables.lock().unwrap();
        tables
            .subscriptions
            .insert(subscription.gold_id, subscription.clone());
        Ok(())
    }

    async fn delete_subscription(
        &self,
        ctx: &HandlerContext,
        subscription: &Subscription,
    ) -> Result<()> {
        self.record(ctx, ServiceCall::DeleteSubscription(subscription.gold_id))?;
        self.tables
            .lock()
            .unwrap()
            .subscriptions
            .remove(&subscription.gold_id);
        Ok(())
    }

    async fn upsert_token(&self, ctx: &HandlerContext, token: &LoginToken) -> Result<()> {
        self.record(ctx, ServiceCall::UpsertToken(token.gold_email.clone()))?;
        let mut tables = self.tables.lock().unwrap();
        tables.tokens.insert(token.gold_email.clone(), token.clone());
        Ok(())
    }

    async fn delete_token(&self, ctx: &HandlerContext, token: &LoginToken) -> Result<()> {
        self.record(ctx, ServiceCall::DeleteToken(token.gold_email.clone()))?;
        self.tables.lock().unwrap().tokens.remove(&token.gold_email);
        Ok(())
    }
}

/// One observed [`TableHandler`] invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerCall {
    pub operation: Operation,
    pub after: Option<Row>,
    pub before: Option<Row>,
}

/// A [`TableHandler`] that records its invocations. Clones share the record.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    calls: Arc<Mutex<Vec<HandlerCall>>>,
    failure: Option<String>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler that records the call and then fails with [`Error::Service`].
    pub fn failing(message: &str) -> Self {
        Self {
            calls: Arc::default(),
            failure: Some(message.to_string()),
        }
    }

    pub fn calls(&self) -> Vec<HandlerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TableHandler for RecordingHandler {
    async fn handle(
        &self,
        _ctx: &HandlerContext,
        operation: &Operation,
        after: Option<&Row>,
        before: Option<&Row>,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(HandlerCall {
            operation: operation.clone(),
            after: after.cloned(),
            before: before.cloned(),
        });
        match &self.failure {
            Some(message) => Err(Error::Service {
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// A [`MessageSource`] replaying a fixed script of reads.
///
/// Once drained it pends forever, optionally triggering a shutdown first so
/// the loop driving it stops.
pub struct VecSource {
    script: VecDeque<Result<BrokerMessage>>,
    acked: Arc<Mutex<Vec<i64>>>,
    on_drained: Option<Shutdown>,
}

impl VecSource {
    pub fn new(script: Vec<Result<BrokerMessage>>) -> Self {
        Self {
            script: script.into(),
            acked: Arc::default(),
            on_drained: None,
        }
    }

    pub fn shutdown_when_drained(mut self, shutdown: Shutdown) -> Self {
        self.on_drained = Some(shutdown);
        self
    }

    /// Offsets acknowledged so far, shared with the source.
    pub fn acked(&self) -> Arc<Mutex<Vec<i64>>> {
        Arc::clone(&self.acked)
    }
}

#[async_trait]
impl MessageSource for VecSource {
    async fn recv(&mut self) -> Result<BrokerMessage> {
        if let Some(next) = self.script.pop_front() {
            return next;
        }
        if let Some(shutdown) = &self.on_drained {
            shutdown.trigger();
        }
        std::future::pending().await
    }

    fn ack(&mut self, message: &BrokerMessage) -> Result<()> {
        self.acked.lock().unwrap().push(message.offset);
        Ok(())
    }
}
