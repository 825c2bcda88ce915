//! PostgreSQL-backed [`MembershipService`].
//!
//! Inserts are `INSERT ... ON CONFLICT DO UPDATE` on the table's primary key,
//! so re-delivered create events overwrite instead of duplicating. Updates of
//! rows the target has never seen fall back to the same upsert.

use async_trait::async_trait;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info, warn};

use crate::config::PostgresConfig;
use crate::entity::{LoginToken, Member, Subscription};
use crate::registry::HandlerContext;
use crate::service::MembershipService;
use crate::{Error, Result};

const UPSERT_MEMBER: &str = "INSERT INTO data_peserta (gold_id, gold_email, gold_password, gold_nama, \
     gold_nomorhp, gold_nomorkartu, gold_cvv, gold_expireddate, gold_namapemegangkartu, gold_otp) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
     ON CONFLICT (gold_id) DO UPDATE SET gold_email = EXCLUDED.gold_email, \
     gold_password = EXCLUDED.gold_password, gold_nama = EXCLUDED.gold_nama, \
     gold_nomorhp = EXCLUDED.gold_nomorhp, gold_nomorkartu = EXCLUDED.gold_nomorkartu, \
     gold_cvv = EXCLUDED.gold_cvv, gold_expireddate = EXCLUDED.gold_expireddate, \
     gold_namapemegangkartu = EXCLUDED.gold_namapemegangkartu, gold_otp = EXCLUDED.gold_otp";

const UPDATE_MEMBER: &str = "UPDATE data_peserta SET gold_email = $2, gold_password = $3, gold_nama = $4, \
     gold_nomorhp = $5, gold_nomorkartu = $6, gold_cvv = $7, gold_expireddate = $8, \
     gold_namapemegangkartu = $9, gold_otp = $10 WHERE gold_id = $1";

const DELETE_MEMBER: &str = "DELETE FROM data_peserta WHERE gold_id = $1";

const UPSERT_SUBSCRIPTION: &str = "INSERT INTO subscription (gold_id, gold_totalharga, \
     gold_validasipayment, gold_otp, gold_lastupdate) VALUES ($1, $2, $3, $4, $5) \
     ON CONFLICT (gold_id) DO UPDATE SET gold_totalharga = EXCLUDED.gold_totalharga, \
     gold_validasipayment = EXCLUDED.gold_validasipayment, gold_otp = EXCLUDED.gold_otp, \
     gold_lastupdate = EXCLUDED.gold_lastupdate";

const UPDATE_SUBSCRIPTION: &str = "UPDATE subscription SET gold_totalharga = $2, \
     gold_validasipayment = $3, gold_otp = $4, gold_lastupdate = $5 WHERE gold_id = $1";

const DELETE_SUBSCRIPTION: &str = "DELETE FROM subscription WHERE gold_id = $1";

const UPSERT_TOKEN: &str = "INSERT INTO data_token (gold_email, gold_token) VALUES ($1, $2) \
     ON CONFLICT (gold_email) DO UPDATE SET gold_token = EXCLUDED.gold_token";

const DELETE_TOKEN: &str = "DELETE FROM data_token WHERE gold_email = $1";

pub struct PgMembershipStore {
    name: String,
    client: Client,
    connection_task: tokio::task::JoinHandle<()>,
}

impl PgMembershipStore {
    /// Connects to the database described by `config`. `name` labels the
    /// environment in logs.
    pub async fn connect(name: &str, config: &PostgresConfig) -> Result<Self> {
        info!(
            store = name,
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Connecting to PostgreSQL"
        );

        let (client, connection) = tokio_postgres::connect(&config.postgres_url(), NoTls).await?;

        let store = name.to_string();
        let connection_task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(store = %store, "Connection error: {}", e);
            }
        });

        info!(store = name, "Connected to PostgreSQL");

        Ok(Self {
            name: name.to_string(),
            client,
            connection_task,
        })
    }

    async fn execute(
        &self,
        ctx: &HandlerContext,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64> {
        ctx.check_cancelled()?;
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(Error::Shutdown),
            result = self.client.execute(statement, params) => Ok(result?),
        }
    }

    async fn write_member(&self, ctx: &HandlerContext, statement: &str, m: &Member) -> Result<u64> {
        self.execute(
            ctx,
            statement,
            &[
                &m.gold_id,
                &m.gold_email,
                &m.gold_password,
                &m.gold_nama,
                &m.gold_nomorhp,
                &m.gold_nomorkartu,
                &m.gold_cvv,
                &m.gold_expireddate,
                &m.gold_namapemegangkartu,
                &m.gold_otp,
            ],
        )
        .await
    }

    async fn write_subscription(
        &self,
        ctx: &HandlerContext,
        statement: &str,
        s: &Subscription,
    ) -> Result<u64> {
        self.execute(
            ctx,
            statement,
            &[
                &s.gold_id,
                &s.gold_totalharga,
                &s.gold_validasipayment,
                &s.gold_otp,
                &s.gold_lastupdate,
            ],
        )
        .await
    }
}

impl Drop for PgMembershipStore {
    fn drop(&mut self) {
        self.connection_task.abort();
    }
}

#[async_trait]
impl MembershipService for PgMembershipStore {
    async fn insert_member(&self, ctx: &HandlerContext, member: &Member) -> Result<()> {
        self.write_member(ctx, UPSERT_MEMBER, member).await?;
        debug!(store = %self.name, gold_id = member.gold_id, "Upserted member");
        Ok(())
    }

    async fn update_member(&self, ctx: &HandlerContext, member: &Member) -> Result<()> {
        if self.write_member(ctx, UPDATE_MEMBER, member).await? == 0 {
            warn!(store = %self.name, gold_id = member.gold_id, "Member missing on update, inserting");
            self.write_member(ctx, UPSERT_MEMBER, member).await?;
        }
        Ok(())
    }

    async fn delete_member(&self, ctx: &HandlerContext, member: &Member) -> Result<()> {
        let deleted = self.execute(ctx, DELETE_MEMBER, &[&member.gold_id]).await?;
        debug!(store = %self.name, gold_id = member.gold_id, deleted, "Deleted member");
        Ok(())
    }

    async fn insert_subscription(
        &self,
        ctx: &HandlerContext,
        subscription: &Subscription,
    ) -> Result<()> {
        self.write_subscription(ctx, UPSERT_SUBSCRIPTION, subscription)
            .await?;
        debug!(store = %self.name, gold_id = subscription.gold_id, "Upserted subscription");
        Ok(())
    }

    async fn update_subscription(
        &self,
        ctx: &HandlerContext,
        subscription: &Subscription,
    ) -> Result<()> {
        if self
            .write_subscription(ctx, UPDATE_SUBSCRIPTION, subscription)
            .await?
            == 0
        {
            warn!(
                store = %self.name,
                gold_id = subscription.gold_id,
                "Subscription missing on update, inserting"
            );
            self.write_subscription(ctx, UPSERT_SUBSCRIPTION, subscription)
                .await?;
        }
        Ok(())
    }

    async fn delete_subscription(
        &self,
        ctx: &HandlerContext,
        subscription: &Subscription,
    ) -> Result<()> {
        let deleted = self
            .execute(ctx, DELETE_SUBSCRIPTION, &[&subscription.gold_id])
            .await?;
        debug!(store = %self.name, gold_id = subscription.gold_id, deleted, "Deleted subscription");
        Ok(())
    }

    async fn upsert_token(&self, ctx: &HandlerContext, token: &LoginToken) -> Result<()> {
        self.execute(ctx, UPSERT_TOKEN, &[&token.gold_email, &token.gold_token])
            .await?;
        Ok(())
    }

    async fn delete_token(&self, ctx: &HandlerContext, token: &LoginToken) -> Result<()> {
        self.execute(ctx, DELETE_TOKEN, &[&token.gold_email]).await?;
        Ok(())
    }
}
