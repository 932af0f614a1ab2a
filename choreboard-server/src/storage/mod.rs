pub mod models;
pub mod schema;

use choreboard_shared::api::{CreateChoreReq, CreateRewardReq, CreateUserReq};
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use models::{NewSession, User};
use tracing::warn;

use crate::domain::chores::{ChoreDetail, ChoreWithAssignees};
use crate::domain::error::DomainError;
use crate::domain::rewards::RedemptionDetail;
use crate::domain::users::UserPatch;
use crate::domain::{Actor, chores, ledger, rewards, users};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A domain rule was violated, or the underlying query failed.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),
}

/// Async facade over the connection pool. Reads run on a plain connection;
/// every mutation runs its domain logic inside one immediate transaction so
/// concurrent writers serialize and no partial state is ever visible.
#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let manager = ConnectionManager::<SqliteConnection>::new(path.to_string());
        let pool = Pool::builder().max_size(8).build(manager)?;

        // Run pending Diesel migrations on startup (auto-init empty DBs)
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn).map_err(DomainError::from)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store { pool })
    }

    async fn read<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, DomainError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<T, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn).map_err(DomainError::from)?;
            Ok(f(&mut conn)?)
        })
        .await?
    }

    async fn write<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, DomainError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<T, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn).map_err(DomainError::from)?;
            Ok(conn.immediate_transaction(f)?)
        })
        .await?
    }

    /// Seeds a default admin account when the users table is empty.
    pub async fn ensure_admin_seed(&self) -> Result<(), StorageError> {
        let seeded = self.write(users::seed_admin_if_empty).await?;
        if seeded {
            warn!("empty database: seeded default 'admin' account, change its password");
        }
        Ok(())
    }

    // Users & auth

    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<User, StorageError> {
        let username = username.to_string();
        let password = password.to_string();
        self.read(move |conn| users::authenticate(conn, &username, &password))
            .await
    }

    pub async fn get_user(&self, user_id: i32) -> Result<User, StorageError> {
        self.read(move |conn| users::get_user(conn, user_id)).await
    }

    pub async fn list_users(&self, actor: Actor) -> Result<Vec<User>, StorageError> {
        self.read(move |conn| users::list_users(conn, &actor))
            .await
    }

    pub async fn create_user(
        &self,
        actor: Actor,
        req: CreateUserReq,
    ) -> Result<User, StorageError> {
        self.write(move |conn| {
            users::create_user(
                conn,
                &actor,
                &req.username,
                &req.display_name,
                &req.role,
                &req.password,
                req.avatar.as_deref(),
            )
        })
        .await
    }

    pub async fn patch_user(
        &self,
        actor: Actor,
        user_id: i32,
        patch: UserPatch,
    ) -> Result<User, StorageError> {
        self.write(move |conn| users::patch_user(conn, &actor, user_id, &patch))
            .await
    }

    pub async fn reset_password(
        &self,
        actor: Actor,
        user_id: i32,
        new_password: &str,
    ) -> Result<(), StorageError> {
        let new_password = new_password.to_string();
        self.write(move |conn| users::reset_password(conn, &actor, user_id, &new_password))
            .await
    }

    pub async fn change_password(
        &self,
        user_id: i32,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), StorageError> {
        let old_password = old_password.to_string();
        let new_password = new_password.to_string();
        self.write(move |conn| {
            users::change_password(conn, user_id, &old_password, &new_password)
        })
        .await
    }

    // Chores

    pub async fn create_chore(
        &self,
        actor: Actor,
        req: CreateChoreReq,
    ) -> Result<ChoreDetail, StorageError> {
        self.write(move |conn| {
            chores::create(
                conn,
                &actor,
                &req.title,
                req.description.as_deref(),
                req.points,
                &req.assignee_ids,
                req.recurrence.as_deref(),
                req.due_date,
            )
        })
        .await
    }

    pub async fn get_chore(&self, actor: Actor, chore_id: i32) -> Result<ChoreDetail, StorageError> {
        self.read(move |conn| chores::get(conn, &actor, chore_id))
            .await
    }

    pub async fn list_chores(
        &self,
        actor: Actor,
        status: Option<String>,
    ) -> Result<Vec<ChoreWithAssignees>, StorageError> {
        self.read(move |conn| chores::list(conn, &actor, status.as_deref()))
            .await
    }

    pub async fn approvals_queue(
        &self,
        actor: Actor,
    ) -> Result<Vec<ChoreWithAssignees>, StorageError> {
        self.read(move |conn| chores::approvals_queue(conn, &actor))
            .await
    }

    pub async fn mark_chore_done(
        &self,
        actor: Actor,
        chore_id: i32,
    ) -> Result<ChoreDetail, StorageError> {
        self.write(move |conn| chores::mark_done(conn, &actor, chore_id))
            .await
    }

    pub async fn approve_chore(
        &self,
        actor: Actor,
        chore_id: i32,
        note: Option<String>,
    ) -> Result<ChoreDetail, StorageError> {
        self.write(move |conn| chores::approve(conn, &actor, chore_id, note.as_deref()))
            .await
    }

    pub async fn reject_chore(
        &self,
        actor: Actor,
        chore_id: i32,
        note: Option<String>,
    ) -> Result<ChoreDetail, StorageError> {
        self.write(move |conn| chores::reject(conn, &actor, chore_id, note.as_deref()))
            .await
    }

    // Rewards & redemptions

    pub async fn create_reward(
        &self,
        actor: Actor,
        req: CreateRewardReq,
    ) -> Result<models::Reward, StorageError> {
        self.write(move |conn| {
            rewards::create_reward(conn, &actor, &req.name, req.cost, req.limit_per_week)
        })
        .await
    }

    pub async fn list_rewards(&self, actor: Actor) -> Result<Vec<models::Reward>, StorageError> {
        self.read(move |conn| rewards::list_rewards(conn, &actor))
            .await
    }

    pub async fn request_redemption(
        &self,
        actor: Actor,
        reward_id: i32,
        note: Option<String>,
    ) -> Result<RedemptionDetail, StorageError> {
        self.write(move |conn| {
            rewards::request_redemption(conn, &actor, reward_id, note.as_deref())
        })
        .await
    }

    pub async fn approve_redemption(
        &self,
        actor: Actor,
        redemption_id: i32,
        note: Option<String>,
    ) -> Result<RedemptionDetail, StorageError> {
        self.write(move |conn| {
            rewards::approve_redemption(conn, &actor, redemption_id, note.as_deref())
        })
        .await
    }

    pub async fn deny_redemption(
        &self,
        actor: Actor,
        redemption_id: i32,
        note: Option<String>,
    ) -> Result<RedemptionDetail, StorageError> {
        self.write(move |conn| rewards::deny_redemption(conn, &actor, redemption_id, note.as_deref()))
            .await
    }

    pub async fn list_redemptions(
        &self,
        actor: Actor,
    ) -> Result<Vec<RedemptionDetail>, StorageError> {
        self.read(move |conn| rewards::list_redemptions(conn, &actor))
            .await
    }

    // Ledger

    pub async fn ledger_of(
        &self,
        user_id: i32,
    ) -> Result<(i64, Vec<models::LedgerEntry>), StorageError> {
        self.read(move |conn| {
            let total = ledger::total_points(conn, user_id)?;
            let entries = ledger::list_entries(conn, user_id)?;
            Ok((total, entries))
        })
        .await
    }

    // Session helpers for JWT inactivity windows

    pub async fn create_session(&self, jti: &str, user_id: i32) -> Result<(), StorageError> {
        use schema::sessions;
        let jti = jti.to_string();
        self.write(move |conn| {
            let new = NewSession {
                jti: &jti,
                user_id,
            };
            diesel::insert_into(sessions::table)
                .values(&new)
                .on_conflict_do_nothing()
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    pub async fn delete_session(&self, jti: &str) -> Result<bool, StorageError> {
        use schema::sessions;
        let jti = jti.to_string();
        self.write(move |conn| {
            let deleted = diesel::delete(sessions::table.find(&jti)).execute(conn)?;
            Ok(deleted > 0)
        })
        .await
    }

    /// Touch session atomically, but only if it hasn't gone idle past
    /// `cutoff`. Returns `true` if the session was found and updated. The
    /// idle check and the `last_used_at` bump are a single UPDATE, so there
    /// is no check-then-update race.
    pub async fn touch_session_with_cutoff(
        &self,
        jti: &str,
        cutoff: chrono::NaiveDateTime,
    ) -> Result<bool, StorageError> {
        use schema::sessions;
        let jti = jti.to_string();
        self.write(move |conn| {
            let now = Utc::now().naive_utc();
            let updated = diesel::update(
                sessions::table
                    .find(&jti)
                    .filter(sessions::last_used_at.ge(cutoff)),
            )
            .set(sessions::last_used_at.eq(now))
            .execute(conn)?;
            Ok(updated > 0)
        })
        .await
    }
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // WAL for read/write concurrency; busy timeout so writers queue instead
    // of failing immediately.
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    diesel::sql_query("PRAGMA foreign_keys=ON;").execute(conn)?;
    Ok(())
}
