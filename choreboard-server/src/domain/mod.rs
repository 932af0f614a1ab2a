//! Core state machines and point accounting. Every function here takes a
//! `&mut SqliteConnection` that the storage layer has already scoped to one
//! transaction; nothing in this module commits, and returning an error
//! rolls the whole operation back.

pub mod chores;
pub mod error;
pub mod ledger;
pub mod policy;
pub mod rewards;
pub mod users;

use choreboard_shared::auth::Role;

/// The authenticated user performing an operation, as resolved by the web
/// layer's session handling.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub id: i32,
    pub role: Role,
}

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::Utc;
    use choreboard_shared::auth::Role;
    use diesel::prelude::*;
    use diesel_migrations::MigrationHarness;

    use super::Actor;
    use crate::storage::models::{NewUser, User};
    use crate::storage::schema::users;

    pub fn conn() -> SqliteConnection {
        let mut conn = SqliteConnection::establish(":memory:").expect("open in-memory db");
        diesel::sql_query("PRAGMA foreign_keys = ON;")
            .execute(&mut conn)
            .expect("enable fks");
        conn.run_pending_migrations(crate::storage::MIGRATIONS)
            .expect("migrations");
        conn
    }

    pub fn insert_user(conn: &mut SqliteConnection, username: &str, role: Role) -> User {
        let new = NewUser {
            username,
            display_name: username,
            role: role.as_str(),
            // Not a real hash; tests that exercise authentication insert
            // their own bcrypt hashes.
            password_hash: "x",
            avatar: "🙂",
            is_active: true,
            must_change_password: false,
            created_at: Utc::now().naive_utc(),
        };
        diesel::insert_into(users::table)
            .values(&new)
            .get_result::<User>(conn)
            .expect("insert user")
    }

    pub fn actor_of(user: &User) -> Actor {
        Actor {
            id: user.id,
            role: user.role.parse().expect("role"),
        }
    }
}
