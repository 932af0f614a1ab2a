use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::Utc;
use choreboard_shared::auth::Role;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;

use super::error::DomainError;
use super::policy::{self, Op};
use super::Actor;
use crate::storage::models::{NewUser, User};
use crate::storage::schema::users;

const DEFAULT_AVATAR: &str = "🙂";

/// Fields an admin may change on an existing account. Everything else
/// (username, created_at) is immutable once created.
#[derive(Debug, Default, Clone)]
pub struct UserPatch {
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub avatar: Option<String>,
    pub is_active: Option<bool>,
    pub must_change_password: Option<bool>,
}

#[derive(AsChangeset)]
#[diesel(table_name = users)]
struct UserChanges<'a> {
    display_name: Option<&'a str>,
    role: Option<&'a str>,
    avatar: Option<&'a str>,
    is_active: Option<bool>,
    must_change_password: Option<bool>,
}

pub fn get_user(conn: &mut SqliteConnection, user_id: i32) -> Result<User, DomainError> {
    users::table
        .find(user_id)
        .first::<User>(conn)
        .optional()?
        .ok_or_else(|| DomainError::not_found("user not found"))
}

pub fn find_by_username(
    conn: &mut SqliteConnection,
    username: &str,
) -> Result<Option<User>, DomainError> {
    Ok(users::table
        .filter(users::username.eq(username))
        .first::<User>(conn)
        .optional()?)
}

/// The uniform `Unauthorized` on every failure path keeps the response from
/// revealing whether the username exists.
pub fn authenticate(
    conn: &mut SqliteConnection,
    username: &str,
    password: &str,
) -> Result<User, DomainError> {
    let Some(user) = find_by_username(conn, username)? else {
        return Err(DomainError::Unauthorized);
    };
    if !user.is_active {
        return Err(DomainError::Unauthorized);
    }
    if !verify(password, &user.password_hash)? {
        return Err(DomainError::Unauthorized);
    }
    Ok(user)
}

pub fn list_users(conn: &mut SqliteConnection, actor: &Actor) -> Result<Vec<User>, DomainError> {
    policy::require(actor, Op::ManageUsers)?;
    Ok(users::table.order(users::id.asc()).load::<User>(conn)?)
}

pub fn create_user(
    conn: &mut SqliteConnection,
    actor: &Actor,
    username: &str,
    display_name: &str,
    role: &str,
    password: &str,
    avatar: Option<&str>,
) -> Result<User, DomainError> {
    policy::require(actor, Op::ManageUsers)?;
    let role: Role = role
        .parse()
        .map_err(|_| DomainError::validation("invalid role"))?;
    let username = username.trim();
    let display_name = display_name.trim();
    if username.is_empty() || display_name.is_empty() || password.is_empty() {
        return Err(DomainError::validation(
            "username, display_name and password are required",
        ));
    }

    let pw_hash = hash(password, DEFAULT_COST)?;
    let new = NewUser {
        username,
        display_name,
        role: role.as_str(),
        password_hash: &pw_hash,
        avatar: avatar.filter(|a| !a.is_empty()).unwrap_or(DEFAULT_AVATAR),
        is_active: true,
        must_change_password: false,
        created_at: Utc::now().naive_utc(),
    };
    match diesel::insert_into(users::table)
        .values(&new)
        .get_result::<User>(conn)
    {
        Ok(user) => Ok(user),
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            Err(DomainError::Conflict("username already exists".into()))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn patch_user(
    conn: &mut SqliteConnection,
    actor: &Actor,
    user_id: i32,
    patch: &UserPatch,
) -> Result<User, DomainError> {
    policy::require(actor, Op::ManageUsers)?;
    let user = get_user(conn, user_id)?;

    let role = patch
        .role
        .as_deref()
        .map(|r| {
            r.parse::<Role>()
                .map_err(|_| DomainError::validation("invalid role"))
        })
        .transpose()?;

    let changes = UserChanges {
        display_name: patch.display_name.as_deref(),
        role: role.map(|r| r.as_str()),
        avatar: patch.avatar.as_deref(),
        is_active: patch.is_active,
        must_change_password: patch.must_change_password,
    };
    if changes.display_name.is_none()
        && changes.role.is_none()
        && changes.avatar.is_none()
        && changes.is_active.is_none()
        && changes.must_change_password.is_none()
    {
        return Ok(user);
    }
    diesel::update(users::table.find(user_id))
        .set(&changes)
        .execute(conn)?;
    get_user(conn, user_id)
}

/// Admin-side reset: forces a password change on next login.
pub fn reset_password(
    conn: &mut SqliteConnection,
    actor: &Actor,
    user_id: i32,
    new_password: &str,
) -> Result<(), DomainError> {
    policy::require(actor, Op::ManageUsers)?;
    get_user(conn, user_id)?;
    if new_password.is_empty() {
        return Err(DomainError::validation("new_password is required"));
    }
    diesel::update(users::table.find(user_id))
        .set((
            users::password_hash.eq(hash(new_password, DEFAULT_COST)?),
            users::must_change_password.eq(true),
        ))
        .execute(conn)?;
    Ok(())
}

/// Self-service change; requires the old password and clears the
/// must-change flag.
pub fn change_password(
    conn: &mut SqliteConnection,
    user_id: i32,
    old_password: &str,
    new_password: &str,
) -> Result<(), DomainError> {
    let user = get_user(conn, user_id)?;
    if !verify(old_password, &user.password_hash)? {
        return Err(DomainError::validation("old password is incorrect"));
    }
    if new_password.is_empty() {
        return Err(DomainError::validation("new_password is required"));
    }
    diesel::update(users::table.find(user_id))
        .set((
            users::password_hash.eq(hash(new_password, DEFAULT_COST)?),
            users::must_change_password.eq(false),
        ))
        .execute(conn)?;
    Ok(())
}

/// Bootstrap account for a fresh database: admin/admin123 with a forced
/// password change. Returns true when the seed was created.
pub fn seed_admin_if_empty(conn: &mut SqliteConnection) -> Result<bool, DomainError> {
    let count: i64 = users::table.count().get_result(conn)?;
    if count > 0 {
        return Ok(false);
    }
    let pw_hash = hash("admin123", DEFAULT_COST)?;
    let new = NewUser {
        username: "admin",
        display_name: "Admin",
        role: Role::Admin.as_str(),
        password_hash: &pw_hash,
        avatar: "🛡️",
        is_active: true,
        must_change_password: true,
        created_at: Utc::now().naive_utc(),
    };
    diesel::insert_into(users::table).values(&new).execute(conn)?;
    Ok(true)
}
