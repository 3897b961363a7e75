use crate::db::models::{NewUser, User, UserChanges};
use crate::models::site::{UserInput, UserPatch};
use crate::schema;
use crate::utils::enum_text;
use crate::validation::{validate_user, validate_user_patch};
use chrono::Utc;
use diesel::PgConnection;
use diesel::prelude::*;
use log::info;

/// Active users ordered by full name.
pub fn list_active(conn: &mut PgConnection) -> Result<Vec<User>, String> {
    use schema::users::dsl as U;

    U::users
        .filter(U::active.eq(true))
        .order(U::full_name.asc())
        .select(User::as_select())
        .load(conn)
        .map_err(|e| format!("list users failed: {}", e))
}

pub fn get(conn: &mut PgConnection, id: i64) -> Result<Option<User>, String> {
    use schema::users::dsl as U;

    U::users
        .find(id)
        .select(User::as_select())
        .first(conn)
        .optional()
        .map_err(|e| format!("fetch user {} failed: {}", id, e))
}

pub fn find_by_username(conn: &mut PgConnection, username: &str) -> Result<Option<User>, String> {
    use schema::users::dsl as U;

    U::users
        .filter(U::username.eq(username))
        .select(User::as_select())
        .first(conn)
        .optional()
        .map_err(|e| format!("fetch user {:?} failed: {}", username, e))
}

pub fn create(conn: &mut PgConnection, input: &UserInput) -> Result<User, String> {
    use schema::users::dsl as U;

    validate_user(input).map_err(|e| e.to_string())?;
    if find_by_username(conn, &input.username)?.is_some() {
        return Err(format!("username {:?} already exists", input.username));
    }

    let row = NewUser {
        username: input.username.clone(),
        email: input.email.clone(),
        full_name: input.full_name.trim().to_string(),
        role: enum_text(&input.role),
        active: true,
    };
    let user = diesel::insert_into(U::users)
        .values(&row)
        .returning(User::as_returning())
        .get_result(conn)
        .map_err(|e| format!("insert user failed: {}", e))?;
    info!("Users: created {} ({})", user.username, user.id);
    Ok(user)
}

/// Partial update; `Ok(None)` when the user does not exist.
pub fn update(conn: &mut PgConnection, id: i64, patch: &UserPatch) -> Result<Option<User>, String> {
    use schema::users::dsl as U;

    validate_user_patch(patch).map_err(|e| e.to_string())?;
    let changes = UserChanges {
        email: patch.email.clone(),
        full_name: patch.full_name.as_deref().map(|n| n.trim().to_string()),
        role: patch.role.as_ref().map(enum_text),
        active: patch.active,
        updated_at: Some(Utc::now()),
    };
    let updated = diesel::update(U::users.find(id))
        .set(&changes)
        .returning(User::as_returning())
        .get_result(conn)
        .optional()
        .map_err(|e| format!("update user {} failed: {}", id, e))?;
    if updated.is_some() {
        info!("Users: updated {}", id);
    }
    Ok(updated)
}

/// Soft delete: the row stays for authorship of existing records.
pub fn deactivate(conn: &mut PgConnection, id: i64) -> Result<bool, String> {
    use schema::users::dsl as U;

    let count = diesel::update(U::users.find(id))
        .set((U::active.eq(false), U::updated_at.eq(Utc::now())))
        .execute(conn)
        .map_err(|e| format!("deactivate user {} failed: {}", id, e))?;
    if count > 0 {
        info!("Users: deactivated {}", id);
    }
    Ok(count > 0)
}
