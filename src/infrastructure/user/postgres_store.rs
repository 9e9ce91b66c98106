//! PostgreSQL user store

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::domain::user::{Page, UserId, UserRecord};
use crate::domain::{DomainError, ResultExt};
use crate::infrastructure::storage::{translate, Runner};

use super::store::UserStore;

const INSERT_USER: &str = r#"
    INSERT INTO users (first_name, last_name, nickname, email, country, password, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, crypt($6, gen_salt('bf')), $7, $8)
    RETURNING id
"#;

const SELECT_USER: &str = r#"
    SELECT id, first_name, last_name, nickname, email, country, created_at, updated_at
    FROM users
    WHERE id = $1
"#;

// Every sub-statement of the CTE sees the same snapshot, so `old_state`
// holds the row as it was before `update_state` wrote to it.
const UPDATE_USER: &str = r#"
    WITH old_state AS (
        SELECT id, first_name, last_name, nickname, email, country, created_at, updated_at
        FROM users
        WHERE id = $1
    ), update_state AS (
        UPDATE users
        SET first_name = $2,
            last_name = $3,
            nickname = $4,
            email = $5,
            country = $6,
            updated_at = $7
        WHERE id = $1
    )
    SELECT * FROM old_state
"#;

const DELETE_USER: &str = "DELETE FROM users WHERE id = $1";

const LIST_USERS: &str = r#"
    SELECT id, first_name, last_name, nickname, email, country, created_at, updated_at
    FROM users
    ORDER BY created_at, id
    LIMIT $1 OFFSET $2
"#;

/// User store over the `users` table.
///
/// Holds no connection of its own; every statement runs on the runner passed in.
#[derive(Debug, Clone, Default)]
pub struct PostgresUserStore;

impl PostgresUserStore {
    pub fn new() -> Self {
        Self
    }
}

fn row_to_record(row: &PgRow) -> Result<UserRecord, DomainError> {
    let id: String = row.try_get("id").map_err(translate)?;

    Ok(UserRecord {
        id: Some(UserId::from(id)),
        first_name: row.try_get("first_name").map_err(translate)?,
        last_name: row.try_get("last_name").map_err(translate)?,
        nickname: row.try_get("nickname").map_err(translate)?,
        email: row.try_get("email").map_err(translate)?,
        country: row.try_get("country").map_err(translate)?,
        password: None,
        created_at: row.try_get("created_at").map_err(translate)?,
        updated_at: row.try_get("updated_at").map_err(translate)?,
    })
}

fn select_user(for_update: bool) -> String {
    if for_update {
        format!("{} FOR UPDATE", SELECT_USER.trim_end())
    } else {
        SELECT_USER.to_string()
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn persist(&self, run: &mut dyn Runner, user: &UserRecord) -> Result<UserId, DomainError> {
        let password = user
            .password
            .as_deref()
            .ok_or_else(|| DomainError::bad_input("password is required to persist a user"))?;

        let query = sqlx::query(INSERT_USER)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.nickname)
            .bind(&user.email)
            .bind(&user.country)
            .bind(password)
            .bind(user.created_at)
            .bind(user.updated_at);

        let row = run.query_one(query).await.context("query single")?;
        let id: String = row.try_get("id").map_err(translate)?;

        Ok(UserId::from(id))
    }

    async fn retrieve(
        &self,
        run: &mut dyn Runner,
        id: &UserId,
        for_update: bool,
    ) -> Result<UserRecord, DomainError> {
        let sql = select_user(for_update);
        let query = sqlx::query(&sql).bind(id.as_str());

        let row = run.query_one(query).await.context("query single")?;
        row_to_record(&row)
    }

    async fn update(
        &self,
        run: &mut dyn Runner,
        id: &UserId,
        user: &UserRecord,
    ) -> Result<UserRecord, DomainError> {
        let query = sqlx::query(UPDATE_USER)
            .bind(id.as_str())
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.nickname)
            .bind(&user.email)
            .bind(&user.country)
            .bind(user.updated_at);

        let row = run.query_one(query).await.context("query single")?;
        row_to_record(&row)
    }

    async fn delete(&self, run: &mut dyn Runner, id: &UserId) -> Result<(), DomainError> {
        let query = sqlx::query(DELETE_USER).bind(id.as_str());

        match run.exec(query).await.context("exec")? {
            0 => Err(DomainError::not_found(format!("no user with id {:?}", id.as_str()))),
            1 => Ok(()),
            n => Err(DomainError::internal(format!(
                "delete removed {} rows for id {:?}",
                n,
                id.as_str()
            ))),
        }
    }

    async fn list(&self, run: &mut dyn Runner, page: Page) -> Result<Vec<UserRecord>, DomainError> {
        let query = sqlx::query(LIST_USERS)
            .bind(i64::from(page.limit()))
            .bind(i64::from(page.offset()));

        let mut rows = run.query_many(query);
        let mut users = Vec::with_capacity(page.limit() as usize);

        while let Some(row) = rows.try_next().await.context("query many")? {
            users.push(row_to_record(&row)?);
        }

        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::infrastructure::storage::stub::StubRunner;
    use crate::domain::UserEntity;

    #[test]
    fn test_select_for_update_appends_lock() {
        assert!(!select_user(false).contains("FOR UPDATE"));
        assert!(select_user(true).trim_end().ends_with("WHERE id = $1 FOR UPDATE"));
    }

    #[test]
    fn test_insert_hashes_inline() {
        assert!(INSERT_USER.contains("crypt($6, gen_salt('bf'))"));
        assert!(INSERT_USER.contains("RETURNING id"));
    }

    #[test]
    fn test_update_returns_prior_state() {
        assert!(UPDATE_USER.contains("SELECT * FROM old_state"));
        assert!(!UPDATE_USER.contains("password"));
        assert!(!UPDATE_USER.contains("created_at ="));
    }

    #[tokio::test]
    async fn test_persist_requires_password() {
        let record = UserRecord::from_entity(&UserEntity::default(), Utc::now());

        let err = PostgresUserStore::new()
            .persist(&mut StubRunner, &record)
            .await
            .unwrap_err();
        assert!(err.is_bad_input());
    }

    #[tokio::test]
    async fn test_runner_failures_keep_their_kind() {
        let store = PostgresUserStore::new();
        let id = UserId::new("any");

        let err = store.retrieve(&mut StubRunner, &id, false).await.unwrap_err();
        assert_eq!(err.kind(), crate::domain::ErrorKind::Internal);
        assert!(err.to_string().starts_with("query single: "));

        let err = store.list(&mut StubRunner, Page::default()).await.unwrap_err();
        assert!(err.to_string().starts_with("query many: "));
    }
}
