use crate::{
    auth::AuthUser,
    credentials::{Role, hash_password, verify_password},
    db::Db,
    error::{AppError, AppResult},
    models::User,
    params,
};

pub const MIN_PASSWORD_LEN: usize = 6;

const INVALID_LOGIN: &str = "Invalid username or password";

/// UserService
///
/// Admin accounts: registration, login checks and superadmin housekeeping.
#[derive(Clone)]
pub struct UserService {
    db: Db,
}

impl UserService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// register
    ///
    /// Creates an `admin` account, or a `superadmin` one when the table is
    /// still empty.
    pub async fn register(&self, username: &str, password: &str) -> AppResult<User> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AppError::validation("Username and password are required"));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let role = if self.count().await? == 0 {
            Role::SuperAdmin
        } else {
            Role::Admin
        };
        let digest = hash_password(password)?;

        let result = self
            .db
            .run(
                "INSERT INTO users (username, password_hash, role) VALUES (?, ?, ?)",
                &params![username, digest, role.as_str()],
            )
            .await
            .map_err(|e| {
                if e.is_unique_violation() {
                    AppError::conflict("Username already exists")
                } else {
                    e.into()
                }
            })?;

        let id = result
            .generated_id
            .ok_or_else(|| AppError::Internal("insert returned no id".into()))?;
        tracing::info!(user_id = id, %username, role = role.as_str(), "User registered");
        self.get(id).await
    }

    /// authenticate
    ///
    /// Unknown usernames and wrong passwords produce the same error.
    pub async fn authenticate(&self, username: &str, password: &str) -> AppResult<User> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(AppError::validation("Username and password are required"));
        }

        let row = self
            .db
            .get_one(
                "SELECT id, username, role, password_hash, created_at FROM users WHERE username = ?",
                &params![username.trim()],
            )
            .await?;

        let Some(row) = row else {
            tracing::warn!(%username, "Login failed: unknown user");
            return Err(AppError::Unauthenticated(INVALID_LOGIN.into()));
        };

        let digest: String = row.get("password_hash")?;
        if !verify_password(password, &digest) {
            tracing::warn!(%username, "Login failed: wrong password");
            return Err(AppError::Unauthenticated(INVALID_LOGIN.into()));
        }

        Ok(User::try_from(row)?)
    }

    pub async fn get(&self, id: i64) -> AppResult<User> {
        let row = self
            .db
            .get_one(
                "SELECT id, username, role, created_at FROM users WHERE id = ?",
                &params![id],
            )
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        Ok(User::try_from(row)?)
    }

    pub async fn list(&self) -> AppResult<Vec<User>> {
        let rows = self
            .db
            .get_all(
                "SELECT id, username, role, created_at FROM users ORDER BY created_at ASC, id ASC",
                &[],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(User::try_from)
            .collect::<Result<_, _>>()?)
    }

    pub async fn count(&self) -> AppResult<i64> {
        let row = self
            .db
            .get_one("SELECT COUNT(*) AS count FROM users", &[])
            .await?;
        Ok(match row {
            Some(row) => row.get("count")?,
            None => 0,
        })
    }

    /// delete
    ///
    /// Only a superadmin may delete accounts, and never their own.
    pub async fn delete(&self, caller: &AuthUser, id: i64) -> AppResult<()> {
        if !caller.is_superadmin() {
            return Err(AppError::Forbidden);
        }
        if caller.id == id {
            return Err(AppError::validation("Cannot delete your own account"));
        }

        let result = self
            .db
            .run("DELETE FROM users WHERE id = ?", &params![id])
            .await?;
        if result.affected == 0 {
            return Err(AppError::not_found("User not found"));
        }

        tracing::info!(user_id = id, deleted_by = caller.id, "User deleted");
        Ok(())
    }

    /// seed
    ///
    /// One-time bootstrap from the command line. Refuses to run once any
    /// account exists, so it can never mint a second superadmin.
    pub async fn seed(&self, username: &str, password: &str) -> AppResult<User> {
        if self.count().await? > 0 {
            return Err(AppError::conflict(
                "Accounts already exist; register further users through the API",
            ));
        }
        self.register(username, password).await
    }
}
