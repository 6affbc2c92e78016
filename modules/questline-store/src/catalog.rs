//! Users and the static game catalog. Both are seeded by migrations;
//! account management lives outside this system.

use questline_common::{Game, User};

use crate::error::Result;
use crate::PgStore;

impl PgStore {
    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, User>(
            "SELECT id, username, password, points FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn user_exists(&self, user_id: i64) -> Result<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    pub async fn game_exists(&self, game_id: i64) -> Result<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM games WHERE id = $1)")
                .bind(game_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    pub async fn list_games(&self) -> Result<Vec<Game>> {
        let rows = sqlx::query_as::<_, Game>("SELECT id, name FROM games ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }
}
