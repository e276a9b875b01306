//! SQLite world store
//!
//! One `sqlx` transaction per [`WorldTx`]. Ids are stored as UUID text,
//! timestamps as RFC 3339 text and enum tags by name. Tile contents are
//! ordered by an explicit position column.

use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hexworld_domain::{
    Account, Building, BuildingCost, BuildingType, BuildingTypeId, ContentKind, HexColor,
    HexCoord, HexWindow, Player, PlayerId, PlayerName, Resource, SessionId, Tile, TileContent,
    TileId,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::infrastructure::ports::{RepoError, WorldStore, WorldTx};

const SCHEMA: [&str; 11] = [
    r#"
    CREATE TABLE IF NOT EXISTS players (
        id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        color TEXT NOT NULL,
        last_updated TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id TEXT PRIMARY KEY,
        player_id TEXT NOT NULL UNIQUE REFERENCES players(id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tiles (
        id TEXT PRIMARY KEY,
        q INTEGER NOT NULL,
        r INTEGER NOT NULL,
        owner_id TEXT REFERENCES players(id),
        color TEXT,
        last_updated TEXT NOT NULL,
        UNIQUE (q, r)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tile_contents (
        id TEXT PRIMARY KEY,
        tile_id TEXT NOT NULL REFERENCES tiles(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        kind TEXT NOT NULL,
        status TEXT NOT NULL,
        progress INTEGER NOT NULL,
        owner_id TEXT,
        render_hint TEXT NOT NULL,
        last_updated TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS building_costs (
        id TEXT PRIMARY KEY,
        level INTEGER NOT NULL,
        level_multiplier INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS building_types (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        tile_radius INTEGER NOT NULL,
        description TEXT,
        render_path TEXT,
        cost_id TEXT NOT NULL REFERENCES building_costs(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS resources (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        quantity INTEGER NOT NULL,
        description TEXT,
        kind TEXT NOT NULL,
        account_id TEXT REFERENCES accounts(id) ON DELETE CASCADE,
        origin_tile_id TEXT REFERENCES tiles(id),
        building_cost_id TEXT REFERENCES building_costs(id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS buildings (
        id TEXT PRIMARY KEY,
        owner_id TEXT REFERENCES players(id),
        building_type_id TEXT NOT NULL REFERENCES building_types(id),
        origin_tile_id TEXT NOT NULL REFERENCES tiles(id) ON DELETE RESTRICT,
        last_updated TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS building_tiles (
        building_id TEXT NOT NULL REFERENCES buildings(id) ON DELETE CASCADE,
        tile_id TEXT NOT NULL REFERENCES tiles(id) ON DELETE RESTRICT,
        PRIMARY KEY (building_id, tile_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tile_contents_tile ON tile_contents(tile_id, position)",
    "CREATE INDEX IF NOT EXISTS idx_resources_owner ON resources(account_id, origin_tile_id, building_cost_id)",
];

#[derive(Clone)]
pub struct SqliteWorldStore {
    pool: SqlitePool,
}

impl SqliteWorldStore {
    pub async fn open(db_path: &str) -> Result<Self, RepoError> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await
            .map_err(|e| RepoError::database("open", e))?;
        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self, RepoError> {
        for ddl in SCHEMA {
            sqlx::query(ddl)
                .execute(&pool)
                .await
                .map_err(|e| RepoError::database("create_schema", e))?;
        }
        tracing::info!("World schema initialized");
        Ok(Self { pool })
    }
}

#[async_trait]
impl WorldStore for SqliteWorldStore {
    async fn begin(&self) -> Result<Box<dyn WorldTx>, RepoError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("begin", e))?;
        Ok(Box::new(SqliteTx { tx }))
    }
}

struct SqliteTx {
    tx: Transaction<'static, Sqlite>,
}

// =============================================================================
// Row mapping
// =============================================================================

fn parse<T>(raw: &str) -> Result<T, RepoError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse()
        .map_err(|e: T::Err| RepoError::serialization(format!("{raw:?}: {e}")))
}

fn parse_opt<T>(raw: Option<String>) -> Result<Option<T>, RepoError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.as_deref().map(parse::<T>).transpose()
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, RepoError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RepoError::serialization(format!("timestamp {raw:?}: {e}")))
}

fn db_err(operation: &'static str) -> impl Fn(sqlx::Error) -> RepoError {
    move |e| {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return RepoError::constraint(db.message());
            }
        }
        RepoError::database(operation, e)
    }
}

fn row_to_player(row: &SqliteRow) -> Result<Player, RepoError> {
    let session: String = row.get("session_id");
    let name: String = row.get("name");
    Ok(Player {
        id: parse(row.get("id"))?,
        session_id: SessionId::new(session).map_err(RepoError::serialization)?,
        name: PlayerName::new(name).map_err(RepoError::serialization)?,
        color: parse(row.get("color"))?,
        last_updated: parse_time(row.get("last_updated"))?,
    })
}

fn row_to_resource(row: &SqliteRow) -> Result<Resource, RepoError> {
    Ok(Resource {
        id: parse(row.get("id"))?,
        name: row.get("name"),
        quantity: row.get("quantity"),
        description: row.get("description"),
        kind: parse(row.get("kind"))?,
        origin_tile: parse_opt(row.get("origin_tile_id"))?,
        building_cost: parse_opt(row.get("building_cost_id"))?,
    })
}

fn row_to_content(row: &SqliteRow) -> Result<TileContent, RepoError> {
    let kind: String = row.get("kind");
    let progress: i64 = row.get("progress");
    Ok(TileContent {
        id: parse(row.get("id"))?,
        kind: ContentKind::from(kind),
        status: parse(row.get("status"))?,
        progress: progress.clamp(0, 100) as u8,
        owner: parse_opt(row.get("owner_id"))?,
        render_hint: row.get("render_hint"),
        last_updated: parse_time(row.get("last_updated"))?,
    })
}

fn row_to_tile(row: &SqliteRow, contents: Vec<TileContent>) -> Result<Tile, RepoError> {
    Ok(Tile {
        id: parse(row.get("id"))?,
        coord: HexCoord::new(row.get("q"), row.get("r")),
        owner: parse_opt(row.get("owner_id"))?,
        color: parse_opt::<HexColor>(row.get("color"))?,
        last_updated: parse_time(row.get("last_updated"))?,
        contents,
    })
}

impl SqliteTx {
    async fn contents_of(&mut self, tile: &str) -> Result<Vec<TileContent>, RepoError> {
        let rows = sqlx::query("SELECT * FROM tile_contents WHERE tile_id = ? ORDER BY position")
            .bind(tile)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err("tile_contents"))?;
        rows.iter().map(row_to_content).collect()
    }

    async fn resources_where(
        &mut self,
        column: &'static str,
        owner: &str,
    ) -> Result<Vec<Resource>, RepoError> {
        let sql = format!("SELECT * FROM resources WHERE {column} = ? ORDER BY rowid");
        let rows = sqlx::query(&sql)
            .bind(owner)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err("resources"))?;
        rows.iter().map(row_to_resource).collect()
    }

    async fn upsert_resource(
        &mut self,
        resource: &Resource,
        account: Option<String>,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO resources
            (id, name, quantity, description, kind, account_id, origin_tile_id, building_cost_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                quantity = excluded.quantity,
                description = excluded.description,
                kind = excluded.kind,
                account_id = excluded.account_id,
                origin_tile_id = excluded.origin_tile_id,
                building_cost_id = excluded.building_cost_id
            "#,
        )
        .bind(resource.id.to_string())
        .bind(&resource.name)
        .bind(resource.quantity)
        .bind(&resource.description)
        .bind(resource.kind.as_str())
        .bind(account)
        .bind(resource.origin_tile.map(|t| t.to_string()))
        .bind(resource.building_cost.map(|c| c.to_string()))
        .execute(&mut *self.tx)
        .await
        .map_err(db_err("save_resource"))?;
        Ok(())
    }

    async fn load_account(&mut self, row: &SqliteRow) -> Result<Account, RepoError> {
        let id: String = row.get("id");
        let resources = self.resources_where("account_id", &id).await?;
        Ok(Account {
            id: parse(&id)?,
            player_id: parse(row.get("player_id"))?,
            resources,
        })
    }
}

#[async_trait]
impl WorldTx for SqliteTx {
    async fn player_by_session(
        &mut self,
        session: &SessionId,
    ) -> Result<Option<Player>, RepoError> {
        let row = sqlx::query("SELECT * FROM players WHERE session_id = ?")
            .bind(session.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err("player_by_session"))?;
        row.as_ref().map(row_to_player).transpose()
    }

    async fn color_in_use(&mut self, color: HexColor) -> Result<bool, RepoError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM players WHERE color = ?")
            .bind(color.to_string())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_err("color_in_use"))?;
        Ok(count > 0)
    }

    async fn insert_player(&mut self, player: &Player, account: &Account) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO players (id, session_id, name, color, last_updated) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(player.id.to_string())
        .bind(player.session_id.as_str())
        .bind(player.name.as_str())
        .bind(player.color.to_string())
        .bind(player.last_updated.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .map_err(db_err("insert_player"))?;

        self.save_account(account).await
    }

    async fn save_player(&mut self, player: &Player) -> Result<(), RepoError> {
        let result =
            sqlx::query("UPDATE players SET name = ?, color = ?, last_updated = ? WHERE id = ?")
                .bind(player.name.as_str())
                .bind(player.color.to_string())
                .bind(player.last_updated.to_rfc3339())
                .bind(player.id.to_string())
                .execute(&mut *self.tx)
                .await
                .map_err(db_err("save_player"))?;
        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("Player", player.id));
        }
        Ok(())
    }

    async fn account_for_player(&mut self, player: PlayerId) -> Result<Option<Account>, RepoError> {
        let row = sqlx::query("SELECT * FROM accounts WHERE player_id = ?")
            .bind(player.to_string())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err("account_for_player"))?;
        match row {
            Some(row) => Ok(Some(self.load_account(&row).await?)),
            None => Ok(None),
        }
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), RepoError> {
        sqlx::query("INSERT INTO accounts (id, player_id) VALUES (?, ?) ON CONFLICT(id) DO NOTHING")
            .bind(account.id.to_string())
            .bind(account.player_id.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(db_err("save_account"))?;
        for resource in &account.resources {
            self.upsert_resource(resource, Some(account.id.to_string()))
                .await?;
        }
        Ok(())
    }

    async fn list_holdings(&mut self) -> Result<Vec<(Player, Account)>, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.session_id, p.name, p.color, p.last_updated,
                   a.id AS account_id
            FROM players p JOIN accounts a ON a.player_id = p.id
            ORDER BY p.id
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err("list_holdings"))?;

        let mut holdings = Vec::with_capacity(rows.len());
        for row in &rows {
            let player = row_to_player(row)?;
            let account_id: String = row.get("account_id");
            let resources = self.resources_where("account_id", &account_id).await?;
            let account = Account {
                id: parse(&account_id)?,
                player_id: player.id,
                resources,
            };
            holdings.push((player, account));
        }
        Ok(holdings)
    }

    async fn tile_at(&mut self, coord: HexCoord) -> Result<Option<Tile>, RepoError> {
        let row = sqlx::query("SELECT * FROM tiles WHERE q = ? AND r = ?")
            .bind(coord.q)
            .bind(coord.r)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err("tile_at"))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let id: String = row.get("id");
        let contents = self.contents_of(&id).await?;
        row_to_tile(&row, contents).map(Some)
    }

    async fn tiles_in_radius(
        &mut self,
        center: HexCoord,
        radius: u32,
    ) -> Result<Vec<Tile>, RepoError> {
        let window = HexWindow::around(center, radius);

        let rows = sqlx::query(
            "SELECT * FROM tiles WHERE q BETWEEN ? AND ? AND r BETWEEN ? AND ? ORDER BY q, r",
        )
        .bind(window.min_q)
        .bind(window.max_q)
        .bind(window.min_r)
        .bind(window.max_r)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err("tiles_in_radius"))?;

        let content_rows = sqlx::query(
            r#"
            SELECT c.* FROM tile_contents c
            JOIN tiles t ON t.id = c.tile_id
            WHERE t.q BETWEEN ? AND ? AND t.r BETWEEN ? AND ?
            ORDER BY c.tile_id, c.position
            "#,
        )
        .bind(window.min_q)
        .bind(window.max_q)
        .bind(window.min_r)
        .bind(window.max_r)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err("tiles_in_radius"))?;

        let mut contents: HashMap<String, Vec<TileContent>> = HashMap::new();
        for row in &content_rows {
            let tile_id: String = row.get("tile_id");
            contents
                .entry(tile_id)
                .or_default()
                .push(row_to_content(row)?);
        }

        let mut tiles = Vec::new();
        for row in &rows {
            let coord = HexCoord::new(row.get("q"), row.get("r"));
            if !coord.is_within(center, radius) {
                continue;
            }
            let id: String = row.get("id");
            tiles.push(row_to_tile(row, contents.remove(&id).unwrap_or_default())?);
        }
        Ok(tiles)
    }

    async fn save_tile(&mut self, tile: &Tile) -> Result<(), RepoError> {
        let id = tile.id.to_string();
        sqlx::query(
            r#"
            INSERT INTO tiles (id, q, r, owner_id, color, last_updated)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                color = excluded.color,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&id)
        .bind(tile.coord.q)
        .bind(tile.coord.r)
        .bind(tile.owner.map(|o| o.to_string()))
        .bind(tile.color.map(|c| c.to_string()))
        .bind(tile.last_updated.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .map_err(db_err("save_tile"))?;

        sqlx::query("DELETE FROM tile_contents WHERE tile_id = ?")
            .bind(&id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err("save_tile"))?;

        for (position, content) in tile.contents.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO tile_contents
                (id, tile_id, position, kind, status, progress, owner_id, render_hint, last_updated)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(content.id.to_string())
            .bind(&id)
            .bind(position as i64)
            .bind(content.kind.as_str())
            .bind(content.status.as_str())
            .bind(i64::from(content.progress))
            .bind(content.owner.map(|o| o.to_string()))
            .bind(&content.render_hint)
            .bind(content.last_updated.to_rfc3339())
            .execute(&mut *self.tx)
            .await
            .map_err(db_err("save_tile"))?;
        }
        Ok(())
    }

    async fn tile_count(&mut self) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tiles")
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_err("tile_count"))?;
        Ok(count.max(0) as u64)
    }

    async fn has_map_resource(&mut self, tile: TileId) -> Result<bool, RepoError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM resources WHERE origin_tile_id = ? AND kind = 'MapPickup'",
        )
        .bind(tile.to_string())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err("has_map_resource"))?;
        Ok(count > 0)
    }

    async fn save_map_resource(&mut self, resource: &Resource) -> Result<(), RepoError> {
        self.upsert_resource(resource, None).await
    }

    async fn building_type(
        &mut self,
        id: BuildingTypeId,
    ) -> Result<Option<BuildingType>, RepoError> {
        let row = sqlx::query(
            r#"
            SELECT t.id, t.name, t.tile_radius, t.description, t.render_path,
                   c.id AS cost_id, c.level, c.level_multiplier
            FROM building_types t JOIN building_costs c ON c.id = t.cost_id
            WHERE t.id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err("building_type"))?;
        let Some(row) = row else {
            return Ok(None);
        };

        let cost_id: String = row.get("cost_id");
        let line_items = self.resources_where("building_cost_id", &cost_id).await?;
        let tile_radius: i64 = row.get("tile_radius");
        let level: i64 = row.get("level");
        let level_multiplier: i64 = row.get("level_multiplier");

        Ok(Some(BuildingType {
            id: parse(row.get("id"))?,
            name: row.get("name"),
            tile_radius: u32::try_from(tile_radius).map_err(RepoError::serialization)?,
            description: row.get("description"),
            render_path: row.get("render_path"),
            cost: BuildingCost {
                id: parse(&cost_id)?,
                level: u32::try_from(level).map_err(RepoError::serialization)?,
                level_multiplier: u32::try_from(level_multiplier)
                    .map_err(RepoError::serialization)?,
                line_items,
            },
        }))
    }

    async fn save_building_type(&mut self, building_type: &BuildingType) -> Result<(), RepoError> {
        let cost = &building_type.cost;
        sqlx::query(
            r#"
            INSERT INTO building_costs (id, level, level_multiplier) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                level = excluded.level,
                level_multiplier = excluded.level_multiplier
            "#,
        )
        .bind(cost.id.to_string())
        .bind(i64::from(cost.level))
        .bind(i64::from(cost.level_multiplier))
        .execute(&mut *self.tx)
        .await
        .map_err(db_err("save_building_type"))?;

        sqlx::query(
            r#"
            INSERT INTO building_types (id, name, tile_radius, description, render_path, cost_id)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                tile_radius = excluded.tile_radius,
                description = excluded.description,
                render_path = excluded.render_path,
                cost_id = excluded.cost_id
            "#,
        )
        .bind(building_type.id.to_string())
        .bind(&building_type.name)
        .bind(i64::from(building_type.tile_radius))
        .bind(&building_type.description)
        .bind(&building_type.render_path)
        .bind(cost.id.to_string())
        .execute(&mut *self.tx)
        .await
        .map_err(db_err("save_building_type"))?;

        for item in &cost.line_items {
            self.upsert_resource(item, None).await?;
        }
        Ok(())
    }

    async fn insert_building(&mut self, building: &Building) -> Result<(), RepoError> {
        let id = building.id.to_string();
        sqlx::query(
            r#"
            INSERT INTO buildings (id, owner_id, building_type_id, origin_tile_id, last_updated)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(building.owner.map(|o| o.to_string()))
        .bind(building.building_type.to_string())
        .bind(building.origin_tile.to_string())
        .bind(building.last_updated.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .map_err(db_err("insert_building"))?;

        for tile in &building.occupied_tiles {
            sqlx::query("INSERT INTO building_tiles (building_id, tile_id) VALUES (?, ?)")
                .bind(&id)
                .bind(tile.to_string())
                .execute(&mut *self.tx)
                .await
                .map_err(db_err("insert_building"))?;
        }
        Ok(())
    }

    async fn building_at(&mut self, origin: TileId) -> Result<Option<Building>, RepoError> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, building_type_id, origin_tile_id, last_updated
            FROM buildings WHERE origin_tile_id = ?
            "#,
        )
        .bind(origin.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err("building_at"))?;
        let Some(row) = row else {
            return Ok(None);
        };

        let id: String = row.get("id");
        let occupied: Vec<String> =
            sqlx::query_scalar("SELECT tile_id FROM building_tiles WHERE building_id = ?")
                .bind(&id)
                .fetch_all(&mut *self.tx)
                .await
                .map_err(db_err("building_at"))?;

        Ok(Some(Building {
            id: parse(&id)?,
            owner: parse_opt(row.get("owner_id"))?,
            building_type: parse(row.get("building_type_id"))?,
            origin_tile: parse(row.get("origin_tile_id"))?,
            occupied_tiles: occupied
                .iter()
                .map(|raw| parse(raw))
                .collect::<Result<_, _>>()?,
            last_updated: parse_time(row.get("last_updated"))?,
        }))
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        self.tx.commit().await.map_err(db_err("commit"))
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepoError> {
        self.tx.rollback().await.map_err(db_err("rollback"))
    }
}
