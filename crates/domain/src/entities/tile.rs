//! Tile and tile content
//!
//! Each tile is unique per axial coordinate. Content entries are never
//! physically removed; they retire by moving to [`ContentStatus::Destroyed`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;
use crate::hex::HexCoord;
use crate::ids::{PlayerId, TileContentId, TileId};
use crate::value_objects::HexColor;

/// Render hint for footprint tiles that are occupied but not the building origin.
pub const BUSY_RENDER_HINT: &str = "owned.glb";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub id: TileId,
    pub coord: HexCoord,
    pub owner: Option<PlayerId>,
    pub color: Option<HexColor>,
    pub last_updated: DateTime<Utc>,
    /// Ordered by insertion
    pub contents: Vec<TileContent>,
}

impl Tile {
    pub fn new(coord: HexCoord, now: DateTime<Utc>) -> Self {
        Self {
            id: TileId::new(),
            coord,
            owner: None,
            color: None,
            last_updated: now,
            contents: Vec::new(),
        }
    }

    pub fn is_owned(&self) -> bool {
        self.owner.is_some()
    }

    pub fn is_owned_by(&self, player: PlayerId) -> bool {
        self.owner == Some(player)
    }

    /// No content other than destroyed entries.
    pub fn is_empty(&self) -> bool {
        !self.contents.iter().any(TileContent::is_active)
    }

    /// Carries a non-destroyed "Building" content.
    pub fn has_active_building(&self) -> bool {
        self.contents.iter().any(TileContent::is_active_building)
    }

    pub fn assign_owner(&mut self, owner: PlayerId, color: HexColor, now: DateTime<Utc>) {
        self.owner = Some(owner);
        self.color = Some(color);
        self.last_updated = now;
    }

    pub fn push_content(&mut self, content: TileContent) {
        self.last_updated = content.last_updated;
        self.contents.push(content);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileContent {
    pub id: TileContentId,
    pub kind: ContentKind,
    pub status: ContentStatus,
    /// 0..=100
    pub progress: u8,
    pub owner: Option<PlayerId>,
    pub render_hint: String,
    pub last_updated: DateTime<Utc>,
}

impl TileContent {
    /// Fresh content in the initial `Building` status with zero progress.
    pub fn new(
        kind: ContentKind,
        owner: Option<PlayerId>,
        render_hint: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TileContentId::new(),
            kind,
            status: ContentStatus::default(),
            progress: 0,
            owner,
            render_hint: render_hint.into(),
            last_updated: now,
        }
    }

    /// Content that is complete on arrival (`Built`, progress 100).
    pub fn built(
        kind: ContentKind,
        owner: Option<PlayerId>,
        render_hint: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            status: ContentStatus::Built,
            progress: 100,
            ..Self::new(kind, owner, render_hint, now)
        }
    }

    pub fn is_active(&self) -> bool {
        self.status != ContentStatus::Destroyed
    }

    pub fn is_active_building(&self) -> bool {
        self.is_active() && self.kind == ContentKind::Building
    }

    pub fn destroy(&mut self, now: DateTime<Utc>) {
        self.status = ContentStatus::Destroyed;
        self.last_updated = now;
    }
}

/// Free-form content type tag. Known tags get their own variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentKind {
    Building,
    Busy,
    Resource,
    Other(String),
}

impl ContentKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Building => "Building",
            Self::Busy => "Busy",
            Self::Resource => "Resource",
            Self::Other(tag) => tag,
        }
    }
}

impl From<String> for ContentKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "Building" => Self::Building,
            "Busy" => Self::Busy,
            "Resource" => Self::Resource,
            _ => Self::Other(tag),
        }
    }
}

impl From<ContentKind> for String {
    fn from(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentStatus {
    #[default]
    Building,
    Built,
    Destroyed,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Building => "Building",
            Self::Built => "Built",
            Self::Destroyed => "Destroyed",
        }
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Building" => Ok(Self::Building),
            "Built" => Ok(Self::Built),
            "Destroyed" => Ok(Self::Destroyed),
            _ => Err(DomainError::parse(format!("Unknown content status: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn new_content_starts_building_with_zero_progress() {
        let content = TileContent::new(ContentKind::Resource, None, "ore.glb", now());
        assert_eq!(content.status, ContentStatus::Building);
        assert_eq!(content.progress, 0);
    }

    #[test]
    fn destroyed_content_leaves_tile_empty() {
        let mut tile = Tile::new(HexCoord::ORIGIN, now());
        tile.push_content(TileContent::built(
            ContentKind::Building,
            None,
            "hut.glb",
            now(),
        ));
        assert!(!tile.is_empty());
        assert!(tile.has_active_building());

        tile.contents[0].destroy(now());
        assert!(tile.is_empty());
        assert!(!tile.has_active_building());
        assert_eq!(tile.contents.len(), 1);
    }

    #[test]
    fn content_kind_round_trips_free_form_tags() {
        let json = serde_json::to_string(&ContentKind::Other("Tree".into())).unwrap();
        assert_eq!(json, "\"Tree\"");
        let kind: ContentKind = serde_json::from_str("\"Busy\"").unwrap();
        assert_eq!(kind, ContentKind::Busy);
    }

    #[test]
    fn unknown_status_is_a_parse_error() {
        assert!("Ruined".parse::<ContentStatus>().is_err());
        assert_eq!("Built".parse::<ContentStatus>().unwrap(), ContentStatus::Built);
    }
}
