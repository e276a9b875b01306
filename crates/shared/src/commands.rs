//! Command payloads, one per command routing key

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `game.commands.tile.claim`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimTileCommand {
    pub q: i32,
    pub r: i32,
}

/// `game.commands.building.build`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BuildBuildingCommand {
    pub building_type_id: Uuid,
    pub q: i32,
    pub r: i32,
}

/// `game.commands.player.join`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinPlayerCommand {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_command_reads_camel_case() {
        let id = Uuid::new_v4();
        let json = format!(r#"{{"buildingTypeId":"{id}","q":3,"r":-1}}"#);
        let cmd: BuildBuildingCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(cmd.building_type_id, id);
        assert_eq!((cmd.q, cmd.r), (3, -1));
    }

    #[test]
    fn claim_payload_missing_coordinate_fails() {
        assert!(serde_json::from_str::<ClaimTileCommand>(r#"{"q":1}"#).is_err());
    }
}
