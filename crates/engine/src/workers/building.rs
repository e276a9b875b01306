//! Building command worker.

use async_trait::async_trait;
use hexworld_domain::{BuildingTypeId, HexCoord, SessionId};
use hexworld_shared::topics::{commands, events};
use hexworld_shared::{BuildBuildingCommand, BuildingBuiltEvent};
use tokio_util::sync::CancellationToken;

use crate::infrastructure::ports::{AckDecision, HandlerError};
use crate::use_cases::{ActionOutcome, ConstructBuilding, PlacedBuilding, PlacementResult};

use super::dispatch::{decode_payload, CommandFamily, CommandHandler, DecodeError, MessageScope};
use super::events::tile_data;

#[derive(Debug, Clone, PartialEq)]
pub enum BuildingCommand {
    Build(BuildBuildingCommand),
}

impl CommandFamily for BuildingCommand {
    const FAMILY: &'static str = "building";

    fn decode(topic: &str, payload: &serde_json::Value) -> Result<Self, DecodeError> {
        match topic {
            commands::BUILDING_BUILD => Ok(Self::Build(decode_payload(topic, payload)?)),
            other => Err(DecodeError::UnknownTopic(other.to_string())),
        }
    }
}

fn built_event(placed: &PlacedBuilding) -> Result<BuildingBuiltEvent, HandlerError> {
    let origin = placed
        .origin()
        .ok_or_else(|| HandlerError::permanent("placed building has an empty footprint"))?;
    Ok(BuildingBuiltEvent {
        building_id: placed.building.id.to_uuid(),
        building_type_id: placed.building_type.id.to_uuid(),
        owner_id: placed.building.owner.map(|owner| owner.to_uuid()),
        origin: tile_data(origin),
        footprint: placed.footprint.iter().map(tile_data).collect(),
    })
}

#[derive(Debug, Default)]
pub struct BuildingCommandHandler;

impl BuildingCommandHandler {
    async fn build(
        &self,
        command: BuildBuildingCommand,
        origin: SessionId,
        scope: MessageScope,
    ) -> Result<AckDecision, HandlerError> {
        let action = ConstructBuilding {
            session: origin.clone(),
            building_type: BuildingTypeId::from_uuid(command.building_type_id),
            origin: HexCoord::new(command.q, command.r),
            now: scope.clock.now(),
        };

        match scope.actions.run(&action).await? {
            ActionOutcome::Applied(result) => {
                let placed = result.placed();
                let event = built_event(placed)?;
                if let PlacementResult::AlreadyPlaced(_) = result {
                    tracing::info!(
                        origin = %origin,
                        building_id = %placed.building.id,
                        "Building already standing, re-announcing"
                    );
                } else {
                    tracing::info!(
                        origin = %origin,
                        building_id = %placed.building.id,
                        building_type = %placed.building_type.name,
                        tiles = placed.footprint.len(),
                        "Building placed"
                    );
                }
                scope.events.publish(events::BUILDING_BUILT, &origin, &event).await?;
            }
            ActionOutcome::Rejected(violation) => {
                scope
                    .events
                    .reject(
                        events::BUILDING_REJECTED,
                        commands::BUILDING_BUILD,
                        &origin,
                        &violation,
                    )
                    .await?;
            }
        }
        Ok(AckDecision::Ack)
    }
}

#[async_trait]
impl CommandHandler for BuildingCommandHandler {
    type Command = BuildingCommand;

    async fn handle(
        &self,
        command: BuildingCommand,
        origin: SessionId,
        scope: MessageScope,
        _cancel: CancellationToken,
    ) -> Result<AckDecision, HandlerError> {
        match command {
            BuildingCommand::Build(build) => self.build(build, origin, scope).await,
        }
    }
}
