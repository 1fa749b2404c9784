//! Door gateways

use serde::{Deserialize, Serialize};

use super::access::Capability;

/// Gateway identifier; also the `doorId` recorded on-chain
pub type GatewayId = u64;

/// Kind of door, selecting which capability predicate applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoorType {
    /// Physical door
    Physical,
    /// Digital door
    Digital,
    /// Admin room door
    Admin,
}

impl DoorType {
    /// Capability flag a principal must hold
    pub fn required_capability(&self) -> Capability {
        match self {
            DoorType::Physical => Capability::Physical,
            DoorType::Digital => Capability::Digital,
            DoorType::Admin => Capability::AdminRoom,
        }
    }

    /// Whether openings are recorded as physical access
    pub fn is_physical(&self) -> bool {
        matches!(self, DoorType::Physical | DoorType::Admin)
    }

    /// Parse from string
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "physical" => Some(Self::Physical),
            "digital" => Some(Self::Digital),
            "admin" | "admin_room" => Some(Self::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for DoorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DoorType::Physical => write!(f, "Physical"),
            DoorType::Digital => write!(f, "Digital"),
            DoorType::Admin => write!(f, "Admin"),
        }
    }
}

/// Open/closed state of a gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoorState {
    /// Closed
    #[default]
    Closed,
    /// Open
    Open,
}

impl DoorState {
    /// The opposite state
    pub fn toggled(&self) -> Self {
        match self {
            DoorState::Closed => DoorState::Open,
            DoorState::Open => DoorState::Closed,
        }
    }
}

/// Position in scene space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance
    pub fn distance(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// A gated resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoorGateway {
    /// Gateway ID
    pub id: GatewayId,
    /// Display name
    pub name: String,
    /// Door type
    pub door_type: DoorType,
    /// Current state
    pub current_state: DoorState,
    /// Radius within which a player may interact
    pub interaction_radius: f32,
    /// Location used for presence checks
    pub position: Position,
}

impl DoorGateway {
    /// Create a closed gateway at the origin with the default 2.0 radius
    pub fn new(id: GatewayId, name: impl Into<String>, door_type: DoorType) -> Self {
        Self {
            id,
            name: name.into(),
            door_type,
            current_state: DoorState::Closed,
            interaction_radius: 2.0,
            position: Position::default(),
        }
    }

    /// Set interaction radius
    pub fn with_radius(mut self, radius: f32) -> Self {
        self.interaction_radius = radius;
        self
    }

    /// Set position
    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Whether a point lies within the interaction radius
    pub fn within_reach(&self, point: &Position) -> bool {
        self.position.distance(point) <= self.interaction_radius
    }
}

/// Display name for an on-chain door id
pub fn door_display_name(door_id: u64) -> String {
    match door_id {
        0 => "Main Door".to_string(),
        1 => "Server Room".to_string(),
        n => format!("Door #{}", n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_door_type_capabilities() {
        assert_eq!(DoorType::Physical.required_capability(), Capability::Physical);
        assert_eq!(DoorType::Digital.required_capability(), Capability::Digital);
        assert_eq!(DoorType::Admin.required_capability(), Capability::AdminRoom);
        assert!(!DoorType::Digital.is_physical());
    }

    #[test]
    fn test_state_toggle() {
        assert_eq!(DoorState::Closed.toggled(), DoorState::Open);
        assert_eq!(DoorState::Open.toggled(), DoorState::Closed);
    }

    #[test]
    fn test_within_reach() {
        let door = DoorGateway::new(0, "Main", DoorType::Physical)
            .with_radius(2.0)
            .at(Position::new(1.0, 0.0, 1.0));
        assert!(door.within_reach(&Position::new(2.0, 0.0, 2.0)));
        assert!(!door.within_reach(&Position::new(4.0, 0.0, 1.0)));
    }

    #[test]
    fn test_door_display_names() {
        assert_eq!(door_display_name(0), "Main Door");
        assert_eq!(door_display_name(1), "Server Room");
        assert_eq!(door_display_name(7), "Door #7");
    }
}
