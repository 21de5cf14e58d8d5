//! Room-scan scenarios for the simulator.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// RS-001: Static room, pose noise only
    SteadyRoom,

    /// RS-002: Doors swinging open and shut
    DoorSwing,

    /// RS-003: Elements dropping out of scans and coming back
    Flicker,

    /// RS-004: Furniture arriving and leaving
    Furnish,

    /// RS-005: Room disappears from view entirely
    Teardown,

    /// RS-006: Scanner reporting the same element twice per scan
    Echo,

    /// RS-007: Scanner reporting kinds this build does not know
    UnknownKinds,

    /// RS-008: Scans delivered through the async feed from a background producer
    Streamed,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SteadyRoom,
            ScenarioId::DoorSwing,
            ScenarioId::Flicker,
            ScenarioId::Furnish,
            ScenarioId::Teardown,
            ScenarioId::Echo,
            ScenarioId::UnknownKinds,
            ScenarioId::Streamed,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SteadyRoom => "steady_room",
            ScenarioId::DoorSwing => "door_swing",
            ScenarioId::Flicker => "flicker",
            ScenarioId::Furnish => "furnish",
            ScenarioId::Teardown => "teardown",
            ScenarioId::Echo => "echo",
            ScenarioId::UnknownKinds => "unknown_kinds",
            ScenarioId::Streamed => "streamed",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SteadyRoom => "Static room with 1cm pose noise, nothing created or retracted after the first scan",
            ScenarioId::DoorSwing => "Doors flip open/closed 30% of scans, kind changes are updates",
            ScenarioId::Flicker => "25% occlusion per element, retract on miss and recreate on return",
            ScenarioId::Furnish => "Furniture arrives 50% and leaves 20% of scans",
            ScenarioId::Teardown => "Room scanned for a while, then an empty scan retracts everything",
            ScenarioId::Echo => "30% of detections reported twice, last write wins",
            ScenarioId::UnknownKinds => "20% of detections come back with an unrecognized kind",
            ScenarioId::Streamed => "Background producer publishes through the scan feed",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady_room" | "steadyroom" | "rs-001" => Ok(ScenarioId::SteadyRoom),
            "door_swing" | "doorswing" | "rs-002" => Ok(ScenarioId::DoorSwing),
            "flicker" | "rs-003" => Ok(ScenarioId::Flicker),
            "furnish" | "rs-004" => Ok(ScenarioId::Furnish),
            "teardown" | "rs-005" => Ok(ScenarioId::Teardown),
            "echo" | "rs-006" => Ok(ScenarioId::Echo),
            "unknown_kinds" | "unknownkinds" | "rs-007" => Ok(ScenarioId::UnknownKinds),
            "streamed" | "rs-008" => Ok(ScenarioId::Streamed),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
        assert_eq!("RS-003".parse::<ScenarioId>(), Ok(ScenarioId::Flicker));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }
}
