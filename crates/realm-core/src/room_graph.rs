//! Directed room adjacency and BFS hop distances.
//!
//! The graph is rebuilt wholesale from the world collaborator's room records;
//! there is no incremental edit API. Range-limited propagation asks for all
//! rooms within N hops of an origin.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use contracts::RoomRecord;

/// Error type for graph rebuilds. A wrong graph silently breaks every
/// subsequent propagation decision, so rebuilds fail fast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// An exit points at a room id that is not part of the rebuild set.
    DanglingExit {
        room_id: String,
        direction: String,
        target: String,
    },
    /// Two room records share an id.
    DuplicateRoom { room_id: String },
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyError::DanglingExit {
                room_id,
                direction,
                target,
            } => write!(
                f,
                "room {room_id} exit {direction} references unknown room {target}"
            ),
            TopologyError::DuplicateRoom { room_id } => {
                write!(f, "duplicate room id {room_id}")
            }
        }
    }
}

impl std::error::Error for TopologyError {}

/// Directed adjacency of rooms keyed by stable room id, owned exclusively
/// by the world. Exits need not be symmetric.
#[derive(Debug, Clone, Default)]
pub struct RoomGraph {
    adjacency: BTreeMap<String, Vec<String>>,
}

impl RoomGraph {
    pub fn new() -> Self {
        Self {
            adjacency: BTreeMap::new(),
        }
    }

    /// Replace the adjacency map wholesale from the given room records.
    /// Every exit must reference a room in the same set.
    pub fn build(&mut self, rooms: &[RoomRecord]) -> Result<(), TopologyError> {
        let mut known = BTreeSet::new();
        for room in rooms {
            if !known.insert(room.room_id.as_str()) {
                return Err(TopologyError::DuplicateRoom {
                    room_id: room.room_id.clone(),
                });
            }
        }

        let mut adjacency = BTreeMap::new();
        for room in rooms {
            let mut neighbours = Vec::new();
            for (direction, target) in &room.exits {
                if !known.contains(target.as_str()) {
                    return Err(TopologyError::DanglingExit {
                        room_id: room.room_id.clone(),
                        direction: direction.clone(),
                        target: target.clone(),
                    });
                }
                neighbours.push(target.clone());
            }
            adjacency.insert(room.room_id.clone(), neighbours);
        }

        self.adjacency = adjacency;
        Ok(())
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.adjacency.contains_key(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Breadth-first hop distances from `origin`, expanding at most
    /// `max_distance` hops. The origin maps to 0; unreachable rooms are
    /// absent from the result. An unknown origin yields an empty map.
    pub fn distances_from(&self, origin: &str, max_distance: u32) -> BTreeMap<String, u32> {
        let mut distances = BTreeMap::new();
        if !self.adjacency.contains_key(origin) {
            return distances;
        }

        distances.insert(origin.to_string(), 0);
        let mut frontier = VecDeque::new();
        frontier.push_back((origin.to_string(), 0_u32));

        while let Some((room_id, distance)) = frontier.pop_front() {
            if distance >= max_distance {
                continue;
            }
            let Some(neighbours) = self.adjacency.get(&room_id) else {
                continue;
            };
            for neighbour in neighbours {
                if !distances.contains_key(neighbour) {
                    distances.insert(neighbour.clone(), distance + 1);
                    frontier.push_back((neighbour.clone(), distance + 1));
                }
            }
        }

        distances
    }

    /// All room ids within `max_distance` hops of `origin`, origin included.
    pub fn rooms_within(&self, origin: &str, max_distance: u32) -> BTreeSet<String> {
        self.distances_from(origin, max_distance)
            .into_keys()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn room(id: &str, exits: &[(&str, &str)]) -> RoomRecord {
        RoomRecord {
            room_id: id.to_string(),
            name: id.to_string(),
            exits: exits
                .iter()
                .map(|(direction, target)| (direction.to_string(), target.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    /// R0 - R1 - R2 - R3 - R4 chained one hop apart, both directions.
    fn chain() -> Vec<RoomRecord> {
        vec![
            room("r0", &[("east", "r1")]),
            room("r1", &[("west", "r0"), ("east", "r2")]),
            room("r2", &[("west", "r1"), ("east", "r3")]),
            room("r3", &[("west", "r2"), ("east", "r4")]),
            room("r4", &[("west", "r3")]),
        ]
    }

    #[test]
    fn origin_has_distance_zero() {
        let mut graph = RoomGraph::new();
        graph.build(&chain()).expect("valid chain");
        let distances = graph.distances_from("r0", 5);
        assert_eq!(distances.get("r0"), Some(&0));
    }

    #[test]
    fn chain_distances_match_hop_count() {
        let mut graph = RoomGraph::new();
        graph.build(&chain()).expect("valid chain");
        let distances = graph.distances_from("r0", 10);
        assert_eq!(distances.get("r1"), Some(&1));
        assert_eq!(distances.get("r2"), Some(&2));
        assert_eq!(distances.get("r3"), Some(&3));
        assert_eq!(distances.get("r4"), Some(&4));
    }

    #[test]
    fn max_distance_stops_expansion() {
        let mut graph = RoomGraph::new();
        graph.build(&chain()).expect("valid chain");
        let distances = graph.distances_from("r0", 3);
        assert!(distances.contains_key("r3"));
        assert!(!distances.contains_key("r4"));
    }

    #[test]
    fn zero_distance_is_origin_only() {
        let mut graph = RoomGraph::new();
        graph.build(&chain()).expect("valid chain");
        let distances = graph.distances_from("r2", 0);
        assert_eq!(distances.len(), 1);
        assert_eq!(distances.get("r2"), Some(&0));
    }

    #[test]
    fn unreachable_rooms_are_absent() {
        let mut graph = RoomGraph::new();
        graph
            .build(&[room("a", &[]), room("b", &[])])
            .expect("valid");
        let distances = graph.distances_from("a", 10);
        assert_eq!(distances.len(), 1);
        assert!(!distances.contains_key("b"));
    }

    #[test]
    fn isolated_room_returns_singleton_map() {
        let mut graph = RoomGraph::new();
        graph.build(&[room("lonely", &[])]).expect("valid");
        let distances = graph.distances_from("lonely", 5);
        assert_eq!(distances.len(), 1);
    }

    #[test]
    fn asymmetric_exits_are_directed() {
        // a -> b but not back.
        let mut graph = RoomGraph::new();
        graph
            .build(&[room("a", &[("down", "b")]), room("b", &[])])
            .expect("valid");
        assert!(graph.distances_from("a", 3).contains_key("b"));
        assert!(!graph.distances_from("b", 3).contains_key("a"));
    }

    #[test]
    fn dangling_exit_fails_fast() {
        let mut graph = RoomGraph::new();
        let err = graph
            .build(&[room("a", &[("north", "nowhere")])])
            .unwrap_err();
        assert!(matches!(err, TopologyError::DanglingExit { .. }));
    }

    #[test]
    fn duplicate_room_fails_fast() {
        let mut graph = RoomGraph::new();
        let err = graph.build(&[room("a", &[]), room("a", &[])]).unwrap_err();
        assert!(matches!(err, TopologyError::DuplicateRoom { .. }));
    }

    #[test]
    fn rebuild_replaces_previous_topology() {
        let mut graph = RoomGraph::new();
        graph.build(&chain()).expect("valid chain");
        graph.build(&[room("solo", &[])]).expect("valid rebuild");
        assert!(!graph.contains("r0"));
        assert!(graph.contains("solo"));
    }

    #[test]
    fn unknown_origin_yields_empty_map() {
        let mut graph = RoomGraph::new();
        graph.build(&chain()).expect("valid chain");
        assert!(graph.distances_from("missing", 3).is_empty());
    }

    #[test]
    fn multiple_equal_paths_keep_shortest_distance() {
        // Diamond: top -> left/right -> bottom.
        let mut graph = RoomGraph::new();
        graph
            .build(&[
                room("top", &[("west", "left"), ("east", "right")]),
                room("left", &[("south", "bottom")]),
                room("right", &[("south", "bottom")]),
                room("bottom", &[]),
            ])
            .expect("valid diamond");
        let distances = graph.distances_from("top", 5);
        assert_eq!(distances.get("bottom"), Some(&2));
    }
}
