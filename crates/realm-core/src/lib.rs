//! Runtime core for a multi-occupant text realm.
//!
//! The world is driven by a single cooperative tick loop: commands batch
//! up between ticks and drain sequentially, combat advances on gauges,
//! events fan out through BFS-ranged propagation, and autonomous agents
//! react on priority-weighted deadlines with a bounded number of
//! in-flight decision calls.

pub mod agent_queue;
pub mod attention;
pub mod clock;
pub mod combat;
pub mod decision;
pub mod propagation;
pub mod room_graph;
pub mod tick;
pub mod world;

pub use world::GameWorld;
