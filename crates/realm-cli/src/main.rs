use std::collections::BTreeMap;
use std::env;
use std::sync::{Arc, Mutex};

use contracts::{CharacterRecord, CommandSource, DecisionContext, EngineConfig, GameEvent, RoomRecord};
use realm_core::decision::{DecisionBackend, DecisionFuture, NullBackend};
use realm_core::propagation::DeliverySink;
use realm_core::GameWorld;
use tracing::info;

fn print_usage() {
    println!("realm-cli <command>");
    println!("commands:");
    println!("  demo [ticks]");
    println!("    runs a scripted five-room scene and prints what Alice sees");
    println!("  simulate <seed> [ticks] [sqlite_path]");
    println!("    runs a deterministic world and persists state to sqlite");
}

fn parse_seed(value: Option<&String>) -> Result<u64, String> {
    let raw = value.ok_or_else(|| "missing seed".to_string())?;
    raw.parse::<u64>()
        .map_err(|_| format!("invalid seed: {raw}"))
}

fn parse_ticks(value: Option<&String>, default: u64) -> Result<u64, String> {
    match value {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| format!("invalid ticks: {raw}")),
        None => Ok(default),
    }
}

fn default_sqlite_path() -> String {
    env::var("REALM_SQLITE_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "realm_world.sqlite".to_string())
}

fn parse_sqlite_path(value: Option<&String>) -> String {
    value
        .map(String::to_string)
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(default_sqlite_path)
}

/// Sink for a live character: pushes straight to the terminal.
struct ConsoleSink {
    label: String,
}

impl DeliverySink for ConsoleSink {
    fn deliver(&mut self, _event: &GameEvent, rendered: &str) {
        println!("[{}] {}", self.label, rendered);
    }
}

/// Cycles through a fixed script, one command per decision call.
struct ScriptedBackend {
    script: Vec<String>,
    cursor: Mutex<usize>,
}

impl ScriptedBackend {
    fn new(script: &[&str]) -> Self {
        Self {
            script: script.iter().map(|line| line.to_string()).collect(),
            cursor: Mutex::new(0),
        }
    }
}

impl DecisionBackend for ScriptedBackend {
    fn decide(&self, _context: DecisionContext) -> DecisionFuture {
        let command = {
            let mut cursor = self.cursor.lock().unwrap_or_else(|err| err.into_inner());
            let command = self.script.get(*cursor % self.script.len().max(1)).cloned();
            *cursor += 1;
            command
        };
        Box::pin(async move { Ok(command.map(|command| contracts::AgentDecision { command })) })
    }
}

fn room(room_id: &str, name: &str, exits: &[(&str, &str)]) -> RoomRecord {
    RoomRecord {
        room_id: room_id.to_string(),
        name: name.to_string(),
        exits: exits
            .iter()
            .map(|(direction, target)| (direction.to_string(), target.to_string()))
            .collect::<BTreeMap<String, String>>(),
    }
}

fn character(
    id: &str,
    name: &str,
    room_id: &str,
    power: i64,
    is_agent: bool,
) -> CharacterRecord {
    CharacterRecord {
        character_id: id.to_string(),
        name: name.to_string(),
        room_id: room_id.to_string(),
        hp: 20,
        max_hp: 20,
        power,
        defense: 2,
        alive: true,
        is_agent,
        is_admin: false,
    }
}

fn village_rooms() -> Vec<RoomRecord> {
    vec![
        room("square", "The Village Square", &[("east", "market")]),
        room(
            "market",
            "The Market Row",
            &[("west", "square"), ("east", "tavern")],
        ),
        room(
            "tavern",
            "The Rusted Tankard",
            &[("west", "market"), ("east", "alley")],
        ),
        room(
            "alley",
            "A Narrow Alley",
            &[("west", "tavern"), ("down", "crypt")],
        ),
        room("crypt", "The Old Crypt", &[("up", "alley")]),
    ]
}

fn build_world(seed: u64, backend: Arc<dyn DecisionBackend>) -> Result<GameWorld, String> {
    let mut config = EngineConfig::default();
    config.seed = seed;
    let mut world = GameWorld::with_backend(config, backend);
    world
        .load_rooms(village_rooms())
        .map_err(|err| format!("bad world topology: {err}"))?;
    world.join_character(character("char:golem", "Golem", "market", 6, true));
    world.join_character(character("char:mira", "Mira", "tavern", 4, true));
    world.join_character(character("char:alice", "Alice", "square", 5, false));
    world.join_character(character("char:bob", "Bob", "square", 5, false));
    Ok(world)
}

async fn run_demo(args: &[String]) -> Result<(), String> {
    let ticks = parse_ticks(args.get(2), 120)?;

    let backend = Arc::new(ScriptedBackend::new(&[
        "emote looks up from its work.",
        "say Strangers in the village, hm?",
        "look",
    ]));
    let mut world = build_world(42, backend)?;
    world.attach_sink(
        "char:alice",
        Box::new(ConsoleSink {
            label: "Alice".to_string(),
        }),
    );

    // Player script keyed by tick number; the world runs live at the
    // configured cadence between scripted commands.
    let script: Vec<(u64, &str, &str)> = vec![
        (1, "char:alice", "look"),
        (2, "char:alice", "say hello Bob"),
        (4, "char:bob", "say off to the market"),
        (5, "char:bob", "east"),
        (8, "char:alice", "east"),
        (12, "char:alice", "say good day, Golem"),
        (30, "char:bob", "shout anyone seen the innkeeper?"),
    ];

    let mut reached = 0;
    for (at_tick, actor_id, raw) in &script {
        if *at_tick > ticks {
            break;
        }
        realm_core::tick::run_ticks(&mut world, at_tick - reached).await;
        reached = *at_tick;
        world.enqueue_command(CommandSource::Player, actor_id, raw);
    }
    realm_core::tick::run_ticks(&mut world, ticks.saturating_sub(reached)).await;

    println!(
        "-- demo finished: {} ticks, {} events, game time {}m --",
        world.tick_count(),
        world.event_log().len(),
        world.clock().game_minute()
    );
    Ok(())
}

async fn run_simulation(args: &[String]) -> Result<(), String> {
    let seed = parse_seed(args.get(2))?;
    let ticks = parse_ticks(args.get(3), 240)?;
    let sqlite_path = parse_sqlite_path(args.get(4));

    let mut store = realm_store::SqliteWorldStore::open(&sqlite_path)
        .map_err(|err| format!("failed to open sqlite store: {err}"))?;

    let mut world = build_world(seed, Arc::new(NullBackend))?;
    // Resume agent memory persisted by an earlier run against this store.
    let window_ms = world.config().queue_window_ms;
    let now_ms = world.now_ms();
    for agent_id in ["char:golem", "char:mira"] {
        let snapshot = store
            .load_agent_queue(agent_id)
            .map_err(|err| format!("failed to load agent memory: {err}"))?;
        if !snapshot.entries.is_empty() || !snapshot.self_outputs.is_empty() {
            world.restore_agent_queue(
                agent_id,
                realm_core::agent_queue::AgentEventQueue::restore(window_ms, snapshot, now_ms),
            );
        }
    }
    world.enqueue_command(CommandSource::Player, "char:alice", "say settling in");
    world.enqueue_command(CommandSource::Player, "char:bob", "east");

    realm_core::tick::step_n(&mut world, ticks).await;

    store
        .save_config(world.config())
        .map_err(|err| format!("failed to persist config: {err}"))?;
    store
        .save_rooms(&village_rooms())
        .map_err(|err| format!("failed to persist rooms: {err}"))?;

    let mut agents = 0;
    for record in world.characters().values() {
        store
            .save_character(record)
            .map_err(|err| format!("failed to persist {}: {err}", record.character_id))?;
        if record.is_agent {
            if let Some(queue) = world.agent_queue(&record.character_id) {
                store
                    .save_agent_queue(&record.character_id, &queue.snapshot())
                    .map_err(|err| format!("failed to persist agent memory: {err}"))?;
                agents += 1;
            }
        }
    }

    println!(
        "simulated seed={} ticks={} events={} agents={} sqlite={}",
        seed,
        world.tick_count(),
        world.event_log().len(),
        agents,
        sqlite_path
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            env::var("REALM_LOG").unwrap_or_else(|_| "realm_core=info,realm_cli=info".to_string()),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("demo") => {
            if let Err(err) = run_demo(&args).await {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        }
        Some("simulate") => {
            info!("starting simulation");
            if let Err(err) = run_simulation(&args).await {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        }
        _ => {
            print_usage();
        }
    }
}
