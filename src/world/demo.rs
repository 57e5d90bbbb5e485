//! Built-in demo town used by the headless runner and integration tests

use ahash::AHashMap;

use crate::core::types::{AgentId, ObjectId, Rect, Vec2};
use crate::entity::memory::MemoryKind;
use crate::simulation::state::PreferredActivity;
use crate::world::geometry::WorldGeometry;
use crate::world::loader::{AgentDefinition, MemorySeed, WorldDefinition, WORLD_FORMAT_VERSION};

fn agent(id: &str, name: &str, x: f32, y: f32, persona: &str) -> AgentDefinition {
    AgentDefinition {
        id: AgentId::from(id),
        name: name.to_string(),
        position: Vec2::new(x, y),
        persona: persona.to_string(),
        is_player: false,
        is_animal: false,
        sound: None,
        is_locked: false,
        memories: Vec::new(),
        relationships: AHashMap::new(),
    }
}

fn animal(id: &str, name: &str, x: f32, y: f32, sound: &str) -> AgentDefinition {
    AgentDefinition {
        is_animal: true,
        sound: Some(sound.to_string()),
        ..agent(id, name, x, y, "")
    }
}

fn seed(kind: MemoryKind, description: &str, importance: f32) -> MemorySeed {
    MemorySeed {
        kind,
        description: description.to_string(),
        importance,
    }
}

/// A small town: a cafe and an art studio around an open plaza with a
/// fountain, plus a locked-off dungeon
pub fn demo_world() -> WorldDefinition {
    let geometry = WorldGeometry::new(Rect::new(0.0, 0.0, 1600.0, 1000.0))
        .with_zone("cafe", Rect::new(100.0, 100.0, 500.0, 400.0))
        .with_zone("studio", Rect::new(1100.0, 100.0, 1500.0, 400.0))
        .with_zone("dungeon", Rect::new(1300.0, 750.0, 1550.0, 950.0))
        // Fountain in the middle of the plaza
        .with_obstacle(Rect::new(740.0, 440.0, 860.0, 560.0))
        // Cafe counter and studio wall segment
        .with_obstacle(Rect::new(150.0, 130.0, 350.0, 160.0))
        .with_obstacle(Rect::new(1100.0, 395.0, 1250.0, 405.0))
        .with_object("bookshelf", "cafe", Rect::new(380.0, 120.0, 460.0, 150.0))
        .with_object("piano", "cafe", Rect::new(150.0, 300.0, 230.0, 330.0))
        .with_object("easel", "studio", Rect::new(1300.0, 180.0, 1340.0, 220.0))
        .with_object("sculpting_table", "studio", Rect::new(1400.0, 250.0, 1460.0, 290.0));

    let mut player = agent("player", "You", 800.0, 700.0, "");
    player.is_player = true;

    let mut mara = agent("mara", "Mara", 300.0, 250.0, "A friendly barista who loves a good story");
    mara.memories = vec![
        seed(MemoryKind::Core, "I grew up above the cafe", 9.0),
        seed(MemoryKind::Observation, "The mayor was seen arguing with the baker", 8.0),
    ];
    mara.relationships.insert(AgentId::from("theo"), 40.0);

    let mut theo = agent("theo", "Theo", 420.0, 330.0, "A quiet bookworm, curious about everything");
    theo.memories = vec![seed(MemoryKind::Observation, "A new novel arrived at the library", 6.0)];

    let mut iris = agent("iris", "Iris", 1200.0, 250.0, "An arrogant painter convinced of her genius");
    iris.memories = vec![seed(MemoryKind::Observation, "Someone broke the studio window", 7.0)];
    iris.relationships.insert(AgentId::from("felix"), -20.0);

    let felix = agent("felix", "Felix", 1380.0, 330.0, "An engaging sculptor who hums while working");
    let juno = agent("juno", "Juno", 650.0, 650.0, "A dismissive courier always in a hurry");
    let mut otto = agent("otto", "Otto", 950.0, 380.0, "A retired sailor full of tall tales");
    otto.memories = vec![seed(MemoryKind::Observation, "A ship with red sails helped a fishing boat in the storm", 9.0)];
    let mut warden = agent("warden", "Warden", 1420.0, 850.0, "The dungeon keeper");
    warden.is_locked = true;

    let agents = vec![
        player,
        mara,
        theo,
        iris,
        felix,
        juno,
        otto,
        warden,
        animal("biscuit", "Biscuit", 700.0, 300.0, "Woof!"),
        animal("pepper", "Pepper", 900.0, 650.0, "Meow."),
    ];

    let mut preferred_activities = AHashMap::new();
    for (id, object, activity) in [
        ("theo", "bookshelf", "read"),
        ("mara", "piano", "play"),
        ("iris", "easel", "paint"),
        ("felix", "sculpting_table", "sculpt"),
    ] {
        preferred_activities.insert(
            AgentId::from(id),
            PreferredActivity {
                object: ObjectId::from(object),
                activity: activity.to_string(),
            },
        );
    }

    WorldDefinition {
        version: WORLD_FORMAT_VERSION,
        name: Some("Demo Town".to_string()),
        geometry,
        agents,
        preferred_activities,
    }
}
