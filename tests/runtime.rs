//! Async runtime behavior on wall-clock time

use std::time::Duration;

use plaza_sim::core::types::{AgentId, Rect, Vec2};
use plaza_sim::core::{SimError, SimulationConfig};
use plaza_sim::entity::{Agent, MemoryKind, MemoryRecord, Task};
use plaza_sim::simulation::{Collaborators, SimCommand, SimState, SimulationEvent, SimulationRuntime};
use plaza_sim::world::WorldGeometry;
use tokio::sync::broadcast;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn quiet_config() -> SimulationConfig {
    let mut config = SimulationConfig::default();
    // Keep autonomous decisions out of the way
    config.autonomy_enabled = false;
    config
}

fn state_with(config: SimulationConfig, agents: Vec<Agent>) -> SimState {
    let geometry = WorldGeometry::new(Rect::new(0.0, 0.0, 1600.0, 1000.0));
    let mut all = vec![Agent::player("player", "Player", Vec2::new(800.0, 500.0))];
    all.extend(agents);
    SimState::new(config, geometry, all).unwrap()
}

fn state(agents: Vec<Agent>) -> SimState {
    state_with(quiet_config(), agents)
}

async fn wait_for<F>(events: &mut broadcast::Receiver<SimulationEvent>, mut pred: F) -> SimulationEvent
where
    F: FnMut(&SimulationEvent) -> bool,
{
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn test_command_updates_snapshot() {
    let (handle, task) = SimulationRuntime::spawn(state(vec![]), Collaborators::offline());

    handle
        .send(SimCommand::MovePlayer {
            direction: Vec2::new(1.0, 0.0),
        })
        .await
        .unwrap();

    let snapshot = handle.snapshot();
    let player = snapshot.agents.iter().find(|a| a.id == AgentId::from("player")).unwrap();
    assert!(player.position.x > 800.0);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_unknown_agent_is_rejected() {
    let (handle, task) = SimulationRuntime::spawn(state(vec![]), Collaborators::offline());

    let result = handle
        .send(SimCommand::SetLocked {
            agent: AgentId::from("ghost"),
            locked: true,
        })
        .await;
    assert!(matches!(result, Err(SimError::AgentNotFound(id)) if id == AgentId::from("ghost")));

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_silences_walking_audio_and_closes() {
    let (runtime, handle) = SimulationRuntime::new(state(vec![]), Collaborators::offline());
    let mut events = handle.subscribe();
    let task = tokio::spawn(runtime.run());

    handle.shutdown().await.unwrap();
    let event = wait_for(&mut events, |e| matches!(e, SimulationEvent::WalkingAudio { .. })).await;
    assert_eq!(event, SimulationEvent::WalkingAudio { active: false });

    timeout(WAIT, task).await.unwrap().unwrap();
    assert!(!handle.snapshot().walking_near_player);

    let result = handle.send(SimCommand::SetModalOpen { open: true }).await;
    assert!(matches!(result, Err(SimError::ChannelClosed)));
}

#[tokio::test]
async fn test_gossip_reaction_comes_back_as_relationship_change() {
    let memory = MemoryRecord::new(MemoryKind::Observation, "Otto helped rebuild the bridge", 7.0, 0);
    let mut a = Agent::new("a", "Ana", Vec2::new(200.0, 200.0));
    a.current_task = Some(Task::Talk {
        partner: "b".into(),
        memory: Some(memory),
        started_at: 0,
    });
    let mut b = Agent::new("b", "Ben", Vec2::new(230.0, 200.0));
    b.current_task = Some(Task::Talk {
        partner: "a".into(),
        memory: None,
        started_at: 0,
    });

    // Reactions are only requested while autonomy is on
    let (runtime, handle) = SimulationRuntime::new(
        state_with(SimulationConfig::default(), vec![a, b]),
        Collaborators::offline(),
    );
    let mut events = handle.subscribe();
    let task = tokio::spawn(runtime.run());

    let event = wait_for(&mut events, |e| matches!(e, SimulationEvent::RelationshipChanged { .. })).await;
    match event {
        SimulationEvent::RelationshipChanged { agent, toward, delta, score } => {
            assert_eq!(agent, AgentId::from("b"));
            assert_eq!(toward, AgentId::from("a"));
            assert!(delta > 0.0);
            assert_eq!(score, delta);
        }
        other => panic!("unexpected event {:?}", other),
    }

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}
