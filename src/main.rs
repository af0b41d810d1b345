//! Rollback Netcode Demo
//!
//! Loopback session: one server and two clients wired through in-memory
//! queues with delivery delay and packet loss on the unreliable channel.
//! Exercises handshake, prediction, rollback, bounded-wait reconciliation,
//! snapshot correction, clock sync, and finishes with a trace replay that
//! verifies the authoritative timeline was deterministic.

use anyhow::Context;
use chrono::Utc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use rollback_netcode::game::replay::replay_session;
use rollback_netcode::game::state::frame_hash;
use rollback_netcode::network::session::{ClientSession, Outbound, Recipient, ServerSession};
use rollback_netcode::{
    Channel, InputFrame, Message, ParticipantId, MAX_SIM_WAIT_TICKS, ROLLBACK_WINDOW, TICK_RATE,
    VERSION,
};

/// Simulated one-way delivery delay, in steps.
const DELAY: u32 = 2;

/// Drop every Nth unreliable message (the reliable channel never drops).
const LOSS_MODULUS: u32 = 9;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("Rollback Netcode Demo v{}", VERSION);
    info!(
        "Tick rate: {} Hz, rollback window: {} ticks, bounded wait: {} ticks",
        TICK_RATE, ROLLBACK_WINDOW, MAX_SIM_WAIT_TICKS
    );

    demo_session()
}

fn now_ms() -> f64 {
    Utc::now().timestamp_millis() as f64
}

/// A queued delivery: due step, destination lane, message.
type ClientQueue = Vec<(u32, usize, Message)>;

/// Fan an outbound message into per-client deliveries, dropping unreliable
/// traffic according to the loss pattern.
fn fan_out(
    out: Outbound,
    ids: &[ParticipantId],
    due: u32,
    sent_unreliable: &mut u32,
    queue: &mut ClientQueue,
) {
    let targets: Vec<usize> = match out.recipient {
        Recipient::One(id) => vec![id.index()],
        Recipient::All => ids.iter().map(|id| id.index()).collect(),
        Recipient::AllExcept(except) => ids
            .iter()
            .filter(|id| **id != except)
            .map(|id| id.index())
            .collect(),
    };

    for lane in targets {
        if out.channel == Channel::Unreliable {
            *sent_unreliable += 1;
            if *sent_unreliable % LOSS_MODULUS == 0 {
                continue; // lost on the wire; a missed input is predicted
            }
        }
        queue.push((due, lane, out.message.clone()));
    }
}

fn demo_session() -> anyhow::Result<()> {
    info!("=== Starting Loopback Session ===");

    let mut server = ServerSession::new(0);
    let mut clients = [ClientSession::new(), ClientSession::new()];
    let ids = [
        ParticipantId::new(1).expect("id in range"),
        ParticipantId::new(2).expect("id in range"),
    ];

    let mut to_clients: ClientQueue = Vec::new();
    let mut to_server: Vec<(u32, ParticipantId, Message)> = Vec::new();
    let mut unreliable_sent = 0u32;

    for id in &ids {
        for out in server.on_connect(*id) {
            fan_out(out, &ids, 0, &mut unreliable_sent, &mut to_clients);
        }
    }

    let active_steps = 240u32; // four seconds of movement
    let total_steps = 360u32; // then quiet until the pipes drain

    for step in 1..=total_steps {
        // Deliver due server -> client traffic.
        let due: ClientQueue = to_clients
            .iter()
            .filter(|(d, _, _)| *d <= step)
            .cloned()
            .collect();
        to_clients.retain(|(d, _, _)| *d > step);
        for (_, lane, message) in due {
            clients[lane]
                .handle_message(message, now_ms())
                .context("client message handling")?;
        }

        // Each client runs its fixed step; scripted, deterministic inputs.
        for (lane, client) in clients.iter_mut().enumerate() {
            if !client.is_joined() {
                continue;
            }
            let frame = if step <= active_steps {
                scripted_frame(lane, step)
            } else {
                InputFrame::neutral()
            };
            let msg = client.advance(frame).context("client step")?;
            to_server.push((step + DELAY, ids[lane], msg));

            // One clock sync early in the session.
            if step == 30 && lane == 0 {
                to_server.push((step + DELAY, ids[lane], client.time_request()));
            }
        }

        // Deliver due client -> server traffic, then run the server step.
        let due: Vec<(u32, ParticipantId, Message)> = to_server
            .iter()
            .filter(|(d, _, _)| *d <= step)
            .cloned()
            .collect();
        to_server.retain(|(d, _, _)| *d > step);

        let mut outbound = Vec::new();
        for (_, from, message) in due {
            outbound.extend(
                server
                    .handle_message(from, message, now_ms())
                    .context("server message handling")?,
            );
        }
        outbound.extend(server.advance().context("server step")?);

        for out in outbound {
            fan_out(out, &ids, step + DELAY, &mut unreliable_sent, &mut to_clients);
        }

        // Report once per simulated second.
        if step % TICK_RATE == 0 {
            let awaiting = server.engine().tick_awaiting();
            let p1 = server.engine().states()[0].position;
            info!(
                "step {}: server awaiting tick {}, P1 at {}, {} unreliable messages sent",
                step, awaiting, p1, unreliable_sent
            );
        }
    }

    // =========================================================================
    // RESULTS
    // =========================================================================

    info!("=== Session Results ===");
    let awaiting = server.engine().tick_awaiting();
    let authoritative_hash = frame_hash(awaiting, server.engine().roster(), server.engine().states());
    info!("Server simulated through tick {}", awaiting - 1);
    info!("Authoritative hash: {}", hex::encode(authoritative_hash));

    for id in ids {
        let state = server
            .engine()
            .state(id)
            .context("participant missing from roster")?;
        info!("{} final position: {}", id, state.position);

        for (lane, client) in clients.iter().enumerate() {
            let view = client.state(id).context("client lost roster entry")?;
            let agrees = view.bits_eq(state);
            info!(
                "  client {} view: {} ({})",
                lane + 1,
                view.position,
                if agrees { "converged" } else { "DIVERGED" }
            );
        }
    }

    // =========================================================================
    // REPLAY VERIFICATION
    // =========================================================================

    info!("=== Verifying Determinism ===");
    let (_, replay_hash) = replay_session(
        server.engine().roster(),
        Default::default(),
        server.engine().traces(),
        0,
        awaiting,
    );
    info!("Replay hash: {}", hex::encode(replay_hash));

    if replay_hash == authoritative_hash {
        info!("DETERMINISM VERIFIED: replayed timeline matches");
        Ok(())
    } else {
        anyhow::bail!("replayed timeline diverged from the live simulation");
    }
}

/// Deterministic input script: the two participants orbit in different
/// rhythms so rollbacks and predictions both get exercised.
fn scripted_frame(lane: usize, step: u32) -> InputFrame {
    let phase = (step / 30 + lane as u32) % 4;
    match phase {
        0 => InputFrame::from_flags(true, false, false, false),
        1 => InputFrame::from_flags(true, false, false, true),
        2 => InputFrame::from_flags(false, false, true, true),
        _ => InputFrame::from_flags(false, true, false, false),
    }
}
