//! Disc Duel loopback demo
//!
//! Runs both peers of a match in one process over 127.0.0.1, scripts their
//! shots, and reports the fingerprint agreement at the end.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use disc_duel::{LinkStatus, MatchEvent, MatchSession, SessionConfig, Team, VERSION};

const ADDR_BLUE: &str = "127.0.0.1:47101";
const ADDR_RED: &str = "127.0.0.1:47102";

/// Frame cadence of the demo loop.
const FRAME: Duration = Duration::from_millis(8);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Disc Duel v{VERSION} loopback demo");

    let addr_blue: SocketAddr = ADDR_BLUE.parse().context("blue address")?;
    let addr_red: SocketAddr = ADDR_RED.parse().context("red address")?;
    let match_id = uuid::Uuid::new_v4().to_string();
    info!(%match_id, "starting both peers");

    let mut blue = MatchSession::begin(
        SessionConfig::default(),
        match_id.clone(),
        addr_blue,
        addr_red,
        Team::Blue,
        Team::Blue,
    )
    .await
    .context("starting blue session")?;
    let mut red = MatchSession::begin(
        SessionConfig::default(),
        match_id,
        addr_red,
        addr_blue,
        Team::Red,
        Team::Blue,
    )
    .await
    .context("starting red session")?;

    let dt = FRAME.as_secs_f32();
    let mut over = false;

    // Roughly two minutes of simulated play, or until someone wins.
    for _ in 0..15_000u32 {
        for session in [&mut blue, &mut red] {
            for event in session.tick(dt) {
                report(session.local_team(), &event);
                if matches!(event, MatchEvent::MatchEnded { .. }) {
                    over = true;
                }
            }
            maybe_shoot(session);
        }
        if over || blue.link_status() == LinkStatus::TimedOut {
            break;
        }
        tokio::time::sleep(FRAME).await;
    }

    info!(
        blue = %blue.world().fingerprint(),
        red = %red.world().fingerprint(),
        score = ?blue.score(),
        "demo finished"
    );
    if blue.world().fingerprint() == red.world().fingerprint() {
        info!("worlds agree");
    } else {
        info!("worlds diverged (snapshot correction may still be in flight)");
    }

    blue.stop();
    red.stop();
    Ok(())
}

/// Shoot the piece nearest the ball straight at the ball.
fn maybe_shoot(session: &mut MatchSession) {
    if !session.can_shoot_now() || session.link_status() != LinkStatus::Connected {
        return;
    }
    let world = session.world();
    let Some(ball) = world.get(world.ball_id) else {
        return;
    };
    let ball_pos = ball.pos;
    let team = session.local_team();

    let Some(shooter) = world
        .discs
        .iter()
        .filter(|d| d.team == team)
        .min_by(|a, b| {
            a.pos
                .distance(ball_pos)
                .total_cmp(&b.pos.distance(ball_pos))
        })
        .map(|d| (d.id, d.pos))
    else {
        return;
    };

    let delta = ball_pos - shooter.1;
    let angle = delta.y.atan2(delta.x);
    if let Err(e) = session.submit_local_shot(shooter.0, angle, 0.8) {
        info!(?team, "scripted shot rejected: {e}");
    }
}

fn report(side: Team, event: &MatchEvent) {
    match event {
        MatchEvent::Connected => info!(?side, "peer link up"),
        MatchEvent::ConnectionFailed => info!(?side, "peer unreachable"),
        MatchEvent::TurnChanged { owner } => info!(?side, ?owner, "turn changed"),
        MatchEvent::Goal { team, score } => info!(?side, ?team, ?score, "goal"),
        MatchEvent::MatchEnded { winner, score } => {
            info!(?side, ?winner, ?score, "match over")
        }
    }
}
