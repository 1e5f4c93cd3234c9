//! Local Match - plays a scripted match between two in-process sessions.
//!
//! Run with: `cargo run --package local-match -- --time-control 5+0`
//!
//! The script exercises a premove, a takeback and a draw by agreement.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use match_sync::prelude::*;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "local-match")]
#[command(about = "Plays a scripted match between two in-process sessions")]
struct Args {
    /// Time control as "minutes+increment".
    #[arg(long, env = "MATCH_TIME_CONTROL", default_value = "5+0")]
    time_control: String,

    /// Credit the increment to the mover after each move.
    #[arg(long, env = "MATCH_CREDIT_INCREMENT")]
    credit_increment: bool,

    /// Display timer period in milliseconds.
    #[arg(long, env = "MATCH_TICK_MS", default_value_t = 100)]
    tick_ms: u64,

    /// Pause between scripted moves in milliseconds.
    #[arg(long, env = "MATCH_MOVE_DELAY_MS", default_value_t = 250)]
    move_delay_ms: u64,
}

const WAIT: Duration = Duration::from_secs(5);

async fn wait_for<F>(session: &MatchSession, what: &str, predicate: F) -> Result<MatchRecord>
where
    F: FnMut(&MatchRecord) -> bool,
{
    tokio::time::timeout(WAIT, session.wait_for(predicate))
        .await
        .with_context(|| format!("timed out waiting for {what}"))?
        .map_err(Into::into)
}

async fn play(session: &MatchSession, uci: &str) -> Result<()> {
    let (from, to) = parse_coordinates(uci).map_err(|e| anyhow!("{uci}: {e}"))?;
    if !session.submit_move(from, to).await? {
        tracing::info!(%uci, "move queued as premove");
    }
    Ok(())
}

fn report_clock(label: &str, session: &MatchSession) {
    let clock = session.clock();
    tracing::info!(
        white_ms = clock.white.as_millis() as u64,
        black_ms = clock.black.as_millis() as u64,
        "{label}"
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("match_sync=info".parse()?)
                .add_directive("local_match=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let time_control = TimeControl::parse(&args.time_control)
        .ok_or_else(|| anyhow!("invalid time control {:?}", args.time_control))?;
    let config = MatchConfig {
        tick_interval: Duration::from_millis(args.tick_ms),
        credit_increment: args.credit_increment,
        ..Default::default()
    };
    let delay = Duration::from_millis(args.move_delay_ms);

    let controller = MatchController::new(
        Arc::new(MemoryMatchStore::new()),
        Arc::new(ShakmatyRules),
        Arc::new(WallClock),
        config,
    )?;

    let alice = ParticipantId::new();
    let bob = ParticipantId::new();
    let match_id = controller.create_match(alice, time_control).await?;
    controller.join_match(match_id, bob).await?;
    tracing::info!(%match_id, %time_control, "match started");

    let white = MatchSession::open(controller.clone(), match_id, alice).await?;
    let black = MatchSession::open(controller.clone(), match_id, bob).await?;

    // Black premoves before White has moved.
    play(&black, "e7e5").await?;
    tokio::time::sleep(delay).await;
    play(&white, "e2e4").await?;
    wait_for(&white, "premove reply", |r| r.move_count() == 2).await?;
    report_clock("after premove", &white);

    tokio::time::sleep(delay).await;
    play(&white, "g1f3").await?;
    wait_for(&white, "Nf3", |r| r.move_count() == 3).await?;

    // White changes their mind.
    white.request_takeback().await?;
    wait_for(&black, "takeback request", |r| r.takeback_request.is_some()).await?;
    black.respond_takeback(true).await?;
    wait_for(&white, "takeback", |r| r.move_count() == 2).await?;
    tracing::info!("takeback accepted");

    for (session, uci) in [(&white, "f1c4"), (&black, "b8c6"), (&white, "d1h5")] {
        tokio::time::sleep(delay).await;
        let count = session.snapshot().move_count();
        play(session, uci).await?;
        wait_for(session, uci, |r| r.move_count() > count).await?;
    }
    report_clock("before draw offer", &black);

    black.offer_draw().await?;
    wait_for(&white, "draw offer", |r| r.draw_offer.is_some()).await?;
    white.respond_draw(true).await?;
    let finished = wait_for(&black, "result", |r| r.status == MatchStatus::Completed).await?;

    let moves: Vec<_> = finished
        .move_history
        .iter()
        .map(|m| m.notation.as_str())
        .collect();
    tracing::info!(moves = %moves.join(" "), "final history");
    if let Some(result) = finished.result {
        tracing::info!(%result, "match over");
    }

    white.close().await;
    black.close().await;
    Ok(())
}
