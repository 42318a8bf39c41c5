//! dice-session console entry point.
//!
//! Connects to the dice authority, prints session events and reads
//! commands from stdin.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use dice_session::config::ClientConfig;
use dice_session::domain::{Choice, EventStream, FrameLogEvent, SessionEvent};
use dice_session::service::{SessionClient, SessionHandle};

const HELP: &str = "commands: start | odd <amount> | even <amount> | end | auth | clear | snapshot | debug | quit\n\
                    amounts: a number, x2 | x5 | x10 (times the last bet), or max (whole balance)";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ClientConfig::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(endpoint = %config.endpoint, "starting dice-session");

    let (client, handle) = SessionClient::new(&config);
    let mut events = EventStream::new(handle.subscribe());
    let mut frames = handle.subscribe_frames();
    let mut client_task = tokio::spawn(client.run());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut show_frames = config.debug_frames;
    let mut last_amount: Option<i64> = None;
    println!("{HELP}");

    loop {
        tokio::select! {
            joined = &mut client_task => {
                return match joined? {
                    Ok(()) => Ok(()),
                    Err(err) => Err(anyhow::anyhow!("session client stopped: {err}")),
                };
            }
            event = events.next() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
            frame = frames.recv() => match frame {
                Ok(FrameLogEvent::Appended(entry)) if show_frames => {
                    println!("[{:>4}] {:?} {}", entry.sequence, entry.direction, entry.payload);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "frame printer lagged"),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else {
                    let _ = handle.disconnect().await;
                    break;
                };
                match line.trim() {
                    "" => {}
                    "quit" | "exit" => {
                        let _ = handle.disconnect().await;
                        break;
                    }
                    "debug" => {
                        show_frames = !show_frames;
                        println!("frame display {}", if show_frames { "on" } else { "off" });
                    }
                    command => run_command(&handle, command, &mut last_amount).await,
                }
            }
        }
    }

    match client_task.await? {
        Ok(()) => Ok(()),
        Err(err) => Err(anyhow::anyhow!("session client stopped: {err}")),
    }
}

async fn run_command(handle: &SessionHandle, command: &str, last_amount: &mut Option<i64>) {
    let mut words = command.split_whitespace();
    let result = match (words.next(), words.next()) {
        (Some("start"), None) => handle.start_session().await,
        (Some("end"), None) => handle.end_session().await,
        (Some("auth"), None) => handle.authenticate().await,
        (Some("clear"), None) => handle.clear_frame_log().await,
        (Some("snapshot"), None) => match handle.snapshot().await {
            Ok(snapshot) => {
                match serde_json::to_string_pretty(&snapshot) {
                    Ok(json) => println!("{json}"),
                    Err(err) => println!("cannot render snapshot: {err}"),
                }
                Ok(())
            }
            Err(err) => Err(err),
        },
        (Some(side @ ("odd" | "even")), Some(amount)) => {
            let Ok(choice) = side.parse::<Choice>() else {
                println!("{HELP}");
                return;
            };
            let Some(requested) = parse_amount(amount, *last_amount) else {
                println!("amount must be a whole number, x2, x5, x10 or max");
                return;
            };
            let amount = match requested {
                Amount::Exact(amount) => Some(amount),
                Amount::Scaled(amount) => match handle.snapshot().await {
                    Ok(snapshot) => snapshot.clamp_amount(amount),
                    Err(err) => {
                        println!("refused: {err}");
                        return;
                    }
                },
            };
            let Some(amount) = amount else {
                println!("refused: wallet is empty");
                return;
            };
            let placed = handle.place_bet(amount, choice).await;
            if placed.is_ok() {
                *last_amount = Some(amount);
            }
            placed
        }
        _ => {
            println!("{HELP}");
            return;
        }
    };
    if let Err(err) = result {
        println!("refused: {err}");
    }
}

/// Bet amount as typed at the prompt.
enum Amount {
    /// Sent as typed so the controller's guards report bad values.
    Exact(i64),
    /// Derived from earlier input, clamped to the balance before sending.
    Scaled(i64),
}

fn parse_amount(word: &str, last_amount: Option<i64>) -> Option<Amount> {
    match word {
        "max" => Some(Amount::Scaled(i64::MAX)),
        "x2" | "x5" | "x10" => {
            let factor: i64 = word.trim_start_matches('x').parse().ok()?;
            Some(Amount::Scaled(last_amount.unwrap_or(1).saturating_mul(factor)))
        }
        _ => word.parse().ok().map(Amount::Exact),
    }
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::ConnectionStateChanged { state } => println!("connection: {state}"),
        SessionEvent::SessionStarted { session_id } => println!("session {session_id} started"),
        SessionEvent::BalanceChanged { balance, .. } => println!("balance: {balance}"),
        SessionEvent::BetPlaced { amount, choice } => println!("bet {amount} on {choice}"),
        SessionEvent::RoundResolved {
            roll,
            result,
            delta,
        } => println!("rolled {roll}: {result} ({delta:+})"),
        SessionEvent::HistoryAppended { .. } => {}
        SessionEvent::RoundAbandoned { amount, reason, .. } => {
            println!("round of {amount} abandoned ({reason:?})");
        }
        SessionEvent::SessionEnded {
            net_profit,
            final_balance,
        } => println!("session ended: balance {final_balance}, net {net_profit:+}"),
        SessionEvent::ServerError { message, code } => match code {
            Some(code) => println!("server error {code}: {message}"),
            None => println!("server error: {message}"),
        },
    }
}
