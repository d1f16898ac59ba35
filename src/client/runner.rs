//! Terminal participant client built on top of the sync layer.
//!
//! Joins a room, renders roster/question/leaderboard notifications, and
//! reads input from stdin: an option number answers the current question,
//! `/leave` leaves the room, anything else is sent as a chat message.

use std::sync::Arc;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;

use crate::client::{RoomClient, RoomClientConfig, Subscription};
use crate::common::time::now_timestamp_millis;
use crate::domain::{ConnectionState, EventKind, RoomEvent};

use super::formatter::MessageFormatter;
use super::ui::redisplay_prompt;

/// Why the interactive session ended
enum SessionStop {
    RoomClosed,
    Disconnected,
}

/// Run the terminal participant client until the room closes, the
/// connection dies, or the user exits.
pub async fn run_client(
    url: String,
    token: String,
    access_code: String,
    display_name: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = RoomClient::new(RoomClientConfig::default());
    let (stop_tx, mut stop_rx) = mpsc::unbounded_channel::<SessionStop>();

    let _subscriptions = register_display_handlers(&client, &display_name, stop_tx);

    client.connect(&url, &token).await?;

    match client.session().join_room(&access_code, &display_name).await {
        Ok(joined) => {
            print!(
                "{}",
                MessageFormatter::format_room_joined(
                    &joined.room,
                    &joined.participants,
                    &joined.participant.id,
                )
            );
            println!(
                "You are '{}'. Answer with the option number, /leave to exit.",
                joined.participant.display_name
            );
        }
        Err(e) => {
            tracing::error!("Could not join room '{}': {}", access_code, e);
            client.disconnect();
            return Err(Box::new(e));
        }
    }

    // Blocking thread for rustyline, bridged to the async loop by a channel
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
    let prompt_name = display_name.clone();
    let _readline_handle = std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };

        let prompt = format!("{}> ", prompt_name);

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            line = input_rx.recv() => match line {
                Some(line) => {
                    if !handle_input(&client, &display_name, &line).await {
                        break;
                    }
                }
                // Readline thread ended (Ctrl+C / Ctrl+D)
                None => break,
            },
            stop = stop_rx.recv() => match stop {
                Some(SessionStop::RoomClosed) | None => break,
                Some(SessionStop::Disconnected) => {
                    return Err("connection lost".into());
                }
            },
        }
    }

    client.disconnect();
    Ok(())
}

/// Handle one line of user input.
///
/// # Returns
///
/// `false` when the session should end.
async fn handle_input(client: &RoomClient, display_name: &str, line: &str) -> bool {
    if line == "/leave" || line == "/quit" {
        client.session().leave_room();
        return false;
    }

    // A bare option number answers the current question
    if let Ok(choice) = line.parse::<usize>() {
        submit_choice(client, display_name, choice).await;
        return true;
    }

    if let Err(e) = client.session().send_chat_message(line) {
        println!("Could not send message: {}", e);
    }
    redisplay_prompt(display_name);
    true
}

/// Submit the 1-based option choice for the current question
async fn submit_choice(client: &RoomClient, display_name: &str, choice: usize) {
    let snapshot = client.snapshot();
    let Some(current) = snapshot.question.as_ref() else {
        println!("No question is active right now.");
        redisplay_prompt(display_name);
        return;
    };
    let Some(option) = choice
        .checked_sub(1)
        .and_then(|index| current.question.options.get(index))
    else {
        println!(
            "Pick an option between 1 and {}.",
            current.question.options.len()
        );
        redisplay_prompt(display_name);
        return;
    };

    let elapsed_secs = (now_timestamp_millis() - current.started_at) as f64 / 1000.0;
    match client.quiz().submit_answer(option, elapsed_secs).await {
        Ok(()) => println!("Answer '{}' sent ({:.1}s).", option, elapsed_secs),
        Err(e) => println!("Answer not accepted: {}", e),
    }
    redisplay_prompt(display_name);
}

/// Wire the display handlers; the returned subscriptions are kept for the
/// session's lifetime.
fn register_display_handlers(
    client: &RoomClient,
    display_name: &str,
    stop_tx: mpsc::UnboundedSender<SessionStop>,
) -> Vec<Subscription> {
    let events = client.events();
    let mut subscriptions = Vec::new();

    let name = display_name.to_string();
    subscriptions.push(events.subscribe(EventKind::ParticipantJoined, move |event| {
        if let RoomEvent::ParticipantJoined(participant) = event {
            print!(
                "{}",
                MessageFormatter::format_participant_joined(participant)
            );
            redisplay_prompt(&name);
        }
    }));

    let name = display_name.to_string();
    subscriptions.push(events.subscribe(EventKind::ParticipantLeft, move |event| {
        if let RoomEvent::ParticipantLeft {
            participant_id,
            participant_name,
        } = event
        {
            print!(
                "{}",
                MessageFormatter::format_participant_left(
                    participant_name.as_deref(),
                    participant_id,
                )
            );
            redisplay_prompt(&name);
        }
    }));

    let name = display_name.to_string();
    subscriptions.push(events.subscribe(EventKind::QuestionStarted, move |event| {
        if let RoomEvent::QuestionStarted(question) = event {
            print!("{}", MessageFormatter::format_question(question));
            redisplay_prompt(&name);
        }
    }));

    let name = display_name.to_string();
    let snapshot_source = client.shared_state();
    subscriptions.push(events.subscribe(EventKind::LeaderboardUpdated, move |event| {
        if let RoomEvent::LeaderboardUpdated(entries) = event {
            let local_id = snapshot_source
                .load()
                .local_participant_id
                .clone()
                .unwrap_or_default();
            print!(
                "{}",
                MessageFormatter::format_leaderboard(entries, &local_id)
            );
            redisplay_prompt(&name);
        }
    }));

    let stop_on_close = stop_tx.clone();
    subscriptions.push(events.subscribe(EventKind::RoomClosed, move |event| {
        if let RoomEvent::RoomClosed { reason } = event {
            print!("{}", MessageFormatter::format_room_closed(*reason));
            let _ = stop_on_close.send(SessionStop::RoomClosed);
        }
    }));

    subscriptions.push(events.subscribe(EventKind::ConnectionStateChanged, move |event| {
        if let RoomEvent::ConnectionStateChanged(info) = event {
            print!("{}", MessageFormatter::format_connection_state(info));
            if info.state == ConnectionState::Disconnected {
                let _ = stop_tx.send(SessionStop::Disconnected);
            }
        }
    }));

    subscriptions
}
