//! Message formatting utilities for the terminal client display.

use crate::common::time::timestamp_to_rfc3339;
use crate::domain::{
    ConnectionInfo, ConnectionState, LeaderboardEntry, Participant, Question, Room,
    RoomCloseReason,
};

/// Formatter for the terminal participant client
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format the room header shown after a successful join
    pub fn format_room_joined(room: &Room, participants: &[Participant], local_id: &str) -> String {
        let mut output = String::new();
        output.push_str("\n\n============================================================\n");
        output.push_str(&format!("Room: {} (code {})\n", room.name, room.join_code));
        output.push_str("Participants:\n");

        let mut sorted: Vec<&Participant> = participants.iter().collect();
        sorted.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        for participant in sorted {
            let me_suffix = if participant.id == local_id { " (me)" } else { "" };
            output.push_str(&format!(
                "  {}{} - {} pts\n",
                participant.display_name, me_suffix, participant.score
            ));
        }

        output.push_str("============================================================\n");
        output
    }

    /// Format a participant-joined notification
    pub fn format_participant_joined(participant: &Participant) -> String {
        format!(
            "\n+ {} entered at {}\n",
            participant.display_name,
            timestamp_to_rfc3339(participant.last_activity)
        )
    }

    /// Format a participant-left notification
    pub fn format_participant_left(participant_name: Option<&str>, participant_id: &str) -> String {
        format!("\n- {} left\n", participant_name.unwrap_or(participant_id))
    }

    /// Format a question with numbered options
    pub fn format_question(question: &Question) -> String {
        let mut output = String::new();
        output.push_str("\n\n------------------------------------------------------------\n");
        output.push_str(&format!("Q: {}\n", question.prompt));
        for (index, option) in question.options.iter().enumerate() {
            output.push_str(&format!("  [{}] {}\n", index + 1, option));
        }
        output.push_str(&format!(
            "({} pts, {}s — answer with the option number)\n",
            question.points, question.time_limit_secs
        ));
        output.push_str("------------------------------------------------------------\n");
        output
    }

    /// Format the leaderboard in server-provided order
    pub fn format_leaderboard(entries: &[LeaderboardEntry], local_id: &str) -> String {
        let mut output = String::new();
        output.push_str("\nLeaderboard:\n");
        if entries.is_empty() {
            output.push_str("  (no entries yet)\n");
        }
        for entry in entries {
            let me_suffix = if entry.participant_id == local_id {
                " (me)"
            } else {
                ""
            };
            output.push_str(&format!(
                "  #{} {}{} - {} pts\n",
                entry.rank, entry.participant_id, me_suffix, entry.score
            ));
        }
        output
    }

    /// Format the notification shown when the room closes
    pub fn format_room_closed(reason: RoomCloseReason) -> String {
        match reason {
            RoomCloseReason::Left => "\nYou left the room.\n".to_string(),
            RoomCloseReason::Kicked => "\nYou were removed from the room by the host.\n".to_string(),
            RoomCloseReason::Finished => "\nThe quiz has finished. Thanks for playing!\n".to_string(),
        }
    }

    /// Format a connection state transition
    pub fn format_connection_state(info: &ConnectionInfo) -> String {
        match info.state {
            ConnectionState::Connecting => "\n… connecting\n".to_string(),
            ConnectionState::Connected => "\n✓ connected\n".to_string(),
            ConnectionState::Reconnecting { attempt } => {
                format!("\n… reconnecting (attempt {})\n", attempt)
            }
            ConnectionState::Disconnected => match &info.last_error {
                Some(error) => format!("\n✗ disconnected: {}\n", error),
                None => "\n✗ disconnected\n".to_string(),
            },
        }
    }
}
