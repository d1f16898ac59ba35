//! Conversion logic between DTOs and domain entities.

use crate::domain::{
    LeaderboardEntry, Participant, PresenceState, Question, Role, Room, RoomConfig, RoomStatus,
};
use crate::infrastructure::dto::websocket as dto;

// ========================================
// DTO → Domain Entity
// ========================================

impl From<dto::RoomStatusDto> for RoomStatus {
    fn from(dto: dto::RoomStatusDto) -> Self {
        match dto {
            dto::RoomStatusDto::Waiting => RoomStatus::Waiting,
            dto::RoomStatusDto::Active => RoomStatus::Active,
            dto::RoomStatusDto::Finished => RoomStatus::Finished,
        }
    }
}

impl From<dto::RoomConfigDto> for RoomConfig {
    fn from(dto: dto::RoomConfigDto) -> Self {
        Self {
            question_time_limit_secs: dto.question_time_limit_secs,
            shuffle_questions: dto.shuffle_questions,
            shuffle_options: dto.shuffle_options,
            show_correct_answers: dto.show_correct_answers,
        }
    }
}

impl From<dto::RoomDto> for Room {
    fn from(dto: dto::RoomDto) -> Self {
        Self {
            id: dto.id,
            name: dto.name,
            join_code: dto.join_code,
            status: dto.status.into(),
            capacity: dto.capacity,
            config: dto.config.into(),
        }
    }
}

impl From<dto::RoleDto> for Role {
    fn from(dto: dto::RoleDto) -> Self {
        match dto {
            dto::RoleDto::Host => Role::Host,
            dto::RoleDto::Participant => Role::Participant,
        }
    }
}

impl From<dto::PresenceDto> for PresenceState {
    fn from(dto: dto::PresenceDto) -> Self {
        match dto {
            dto::PresenceDto::Connected => PresenceState::Connected,
            dto::PresenceDto::Disconnected => PresenceState::Disconnected,
            dto::PresenceDto::Finished => PresenceState::Finished,
        }
    }
}

impl From<dto::ParticipantDto> for Participant {
    fn from(dto: dto::ParticipantDto) -> Self {
        Self {
            id: dto.id,
            user_id: dto.user_id,
            display_name: dto.display_name,
            role: dto.role.into(),
            presence: dto.connection.into(),
            score: dto.score,
            last_activity: dto.last_activity,
        }
    }
}

impl From<dto::QuestionDto> for Question {
    fn from(dto: dto::QuestionDto) -> Self {
        Self {
            id: dto.id,
            prompt: dto.prompt,
            options: dto.options,
            time_limit_secs: dto.time_limit_secs,
            points: dto.points,
        }
    }
}

impl From<dto::LeaderboardEntryDto> for LeaderboardEntry {
    fn from(dto: dto::LeaderboardEntryDto) -> Self {
        Self {
            participant_id: dto.participant_id,
            score: dto.score,
            rank: dto.rank,
            correct_count: dto.correct_count,
            accuracy: dto.accuracy,
            average_time_secs: dto.average_time_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dto_participant_to_domain() {
        // テスト項目: DTO の Participant がドメインエンティティに変換される
        // given (前提条件):
        let dto_participant = dto::ParticipantDto {
            id: "p1".to_string(),
            user_id: "u1".to_string(),
            display_name: "Ana".to_string(),
            role: dto::RoleDto::Host,
            connection: dto::PresenceDto::Connected,
            score: 250,
            last_activity: 1000,
        };

        // when (操作):
        let participant: Participant = dto_participant.into();

        // then (期待する結果):
        assert_eq!(participant.id, "p1");
        assert_eq!(participant.role, Role::Host);
        assert_eq!(participant.presence, PresenceState::Connected);
        assert_eq!(participant.score, 250);
    }

    #[test]
    fn test_dto_room_to_domain() {
        // テスト項目: DTO の Room が設定を含めてドメインエンティティに変換される
        // given (前提条件):
        let dto_room = dto::RoomDto {
            id: "room-1".to_string(),
            name: "Friday Quiz".to_string(),
            join_code: "ABC123".to_string(),
            status: dto::RoomStatusDto::Active,
            capacity: 30,
            config: dto::RoomConfigDto {
                question_time_limit_secs: Some(20),
                shuffle_questions: true,
                shuffle_options: false,
                show_correct_answers: true,
            },
        };

        // when (操作):
        let room: Room = dto_room.into();

        // then (期待する結果):
        assert_eq!(room.status, RoomStatus::Active);
        assert_eq!(room.config.question_time_limit_secs, Some(20));
        assert!(room.config.shuffle_questions);
        assert!(room.config.show_correct_answers);
    }

    #[test]
    fn test_dto_leaderboard_entry_to_domain() {
        // テスト項目: DTO の LeaderboardEntry がドメインエンティティに変換される
        // given (前提条件):
        let dto_entry = dto::LeaderboardEntryDto {
            participant_id: "p2".to_string(),
            score: 300,
            rank: 1,
            correct_count: 3,
            accuracy: 0.75,
            average_time_secs: 4.2,
        };

        // when (操作):
        let entry: LeaderboardEntry = dto_entry.into();

        // then (期待する結果):
        assert_eq!(entry.participant_id, "p2");
        assert_eq!(entry.rank, 1);
        assert_eq!(entry.accuracy, 0.75);
    }
}
