//! Domain entities owned by the room coordination service.

/// Lifecycle status of a quiz room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    /// Room created, waiting for the quiz to start
    Waiting,
    /// Quiz in progress
    Active,
    /// Quiz finished, room about to be torn down
    Finished,
}

/// Per-room quiz configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoomConfig {
    /// Default time limit per question in seconds (`None` = per-question values only)
    pub question_time_limit_secs: Option<u32>,
    /// Whether the host shuffles question order
    pub shuffle_questions: bool,
    /// Whether answer options are shuffled per participant
    pub shuffle_options: bool,
    /// Whether correct answers are revealed after each question
    pub show_correct_answers: bool,
}

/// A single live quiz session instance identified by a join code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub join_code: String,
    pub status: RoomStatus,
    pub capacity: u32,
    pub config: RoomConfig,
}

/// Role of a participant inside a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The moderator running the quiz
    Host,
    /// A regular answering participant
    Participant,
}

/// Connection state of a participant as reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    Connected,
    Disconnected,
    Finished,
}

/// Any connected identity inside a room, including the host
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub id: String,
    pub user_id: String,
    pub display_name: String,
    pub role: Role,
    pub presence: PresenceState,
    pub score: u32,
    /// Unix timestamp of the participant's last activity in milliseconds
    pub last_activity: i64,
}

/// A quiz question as presented to participants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    /// Answer options in presentation order
    pub options: Vec<String>,
    /// Time limit for this question in seconds (0 = no limit)
    pub time_limit_secs: u32,
    /// Points awarded for a correct answer
    pub points: u32,
}

/// A locally submitted answer, kept only until acknowledged or superseded
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub question_id: String,
    pub selected_option: String,
    /// Seconds elapsed between question start and the submission
    pub elapsed_secs: f64,
}

/// One row of the leaderboard, in the order delivered by the server
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub participant_id: String,
    pub score: u32,
    pub rank: u32,
    pub correct_count: u32,
    /// Fraction of answered questions that were correct, in `[0, 1]`
    pub accuracy: f64,
    pub average_time_secs: f64,
}
