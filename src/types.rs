use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Opaque ID types for type safety
pub type RoomId = String;
pub type PlayerId = String;

/// Maximum number of seats in a room
pub const MAX_PLAYERS: usize = 4;

/// Maximum display name length (in characters)
pub const MAX_NAME_CHARS: usize = 12;

/// The four fixed answer categories of a round
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Name,
    Place,
    Animal,
    Thing,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Name,
        Category::Place,
        Category::Animal,
        Category::Thing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Name => "name",
            Category::Place => "place",
            Category::Animal => "animal",
            Category::Thing => "thing",
        }
    }

    /// Lenient lookup used at untrusted boundaries (arbiter output)
    pub fn parse(raw: &str) -> Option<Category> {
        let raw = raw.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(raw))
    }
}

/// A player's (possibly partial) answers for one round
pub type Answers = BTreeMap<Category, String>;

/// Per-category verdicts for one player; always contains all four categories
pub type Verdicts = BTreeMap<Category, bool>;

/// Player id -> per-category verdicts
pub type ValidationMask = BTreeMap<PlayerId, Verdicts>;

/// Player id -> answers, copied out of the rooms at grading time
pub type FrozenInputs = BTreeMap<PlayerId, Answers>;

/// Verdicts with every category marked invalid
pub fn all_invalid() -> Verdicts {
    Category::ALL.into_iter().map(|c| (c, false)).collect()
}

/// Avatar tags the client knows how to render
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Avatar {
    Cat,
    #[default]
    Dog,
    Bird,
    Rabbit,
    Turtle,
    Fish,
    Snail,
    Ghost,
    Skull,
    Zap,
    Crown,
    Rocket,
    Smile,
    Panda,
}

impl Avatar {
    const ALL: [Avatar; 14] = [
        Avatar::Cat,
        Avatar::Dog,
        Avatar::Bird,
        Avatar::Rabbit,
        Avatar::Turtle,
        Avatar::Fish,
        Avatar::Snail,
        Avatar::Ghost,
        Avatar::Skull,
        Avatar::Zap,
        Avatar::Crown,
        Avatar::Rocket,
        Avatar::Smile,
        Avatar::Panda,
    ];

    /// Resolve a client-supplied tag, falling back to `Dog` for anything unknown
    pub fn from_tag(tag: Option<&str>) -> Avatar {
        tag.and_then(|t| {
            Avatar::ALL
                .into_iter()
                .find(|a| format!("{:?}", a).eq_ignore_ascii_case(t.trim()))
        })
        .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoomPhase {
    Lobby,
    Playing,
    Grading,
    Ended,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub avatar: Avatar,
    /// Cumulative score, only ever increased by round results
    pub score: u32,
    /// Draft answers for the active round
    #[serde(default)]
    pub current_input: Answers,
    /// False once the player's connection is gone (after the game started)
    #[serde(default = "default_connected")]
    pub connected: bool,
}

fn default_connected() -> bool {
    true
}

impl Player {
    pub fn new(id: PlayerId, name: String, avatar: Avatar) -> Self {
        Self {
            id,
            name,
            avatar,
            score: 0,
            current_input: Answers::new(),
            connected: true,
        }
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id.clone(),
            name: self.name.clone(),
            avatar: self.avatar,
            score: self.score,
            connected: self.connected,
        }
    }
}

/// What other clients get to see about a player (no draft answers)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub avatar: Avatar,
    pub score: u32,
    pub connected: bool,
}

/// How a single answer was graded
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerGrade {
    /// Valid, and nobody else gave the same answer
    Unique,
    /// Valid, but shared with at least one other valid answer
    Duplicate,
    /// Rejected by the referee
    Invalid,
    /// Left blank
    Empty,
}

impl AnswerGrade {
    pub fn points(&self) -> u32 {
        match self {
            AnswerGrade::Unique => 10,
            AnswerGrade::Duplicate => 5,
            AnswerGrade::Invalid | AnswerGrade::Empty => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryScore {
    pub grade: AnswerGrade,
    pub points: u32,
}

/// One player's graded round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundResult {
    pub round_score: u32,
    pub total_score: u32,
    pub breakdown: BTreeMap<Category, CategoryScore>,
    pub validation: Verdicts,
}

/// Read-only view of a room for snapshots and the HTTP API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub id: RoomId,
    pub phase: RoomPhase,
    pub players: Vec<PlayerView>,
    pub round: u32,
    pub total_rounds: u32,
    pub letter: Option<char>,
    pub round_seconds: u64,
}

/// Timing and sizing knobs for rooms
#[derive(Debug, Clone)]
pub struct GameSettings {
    pub round_time: Duration,
    pub settle_delay: Duration,
    pub default_rounds: u32,
    pub ended_room_ttl: Duration,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            round_time: Duration::from_secs(150),
            settle_delay: Duration::from_secs(5),
            default_rounds: 10,
            ended_room_ttl: Duration::from_secs(300),
        }
    }
}

impl GameSettings {
    /// Load settings from environment variables, keeping defaults for anything unset
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |key: &str| -> Option<Duration> {
            std::env::var(key)
                .ok()
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
        };

        Self {
            round_time: secs("ROUND_SECONDS").unwrap_or(defaults.round_time),
            settle_delay: secs("SETTLE_SECONDS").unwrap_or(defaults.settle_delay),
            default_rounds: std::env::var("DEFAULT_ROUNDS")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.default_rounds),
            ended_room_ttl: secs("ENDED_ROOM_TTL_SECONDS").unwrap_or(defaults.ended_room_ttl),
        }
    }

    /// Resolve a host's round-count override
    pub fn resolve_rounds(&self, requested: Option<i64>) -> u32 {
        match requested {
            Some(n) if n > 0 => u32::try_from(n).unwrap_or(u32::MAX),
            _ => self.default_rounds,
        }
    }
}
