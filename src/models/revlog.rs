//! Review log rows.

/// What kind of answer produced a log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevlogKind {
    Learn,
    Review,
    Relearn,
    EarlyReview,
}

impl RevlogKind {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Learn => 0,
            Self::Review => 1,
            Self::Relearn => 2,
            Self::EarlyReview => 3,
        }
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(Self::Learn),
            1 => Some(Self::Review),
            2 => Some(Self::Relearn),
            3 => Some(Self::EarlyReview),
            _ => None,
        }
    }
}

/// One appended audit record per answer, keyed by millisecond timestamp.
///
/// `ivl` and `last_ivl` hold days for review answers and negative
/// seconds for in-learning answers.
#[derive(Debug, Clone)]
pub struct RevlogEntry {
    pub id: i64,
    pub cid: i64,
    pub usn: i32,
    pub ease: i32,
    pub ivl: i64,
    pub last_ivl: i64,
    pub factor: i32,
    pub time_taken_ms: i64,
    pub kind: RevlogKind,
}
