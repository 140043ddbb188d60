//! Resource keys and the GraphQL queries behind them.
//!
//! Key grammar (segments separated by `:`):
//!
//! | key                           | query                      |
//! |-------------------------------|----------------------------|
//! | `batches`                     | `allBatches`               |
//! | `students:<batch>`            | `students(batch)`          |
//! | `student:<batch>:<username>`  | `student(batch, username)` |
//! | `contests:<batch>`            | `allContests(batch)`       |
//! | `leaderboard:<batch>:<title>` | `contestStatusLeaderboard` |

use std::fmt;

use serde_json::{json, Value};

const CONTEST_FIELDS: &str = "
    title
    startTime
    ranking
    rating
    attended
    problemsSolved
    totalProblems
    trendDirection
    finishTimeInSeconds";

const STUDENT_FIELDS: &str = "
    id
    name
    leetcodeUsername
    section
    rollNumber
    totalSolved
    easySolved
    mediumSolved
    hardSolved
    attendedContestsCount
    rating
    globalRanking
    totalParticipants
    topPercentage
    badge
    lastUpdatedAt";

/// A parsed resource key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    AllBatches,
    Students { batch: String },
    Student { batch: String, username: String },
    Contests { batch: String },
    Leaderboard { batch: String, title: String },
}

impl Resource {
    /// Parse a key. Returns `None` for anything outside the grammar.
    pub fn parse(key: &str) -> Option<Self> {
        let mut parts = key.splitn(3, ':');
        let kind = parts.next()?;
        let first = parts.next().filter(|s| !s.is_empty()).map(String::from);
        let second = parts.next().filter(|s| !s.is_empty()).map(String::from);

        match (kind, first, second) {
            ("batches", None, None) => Some(Resource::AllBatches),
            ("students", Some(batch), None) => Some(Resource::Students { batch }),
            ("student", Some(batch), Some(username)) => {
                Some(Resource::Student { batch, username })
            }
            ("contests", Some(batch), None) => Some(Resource::Contests { batch }),
            ("leaderboard", Some(batch), Some(title)) => {
                Some(Resource::Leaderboard { batch, title })
            }
            _ => None,
        }
    }

    /// GraphQL document for this resource.
    pub fn query(&self) -> String {
        match self {
            Resource::AllBatches => "query { allBatches { name secCount } }".to_string(),
            Resource::Students { .. } => format!(
                "query GetStudents($batch: String!) {{ students(batch: $batch) {{ {STUDENT_FIELDS}
    recentContests {{ {CONTEST_FIELDS} }}
    latestContests {{ title data {{ {CONTEST_FIELDS} }} }} }} }}"
            ),
            Resource::Student { .. } => format!(
                "query GetStudent($batch: String!, $username: String!) {{ student(batch: $batch, username: $username) {{ {STUDENT_FIELDS}
    recentContests {{ {CONTEST_FIELDS} }}
    latestContests {{ title data {{ {CONTEST_FIELDS} }} }} }} }}"
            ),
            Resource::Contests { .. } => {
                "query GetAllContests($batch: String!) { allContests(batch: $batch) }".to_string()
            }
            Resource::Leaderboard { .. } => format!(
                "query GetContestLeaderboard($batch: String!, $title: String!) {{ contestStatusLeaderboard(batch: $batch, title: $title) {{
    participants {{ id name leetcodeUsername section rollNumber rating contestRanking contest {{ {CONTEST_FIELDS} }} }}
    nonParticipants {{ id name leetcodeUsername section rollNumber rating }} }} }}"
            ),
        }
    }

    /// Variables accompanying [`Resource::query`].
    pub fn variables(&self) -> Value {
        match self {
            Resource::AllBatches => json!({}),
            Resource::Students { batch } | Resource::Contests { batch } => {
                json!({ "batch": batch })
            }
            Resource::Student { batch, username } => {
                json!({ "batch": batch, "username": username })
            }
            Resource::Leaderboard { batch, title } => json!({ "batch": batch, "title": title }),
        }
    }

    /// Count the items in a `data` object returned for this resource.
    ///
    /// Missing or null fields count as zero, which the validator then treats
    /// as suspicious unless the key is allowlisted.
    pub fn count_items(&self, data: &Value) -> usize {
        let array_len = |v: &Value| v.as_array().map_or(0, Vec::len);
        match self {
            Resource::AllBatches => array_len(&data["allBatches"]),
            Resource::Students { .. } => array_len(&data["students"]),
            Resource::Student { .. } => usize::from(data["student"].is_object()),
            Resource::Contests { .. } => array_len(&data["allContests"]),
            Resource::Leaderboard { .. } => {
                let board = &data["contestStatusLeaderboard"];
                array_len(&board["participants"]) + array_len(&board["nonParticipants"])
            }
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::AllBatches => f.write_str("batches"),
            Resource::Students { batch } => write!(f, "students:{batch}"),
            Resource::Student { batch, username } => write!(f, "student:{batch}:{username}"),
            Resource::Contests { batch } => write!(f, "contests:{batch}"),
            Resource::Leaderboard { batch, title } => write!(f, "leaderboard:{batch}:{title}"),
        }
    }
}
