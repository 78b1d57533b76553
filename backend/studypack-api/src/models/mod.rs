use serde::{Deserialize, Serialize};

pub mod material;
pub mod progress;
pub mod quiz;
pub mod study_pack;
pub mod tutor;

pub use material::{Material, MaterialType, Module};
pub use progress::{FlashcardSession, ProgressEvent, ProgressEventType, QuizAttempt};
pub use quiz::{AnswerKey, Flashcard, QuestionType, Quiz, QuizMetadata, QuizQuestion};
pub use study_pack::{StudyPack, StudyPackStatus, Summary, SummaryContent};

/// Caller roles as carried in the `role` JWT claim.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    #[default]
    Learner,
    Teacher,
    Organizer,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &str {
        match self {
            UserRole::Learner => "LEARNER",
            UserRole::Teacher => "TEACHER",
            UserRole::Organizer => "ORGANIZER",
            UserRole::Admin => "ADMIN",
        }
    }

    /// Lenient parse: claims issued by older frontends use lowercase and `student`.
    pub fn from_claim(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "TEACHER" => UserRole::Teacher,
            "ORGANIZER" => UserRole::Organizer,
            "ADMIN" => UserRole::Admin,
            _ => UserRole::Learner,
        }
    }

    /// Only teachers and organizers may review, approve or regenerate drafts.
    pub fn is_instructor(&self) -> bool {
        matches!(self, UserRole::Teacher | UserRole::Organizer)
    }
}

/// Resolved identity of the user behind a request.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub role: UserRole,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, role: UserRole) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}

// Serde converters for chrono::DateTime <-> mongodb::bson::DateTime
pub(crate) mod bson_datetime_as_chrono {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bson_dt = bson::DateTime::from_millis(date.timestamp_millis());
        bson_dt.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bson_dt = bson::DateTime::deserialize(deserializer)?;
        DateTime::from_timestamp_millis(bson_dt.timestamp_millis())
            .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
    }
}

pub(crate) mod bson_datetime_as_chrono_option {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let bson_dt = bson::DateTime::from_millis(d.timestamp_millis());
                serializer.serialize_some(&bson_dt)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt_bson_dt: Option<bson::DateTime> = Option::deserialize(deserializer)?;
        Ok(opt_bson_dt.and_then(|bson_dt| DateTime::from_timestamp_millis(bson_dt.timestamp_millis())))
    }
}
