//! Typed, normalized records for each importable entity type
//!
//! These are the shapes produced by the validator. Required columns are plain
//! fields; optional columns are `Option`s that stay `None` when the input did not
//! supply them, so serializing a record yields exactly the columns an import may
//! write. Store-managed columns (ids, timestamps) never appear here.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// A closed set of accepted labels for an enumerated column
///
/// Parsing is case-insensitive; the canonical label is what gets stored.
pub trait Vocabulary: Sized + Copy + PartialEq + 'static {
    const VALUES: &'static [(&'static str, Self)];

    fn parse_label(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::VALUES
            .iter()
            .find(|(label, _)| label.eq_ignore_ascii_case(raw))
            .map(|(_, value)| *value)
    }

    fn label(&self) -> &'static str {
        Self::VALUES
            .iter()
            .find(|(_, value)| value == self)
            .map(|(label, _)| *label)
            .unwrap_or_default()
    }

    fn allowed() -> String {
        Self::VALUES
            .iter()
            .map(|(label, _)| *label)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

macro_rules! vocabulary {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl Vocabulary for $name {
            const VALUES: &'static [(&'static str, Self)] = &[$(($label, $name::$variant)),+];
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.label())
            }
        }
    };
}

vocabulary! {
    /// Intended audience of a course
    Audience {
        Primary => "Primary",
        Secondary => "Secondary",
        Student => "Student",
        Professional => "Professional",
        Business => "Business",
    }
}

vocabulary! {
    /// How a course or event is delivered
    DeliveryMode {
        Online => "Online",
        Offline => "Offline",
        Hybrid => "Hybrid",
    }
}

vocabulary! {
    CourseLevel {
        Beginner => "Beginner",
        Intermediate => "Intermediate",
        Advanced => "Advanced",
    }
}

vocabulary! {
    /// Catalog category a course is filed under
    Category {
        Technology => "Technology",
        Ai => "AI",
        DataScience => "Data Science",
        Business => "Business",
        Design => "Design",
        Marketing => "Marketing",
        Finance => "Finance",
        Healthcare => "Healthcare",
        Education => "Education",
        PersonalDevelopment => "Personal Development",
        Languages => "Languages",
        Other => "Other",
    }
}

vocabulary! {
    EventType {
        Workshop => "workshop",
        Webinar => "webinar",
        Seminar => "seminar",
        Conference => "conference",
        Meetup => "meetup",
        Hackathon => "hackathon",
        Bootcamp => "bootcamp",
        Training => "training",
    }
}

vocabulary! {
    /// Skill track a lesson belongs to
    Skill {
        Foundations => "Foundations",
        Llms => "LLMs",
        Vision => "Vision",
        Nlp => "NLP",
        Safety => "Safety",
        Advanced => "Advanced",
    }
}

vocabulary! {
    QuestionType {
        MultipleChoice => "multiple_choice",
        FillBlank => "fill_blank",
        Matching => "matching",
        Ordering => "ordering",
        FreeResponse => "free_response",
    }
}

vocabulary! {
    PaymentStatus {
        Completed => "completed",
        Pending => "pending",
        Failed => "failed",
        Refunded => "refunded",
    }
}

vocabulary! {
    /// Placeholders accepted where a date is not fixed yet
    DateLabel {
        Flexible => "Flexible",
        ComingSoon => "Coming Soon",
        Tbd => "TBD",
    }
}

/// A calendar date or an agreed placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ScheduleDate {
    Date(NaiveDate),
    Label(DateLabel),
}

/// Price as entered plus its amount in minor currency units
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Price {
    pub display: String,
    pub minor_units: i64,
}

/// Course template
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Course {
    pub title: String,
    pub description: String,
    pub audiences: Vec<Audience>,
    pub mode: DeliveryMode,
    pub duration: String,
    pub price: String,
    pub price_amount: i64,
    pub level: CourseLevel,
    pub start_date: ScheduleDate,
    pub features: Vec<String>,
    pub keywords: Vec<String>,
    pub category: Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prerequisites: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<ScheduleDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrollment_deadline: Option<ScheduleDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_students: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_students: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_featured: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currently_enrolling: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certification_available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructor_info: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Event template
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub name: String,
    pub description: String,
    pub event_type: EventType,
    pub date: ScheduleDate,
    pub price: String,
    pub price_amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<DeliveryMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_attendees: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attendees: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_deadline: Option<ScheduleDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_featured: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue_details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_info: Option<Value>,
}

/// Matching pair of a matching question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPair {
    #[serde(default)]
    pub left: String,
    #[serde(default)]
    pub right: String,
}

/// Lesson question after type-specific checks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Question {
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairs: Option<Vec<MatchPair>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ideal_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rubric: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_score: Option<Value>,
}

/// Micro-lesson with its questions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lesson {
    pub lesson_id: String,
    pub title: String,
    pub skill: Skill,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xp_reward: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questions: Option<Vec<Question>>,
}

/// Enrollment of a user, identified by email, into a course
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Enrollment {
    pub email: String,
    pub course_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    /// Amount as entered, e.g. "₹5,000"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_amount: Option<String>,
    /// `payment_amount` in minor currency units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_amount_minor: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
}
