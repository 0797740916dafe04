//! Per-entity record validation
//!
//! Validation is a pure function from a `CandidateRecord` to a
//! `ValidationResult`. It never touches the store.
//!
//! # Design
//!
//! A `FieldReader` walks the known columns of an entity type and applies one rule
//! per column. What a rule rejection means depends on the column:
//!
//! - a missing or rejected **required** column is an error and makes the record
//!   invalid
//! - a rejected **optional** column is a warning; the record stays valid and the
//!   column is dropped so an update never overwrites stored data with it
//!
//! Columns the entity type does not know are ignored.

use crate::core::rules::{self, RuleResult};
use crate::types::catalog::{
    Audience, Category, Course, CourseLevel, DeliveryMode, Enrollment, Event, EventType, Lesson,
    MatchPair, PaymentStatus, Question, QuestionType, Skill,
};
use crate::types::entity::{EntityType, FieldMap, METADATA_FIELDS};
use crate::types::outcome::{DuplicateGroup, ValidationReport};
use crate::types::record::{CandidateRecord, FieldIssue, ValidatedRecord, ValidationResult};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

const COURSE_FIELDS: &[&str] = &[
    "title",
    "description",
    "audiences",
    "mode",
    "duration",
    "price",
    "level",
    "start_date",
    "features",
    "keywords",
    "category",
    "prerequisites",
    "end_date",
    "enrollment_deadline",
    "min_students",
    "max_students",
    "sort_order",
    "is_active",
    "display",
    "is_featured",
    "currently_enrolling",
    "certification_available",
    "instructor_info",
    "tags",
    "price_amount",
];

const EVENT_FIELDS: &[&str] = &[
    "name",
    "title",
    "description",
    "event_type",
    "date",
    "price",
    "time",
    "duration",
    "location",
    "mode",
    "min_attendees",
    "max_attendees",
    "registration_deadline",
    "tags",
    "is_featured",
    "is_active",
    "display",
    "venue_details",
    "speaker_info",
    "price_amount",
];

const LESSON_FIELDS: &[&str] = &[
    "lesson_id",
    "title",
    "skill",
    "duration",
    "description",
    "xp_reward",
    "sort_order",
    "is_active",
    "questions",
];

const ENROLLMENT_FIELDS: &[&str] = &[
    "email",
    "course_id",
    "payment_status",
    "payment_amount",
    "payment_amount_minor",
    "payment_method",
    "user_id",
];

fn known_fields(entity_type: EntityType) -> &'static [&'static str] {
    match entity_type {
        EntityType::Course => COURSE_FIELDS,
        EntityType::Event => EVENT_FIELDS,
        EntityType::Lesson => LESSON_FIELDS,
        EntityType::Enrollment => ENROLLMENT_FIELDS,
    }
}

/// Applies rules to the columns of one record and collects issues
struct FieldReader<'a> {
    fields: &'a FieldMap,
    issues: Vec<FieldIssue>,
}

impl<'a> FieldReader<'a> {
    fn new(fields: &'a FieldMap) -> Self {
        Self {
            fields,
            issues: Vec::new(),
        }
    }

    /// First non-blank value among a column and its aliases
    fn lookup(&self, names: &[&str]) -> Option<&'a Value> {
        names
            .iter()
            .filter_map(|name| self.fields.get(*name))
            .find(|value| !rules::is_blank(value))
    }

    fn required<T>(
        &mut self,
        field: &str,
        rule: impl FnOnce(&Value) -> RuleResult<T>,
    ) -> Option<T> {
        self.required_any(field, &[field], rule)
    }

    fn required_any<T>(
        &mut self,
        field: &str,
        names: &[&str],
        rule: impl FnOnce(&Value) -> RuleResult<T>,
    ) -> Option<T> {
        match self.lookup(names) {
            None => {
                self.error(field, format!("{} is required", field));
                None
            }
            Some(value) => match rule(value) {
                Ok(parsed) => Some(parsed),
                Err(message) => {
                    self.error(field, format!("{} {}", field, message));
                    None
                }
            },
        }
    }

    fn optional<T>(
        &mut self,
        field: &str,
        rule: impl FnOnce(&Value) -> RuleResult<T>,
    ) -> Option<T> {
        let value = self.lookup(&[field])?;
        match rule(value) {
            Ok(parsed) => Some(parsed),
            Err(message) => {
                self.warn(field, format!("{} {} (ignored)", field, message));
                None
            }
        }
    }

    fn error(&mut self, field: &str, message: impl Into<String>) {
        self.issues.push(FieldIssue::error(field, message));
    }

    fn warn(&mut self, field: &str, message: impl Into<String>) {
        self.issues.push(FieldIssue::warning(field, message));
    }

    /// Drop an optional min/max pair whose bounds are inverted
    fn ordered_bounds(
        &mut self,
        min_field: &str,
        max_field: &str,
        min: Option<i64>,
        max: Option<i64>,
    ) -> (Option<i64>, Option<i64>) {
        match (min, max) {
            (Some(lo), Some(hi)) if lo > hi => {
                self.warn(
                    max_field,
                    format!(
                        "{} ({}) must not exceed {} ({}) (both ignored)",
                        min_field, lo, max_field, hi
                    ),
                );
                (None, None)
            }
            bounds => bounds,
        }
    }
}

fn lowercased(items: Vec<String>) -> Vec<String> {
    items.into_iter().map(|item| item.to_lowercase()).collect()
}

fn validate_course(reader: &mut FieldReader) -> Option<Course> {
    let title = reader.required("title", |v| rules::text(v, 200));
    let description = reader.required("description", |v| rules::text(v, 5000));
    if let Some(description) = &description {
        if description.chars().count() < 10 {
            reader.warn("description", "description is very short (under 10 characters)");
        }
    }
    let audiences = reader.required("audiences", |v| rules::choice_list::<Audience>(v, 1, 4));
    let mode = reader.required("mode", rules::choice::<DeliveryMode>);
    let duration = reader.required("duration", rules::duration);
    let price = reader.required("price", rules::price);
    let level = reader.required("level", rules::choice::<CourseLevel>);
    let start_date = reader.required("start_date", rules::schedule_date);
    let features = reader.required("features", |v| rules::bounded_list(v, 1, 20));
    let keywords = reader.required("keywords", |v| rules::bounded_list(v, 1, 30));
    let category = reader.required("category", rules::choice::<Category>);

    let prerequisites = reader.optional("prerequisites", |v| rules::text(v, 2000));
    let end_date = reader.optional("end_date", rules::schedule_date);
    let enrollment_deadline = reader.optional("enrollment_deadline", rules::schedule_date);
    let min_students = reader.optional("min_students", rules::positive);
    let max_students = reader.optional("max_students", rules::positive);
    let (min_students, max_students) =
        reader.ordered_bounds("min_students", "max_students", min_students, max_students);
    let sort_order = reader.optional("sort_order", rules::non_negative);
    let is_active = reader.optional("is_active", rules::boolean);
    let display = reader.optional("display", rules::boolean);
    let is_featured = reader.optional("is_featured", rules::boolean);
    let currently_enrolling = reader.optional("currently_enrolling", rules::boolean);
    let certification_available = reader.optional("certification_available", rules::boolean);
    let instructor_info = reader.optional("instructor_info", rules::object);
    let tags = reader.optional("tags", rules::list);

    let price = price?;
    Some(Course {
        title: title?,
        description: description?,
        audiences: audiences?,
        mode: mode?,
        duration: duration?,
        price: price.display,
        price_amount: price.minor_units,
        level: level?,
        start_date: start_date?,
        features: features?,
        keywords: lowercased(keywords?),
        category: category?,
        prerequisites,
        end_date,
        enrollment_deadline,
        min_students,
        max_students,
        sort_order,
        is_active,
        display,
        is_featured,
        currently_enrolling,
        certification_available,
        instructor_info,
        tags,
    })
}

fn validate_event(reader: &mut FieldReader) -> Option<Event> {
    let name = reader.required_any("name", &["name", "title"], |v| rules::text(v, 200));
    let description = reader.required("description", |v| rules::text(v, 5000));
    let event_type = reader.required("event_type", rules::choice::<EventType>);
    let date = reader.required("date", rules::schedule_date);
    let price = reader.required("price", rules::price);

    let time = reader.optional("time", rules::time);
    let duration = reader.optional("duration", rules::duration);
    let location = reader.optional("location", |v| rules::text(v, 500));
    let mode = reader.optional("mode", rules::choice::<DeliveryMode>);
    let min_attendees = reader.optional("min_attendees", rules::positive);
    let max_attendees = reader.optional("max_attendees", rules::positive);
    let (min_attendees, max_attendees) =
        reader.ordered_bounds("min_attendees", "max_attendees", min_attendees, max_attendees);
    let registration_deadline = reader.optional("registration_deadline", rules::schedule_date);
    let tags = reader.optional("tags", rules::list).map(lowercased);
    let is_featured = reader.optional("is_featured", rules::boolean);
    let is_active = reader.optional("is_active", rules::boolean);
    let display = reader.optional("display", rules::boolean);
    let venue_details = reader.optional("venue_details", rules::object);
    let speaker_info = reader.optional("speaker_info", rules::object);

    let price = price?;
    Some(Event {
        name: name?,
        description: description?,
        event_type: event_type?,
        date: date?,
        price: price.display,
        price_amount: price.minor_units,
        time,
        duration,
        location,
        mode,
        min_attendees,
        max_attendees,
        registration_deadline,
        tags,
        is_featured,
        is_active,
        display,
        venue_details,
        speaker_info,
    })
}

fn validate_lesson(reader: &mut FieldReader) -> Option<Lesson> {
    let lesson_id = reader.required("lesson_id", rules::identifier);
    let title = reader.required("title", |v| rules::text(v, 200));
    let skill = reader.required("skill", rules::choice::<Skill>);

    let duration = reader.optional("duration", |v| rules::text(v, 50));
    if duration.is_none() {
        reader.warn("duration", "duration is missing");
    }
    let description = reader.optional("description", |v| rules::text(v, 5000));
    if description.is_none() {
        reader.warn("description", "description is missing");
    }
    let xp_reward = reader.optional("xp_reward", rules::non_negative);
    let sort_order = reader.optional("sort_order", rules::integer);
    let is_active = reader.optional("is_active", rules::boolean);
    let questions = validate_questions(reader);

    Some(Lesson {
        lesson_id: lesson_id?,
        title: title?,
        skill: skill?,
        duration,
        description,
        xp_reward,
        sort_order,
        is_active,
        questions,
    })
}

/// Questions are part of the lesson: any question error invalidates the lesson
fn validate_questions(reader: &mut FieldReader) -> Option<Vec<Question>> {
    let Some(raw) = reader.lookup(&["questions"]) else {
        reader.warn("questions", "lesson has no questions");
        return None;
    };

    let items = match rules::array(raw) {
        Ok(items) => items,
        Err(message) => {
            reader.error("questions", format!("questions {}", message));
            return None;
        }
    };
    if items.is_empty() {
        reader.warn("questions", "lesson has no questions");
        return None;
    }

    let mut questions = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let field = format!("questions[{}]", index);
        match validate_question(item) {
            Ok(question) => questions.push(question),
            Err(messages) => {
                for message in messages {
                    reader.error(&field, format!("Question {}: {}", index + 1, message));
                }
            }
        }
    }

    Some(questions)
}

fn string_list(question: &FieldMap, field: &str) -> Option<Vec<String>> {
    question.get(field).and_then(|v| rules::list(v).ok())
}

fn string_field(question: &FieldMap, field: &str) -> Option<String> {
    question
        .get(field)
        .and_then(|v| rules::text(v, usize::MAX).ok())
}

fn validate_question(item: &Value) -> Result<Question, Vec<String>> {
    let Value::Object(question) = item else {
        return Err(vec!["must be an object".to_string()]);
    };

    let mut errors = Vec::new();
    let prompt = string_field(question, "prompt");
    if prompt.is_none() {
        errors.push("Missing prompt".to_string());
    }

    let question_type = match question.get("type").map(rules::choice::<QuestionType>) {
        Some(Ok(question_type)) => question_type,
        Some(Err(message)) => {
            errors.push(format!("type {}", message));
            return Err(errors);
        }
        None => {
            errors.push("Missing type".to_string());
            return Err(errors);
        }
    };

    let options = string_list(question, "options");
    let answer = string_field(question, "answer");
    let answers = string_list(question, "answers");
    let steps = string_list(question, "steps");
    let ideal_answer = string_field(question, "ideal_answer");
    let pairs: Option<Vec<MatchPair>> = question
        .get("pairs")
        .and_then(|v| serde_json::from_value(v.clone()).ok());

    match question_type {
        QuestionType::MultipleChoice => {
            if options.as_ref().map_or(true, |o| o.len() < 2) {
                errors.push("Multiple choice requires at least 2 options".to_string());
            }
            match (&answer, &options) {
                (None, _) => errors.push("Missing correct answer".to_string()),
                (Some(answer), Some(options)) if !options.contains(answer) => {
                    errors.push("Correct answer not found in options".to_string())
                }
                _ => {}
            }
        }
        QuestionType::FillBlank => {
            if answers.as_ref().map_or(true, |a| a.is_empty()) {
                errors.push("Fill in blank requires at least 1 accepted answer".to_string());
            }
        }
        QuestionType::Matching => match &pairs {
            Some(pairs) if pairs.len() >= 2 => {
                for (i, pair) in pairs.iter().enumerate() {
                    if pair.left.trim().is_empty() || pair.right.trim().is_empty() {
                        errors.push(format!("Pair {} is incomplete", i + 1));
                    }
                }
            }
            _ => errors.push("Matching requires at least 2 pairs".to_string()),
        },
        QuestionType::Ordering => {
            if steps.as_ref().map_or(true, |s| s.len() < 2) {
                errors.push("Ordering requires at least 2 steps".to_string());
            }
        }
        QuestionType::FreeResponse => {
            if ideal_answer.is_none() {
                errors.push("Free response requires an ideal answer".to_string());
            }
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(Question {
        question_type,
        prompt: prompt.unwrap_or_default(),
        sort_order: question.get("sort_order").and_then(|v| rules::integer(v).ok()),
        explanation: string_field(question, "explanation"),
        options,
        answer,
        answers,
        pairs,
        steps,
        ideal_answer,
        rubric: question.get("rubric").filter(|v| !v.is_null()).cloned(),
        pass_score: question.get("pass_score").filter(|v| !v.is_null()).cloned(),
    })
}

fn validate_enrollment(reader: &mut FieldReader) -> Option<Enrollment> {
    let email = reader.required("email", rules::email);
    let course_id = reader.required("course_id", rules::identifier);
    let payment_status = reader.optional("payment_status", rules::choice::<PaymentStatus>);
    let payment = reader.optional("payment_amount", rules::price);
    let payment_method = reader.optional("payment_method", |v| rules::text(v, 100));

    Some(Enrollment {
        email: email?,
        course_id: course_id?,
        payment_status,
        payment_amount_minor: payment.as_ref().map(|price| price.minor_units),
        payment_amount: payment.map(|price| price.display),
        payment_method,
    })
}

/// Validate one candidate record against the rules of its entity type
pub fn validate(candidate: &CandidateRecord) -> ValidationResult {
    let invalid = |issues: Vec<FieldIssue>| ValidationResult {
        position: candidate.position,
        entity_type: candidate.entity_type,
        is_valid: false,
        issues,
        record: None,
    };

    if let Some(issue) = &candidate.parse_issue {
        return invalid(vec![FieldIssue::error("record", issue.clone())]);
    }

    let known = known_fields(candidate.entity_type);
    let unknown: Vec<&str> = candidate
        .fields
        .keys()
        .map(String::as_str)
        .filter(|field| !known.contains(field) && !METADATA_FIELDS.contains(field))
        .collect();
    if !unknown.is_empty() {
        debug!(
            position = candidate.position,
            entity_type = %candidate.entity_type,
            fields = ?unknown,
            "Ignoring unknown fields"
        );
    }

    let mut reader = FieldReader::new(&candidate.fields);
    let record = match candidate.entity_type {
        EntityType::Course => validate_course(&mut reader).map(ValidatedRecord::Course),
        EntityType::Event => validate_event(&mut reader).map(ValidatedRecord::Event),
        EntityType::Lesson => validate_lesson(&mut reader).map(ValidatedRecord::Lesson),
        EntityType::Enrollment => validate_enrollment(&mut reader).map(ValidatedRecord::Enrollment),
    };

    let issues = reader.issues;
    if issues.iter().any(FieldIssue::is_error) {
        return invalid(issues);
    }

    match record {
        Some(record) => ValidationResult {
            position: candidate.position,
            entity_type: candidate.entity_type,
            is_valid: true,
            issues,
            record: Some(record),
        },
        None => invalid(issues),
    }
}

pub fn validate_all(candidates: &[CandidateRecord]) -> Vec<ValidationResult> {
    candidates.iter().map(validate).collect()
}

/// Whole-batch report: validity counts plus natural keys repeated in the input
pub fn batch_report(results: &[ValidationResult]) -> ValidationReport {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for result in results {
        if let Some(record) = &result.record {
            groups.entry(record.input_key()).or_default().push(result.position);
        }
    }

    ValidationReport {
        total: results.len(),
        valid: results.iter().filter(|r| r.is_valid).count(),
        invalid: results.iter().filter(|r| !r.is_valid).count(),
        warnings: results.iter().filter(|r| r.has_warnings()).count(),
        duplicates: groups
            .into_iter()
            .filter(|(_, positions)| positions.len() > 1)
            .map(|(key, positions)| DuplicateGroup { key, positions })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::catalog::ScheduleDate;
    use crate::types::record::Severity;
    use rstest::rstest;
    use serde_json::json;

    fn candidate(entity_type: EntityType, value: Value) -> CandidateRecord {
        match value {
            Value::Object(fields) => CandidateRecord::new(1, entity_type, fields),
            _ => panic!("expected object"),
        }
    }

    fn course_row() -> Value {
        json!({
            "title": "Intro to Rust",
            "description": "Systems programming without fear.",
            "audiences": "Professional;Student",
            "mode": "online",
            "duration": "6 weeks",
            "price": "₹5,000",
            "level": "Beginner",
            "start_date": "2025-06-01",
            "features": "Live sessions;Projects",
            "keywords": "Rust;Systems",
            "category": "Technology"
        })
    }

    fn error_fields(result: &ValidationResult) -> Vec<&str> {
        result
            .issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .map(|i| i.field.as_str())
            .collect()
    }

    #[test]
    fn test_valid_course_is_normalized() {
        let result = validate(&candidate(EntityType::Course, course_row()));
        assert!(result.is_valid, "{:?}", result.issues);

        let Some(ValidatedRecord::Course(course)) = result.record else {
            panic!("expected course");
        };
        assert_eq!(course.audiences, vec![Audience::Professional, Audience::Student]);
        assert_eq!(course.mode, DeliveryMode::Online);
        assert_eq!(course.price_amount, 500_000);
        assert_eq!(course.keywords, vec!["rust", "systems"]);
        assert!(matches!(course.start_date, ScheduleDate::Date(_)));
        assert_eq!(course.is_active, None);
    }

    #[rstest]
    #[case::missing_title("title", json!(null))]
    #[case::bad_mode("mode", json!("Remote"))]
    #[case::bad_price("price", json!("lots"))]
    #[case::too_many_audiences(
        "audiences",
        json!("Primary;Secondary;Student;Professional;Business")
    )]
    #[case::bad_category("category", json!("Cooking"))]
    #[case::bad_duration("duration", json!("forever"))]
    fn test_course_required_field_errors(#[case] field: &str, #[case] value: Value) {
        let mut row = course_row();
        row[field] = value;

        let result = validate(&candidate(EntityType::Course, row));
        assert!(!result.is_valid);
        assert!(result.record.is_none());
        assert_eq!(error_fields(&result), vec![field]);
    }

    #[test]
    fn test_title_length_boundary() {
        let mut row = course_row();
        row["title"] = json!("t".repeat(200));
        assert!(validate(&candidate(EntityType::Course, row.clone())).is_valid);

        row["title"] = json!("t".repeat(201));
        let result = validate(&candidate(EntityType::Course, row));
        assert!(!result.is_valid);
        assert!(result.issues[0].message.contains("at most 200"));
    }

    #[test]
    fn test_bad_optional_field_becomes_warning_and_is_dropped() {
        let mut row = course_row();
        row["sort_order"] = json!("-3");
        row["is_featured"] = json!("definitely");

        let result = validate(&candidate(EntityType::Course, row));
        assert!(result.is_valid);
        assert_eq!(result.warnings().count(), 2);
        let Some(ValidatedRecord::Course(course)) = result.record else {
            panic!("expected course");
        };
        assert_eq!(course.sort_order, None);
        assert_eq!(course.is_featured, None);
    }

    #[test]
    fn test_inverted_student_bounds_are_dropped() {
        let mut row = course_row();
        row["min_students"] = json!("30");
        row["max_students"] = json!("10");

        let result = validate(&candidate(EntityType::Course, row));
        assert!(result.is_valid);
        let Some(ValidatedRecord::Course(course)) = &result.record else {
            panic!("expected course");
        };
        assert_eq!((course.min_students, course.max_students), (None, None));
        assert!(result.has_warnings());
    }

    #[test]
    fn test_short_description_warns() {
        let mut row = course_row();
        row["description"] = json!("Short");
        let result = validate(&candidate(EntityType::Course, row));
        assert!(result.is_valid);
        assert_eq!(result.warnings().next().unwrap().field, "description");
    }

    #[test]
    fn test_event_accepts_title_alias() {
        let row = json!({
            "title": "AI Meetup",
            "description": "Monthly meetup for AI practitioners",
            "event_type": "Meetup",
            "date": "2025-07-10",
            "price": "Free",
            "tags": "AI;Community",
            "time": "6:00 PM IST"
        });

        let result = validate(&candidate(EntityType::Event, row));
        assert!(result.is_valid, "{:?}", result.issues);
        let Some(ValidatedRecord::Event(event)) = result.record else {
            panic!("expected event");
        };
        assert_eq!(event.name, "AI Meetup");
        assert_eq!(event.event_type, EventType::Meetup);
        assert_eq!(event.price_amount, 0);
        assert_eq!(event.tags, Some(vec!["ai".to_string(), "community".to_string()]));
    }

    #[test]
    fn test_lesson_question_errors_invalidate_lesson() {
        let row = json!({
            "lesson_id": "llm-01",
            "title": "Tokens",
            "skill": "LLMs",
            "duration": "8 min",
            "description": "What a token is",
            "questions": [
                {
                    "type": "multiple_choice",
                    "prompt": "Pick one",
                    "options": ["a", "b"],
                    "answer": "c"
                },
                {"type": "fill_blank", "prompt": "Fill", "answers": ["token"]}
            ]
        });

        let result = validate(&candidate(EntityType::Lesson, row));
        assert!(!result.is_valid);
        assert_eq!(error_fields(&result), vec!["questions[0]"]);
        assert!(result.issues[0].message.contains("Correct answer not found in options"));
    }

    #[test]
    fn test_lesson_without_questions_only_warns() {
        let row = json!({"lesson_id": "llm-02", "title": "Prompts", "skill": "llms"});
        let result = validate(&candidate(EntityType::Lesson, row));
        assert!(result.is_valid);
        let warned: Vec<_> = result.warnings().map(|w| w.field.as_str()).collect();
        assert_eq!(warned, vec!["duration", "description", "questions"]);
    }

    #[rstest]
    #[case::matching_incomplete(
        json!({
            "type": "matching",
            "prompt": "Match",
            "pairs": [{"left": "a", "right": "1"}, {"left": "b"}]
        }),
        "Pair 2 is incomplete"
    )]
    #[case::ordering_short(
        json!({"type": "ordering", "prompt": "Order", "steps": ["one"]}),
        "at least 2 steps"
    )]
    #[case::free_response(json!({"type": "free_response", "prompt": "Explain"}), "ideal answer")]
    #[case::unknown_type(json!({"type": "essay", "prompt": "Write"}), "invalid value 'essay'")]
    #[case::missing_prompt(json!({"type": "fill_blank", "answers": ["x"]}), "Missing prompt")]
    fn test_question_rules(#[case] question: Value, #[case] expected: &str) {
        let errors = validate_question(&question).unwrap_err();
        assert!(errors.iter().any(|e| e.contains(expected)), "{:?}", errors);
    }

    #[test]
    fn test_enrollment_email_lowercased() {
        let row = json!({"email": "Ana@Example.com", "course_id": 12, "payment_amount": "$50"});
        let result = validate(&candidate(EntityType::Enrollment, row));
        let Some(ValidatedRecord::Enrollment(enrollment)) = result.record else {
            panic!("expected enrollment");
        };
        assert_eq!(enrollment.email, "ana@example.com");
        assert_eq!(enrollment.course_id, "12");
        assert_eq!(enrollment.payment_amount.as_deref(), Some("$50"));
        assert_eq!(enrollment.payment_amount_minor, Some(5_000));
    }

    #[test]
    fn test_unparsable_candidate_is_invalid() {
        let candidate = CandidateRecord::unparsable(
            4,
            EntityType::Course,
            FieldMap::new(),
            "expected 11 columns, found 3",
        );
        let result = validate(&candidate);
        assert!(!result.is_valid);
        assert_eq!(result.position, 4);
        assert_eq!(error_fields(&result), vec!["record"]);
    }

    #[test]
    fn test_batch_report_groups_duplicates_case_insensitively() {
        let mut second = course_row();
        second["title"] = json!("INTRO TO RUST");
        let mut third = course_row();
        third["title"] = json!("Other");
        let mut bad = course_row();
        bad["mode"] = json!("nope");

        let candidates: Vec<_> = [course_row(), second, third, bad]
            .into_iter()
            .enumerate()
            .map(|(i, row)| match row {
                Value::Object(fields) => CandidateRecord::new(i + 1, EntityType::Course, fields),
                _ => unreachable!(),
            })
            .collect();

        let report = batch_report(&validate_all(&candidates));
        assert_eq!(report.total, 4);
        assert_eq!(report.valid, 3);
        assert_eq!(report.invalid, 1);
        assert_eq!(
            report.duplicates,
            vec![DuplicateGroup {
                key: "intro to rust".into(),
                positions: vec![1, 2]
            }]
        );
    }
}
