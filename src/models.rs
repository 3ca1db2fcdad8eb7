use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub const NAME_MAX_LEN: usize = 50;
pub const EMAIL_MAX_LEN: usize = 100;
pub const SHORT_FIELD_MAX_LEN: usize = 50;
pub const COURSE_PIC_MAX_LEN: usize = 255;

pub const DEFAULT_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Course {
    pub id: i64,
    pub field: String,
    pub subject: Option<String>,
    pub class_timing: Option<String>,
    pub instructor_name: Option<String>,
    pub course_pic: Option<String>,
    pub registered_count: i32,
}

#[derive(Debug, Clone)]
pub struct NewStudent {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCourse {
    pub field: String,
    pub subject: Option<String>,
    pub class_timing: Option<String>,
    pub instructor_name: Option<String>,
    #[serde(skip)]
    pub course_pic: Option<String>,
}

impl NewCourse {
    pub fn validate(&self) -> Result<(), String> {
        check_field(&self.field)?;
        check_len("class_timing", self.class_timing.as_deref(), SHORT_FIELD_MAX_LEN)?;
        check_len(
            "instructor_name",
            self.instructor_name.as_deref(),
            SHORT_FIELD_MAX_LEN,
        )?;
        check_len("course_pic", self.course_pic.as_deref(), COURSE_PIC_MAX_LEN)
    }
}

/// Fields of a course that may be changed after creation. A key that is
/// absent leaves the column untouched; an explicit `null` clears it.
/// `registered_count` is not listed here; only enrollment moves it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CourseUpdate {
    pub field: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub subject: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub class_timing: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub instructor_name: Option<Option<String>>,
}

impl CourseUpdate {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(field) = &self.field {
            check_field(field)?;
        }
        if let Some(timing) = &self.class_timing {
            check_len("class_timing", timing.as_deref(), SHORT_FIELD_MAX_LEN)?;
        }
        if let Some(instructor) = &self.instructor_name {
            check_len("instructor_name", instructor.as_deref(), SHORT_FIELD_MAX_LEN)?;
        }
        Ok(())
    }

    pub fn apply(self, course: &mut Course) {
        if let Some(field) = self.field {
            course.field = field;
        }
        if let Some(subject) = self.subject {
            course.subject = subject;
        }
        if let Some(timing) = self.class_timing {
            course.class_timing = timing;
        }
        if let Some(instructor) = self.instructor_name {
            course.instructor_name = instructor;
        }
    }
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn check_field(field: &str) -> Result<(), String> {
    if field.trim().is_empty() {
        return Err("`field` must not be empty".to_string());
    }
    check_len("field", Some(field), SHORT_FIELD_MAX_LEN)
}

pub(crate) fn check_len(name: &str, value: Option<&str>, max: usize) -> Result<(), String> {
    match value {
        Some(value) if value.chars().count() > max => Err(format!(
            "`{}` must be at most {} characters long",
            name, max
        )),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Page {
    pub fn capped_limit(&self) -> u32 {
        self.limit.min(DEFAULT_PAGE_LIMIT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
}

impl From<&Student> for UserResponse {
    fn from(student: &Student) -> Self {
        Self {
            id: student.id,
            email: student.email.clone(),
            name: student.name.clone(),
        }
    }
}
