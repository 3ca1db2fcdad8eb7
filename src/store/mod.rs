//! Persistence for students, courses and the enrollment relation between them.
//!
//! Every implementation keeps `Course::registered_count` equal to the number of
//! enrollment rows for that course. The counter only moves together with a
//! relation row that was actually inserted or removed, inside the same unit of
//! work.

use async_trait::async_trait;

use crate::models::{Course, CourseUpdate, NewCourse, NewStudent, Page, Student};

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[cfg(test)]
pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email `{0}` is already registered")]
    EmailTaken(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// What an enroll or unenroll call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enrollment {
    /// The relation row was inserted or removed and the counter moved with it.
    Changed,
    /// Already enrolled (for enroll) or not enrolled (for unenroll).
    Unchanged,
    NoStudent,
    NoCourse,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_student(&self, student: NewStudent) -> Result<Student, StoreError>;

    async fn get_student(&self, id: i64) -> Result<Option<Student>, StoreError>;

    async fn student_by_email(&self, email: &str) -> Result<Option<Student>, StoreError>;

    /// Removes the student with their enrollments, decrementing the counter of
    /// every course they were enrolled in.
    async fn delete_student(&self, id: i64) -> Result<bool, StoreError>;

    async fn create_course(&self, course: NewCourse) -> Result<Course, StoreError>;

    async fn get_course(&self, id: i64) -> Result<Option<Course>, StoreError>;

    async fn list_courses(&self, page: Page) -> Result<Vec<Course>, StoreError>;

    async fn update_course(
        &self,
        id: i64,
        update: CourseUpdate,
    ) -> Result<Option<Course>, StoreError>;

    async fn delete_course(&self, id: i64) -> Result<bool, StoreError>;

    async fn enroll(&self, student_id: i64, course_id: i64) -> Result<Enrollment, StoreError>;

    async fn unenroll(
        &self,
        student_id: i64,
        course_id: i64,
    ) -> Result<Enrollment, StoreError>;

    async fn courses_of(&self, student_id: i64) -> Result<Vec<Course>, StoreError>;
}
