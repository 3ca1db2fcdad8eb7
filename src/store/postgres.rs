use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool, Postgres, Transaction};

use super::{Enrollment, Store, StoreError};
use crate::models::{Course, CourseUpdate, NewCourse, NewStudent, Page, Student};

const SCHEMA: &str = include_str!("schema.sql");

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Creates missing tables. Existing tables are left as they are.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        self.pool.execute(SCHEMA).await?;
        Ok(())
    }
}

const EMAIL_CONSTRAINT: &str = "students_email_key";

fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        // unique_violation
        if db.code().as_deref() == Some("23505") {
            return StoreError::Conflict(db.message().to_string());
        }
    }
    StoreError::Database(err)
}

fn classify_student(email: &str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.constraint() == Some(EMAIL_CONSTRAINT) {
            return StoreError::EmailTaken(email.to_string());
        }
    }
    classify(err)
}

/// Locks both rows of a pair for the rest of `tx`, reporting the missing side.
/// The student row is locked first, in the same order as `delete_student`.
async fn lock_pair(
    tx: &mut Transaction<'_, Postgres>,
    student_id: i64,
    course_id: i64,
) -> Result<Option<Enrollment>, sqlx::Error> {
    let student = sqlx::query_scalar::<_, i64>("SELECT id FROM students WHERE id = $1 FOR SHARE")
        .bind(student_id)
        .fetch_optional(&mut *tx)
        .await?;
    let course = sqlx::query_scalar::<_, i64>("SELECT id FROM courses WHERE id = $1 FOR UPDATE")
        .bind(course_id)
        .fetch_optional(&mut *tx)
        .await?;
    Ok(match (student, course) {
        (_, None) => Some(Enrollment::NoCourse),
        (None, Some(_)) => Some(Enrollment::NoStudent),
        _ => None,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn create_student(&self, student: NewStudent) -> Result<Student, StoreError> {
        sqlx::query_as::<_, Student>(
            "INSERT INTO students (name, email, password_hash) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(&student.name)
        .bind(&student.email)
        .bind(&student.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| classify_student(&student.email, err))
    }

    async fn get_student(&self, id: i64) -> Result<Option<Student>, StoreError> {
        sqlx::query_as::<_, Student>("SELECT * FROM students WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)
    }

    async fn student_by_email(&self, email: &str) -> Result<Option<Student>, StoreError> {
        sqlx::query_as::<_, Student>("SELECT * FROM students WHERE email = $1 LIMIT 1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)
    }

    async fn delete_student(&self, id: i64) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM students WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut tx)
            .await?;
        if exists.is_none() {
            return Ok(false);
        }

        // the cascade below drops these relation rows
        sqlx::query(
            "UPDATE courses SET registered_count = registered_count - 1 \
             WHERE id IN (SELECT course_id FROM students_courses WHERE student_id = $1)",
        )
        .bind(id)
        .execute(&mut tx)
        .await?;

        sqlx::query("DELETE FROM students WHERE id = $1")
            .bind(id)
            .execute(&mut tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn create_course(&self, course: NewCourse) -> Result<Course, StoreError> {
        sqlx::query_as::<_, Course>(
            "INSERT INTO courses (field, subject, class_timing, instructor_name, course_pic) \
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(&course.field)
        .bind(&course.subject)
        .bind(&course.class_timing)
        .bind(&course.instructor_name)
        .bind(&course.course_pic)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)
    }

    async fn get_course(&self, id: i64) -> Result<Option<Course>, StoreError> {
        sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)
    }

    async fn list_courses(&self, page: Page) -> Result<Vec<Course>, StoreError> {
        sqlx::query_as::<_, Course>("SELECT * FROM courses ORDER BY id LIMIT $1 OFFSET $2")
            .bind(i64::from(page.capped_limit()))
            .bind(i64::from(page.skip))
            .fetch_all(&self.pool)
            .await
            .map_err(classify)
    }

    async fn update_course(
        &self,
        id: i64,
        update: CourseUpdate,
    ) -> Result<Option<Course>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let course = sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut tx)
            .await?;
        let mut course = match course {
            Some(course) => course,
            None => return Ok(None),
        };
        update.apply(&mut course);

        let course = sqlx::query_as::<_, Course>(
            "UPDATE courses SET field = $2, subject = $3, class_timing = $4, instructor_name = $5 \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&course.field)
        .bind(&course.subject)
        .bind(&course.class_timing)
        .bind(&course.instructor_name)
        .fetch_one(&mut tx)
        .await
        .map_err(classify)?;

        tx.commit().await?;
        Ok(Some(course))
    }

    async fn delete_course(&self, id: i64) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(res.rows_affected() >= 1)
    }

    async fn enroll(&self, student_id: i64, course_id: i64) -> Result<Enrollment, StoreError> {
        let mut tx = self.pool.begin().await?;
        if let Some(missing) = lock_pair(&mut tx, student_id, course_id).await? {
            return Ok(missing);
        }

        let inserted = sqlx::query(
            "INSERT INTO students_courses (student_id, course_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(student_id)
        .bind(course_id)
        .execute(&mut tx)
        .await?;
        if inserted.rows_affected() == 0 {
            return Ok(Enrollment::Unchanged);
        }

        sqlx::query("UPDATE courses SET registered_count = registered_count + 1 WHERE id = $1")
            .bind(course_id)
            .execute(&mut tx)
            .await?;

        tx.commit().await?;
        Ok(Enrollment::Changed)
    }

    async fn unenroll(
        &self,
        student_id: i64,
        course_id: i64,
    ) -> Result<Enrollment, StoreError> {
        let mut tx = self.pool.begin().await?;
        if let Some(missing) = lock_pair(&mut tx, student_id, course_id).await? {
            return Ok(missing);
        }

        let removed = sqlx::query(
            "DELETE FROM students_courses WHERE student_id = $1 AND course_id = $2",
        )
        .bind(student_id)
        .bind(course_id)
        .execute(&mut tx)
        .await?;
        if removed.rows_affected() == 0 {
            return Ok(Enrollment::Unchanged);
        }

        sqlx::query("UPDATE courses SET registered_count = registered_count - 1 WHERE id = $1")
            .bind(course_id)
            .execute(&mut tx)
            .await?;

        tx.commit().await?;
        Ok(Enrollment::Changed)
    }

    async fn courses_of(&self, student_id: i64) -> Result<Vec<Course>, StoreError> {
        sqlx::query_as::<_, Course>(
            "SELECT c.* FROM courses c \
             JOIN students_courses sc ON sc.course_id = c.id \
             WHERE sc.student_id = $1 ORDER BY c.id",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)
    }
}
