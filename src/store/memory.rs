use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::{Enrollment, Store, StoreError};
use crate::models::{Course, CourseUpdate, NewCourse, NewStudent, Page, Student};

/// In-process store for tests. One lock guards all tables, so each operation
/// is a single unit of work.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    students: BTreeMap<i64, Student>,
    courses: BTreeMap<i64, Course>,
    enrollments: BTreeSet<(i64, i64)>,
    next_student: i64,
    next_course: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of relation rows for `course_id`, for checking the counter.
    pub fn enrolled_in(&self, course_id: i64) -> usize {
        self.tables
            .lock()
            .enrollments
            .iter()
            .filter(|(_, course)| *course == course_id)
            .count()
    }
}

impl Tables {
    fn missing_side(&self, student_id: i64, course_id: i64) -> Option<Enrollment> {
        if !self.courses.contains_key(&course_id) {
            Some(Enrollment::NoCourse)
        } else if !self.students.contains_key(&student_id) {
            Some(Enrollment::NoStudent)
        } else {
            None
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_student(&self, student: NewStudent) -> Result<Student, StoreError> {
        let mut tables = self.tables.lock();
        if tables.students.values().any(|s| s.email == student.email) {
            return Err(StoreError::EmailTaken(student.email));
        }
        if tables.students.values().any(|s| s.name == student.name) {
            return Err(StoreError::Conflict(format!(
                "name `{}` is already taken",
                student.name
            )));
        }

        tables.next_student += 1;
        let now = Utc::now();
        let student = Student {
            id: tables.next_student,
            name: student.name,
            email: student.email,
            password_hash: student.password_hash,
            created_at: now,
            updated_at: now,
        };
        tables.students.insert(student.id, student.clone());
        Ok(student)
    }

    async fn get_student(&self, id: i64) -> Result<Option<Student>, StoreError> {
        Ok(self.tables.lock().students.get(&id).cloned())
    }

    async fn student_by_email(&self, email: &str) -> Result<Option<Student>, StoreError> {
        Ok(self
            .tables
            .lock()
            .students
            .values()
            .find(|s| s.email == email)
            .cloned())
    }

    async fn delete_student(&self, id: i64) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        if tables.students.remove(&id).is_none() {
            return Ok(false);
        }

        let dropped: Vec<(i64, i64)> = tables
            .enrollments
            .iter()
            .filter(|(student, _)| *student == id)
            .copied()
            .collect();
        for pair in dropped {
            tables.enrollments.remove(&pair);
            if let Some(course) = tables.courses.get_mut(&pair.1) {
                course.registered_count -= 1;
            }
        }
        Ok(true)
    }

    async fn create_course(&self, course: NewCourse) -> Result<Course, StoreError> {
        let mut tables = self.tables.lock();
        tables.next_course += 1;
        let course = Course {
            id: tables.next_course,
            field: course.field,
            subject: course.subject,
            class_timing: course.class_timing,
            instructor_name: course.instructor_name,
            course_pic: course.course_pic,
            registered_count: 0,
        };
        tables.courses.insert(course.id, course.clone());
        Ok(course)
    }

    async fn get_course(&self, id: i64) -> Result<Option<Course>, StoreError> {
        Ok(self.tables.lock().courses.get(&id).cloned())
    }

    async fn list_courses(&self, page: Page) -> Result<Vec<Course>, StoreError> {
        Ok(self
            .tables
            .lock()
            .courses
            .values()
            .skip(page.skip as usize)
            .take(page.capped_limit() as usize)
            .cloned()
            .collect())
    }

    async fn update_course(
        &self,
        id: i64,
        update: CourseUpdate,
    ) -> Result<Option<Course>, StoreError> {
        let mut tables = self.tables.lock();
        Ok(tables.courses.get_mut(&id).map(|course| {
            update.apply(course);
            course.clone()
        }))
    }

    async fn delete_course(&self, id: i64) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        if tables.courses.remove(&id).is_none() {
            return Ok(false);
        }
        tables.enrollments.retain(|(_, course)| *course != id);
        Ok(true)
    }

    async fn enroll(&self, student_id: i64, course_id: i64) -> Result<Enrollment, StoreError> {
        let mut tables = self.tables.lock();
        if let Some(missing) = tables.missing_side(student_id, course_id) {
            return Ok(missing);
        }
        if !tables.enrollments.insert((student_id, course_id)) {
            return Ok(Enrollment::Unchanged);
        }
        if let Some(course) = tables.courses.get_mut(&course_id) {
            course.registered_count += 1;
        }
        Ok(Enrollment::Changed)
    }

    async fn unenroll(
        &self,
        student_id: i64,
        course_id: i64,
    ) -> Result<Enrollment, StoreError> {
        let mut tables = self.tables.lock();
        if let Some(missing) = tables.missing_side(student_id, course_id) {
            return Ok(missing);
        }
        if !tables.enrollments.remove(&(student_id, course_id)) {
            return Ok(Enrollment::Unchanged);
        }
        if let Some(course) = tables.courses.get_mut(&course_id) {
            course.registered_count -= 1;
        }
        Ok(Enrollment::Changed)
    }

    async fn courses_of(&self, student_id: i64) -> Result<Vec<Course>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .enrollments
            .iter()
            .filter(|(student, _)| *student == student_id)
            .filter_map(|(_, course)| tables.courses.get(course).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for (name, email) in [("Alice", "a@x.com"), ("Bob", "b@x.com"), ("Cara", "c@x.com")] {
            store
                .create_student(NewStudent {
                    name: name.into(),
                    email: email.into(),
                    password_hash: "hash".into(),
                })
                .await
                .unwrap();
        }
        store
            .create_course(NewCourse {
                field: "Math".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        store
    }

    async fn count(store: &MemoryStore, course_id: i64) -> i32 {
        store
            .get_course(course_id)
            .await
            .unwrap()
            .unwrap()
            .registered_count
    }

    #[tokio::test]
    async fn enroll_then_unenroll_scenario() {
        let store = seeded().await;
        assert_eq!(count(&store, 1).await, 0);

        assert_eq!(store.enroll(1, 1).await.unwrap(), Enrollment::Changed);
        assert_eq!(count(&store, 1).await, 1);

        assert_eq!(store.enroll(1, 1).await.unwrap(), Enrollment::Unchanged);
        assert_eq!(count(&store, 1).await, 1);

        assert_eq!(store.unenroll(1, 1).await.unwrap(), Enrollment::Changed);
        assert_eq!(count(&store, 1).await, 0);
    }

    #[tokio::test]
    async fn counter_tracks_relation_over_sequence() {
        let store = seeded().await;
        let ops: [(bool, i64); 10] = [
            (true, 1),
            (true, 2),
            (true, 2),
            (false, 3),
            (true, 3),
            (false, 1),
            (false, 1),
            (true, 1),
            (false, 2),
            (false, 3),
        ];

        for (enroll, student) in ops {
            if enroll {
                store.enroll(student, 1).await.unwrap();
            } else {
                store.unenroll(student, 1).await.unwrap();
            }
            assert_eq!(count(&store, 1).await as usize, store.enrolled_in(1));
        }
        assert_eq!(count(&store, 1).await, 1);
    }

    #[tokio::test]
    async fn unenroll_without_relation_keeps_count() {
        let store = seeded().await;
        assert_eq!(store.unenroll(2, 1).await.unwrap(), Enrollment::Unchanged);
        assert_eq!(count(&store, 1).await, 0);
    }

    #[tokio::test]
    async fn missing_sides_are_rejected() {
        let store = seeded().await;
        assert_eq!(store.enroll(99, 1).await.unwrap(), Enrollment::NoStudent);
        assert_eq!(store.enroll(1, 99).await.unwrap(), Enrollment::NoCourse);
        assert_eq!(store.unenroll(99, 1).await.unwrap(), Enrollment::NoStudent);
        assert_eq!(count(&store, 1).await, 0);
    }

    #[tokio::test]
    async fn deleting_student_releases_seats() {
        let store = seeded().await;
        store
            .create_course(NewCourse {
                field: "Art".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        store.enroll(1, 1).await.unwrap();
        store.enroll(1, 2).await.unwrap();
        store.enroll(2, 1).await.unwrap();

        assert!(store.delete_student(1).await.unwrap());
        assert_eq!(count(&store, 1).await, 1);
        assert_eq!(count(&store, 2).await, 0);
        assert_eq!(store.enrolled_in(1), 1);
        assert!(!store.delete_student(1).await.unwrap());
    }

    #[tokio::test]
    async fn deleting_course_drops_relation_rows() {
        let store = seeded().await;
        store.enroll(1, 1).await.unwrap();
        assert!(store.delete_course(1).await.unwrap());
        assert!(store.courses_of(1).await.unwrap().is_empty());
        assert!(!store.delete_course(1).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_identity_is_conflict() {
        let store = seeded().await;
        let dup_email = store
            .create_student(NewStudent {
                name: "Other".into(),
                email: "a@x.com".into(),
                password_hash: "hash".into(),
            })
            .await;
        assert!(matches!(dup_email, Err(StoreError::EmailTaken(email)) if email == "a@x.com"));

        let dup_name = store
            .create_student(NewStudent {
                name: "Alice".into(),
                email: "other@x.com".into(),
                password_hash: "hash".into(),
            })
            .await;
        assert!(matches!(dup_name, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn listing_pages_by_id() {
        let store = MemoryStore::new();
        for field in ["A", "B", "C", "D"] {
            store
                .create_course(NewCourse {
                    field: field.into(),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        let page = store.list_courses(Page { skip: 1, limit: 2 }).await.unwrap();
        let fields: Vec<_> = page.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, ["B", "C"]);
    }
}
