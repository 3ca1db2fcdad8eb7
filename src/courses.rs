use axum::extract::{Multipart, Path, Query};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use axum_extra::extract::cookie::CookieJar;

use crate::io::{content_type_of, is_plain_name, ImageStore};
use crate::models::{Course, CourseUpdate, NewCourse, Page};
use crate::session::CurrentStudent;
use crate::store::Enrollment;
use crate::{breaks, proceeds, AppState, Error, Payload};

const COURSE_PIC_FIELD: &str = "course_pic";

fn course_not_found(id: i64) -> Error {
    Error::not_found(format!("Course with id {} not found", id))
}

fn student_gone(id: i64) -> Error {
    Error::unauthenticated(format!("Student {} no longer exists", id))
}

/// Text fields come in the query string; the image, when there is one, is the
/// first non-empty `course_pic` part of a multipart body.
pub async fn create_course(
    Extension(state): Extension<AppState>,
    Query(mut course): Query<NewCourse>,
    upload: Option<Multipart>,
) -> Result<(StatusCode, Json<Course>), Error> {
    course.validate().map_err(Error::invalid)?;

    if let Some(multipart) = upload {
        course.course_pic = receive_picture(&state.images, multipart).await?;
    }
    let stored = course.course_pic.clone();

    let created = match course.validate() {
        Ok(()) => state.store.create_course(course).await.map_err(Error::from),
        Err(message) => Err(Error::invalid(message)),
    };
    match created {
        Ok(course) => {
            log::info!("Created course {} ({})", course.id, course.field);
            Ok((StatusCode::CREATED, Json(course)))
        }
        Err(err) => {
            if let Some(stored) = stored {
                if let Err(discard) = state.images.discard(&stored).await {
                    log::warn!("Could not remove orphaned image {}: {}", stored, discard);
                }
            }
            Err(err)
        }
    }
}

/// Reads the whole body before touching the disk, so a broken upload leaves
/// nothing behind.
async fn receive_picture(
    images: &ImageStore,
    mut multipart: Multipart,
) -> Result<Option<String>, Error> {
    let mut picture = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(COURSE_PIC_FIELD) || picture.is_some() {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;
        if !bytes.is_empty() {
            picture = Some((file_name, bytes));
        }
    }

    match picture {
        Some((file_name, bytes)) => Ok(Some(images.save(file_name.as_deref(), &bytes).await?)),
        None => Ok(None),
    }
}

pub async fn get_course(
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
) -> Payload<Course> {
    match state.store.get_course(id).await? {
        Some(course) => proceeds(course),
        None => breaks(course_not_found(id)),
    }
}

pub async fn list_courses(
    Extension(state): Extension<AppState>,
    Query(page): Query<Page>,
) -> Payload<Vec<Course>> {
    proceeds(state.store.list_courses(page).await?)
}

pub async fn update_course(
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<CourseUpdate>,
) -> Payload<Course> {
    if let Err(message) = update.validate() {
        return breaks(Error::invalid(message));
    }
    match state.store.update_course(id, update).await? {
        Some(course) => proceeds(course),
        None => breaks(course_not_found(id)),
    }
}

pub async fn delete_course(
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, Error> {
    if !state.store.delete_course(id).await? {
        return Err(course_not_found(id));
    }
    log::info!("Deleted course {}", id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn enroll(
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
    current: CurrentStudent,
    jar: CookieJar,
) -> (CookieJar, Payload<Course>) {
    let result = enroll_student(&state, current.student().id, id).await;
    current.respond(jar, result)
}

async fn enroll_student(state: &AppState, student_id: i64, course_id: i64) -> Payload<Course> {
    match state.store.enroll(student_id, course_id).await? {
        Enrollment::Changed => {
            log::info!("Student {} enrolled in course {}", student_id, course_id)
        }
        Enrollment::Unchanged => {
            return breaks(Error::Conflict {
                message: format!(
                    "Student {} is already enrolled in course {}",
                    student_id, course_id
                ),
            })
        }
        Enrollment::NoCourse => return breaks(course_not_found(course_id)),
        Enrollment::NoStudent => return breaks(student_gone(student_id)),
    }
    reload(state, course_id).await
}

pub async fn unenroll(
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
    current: CurrentStudent,
    jar: CookieJar,
) -> (CookieJar, Payload<Course>) {
    let result = unenroll_student(&state, current.student().id, id).await;
    current.respond(jar, result)
}

async fn unenroll_student(state: &AppState, student_id: i64, course_id: i64) -> Payload<Course> {
    match state.store.unenroll(student_id, course_id).await? {
        Enrollment::Changed => log::info!("Student {} left course {}", student_id, course_id),
        Enrollment::Unchanged => {
            return breaks(Error::not_found(format!(
                "Student {} is not enrolled in course {}",
                student_id, course_id
            )))
        }
        Enrollment::NoCourse => return breaks(course_not_found(course_id)),
        Enrollment::NoStudent => return breaks(student_gone(student_id)),
    }
    reload(state, course_id).await
}

async fn reload(state: &AppState, course_id: i64) -> Payload<Course> {
    match state.store.get_course(course_id).await? {
        Some(course) => proceeds(course),
        None => breaks(course_not_found(course_id)),
    }
}

/// Everything is served as an image type the browser will not execute, with
/// sniffing turned off.
pub async fn get_image(
    Extension(state): Extension<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, Error> {
    if !is_plain_name(&name) {
        return Err(Error::invalid(format!("Invalid image name `{}`", name)));
    }
    match state.images.read(&name).await? {
        Some(bytes) => Ok((
            [
                (header::CONTENT_TYPE, HeaderValue::from_static(content_type_of(&name))),
                (
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ),
            ],
            bytes,
        )),
        None => Err(Error::not_found(format!("Image `{}` not found", name))),
    }
}
