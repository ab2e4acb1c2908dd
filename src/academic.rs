//! Course, assignment, lecture and submission endpoints.
//!
//! Plain plumbing over the pipeline: records come back as JSON values and
//! every call gets credential injection and transparent renewal for free.
//! Multipart uploads are not covered. Every method returns the backend's
//! rejection verbatim on failure.

#![allow(clippy::missing_errors_doc)]

#[cfg(test)]
#[path = "academic_test.rs"]
mod tests;

use serde::Serialize;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::pipeline::Pipeline;
use crate::transport::ApiRequest;

const COURSES: &str = "/v1/academic/courses";
const ASSIGNMENTS: &str = "/v1/grading/assignments";
const LECTURES: &str = "/v1/grading/lectures";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseForm {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_teacher_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_teacher_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseUpdate {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentForm {
    pub title: String,
    pub description: String,
    pub course_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentUpdate {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LectureUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct AcademicGateway {
    pipeline: Pipeline,
}

impl AcademicGateway {
    #[must_use]
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    // =========================================================================
    // COURSES
    // =========================================================================

    pub async fn list_courses(&self) -> Result<Vec<Value>, ApiError> {
        self.pipeline.fetch(ApiRequest::get(format!("{COURSES}/"))).await
    }

    pub async fn create_course(&self, form: &CourseForm) -> Result<Value, ApiError> {
        self.pipeline.fetch(ApiRequest::post(format!("{COURSES}/create")).json_from(form)?).await
    }

    pub async fn join_course(&self, code: &str) -> Result<(), ApiError> {
        let path = format!("{COURSES}/invite?code={}", urlencoding::encode(code));
        self.pipeline.execute(ApiRequest::patch(path).json(json!({}))).await
    }

    pub async fn course(&self, course_id: &str) -> Result<Value, ApiError> {
        self.pipeline.fetch(ApiRequest::get(format!("{COURSES}/{course_id}"))).await
    }

    pub async fn update_course(&self, course_id: &str, update: &CourseUpdate) -> Result<(), ApiError> {
        self.pipeline.execute(ApiRequest::patch(format!("{COURSES}/{course_id}")).json_from(update)?).await
    }

    pub async fn leave_course(&self, course_id: &str) -> Result<(), ApiError> {
        self.pipeline.execute(ApiRequest::patch(format!("{COURSES}/{course_id}/leave"))).await
    }

    pub async fn delete_course(&self, course_id: &str) -> Result<(), ApiError> {
        self.pipeline.execute(ApiRequest::delete(format!("{COURSES}/{course_id}"))).await
    }

    // =========================================================================
    // ASSIGNMENTS
    // =========================================================================

    pub async fn create_assignment(&self, form: &AssignmentForm) -> Result<Value, ApiError> {
        self.pipeline.fetch(ApiRequest::post(format!("{ASSIGNMENTS}/create")).json_from(form)?).await
    }

    pub async fn update_assignment(&self, assignment_id: &str, update: &AssignmentUpdate) -> Result<(), ApiError> {
        let request = ApiRequest::patch(format!("{ASSIGNMENTS}/{assignment_id}")).json_from(update)?;
        self.pipeline.execute(request).await
    }

    pub async fn assignment(&self, assignment_id: &str) -> Result<Value, ApiError> {
        self.pipeline.fetch(ApiRequest::get(format!("{ASSIGNMENTS}/{assignment_id}"))).await
    }

    pub async fn course_assignments(&self, course_id: &str) -> Result<Vec<Value>, ApiError> {
        self.pipeline.fetch(ApiRequest::get(format!("{ASSIGNMENTS}/course/{course_id}"))).await
    }

    pub async fn delete_assignment(&self, assignment_id: &str) -> Result<(), ApiError> {
        self.pipeline.execute(ApiRequest::delete(format!("{ASSIGNMENTS}/{assignment_id}"))).await
    }

    pub async fn download_submission(&self, submission_id: &str) -> Result<Vec<u8>, ApiError> {
        let path = format!("{ASSIGNMENTS}/submissions/{submission_id}/download");
        Ok(self.pipeline.send(ApiRequest::get(path)).await?.body)
    }

    pub async fn delete_submission(&self, submission_id: &str) -> Result<(), ApiError> {
        self.pipeline.execute(ApiRequest::delete(format!("{ASSIGNMENTS}/submissions/{submission_id}"))).await
    }

    // =========================================================================
    // LECTURES
    // =========================================================================

    pub async fn lecture(&self, lecture_id: &str) -> Result<Value, ApiError> {
        self.pipeline.fetch(ApiRequest::get(format!("{LECTURES}/{lecture_id}"))).await
    }

    pub async fn course_lectures(&self, course_id: &str) -> Result<Vec<Value>, ApiError> {
        self.pipeline.fetch(ApiRequest::get(format!("{LECTURES}/course/{course_id}"))).await
    }

    pub async fn update_lecture(&self, lecture_id: &str, update: &LectureUpdate) -> Result<Value, ApiError> {
        self.pipeline.fetch(ApiRequest::patch(format!("{LECTURES}/{lecture_id}")).json_from(update)?).await
    }

    pub async fn delete_lecture(&self, lecture_id: &str) -> Result<(), ApiError> {
        self.pipeline.execute(ApiRequest::delete(format!("{LECTURES}/{lecture_id}"))).await
    }

    pub async fn delete_lecture_file(&self, lecture_id: &str, file_id: &str) -> Result<(), ApiError> {
        self.pipeline.execute(ApiRequest::delete(format!("{LECTURES}/{lecture_id}/files/{file_id}"))).await
    }

    pub async fn download_lecture_file(&self, file_id: &str) -> Result<Vec<u8>, ApiError> {
        let path = format!("{LECTURES}/files/{file_id}/download");
        Ok(self.pipeline.send(ApiRequest::get(path)).await?.body)
    }
}
