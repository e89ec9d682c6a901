// Course enumeration through the portal's enrollment API

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::core::client::ContentFetcher;
use crate::core::portal::API_VERSIONS;
use crate::error::FetchError;

/// Org unit type id of a course offering
const COURSE_OFFERING_TYPE: i64 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    /// Org unit id used in every content URL
    pub id: String,
    pub code: String,
    pub name: String,
    /// Display title (code and name)
    pub title: String,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
}

impl Course {
    /// Academic year the course started in, if known
    pub fn year(&self) -> Option<i32> {
        self.start.map(|s| s.year())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnrollmentPage {
    #[serde(default)]
    items: Vec<Enrollment>,
    #[serde(default)]
    paging_info: Option<PagingInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PagingInfo {
    #[serde(default)]
    bookmark: Option<String>,
    #[serde(default)]
    has_more_items: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Enrollment {
    org_unit: OrgUnit,
    #[serde(default)]
    access: Option<Access>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OrgUnit {
    id: serde_json::Value,
    #[serde(rename = "Type")]
    unit_type: OrgUnitType,
    #[serde(default)]
    name: String,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OrgUnitType {
    id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Access {
    #[serde(default)]
    is_active: bool,
    #[serde(default)]
    start_date: Option<String>,
}

impl Enrollment {
    fn into_course(self) -> Option<Course> {
        let access = self.access?;
        if self.org_unit.unit_type.id != COURSE_OFFERING_TYPE || !access.is_active {
            return None;
        }

        let id = match &self.org_unit.id {
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::String(s) => s.clone(),
            _ => return None,
        };

        let name = match self.org_unit.name.split_once(" - ") {
            Some((_, rest)) => rest.to_string(),
            None => self.org_unit.name.clone(),
        };
        let code = self.org_unit.code.unwrap_or_default();
        let title = if !code.is_empty() && code != name {
            format!("{} - {}", code, name)
        } else {
            name.clone()
        };

        let start = access
            .start_date
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc));

        Some(Course {
            id,
            code,
            name,
            title,
            start,
        })
    }
}

/// Fetch every active course offering, following the API's bookmarks.
///
/// Tries the known API versions newest first and keeps the first one the
/// portal answers.
pub async fn list_courses(fetcher: &dyn ContentFetcher) -> Result<Vec<Course>, FetchError> {
    let portal = fetcher.portal().clone();
    let mut last_error = None;

    for version in API_VERSIONS {
        let first_url = portal.enrollments(version, None);
        let body = match fetcher.fetch_page(&first_url).await {
            Ok(body) => body,
            Err(e) if e.is_auth() => return Err(e),
            Err(e) => {
                log::debug!("Enrollment API {} unavailable: {}", version, e);
                last_error = Some(e);
                continue;
            }
        };

        let mut courses = Vec::new();
        let mut page = parse_page(&first_url, &body)?;
        loop {
            let next = page
                .paging_info
                .as_ref()
                .filter(|p| p.has_more_items)
                .and_then(|p| p.bookmark.clone());

            courses.extend(page.items.into_iter().filter_map(Enrollment::into_course));

            let Some(bookmark) = next else {
                break;
            };
            let url = portal.enrollments(version, Some(&bookmark));
            let body = fetcher.fetch_page(&url).await?;
            page = parse_page(&url, &body)?;
        }

        log::info!("Found {} active courses via API {}", courses.len(), version);
        return Ok(courses);
    }

    Err(last_error.unwrap_or_else(|| {
        FetchError::permanent(portal.base().as_str(), "no enrollment API version answered")
    }))
}

fn parse_page(url: &url::Url, body: &str) -> Result<EnrollmentPage, FetchError> {
    serde_json::from_str(body)
        .map_err(|e| FetchError::permanent(url.as_str(), format!("unexpected enrollment payload: {}", e)))
}

/// Courses whose start date falls in `year`
pub fn started_in(courses: &[Course], year: i32) -> Vec<Course> {
    courses
        .iter()
        .filter(|c| c.year() == Some(year))
        .cloned()
        .collect()
}
