// Course listing through the enrollment API

use ufora::core::courses::{list_courses, started_in};

use super::support::{FakePortal, PageReply};
use ufora::core::ContentFetcher;

fn enrollment(id: u64, name: &str, code: &str, start: &str, active: bool) -> serde_json::Value {
    serde_json::json!({
        "OrgUnit": { "Id": id, "Type": { "Id": 3 }, "Name": name, "Code": code },
        "Access": { "IsActive": active, "StartDate": start }
    })
}

#[tokio::test]
async fn test_courses_follow_bookmarks_on_first_answering_version() {
    let portal = FakePortal::new();
    let api = portal.portal().clone();

    // Newest version is missing on this portal
    portal.page(&api.enrollments("1.28", None), PageReply::Permanent);
    portal.page(
        &api.enrollments("1.9", None),
        PageReply::Body(
            serde_json::json!({
                "PagingInfo": { "Bookmark": "p2", "HasMoreItems": true },
                "Items": [
                    enrollment(101, "2025-2026 - Algoritmen", "C003", "2025-09-22T00:00:00.000Z", true),
                    enrollment(102, "2025-2026 - Oud vak", "C004", "2024-09-23T00:00:00.000Z", false),
                ]
            })
            .to_string(),
        ),
    );
    portal.page(
        &api.enrollments("1.9", Some("p2")),
        PageReply::Body(
            serde_json::json!({
                "PagingInfo": { "Bookmark": "p3", "HasMoreItems": false },
                "Items": [
                    enrollment(103, "Databanken", "E001", "2024-09-23T00:00:00.000Z", true),
                ]
            })
            .to_string(),
        ),
    );

    let courses = list_courses(&portal).await.unwrap();

    let ids: Vec<&str> = courses.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["101", "103"], "inactive enrollments are dropped");
    assert_eq!(courses[0].name, "Algoritmen");
    assert_eq!(courses[0].title, "C003 - Algoritmen");

    let this_year = started_in(&courses, 2025);
    assert_eq!(this_year.len(), 1);
    assert_eq!(this_year[0].id, "101");
}

#[tokio::test]
async fn test_rejected_session_is_not_retried_on_older_versions() {
    let portal = FakePortal::new();
    let api = portal.portal().clone();
    portal.page(&api.enrollments("1.28", None), PageReply::Unauthorized);

    let err = list_courses(&portal).await.unwrap_err();

    assert!(err.is_auth());
}

#[tokio::test]
async fn test_no_answering_version_is_an_error() {
    let portal = FakePortal::new();

    assert!(list_courses(&portal).await.is_err());
}

#[tokio::test]
async fn test_forbidden_version_keeps_session_and_falls_back() {
    let portal = FakePortal::new();
    let api = portal.portal().clone();
    portal.page(&api.enrollments("1.28", None), PageReply::Status(403));
    portal.page(
        &api.enrollments("1.9", None),
        PageReply::Body(
            serde_json::json!({
                "PagingInfo": { "Bookmark": null, "HasMoreItems": false },
                "Items": [
                    enrollment(101, "Algoritmen", "C003", "2025-09-22T00:00:00.000Z", true),
                ]
            })
            .to_string(),
        ),
    );

    let courses = list_courses(&portal).await.unwrap();

    assert_eq!(courses.len(), 1);
    assert!(portal.session().is_valid(), "a 403 does not end the session");
}

#[tokio::test]
async fn test_unauthorized_status_ends_session() {
    let portal = FakePortal::new();
    let api = portal.portal().clone();
    portal.page(&api.enrollments("1.28", None), PageReply::Status(401));

    let err = list_courses(&portal).await.unwrap_err();

    assert!(err.is_auth());
    assert!(!portal.session().is_valid());
}
