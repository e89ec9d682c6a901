// Tree discovery against an in-memory portal

use std::path::Path;
use std::time::Duration;
use ufora::core::{DiscoveryOptions, NodeKind, TreeDiscovery};

use super::support::{file_item, folder_item, FakePortal, PageReply, COURSE};

#[tokio::test]
async fn test_course_tree_mirrors_listing_pages() {
    let portal = FakePortal::course_101();

    let root = TreeDiscovery::new(&portal).discover(COURSE).await.unwrap();

    let names: Vec<&str> = root.children.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["Syllabus.pdf", "Labs"]);

    let syllabus = &root.children[0];
    assert_eq!(syllabus.kind, NodeKind::File);
    assert_eq!(syllabus.type_label.as_deref(), Some("PDF document"));
    assert_eq!(syllabus.remote, portal.file_url("9001"));

    let labs = &root.children[1];
    assert_eq!(labs.kind, NodeKind::Folder);
    let lab_targets: Vec<&Path> = labs.children.iter().map(|n| n.target.as_path()).collect();
    assert_eq!(
        lab_targets,
        vec![Path::new("Labs/lab1.zip"), Path::new("Labs/lab2.zip")]
    );
    assert!(root.warnings().is_empty());
}

#[tokio::test]
async fn test_one_request_per_top_level_folder() {
    let portal = FakePortal::new();
    portal.root_listing(&[
        folder_item("1", "Slides"),
        file_item("10", "Intro.pdf", "PDF document"),
        folder_item("2", "Exercises"),
        file_item("11", "Rules.pdf", "PDF document"),
    ]);
    portal.module_listing("1", &[file_item("20", "week1.pdf", "PDF document")]);
    portal.module_listing("2", &[file_item("21", "ex1.pdf", "PDF document")]);

    let root = TreeDiscovery::new(&portal).discover(COURSE).await.unwrap();

    assert_eq!(root.children.len(), 4, "every top-level entry becomes a node");
    assert_eq!(
        portal.listing_requests(),
        3,
        "one root listing plus one listing per folder"
    );
    for node in root.children.iter().filter(|n| n.kind == NodeKind::File) {
        assert!(node.children.is_empty());
    }
    assert_eq!(root.files().len(), 4);
}

#[tokio::test]
async fn test_unreadable_folder_is_kept_empty_with_warning() {
    let portal = FakePortal::new();
    portal.root_listing(&[folder_item("1", "Broken"), folder_item("2", "Fine")]);
    portal.module_reply("1", PageReply::Transient);
    portal.module_listing("2", &[file_item("20", "notes.pdf", "PDF document")]);

    let root = TreeDiscovery::new(&portal).discover(COURSE).await.unwrap();

    let broken = &root.children[0];
    assert!(broken.children.is_empty());
    assert!(broken.warning.is_some(), "failed folder must carry a warning");

    let fine = &root.children[1];
    assert_eq!(fine.children.len(), 1, "siblings are still resolved");
    assert!(fine.warning.is_none());

    let warnings = root.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].0, Path::new("Broken"));
}

#[tokio::test]
async fn test_malformed_folder_payload_is_a_warning() {
    let portal = FakePortal::new();
    portal.root_listing(&[folder_item("1", "Odd")]);
    portal.module_reply("1", PageReply::Body("while(1);{not json".to_string()));

    let root = TreeDiscovery::new(&portal).discover(COURSE).await.unwrap();

    assert!(root.children[0].children.is_empty());
    assert!(root.children[0].warning.is_some());
}

#[tokio::test]
async fn test_empty_course_yields_empty_root() {
    let portal = FakePortal::new();
    portal.root_listing(&[]);

    let root = TreeDiscovery::new(&portal).discover(COURSE).await.unwrap();

    assert!(root.children.is_empty());
    assert_eq!(portal.listing_requests(), 1);
}

#[tokio::test]
async fn test_root_failure_is_an_error() {
    let portal = FakePortal::new();

    let result = TreeDiscovery::new(&portal).discover(COURSE).await;

    assert!(result.is_err(), "missing root listing cannot be discovered");
}

#[tokio::test]
async fn test_rejected_session_in_folder_aborts_discovery() {
    let portal = FakePortal::new();
    portal.root_listing(&[folder_item("1", "Slides")]);
    portal.module_reply("1", PageReply::Unauthorized);

    let err = TreeDiscovery::new(&portal).discover(COURSE).await.unwrap_err();

    assert!(err.is_auth());
}

#[tokio::test]
async fn test_nested_folders_stop_at_depth_limit() {
    let portal = FakePortal::new();
    portal.root_listing(&[folder_item("1", "Chapters")]);
    portal.module_listing(
        "1",
        &[
            folder_item("2", "Chapter 1"),
            file_item("20", "overview.pdf", "PDF document"),
        ],
    );
    portal.module_listing("2", &[file_item("21", "part1.pdf", "PDF document")]);

    let root = TreeDiscovery::new(&portal).discover(COURSE).await.unwrap();
    let nested = &root.children[0].children[0];
    assert_eq!(nested.kind, NodeKind::Folder);
    assert!(nested.children.is_empty(), "second level is not expanded by default");
    assert_eq!(portal.module_requests("2"), 0);

    let deeper = TreeDiscovery::new(&portal)
        .with_options(DiscoveryOptions {
            max_depth: 2,
            ..Default::default()
        })
        .discover(COURSE)
        .await
        .unwrap();
    let nested = &deeper.children[0].children[0];
    assert_eq!(nested.children.len(), 1);
    assert_eq!(
        nested.children[0].target,
        Path::new("Chapters/Chapter 1/part1.pdf")
    );
}

#[tokio::test]
async fn test_assignments_are_not_material() {
    let portal = FakePortal::new();
    portal.root_listing(&[
        file_item("10", "Homework 1", "Assignment"),
        file_item("11", "Slides.pdf", "PDF document"),
    ]);

    let root = TreeDiscovery::new(&portal).discover(COURSE).await.unwrap();

    let names: Vec<&str> = root.children.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["Slides.pdf"]);
}

#[tokio::test]
async fn test_folder_listings_are_bounded() {
    let portal = FakePortal::new().with_latency(Duration::from_millis(20));
    let ids = ["1", "2", "3", "4", "5"];
    let folders: Vec<String> = ids
        .iter()
        .map(|id| folder_item(id, &format!("Week {}", id)))
        .collect();
    portal.root_listing(&folders);
    for id in ids {
        portal.module_listing(id, &[file_item(&format!("2{}", id), "notes.pdf", "PDF document")]);
    }

    let root = TreeDiscovery::new(&portal)
        .with_options(DiscoveryOptions {
            folder_concurrency: 2,
            ..Default::default()
        })
        .discover(COURSE)
        .await
        .unwrap();

    assert_eq!(root.files().len(), 5);
    assert_eq!(portal.folder_gauge.peak(), 2, "two listings overlap, never three");
    let names: Vec<&str> = root.children.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["Week 1", "Week 2", "Week 3", "Week 4", "Week 5"]);
}
