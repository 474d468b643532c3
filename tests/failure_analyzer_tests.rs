use std::path::PathBuf;

use screen_healing::healing::failure_analyzer::{
    FailureRecord, analyze, analyze_path, extract_locator, extract_source_location,
    is_lookup_failure,
};
use screen_healing::locator::locator_model::Strategy;

use crate::common::builders::locator;

mod common;

const REPORT: &str = r#"{
  "suites": [
    {
      "name": "login",
      "tests": [
        {
          "id": "LoginTest.test_login",
          "status": "failed",
          "message": "NoSuchElementError: element not found: stable-id=login_btn",
          "source": "tests/login_test.py:12",
          "snapshot": "login-1"
        },
        {
          "id": "LoginTest.test_logout",
          "status": "error",
          "error": "selenium.common.exceptions.NoSuchElementException: Message: An element could not be located (using='accessibility id', value='logout')",
          "trace": "Traceback (most recent call last):\n  File \"tests/conftest.py\", line 3, in wrapper\n  File \"tests/logout_test.py\", line 27, in test_logout"
        },
        { "id": "LoginTest.test_title", "status": "passed" },
        { "id": "LoginTest.test_math", "status": "failed", "message": "AssertionError: expected 3 got 4" },
        { "name": "LoginTest.test_later", "status": "skipped" },
        { "status": "failed", "message": "no such element" },
        42
      ]
    }
  ]
}"#;

// =========================================================================
// Extraction
// =========================================================================

#[test]
fn lookup_failures_are_recognized() {
    assert!(is_lookup_failure("NoSuchElementError: whatever"));
    assert!(is_lookup_failure("Unable to find element with id login"));
    assert!(is_lookup_failure("Element with text 'Login' not found"));
    assert!(!is_lookup_failure("AssertionError: expected 3 got 4"));
    assert!(!is_lookup_failure("TimeoutException: page did not load"));
}

#[test]
fn locators_are_extracted_from_framework_messages() {
    assert_eq!(
        extract_locator("element not found: accessibility-id=\"log in\""),
        Some(locator(Strategy::AccessibilityId, "log in")),
        "Canonical quoted"
    );
    assert_eq!(
        extract_locator("(using='xpath', value='//Button[1]')"),
        Some(locator(Strategy::StructuralPath, "//Button[1]")),
        "Appium using/value"
    );
    assert_eq!(
        extract_locator("NoSuchElementException: By.id: com.shop:id/login_btn"),
        Some(locator(Strategy::StableId, "com.shop:id/login_btn")),
        "Java By prefix"
    );
    assert_eq!(
        extract_locator("could not find element with resource-id: 'login_btn'"),
        Some(locator(Strategy::StableId, "login_btn")),
        "Keyed form"
    );
    assert_eq!(extract_locator("no locator here"), None);
}

#[test]
fn source_locations_prefer_innermost_python_frame() {
    let trace = "  File \"tests/conftest.py\", line 3, in wrapper\n  File \"tests/login_test.py\", line 27, in test_login";
    let location = extract_source_location(trace).unwrap();
    assert_eq!(location.file, PathBuf::from("tests/login_test.py"));
    assert_eq!(location.line, 27);

    let java = extract_source_location("at LoginTest.login(LoginTest.java:44)").unwrap();
    assert_eq!(java.file, PathBuf::from("LoginTest.java"));
    assert_eq!(java.line, 44);

    assert!(extract_source_location("no frames").is_none());
}

// =========================================================================
// Report analysis
// =========================================================================

#[test]
fn report_yields_one_record_per_lookup_failure() {
    let analysis = analyze(REPORT, "report.json").unwrap();

    assert_eq!(analysis.records.len(), 2);
    assert_eq!(analysis.passed, 1);
    assert_eq!(analysis.not_run, 1);
    assert_eq!(analysis.other_failures, 1, "Assertion failure is not a lookup");
    assert_eq!(analysis.skipped, 2, "Entry without id and non-object entry");
    assert_eq!(analysis.errors.len(), 2);

    let login = &analysis.records[0];
    assert_eq!(login.test_id, "LoginTest.test_login");
    assert_eq!(login.failing_locator, locator(Strategy::StableId, "login_btn"));
    let location = login.source_location.as_ref().unwrap();
    assert_eq!(location.file, PathBuf::from("tests/login_test.py"));
    assert_eq!(location.line, 12);
    assert_eq!(login.snapshot_ref.as_deref(), Some("login-1"));

    let logout = &analysis.records[1];
    assert_eq!(logout.failing_locator, locator(Strategy::AccessibilityId, "logout"));
    assert_eq!(logout.source_location.as_ref().unwrap().line, 27, "Taken from the trace");
    assert!(logout.snapshot_ref.is_none());
}

#[test]
fn yaml_list_reports_are_accepted() {
    let report = r#"
- name: CartTest.checkout
  status: failed
  message: "no such element: text=Checkout"
  source: { file: tests/cart_test.py, line: 8 }
- name: CartTest.empty
  status: ok
"#;
    let analysis = analyze(report, "report.yaml").unwrap();
    assert_eq!(analysis.records.len(), 1);
    assert_eq!(analysis.passed, 1);
    let record = &analysis.records[0];
    assert_eq!(record.failing_locator, locator(Strategy::Text, "Checkout"));
    assert_eq!(record.source_location.as_ref().unwrap().line, 8);
}

#[test]
fn unreadable_report_is_an_error() {
    assert!(analyze("{\"summary\": {}}", "report.json").is_err(), "No tests key");
    assert!(analyze("[unclosed", "report.json").is_err());
    assert!(analyze_path(&PathBuf::from("/definitely/not/here.json")).is_err());
}

#[test]
fn failure_ids_are_stable() {
    let a = analyze(REPORT, "a.json").unwrap();
    let b = analyze(REPORT, "b.json").unwrap();
    let ids_a: Vec<&str> = a.records.iter().map(|r| r.failure_id.as_str()).collect();
    let ids_b: Vec<&str> = b.records.iter().map(|r| r.failure_id.as_str()).collect();
    assert_eq!(ids_a, ids_b);
    assert_ne!(ids_a[0], ids_a[1]);

    let record = FailureRecord::new("t", locator(Strategy::Text, "Go"), None, None, "");
    assert_eq!(record.failure_id.len(), 12);
}
