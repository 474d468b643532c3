use screen_healing::error::PatchError;
use screen_healing::healing::patcher::{
    apply_patch, current_sha1, replace_literal, restore_backup, reverse_patch,
};
use screen_healing::locator::locator_model::Strategy;

use crate::common::builders::locator;
use crate::common::utils::write_file;

mod common;

const PY_SOURCE: &str = "from appium.webdriver.common.appiumby import AppiumBy\r\n\r\ndef test_login(driver):\r\n    driver.find_element(AppiumBy.ID, \"login_btn\").click()\r\n";

// =========================================================================
// replace_literal
// =========================================================================

#[test]
fn canonical_literal_is_replaced_whole() {
    let line = "LOGIN = \"stable-id=login_btn\"\n";
    let out = replace_literal(
        line,
        &locator(Strategy::StableId, "login_btn"),
        &locator(Strategy::AccessibilityId, "login"),
    );
    assert_eq!(out.as_deref(), Some("LOGIN = \"accessibility-id=login\"\n"));
}

#[test]
fn python_client_swaps_strategy_token() {
    let out = replace_literal(
        "    driver.find_element(AppiumBy.ID, \"login_btn\").click()",
        &locator(Strategy::StableId, "login_btn"),
        &locator(Strategy::AccessibilityId, "login"),
    );
    assert_eq!(
        out.as_deref(),
        Some("    driver.find_element(AppiumBy.ACCESSIBILITY_ID, \"login\").click()")
    );
}

#[test]
fn java_client_swaps_by_call() {
    let out = replace_literal(
        "driver.findElement(By.id(\"login_btn\")).click();",
        &locator(Strategy::StableId, "login_btn"),
        &locator(Strategy::AccessibilityId, "login"),
    );
    assert_eq!(
        out.as_deref(),
        Some("driver.findElement(AppiumBy.accessibilityId(\"login\")).click();")
    );
}

#[test]
fn single_quotes_and_same_strategy() {
    let out = replace_literal(
        "el = driver.find_element(AppiumBy.XPATH, '//Button[1]')",
        &locator(Strategy::StructuralPath, "//Button[1]"),
        &locator(Strategy::StructuralPath, "//Button[@content-desc=\"go\"]"),
    );
    assert_eq!(
        out.as_deref(),
        Some("el = driver.find_element(AppiumBy.XPATH, '//Button[@content-desc=\"go\"]')")
    );
}

#[test]
fn missing_literal_is_none() {
    let out = replace_literal(
        "driver.find_element(AppiumBy.ID, \"other\")",
        &locator(Strategy::StableId, "login_btn"),
        &locator(Strategy::AccessibilityId, "login"),
    );
    assert!(out.is_none());
}

// =========================================================================
// File operations
// =========================================================================

#[test]
fn apply_patch_backs_up_and_keeps_line_endings() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(dir.path(), "tests/login_test.py", PY_SOURCE);
    let backup = dir.path().join("backups/f1.bak");

    let outcome = apply_patch(
        &file,
        4,
        &locator(Strategy::StableId, "login_btn"),
        &locator(Strategy::AccessibilityId, "login"),
        &backup,
    )
    .unwrap();

    let patched = std::fs::read_to_string(&file).unwrap();
    assert!(patched.contains("AppiumBy.ACCESSIBILITY_ID, \"login\""));
    assert_eq!(patched.matches("\r\n").count(), 4, "CRLF preserved");
    assert_eq!(std::fs::read_to_string(&backup).unwrap(), PY_SOURCE);
    assert_eq!(outcome.backup_path, backup);
    assert_ne!(outcome.original_sha1, outcome.patched_sha1);
    assert_eq!(current_sha1(&file), Some(outcome.patched_sha1.clone()));

    let restored = restore_backup(&file, &backup).unwrap();
    assert_eq!(restored, outcome.original_sha1);
    assert_eq!(std::fs::read_to_string(&file).unwrap(), PY_SOURCE, "Byte-for-byte");
}

#[test]
fn failed_patch_leaves_file_and_writes_no_backup() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(dir.path(), "login_test.py", PY_SOURCE);
    let backup = dir.path().join("backups/f1.bak");

    let wrong_line = apply_patch(
        &file,
        3,
        &locator(Strategy::StableId, "login_btn"),
        &locator(Strategy::AccessibilityId, "login"),
        &backup,
    )
    .unwrap_err();
    assert!(matches!(wrong_line, PatchError::LiteralNotFound { line: 3, .. }), "Got {:?}", wrong_line);

    let out_of_range = apply_patch(
        &file,
        40,
        &locator(Strategy::StableId, "login_btn"),
        &locator(Strategy::AccessibilityId, "login"),
        &backup,
    )
    .unwrap_err();
    assert!(matches!(out_of_range, PatchError::LineOutOfRange { line: 40, .. }));

    let missing = apply_patch(
        &dir.path().join("nope.py"),
        1,
        &locator(Strategy::StableId, "login_btn"),
        &locator(Strategy::AccessibilityId, "login"),
        &backup,
    )
    .unwrap_err();
    assert!(matches!(missing, PatchError::FileMissing(_)));

    assert_eq!(std::fs::read_to_string(&file).unwrap(), PY_SOURCE);
    assert!(!backup.exists());
    assert!(matches!(restore_backup(&file, &backup), Err(PatchError::BackupMissing(_))));
}

#[test]
fn reverse_patch_swaps_back_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(dir.path(), "login_test.py", PY_SOURCE);
    let backup = dir.path().join("f1.bak");
    let old = locator(Strategy::StableId, "login_btn");
    let new = locator(Strategy::AccessibilityId, "login");
    apply_patch(&file, 4, &old, &new, &backup).unwrap();

    // Someone edits another line after the heal.
    let edited = std::fs::read_to_string(&file).unwrap().replace("def test_login", "def test_sign_in");
    std::fs::write(&file, &edited).unwrap();

    reverse_patch(&file, 4, &new, &old).unwrap();
    let content = std::fs::read_to_string(&file).unwrap();
    assert!(content.contains("AppiumBy.ID, \"login_btn\""));
    assert!(content.contains("def test_sign_in"), "Unrelated edit kept");
}
