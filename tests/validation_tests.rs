// Name and location validation against a store on disk.

use std::fs;
use tempfile::TempDir;
use treepass::validation::check_leaf;
use treepass::{PathValidator, StoreConfig, ValidateOptions, ValidationErrorKind};

fn store() -> (TempDir, StoreConfig) {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::with_store_dir(dir.path());
    (dir, config)
}

// ============================================================================
// Character rules
// ============================================================================

#[test]
fn test_space_rejection_reports_position() {
    let config = StoreConfig::default();
    let msg = check_leaf("work email.age", true, &config)
        .unwrap_err()
        .to_string();
    assert!(msg.contains("position 5"), "{msg}");
    assert!(msg.contains("' '"), "{msg}");
}

#[test]
fn test_multibyte_position_counts_characters() {
    let config = StoreConfig::default();
    let msg = check_leaf("åäö#", false, &config).unwrap_err().to_string();
    assert!(msg.contains("position 4"), "{msg}");
}

#[test]
fn test_slash_is_not_part_of_a_name() {
    let config = StoreConfig::default();
    let err = check_leaf("a/b.age", true, &config).unwrap_err();
    assert!(matches!(err.kind, ValidationErrorKind::BadCharset { .. }));
}

#[test]
fn test_error_names_the_input() {
    let config = StoreConfig::default();
    let err = check_leaf("bad!.age", true, &config).unwrap_err();
    assert_eq!(err.input, "bad!.age");
    assert!(err.to_string().starts_with("Invalid node path 'bad!.age'"));
}

// ============================================================================
// Locations
// ============================================================================

#[test]
fn test_new_entry_in_existing_folder() {
    let (dir, config) = store();
    fs::create_dir_all(dir.path().join("mail/personal")).unwrap();

    let valid = PathValidator::new(dir.path(), &config)
        .validate("github.age", "/mail/personal/", ValidateOptions::new_entry())
        .unwrap();
    assert_eq!(valid.relative_path(), "mail/personal/github.age");
    assert_eq!(valid.location, dir.path().join("mail/personal/github.age"));
    assert!(valid.is_entry);
}

#[test]
fn test_missing_parent_is_named() {
    let (dir, config) = store();
    fs::create_dir(dir.path().join("mail")).unwrap();

    let err = PathValidator::new(dir.path(), &config)
        .validate("github.age", "mail/nope", ValidateOptions::new_entry())
        .unwrap_err();
    assert_eq!(
        err.kind,
        ValidationErrorKind::MissingParent {
            path: dir.path().join("mail/nope")
        }
    );
}

#[test]
fn test_parent_that_is_a_file() {
    let (dir, config) = store();
    fs::write(dir.path().join("bank.age"), "x").unwrap();

    let err = PathValidator::new(dir.path(), &config)
        .validate("card.age", "bank.age", ValidateOptions::new_entry())
        .unwrap_err();
    assert!(matches!(err.kind, ValidationErrorKind::MissingParent { .. }));
}

#[test]
fn test_entry_and_folder_share_a_namespace() {
    let (dir, config) = store();
    fs::create_dir(dir.path().join("bank")).unwrap();
    fs::write(dir.path().join("mail.age"), "x").unwrap();
    let validator = PathValidator::new(dir.path(), &config);

    let err = validator
        .validate("bank.age", "/", ValidateOptions::new_entry())
        .unwrap_err();
    assert_eq!(
        err.kind,
        ValidationErrorKind::NameCollision {
            existing: dir.path().join("bank")
        }
    );

    // Allowing the same kind does not allow the other kind.
    let err = validator
        .validate("mail", "/", ValidateOptions::new_folder().allow_name_taken(true))
        .unwrap_err();
    assert!(matches!(err.kind, ValidationErrorKind::NameCollision { .. }));
}

#[test]
fn test_allow_name_taken_for_in_place_change() {
    let (dir, config) = store();
    fs::write(dir.path().join("bank.age"), "x").unwrap();
    let validator = PathValidator::new(dir.path(), &config);

    assert!(validator
        .validate("bank.age", "/", ValidateOptions::new_entry())
        .is_err());
    assert!(validator
        .validate(
            "bank.age",
            "/",
            ValidateOptions::new_entry().allow_name_taken(true)
        )
        .is_ok());
}

#[test]
fn test_invalid_ancestor_names() {
    let (dir, config) = store();
    fs::create_dir(dir.path().join("bad dir")).unwrap();
    let validator = PathValidator::new(dir.path(), &config);

    let err = validator
        .validate("x.age", "bad dir", ValidateOptions::new_entry())
        .unwrap_err();
    assert!(matches!(err.kind, ValidationErrorKind::BadCharset { .. }));

    assert!(validator
        .validate(
            "x.age",
            "bad dir",
            ValidateOptions::new_entry().check_parents(false)
        )
        .is_ok());
}

#[test]
fn test_dot_segments_cannot_escape() {
    let (dir, config) = store();
    fs::create_dir(dir.path().join("mail")).unwrap();
    let validator = PathValidator::new(dir.path(), &config);

    for folder in ["..", "mail/..", "./mail", "mail/../.."] {
        let err = validator
            .validate("x.age", folder, ValidateOptions::new_entry())
            .unwrap_err();
        assert!(
            matches!(err.kind, ValidationErrorKind::BadCharset { .. }),
            "{folder}"
        );
    }
}

#[test]
fn test_depth_bound() {
    let (dir, mut config) = store();
    config.max_tree_depth = 2;
    fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
    let validator = PathValidator::new(dir.path(), &config);

    assert!(validator
        .validate("x.age", "a/b", ValidateOptions::new_entry())
        .is_ok());
    let err = validator
        .validate("x.age", "a/b/c", ValidateOptions::new_entry())
        .unwrap_err();
    assert_eq!(err.kind, ValidationErrorKind::DepthExceeded { maximum: 2 });
}

#[test]
fn test_name_checked_before_location() {
    let (dir, config) = store();
    let err = PathValidator::new(dir.path(), &config)
        .validate("", "missing", ValidateOptions::new_folder())
        .unwrap_err();
    assert_eq!(err.kind, ValidationErrorKind::EmptyName);
}
