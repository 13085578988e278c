use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Two weighted scenarios sharing ten users.
pub const WEIGHTED: &str = r#"Feature: checkout
  Background: common
    Given "10" users

  Scenario: browse
    Given a user of type "RestApi" with weight "3" load testing "https://shop.example.com"
    And repeat for "30" iterations
    Then get request from endpoint "/products"

  Scenario: buy
    Given a user of type "RestApi" with weight "1" load testing "https://shop.example.com"
    And repeat for "10" iterations
    Then post request to endpoint "/cart"
"#;

/// Write `contents` as `name` inside `dir`.
pub fn write_feature(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));
    path
}

pub fn path_arg(path: &Path) -> String {
    path.display().to_string()
}
