//! Distribution of users over the scenarios of a feature.
//!
//! The total user count comes from the background step `Given "<n>" users`.
//! Each scenario declares its user type and weight with
//! `a user of type "<T>" with weight "<w>"` and its iteration count with
//! `repeat for "<n>" iterations`. Quoted values may reference testdata
//! variables as `{{ name }}`.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tabled::{Table, Tabled};

use crate::domain::feature::quoted;
use crate::domain::{Feature, StepKind};
use crate::error::DistributionError;

/// Largest user or iteration count a step may declare.
pub const MAX_COUNT: u64 = 1_000_000_000;

/// Share of the users assigned to one scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioShare {
    /// 1-based position in the feature.
    pub index: usize,
    pub name: String,
    pub user_type: String,
    pub weight: f64,
    pub iterations: u64,
    pub users: u64,
}

impl ScenarioShare {
    /// Zero-padded identifier, e.g. `001`.
    pub fn ident(&self) -> String {
        format!("{:03}", self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distribution {
    pub total_users: u64,
    pub scenarios: Vec<ScenarioShare>,
}

#[derive(Tabled)]
struct ShareRow {
    #[tabled(rename = "ident")]
    ident: String,
    #[tabled(rename = "weight")]
    weight: f64,
    #[tabled(rename = "#iter")]
    iterations: u64,
    #[tabled(rename = "#user")]
    users: u64,
    #[tabled(rename = "description")]
    description: String,
}

impl Distribution {
    pub fn total_iterations(&self) -> u64 {
        self.scenarios
            .iter()
            .fold(0, |total, s| total.saturating_add(s.iterations))
    }

    /// Fails when a scenario gets more users than it has iterations to run.
    pub fn check_iterations(&self) -> Result<(), DistributionError> {
        match self.scenarios.iter().find(|s| s.iterations < s.users) {
            Some(share) => Err(DistributionError::TooFewIterations {
                scenario: share.name.clone(),
                users: share.users,
                iterations: share.iterations,
            }),
            None => Ok(()),
        }
    }

    pub fn table(&self) -> String {
        let rows = self.scenarios.iter().map(|share| ShareRow {
            ident: share.ident(),
            weight: share.weight,
            iterations: share.iterations,
            users: share.users,
            description: share.name.clone(),
        });
        Table::new(rows).to_string()
    }
}

/// Compute the user distribution of `feature`. `variables` are the testdata
/// variables (without prefix) available to `{{ name }}` templates.
pub fn compute(
    feature: &Feature,
    variables: &BTreeMap<String, String>,
) -> Result<Distribution, DistributionError> {
    let context = TemplateContext::new(variables);

    if let Some(empty) = feature.scenarios.iter().find(|s| s.steps.is_empty()) {
        return Err(DistributionError::NoSteps {
            scenario: empty.name.clone(),
        });
    }

    let mut total_users = 0;
    if !feature.scenarios.is_empty() {
        for step in feature.background.iter().filter(|s| s.kind == StepKind::Given) {
            if !(step.text.ends_with(" users") || step.text.ends_with(" user")) {
                continue;
            }
            if let Some((value, _)) = quoted(&step.text) {
                total_users = context.round(&step.text, value)?;
            }
        }
    }

    let mut shares = Vec::with_capacity(feature.scenarios.len());
    for (position, scenario) in feature.scenarios.iter().enumerate() {
        let mut user_type = None;
        let mut weight = 1.0;
        let mut iterations = 1;

        for step in &scenario.steps {
            if let Some(rest) = step.text.strip_prefix("a user of type ") {
                let Some((name, rest)) = quoted(rest) else {
                    continue;
                };
                user_type = Some(name.to_string());
                let raw_weight = rest
                    .trim_start()
                    .strip_prefix("with weight ")
                    .and_then(quoted)
                    .map_or("1.0", |(value, _)| value);
                weight = context.number(&step.text, raw_weight)?;
            } else if let Some(rest) = step.text.strip_prefix("repeat for ") {
                if let Some((value, rest)) = quoted(rest) {
                    if rest.trim_start().starts_with("iteration") {
                        iterations = context.round(&step.text, value)?;
                    }
                }
            }
        }

        shares.push((position + 1, scenario.name.clone(), user_type, weight, iterations));
    }

    if shares.len() as u64 > total_users {
        return Err(DistributionError::NotEnoughUsers {
            required: shares.len(),
        });
    }

    let mut scenarios = Vec::with_capacity(shares.len());
    for (index, name, user_type, weight, iterations) in shares {
        let Some(user_type) = user_type else {
            return Err(DistributionError::MissingUserType { scenario: name });
        };
        scenarios.push(ScenarioShare {
            index,
            name,
            user_type,
            weight,
            iterations,
            users: 0,
        });
    }

    let total_weight: f64 = scenarios.iter().map(|s| s.weight).sum();
    if total_weight <= 0.0 {
        return Err(DistributionError::ZeroWeight);
    }

    for share in &mut scenarios {
        let users = (total_users as f64 * share.weight / total_weight).ceil();
        share.users = users.clamp(0.0, total_users as f64) as u64;
    }
    smooth(&mut scenarios, total_users);

    Ok(Distribution {
        total_users,
        scenarios,
    })
}

/// Remove users rounded up by `ceil` until the sum matches `total`, taking
/// from the largest scenarios first and never going below one user.
fn smooth(scenarios: &mut [ScenarioShare], total: u64) {
    let assigned = scenarios
        .iter()
        .try_fold(0u64, |sum, s| sum.checked_add(s.users))
        .unwrap_or(u64::MAX);
    let mut overflow = assigned.saturating_sub(total);

    while overflow > 0 {
        let mut order: Vec<usize> = (0..scenarios.len()).collect();
        order.sort_by(|&a, &b| scenarios[b].users.cmp(&scenarios[a].users));

        let before = overflow;
        for position in order {
            let share = &mut scenarios[position];
            if share.users <= 1 {
                continue;
            }
            share.users -= 1;
            overflow -= 1;
            if overflow == 0 {
                break;
            }
        }

        if overflow == before {
            break;
        }
    }
}

/// Testdata value with its guessed datatype.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl TemplateValue {
    /// Guess the datatype of a raw value. Numbers with a leading zero stay
    /// strings so identifiers like `007` keep their padding.
    pub fn guess(value: &str) -> Self {
        let unsigned = value.strip_prefix('-').unwrap_or(value);
        let digits = unsigned.replacen('.', "", 1);
        let numeric = !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit());

        if numeric {
            if let Ok(number) = value.parse::<f64>() {
                if number.fract() != 0.0 {
                    return TemplateValue::Float(number);
                }
                if value.starts_with('0') {
                    return TemplateValue::Str(value.to_string());
                }
                return TemplateValue::Int(number as i64);
            }
        }

        match value.to_ascii_lowercase().as_str() {
            "true" => TemplateValue::Bool(true),
            "false" => TemplateValue::Bool(false),
            _ => TemplateValue::Str(value.to_string()),
        }
    }
}

impl fmt::Display for TemplateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateValue::Int(value) => write!(f, "{value}"),
            TemplateValue::Float(value) => write!(f, "{value}"),
            TemplateValue::Bool(value) => write!(f, "{value}"),
            TemplateValue::Str(value) => f.write_str(value),
        }
    }
}

/// Render `{{ name }}` placeholders. Unknown names render empty.
pub fn render(template: &str, values: &BTreeMap<String, TemplateValue>) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(end) = rest[start..].find("}}") else {
            break;
        };
        rendered.push_str(&rest[..start]);
        let name = rest[start + 2..start + end].trim();
        if let Some(value) = values.get(name) {
            rendered.push_str(&value.to_string());
        }
        rest = &rest[start + end + 2..];
    }

    rendered.push_str(rest);
    rendered
}

struct TemplateContext {
    values: BTreeMap<String, TemplateValue>,
}

impl TemplateContext {
    fn new(variables: &BTreeMap<String, String>) -> Self {
        Self {
            values: variables
                .iter()
                .map(|(name, value)| (name.clone(), TemplateValue::guess(value)))
                .collect(),
        }
    }

    fn number(&self, step: &str, raw: &str) -> Result<f64, DistributionError> {
        let value = render(raw, &self.values);
        match value.trim().parse::<f64>() {
            Ok(number) if number.is_finite() => Ok(number),
            _ => Err(DistributionError::NotANumber {
                step: step.to_string(),
                value,
            }),
        }
    }

    fn round(&self, step: &str, raw: &str) -> Result<u64, DistributionError> {
        let number = self.number(step, raw)?;
        if number < 0.0 {
            return Err(DistributionError::NotANumber {
                step: step.to_string(),
                value: render(raw, &self.values),
            });
        }
        let rounded = number.round();
        if rounded > MAX_COUNT as f64 {
            return Err(DistributionError::TooLarge {
                step: step.to_string(),
                value: render(raw, &self.values),
                max: MAX_COUNT,
            });
        }
        Ok(rounded as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(text: &str) -> Feature {
        Feature::parse("test.feature", text).unwrap()
    }

    fn no_vars() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    const WEIGHTED: &str = r#"Feature: weighted
  Background:
    Given "{{ users }}" users

  Scenario: first
    Given a user of type "RestApi" with weight "{{ heavy }}" load testing "https://a"
    And repeat for "10" iterations

  Scenario: second
    Given a user of type "RestApi" with weight "1" load testing "https://b"
    And repeat for "10" iterations
"#;

    #[test]
    fn users_follow_weights() {
        let vars = BTreeMap::from([
            ("users".to_string(), "4".to_string()),
            ("heavy".to_string(), "3".to_string()),
        ]);
        let distribution = compute(&feature(WEIGHTED), &vars).unwrap();

        assert_eq!(distribution.total_users, 4);
        let users: Vec<u64> = distribution.scenarios.iter().map(|s| s.users).collect();
        assert_eq!(users, vec![3, 1]);
        assert_eq!(distribution.total_iterations(), 20);
        assert!(distribution.check_iterations().is_ok());
    }

    #[test]
    fn rounding_overflow_is_smoothed_largest_first() {
        let text = r#"Feature: three
  Background:
    Given "5" users
  Scenario: a
    Given a user of type "A" load testing "x"
    And repeat for "9" iterations
  Scenario: b
    Given a user of type "B" load testing "x"
    And repeat for "9" iterations
  Scenario: c
    Given a user of type "C" load testing "x"
    And repeat for "9" iterations
"#;
        let distribution = compute(&feature(text), &no_vars()).unwrap();

        // ceil(5/3) = 2 each, 1 too many
        let users: Vec<u64> = distribution.scenarios.iter().map(|s| s.users).collect();
        assert_eq!(users, vec![1, 2, 2]);
        assert_eq!(users.iter().sum::<u64>(), 5);
    }

    #[test]
    fn smoothing_never_goes_below_one() {
        let mut shares: Vec<ScenarioShare> = (1..=3)
            .map(|index| ScenarioShare {
                index,
                name: format!("s{index}"),
                user_type: "A".into(),
                weight: 1.0,
                iterations: 1,
                users: 1,
            })
            .collect();

        smooth(&mut shares, 2);

        assert!(shares.iter().all(|s| s.users == 1));
    }

    #[test]
    fn more_scenarios_than_users_is_an_error() {
        let err = compute(&feature(WEIGHTED), &BTreeMap::from([
            ("users".to_string(), "1".to_string()),
            ("heavy".to_string(), "1".to_string()),
        ]))
        .unwrap_err();

        assert_eq!(err, DistributionError::NotEnoughUsers { required: 2 });
    }

    #[test]
    fn missing_user_count_needs_users() {
        let text = "Feature: f\n  Scenario: s\n    Given a user of type \"A\" load testing \"x\"\n";
        let err = compute(&feature(text), &no_vars()).unwrap_err();
        assert_eq!(err, DistributionError::NotEnoughUsers { required: 1 });
    }

    #[test]
    fn scenario_without_steps_is_an_error() {
        let text = "Feature: f\n  Background:\n    Given \"1\" user\n  Scenario: empty\n";
        let err = compute(&feature(text), &no_vars()).unwrap_err();
        assert_eq!(
            err,
            DistributionError::NoSteps {
                scenario: "empty".into()
            }
        );
    }

    #[test]
    fn scenario_without_user_type_is_an_error() {
        let text = "Feature: f\n  Background:\n    Given \"1\" user\n  Scenario: s\n    Given repeat for \"2\" iterations\n";
        let err = compute(&feature(text), &no_vars()).unwrap_err();
        assert_eq!(
            err,
            DistributionError::MissingUserType {
                scenario: "s".into()
            }
        );
    }

    #[test]
    fn zero_total_weight_is_an_error() {
        let text = "Feature: f\n  Background:\n    Given \"1\" user\n  Scenario: s\n    Given a user of type \"A\" with weight \"0\" load testing \"x\"\n";
        let err = compute(&feature(text), &no_vars()).unwrap_err();
        assert_eq!(err, DistributionError::ZeroWeight);
    }

    #[test]
    fn too_few_iterations_is_reported_after_distribution() {
        let text = "Feature: f\n  Background:\n    Given \"3\" users\n  Scenario: s\n    Given a user of type \"A\" load testing \"x\"\n    And repeat for \"2\" iterations\n";
        let distribution = compute(&feature(text), &no_vars()).unwrap();

        assert_eq!(
            distribution.check_iterations().unwrap_err(),
            DistributionError::TooFewIterations {
                scenario: "s".into(),
                users: 3,
                iterations: 2,
            }
        );
    }

    #[test]
    fn unresolved_template_is_not_a_number() {
        let err = compute(&feature(WEIGHTED), &no_vars()).unwrap_err();
        assert!(matches!(err, DistributionError::NotANumber { .. }));
    }

    #[test]
    fn huge_user_count_is_rejected() {
        let text = "Feature: f\n  Background:\n    Given \"1e30\" users\n  Scenario: a\n    Given a user of type \"A\" load testing \"x\"\n    And repeat for \"1\" iterations\n  Scenario: b\n    Given a user of type \"A\" load testing \"x\"\n    And repeat for \"1\" iterations\n";
        let err = compute(&feature(text), &no_vars()).unwrap_err();

        assert_eq!(
            err,
            DistributionError::TooLarge {
                step: "\"1e30\" users".into(),
                value: "1e30".into(),
                max: MAX_COUNT,
            }
        );
    }

    #[test]
    fn huge_iteration_count_is_rejected() {
        let text = "Feature: f\n  Background:\n    Given \"2\" users\n  Scenario: a\n    Given a user of type \"A\" load testing \"x\"\n    And repeat for \"1e30\" iterations\n  Scenario: b\n    Given a user of type \"A\" load testing \"x\"\n    And repeat for \"1e30\" iterations\n";
        let err = compute(&feature(text), &no_vars()).unwrap_err();

        assert!(matches!(err, DistributionError::TooLarge { max: MAX_COUNT, .. }));
    }

    #[test]
    fn infinite_weight_is_not_a_number() {
        let text = "Feature: f\n  Background:\n    Given \"2\" users\n  Scenario: a\n    Given a user of type \"A\" with weight \"inf\" load testing \"x\"\n    And repeat for \"1\" iterations\n";
        let err = compute(&feature(text), &no_vars()).unwrap_err();

        assert!(matches!(err, DistributionError::NotANumber { .. }));
    }

    #[test]
    fn table_lists_every_scenario() {
        let vars = BTreeMap::from([
            ("users".to_string(), "2".to_string()),
            ("heavy".to_string(), "1".to_string()),
        ]);
        let table = compute(&feature(WEIGHTED), &vars).unwrap().table();

        assert!(table.contains("#iter"));
        assert!(table.contains("001"));
        assert!(table.contains("002"));
        assert!(table.contains("second"));
    }

    #[test]
    fn guesses_datatypes() {
        assert_eq!(TemplateValue::guess("10"), TemplateValue::Int(10));
        assert_eq!(TemplateValue::guess("-3"), TemplateValue::Int(-3));
        assert_eq!(TemplateValue::guess("1.5"), TemplateValue::Float(1.5));
        assert_eq!(TemplateValue::guess("2.0"), TemplateValue::Int(2));
        assert_eq!(TemplateValue::guess("007"), TemplateValue::Str("007".into()));
        assert_eq!(TemplateValue::guess("True"), TemplateValue::Bool(true));
        assert_eq!(TemplateValue::guess("host"), TemplateValue::Str("host".into()));
        assert_eq!(TemplateValue::guess("1.2.3"), TemplateValue::Str("1.2.3".into()));
    }

    #[test]
    fn renders_placeholders() {
        let values = BTreeMap::from([
            ("a".to_string(), TemplateValue::Int(1)),
            ("b".to_string(), TemplateValue::Str("x".into())),
        ]);

        assert_eq!(render("{{ a }}-{{b}}-{{ missing }}", &values), "1-x-");
        assert_eq!(render("no placeholders", &values), "no placeholders");
        assert_eq!(render("open {{ a", &values), "open {{ a");
    }
}
