//! Multi-way decision trees grown by information gain.
use crate::data::{Table, Value};
use crate::errors::ArborError;
use crate::metric;
use crate::node::BranchNode;
use crate::report;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::time::{Duration, Instant};

/// Additive smoothing applied to the conditional entropy terms, so a
/// zero count never reaches `log2` or a division.
const EPS: f64 = f64::EPSILON;

/// A multi-way classification tree built by recursive entropy
/// splitting. Each branch node partitions on every distinct value of
/// the attribute with the greatest information gain.
#[derive(Debug, Serialize, Deserialize)]
pub struct Id3Tree {
    root: BranchNode,
    used: Vec<String>,
    n_rows: usize,
    elapsed: Duration,
}

impl Id3Tree {
    /// Induce a tree from a table. The table must have at least one
    /// row and a declared target column; induction itself never fails.
    pub fn fit(table: &Table) -> Result<Self, ArborError> {
        if table.is_empty() {
            return Err(ArborError::EmptyTable);
        }
        if table.target_name().is_none() {
            return Err(ArborError::MissingTarget);
        }
        let start = Instant::now();
        let root = build(table)?;
        let elapsed = start.elapsed();
        let used = root.used_attributes();
        info!(
            "Finished inducing an ID3 tree using {} of {} columns over {} rows in {:.6} seconds.",
            used.len(),
            table.columns().len(),
            table.len(),
            elapsed.as_secs_f64()
        );
        Ok(Id3Tree {
            root,
            used,
            n_rows: table.len(),
            elapsed,
        })
    }

    /// Root node of the built tree.
    pub fn root(&self) -> &BranchNode {
        &self.root
    }

    /// Attributes used by at least one branch, in encounter order.
    pub fn used_columns(&self) -> &[String] {
        &self.used
    }

    /// Wall-clock duration of the build.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Render the tree as a named decision procedure with a metadata
    /// header. The header lists the attributes the tree actually uses.
    ///
    /// * `name` - Name given to the emitted procedure.
    pub fn report(&self, name: &str) -> String {
        let mut out = report::header("ID3", self.n_rows, &self.used, self.elapsed);
        out.push('\n');
        out.push_str(&report::branch_procedure(name, &self.root));
        out
    }

    /// Classify one attribute-keyed row by walking the tree. `None`
    /// when the row is missing a branching attribute or carries a value
    /// never seen during the build, mirroring the generated `if`/
    /// `elsif` chain falling through without an `else`.
    pub fn predict(&self, data: &HashMap<&str, &Value>) -> Option<String> {
        let mut node = &self.root;
        loop {
            match node {
                BranchNode::Leaf { labels } => return Some(labels.join(", ")),
                BranchNode::Branch { attribute, children } => {
                    let row_value = data.get(attribute.as_str())?;
                    let child = children.iter().find(|(value, _)| value == *row_value);
                    node = match child {
                        Some((_, child)) => child,
                        None => return None,
                    };
                }
            }
        }
    }

    /// Classify every row of a table and return the accuracy against
    /// its target column, as a percentage.
    pub fn evaluate(&self, table: &Table) -> f64 {
        let mut correct = 0;
        for i in 0..table.len() {
            let answer = match table.target_value(i) {
                Some(value) => value.to_string(),
                None => return 0.0,
            };
            if self.predict(&table.row_map(i)) == Some(answer) {
                correct += 1;
            }
        }
        metric::accuracy(correct, table.len())
    }

    /// Save the model as a json object to a file.
    ///
    /// * `path` - Path to save the model.
    pub fn save_model(&self, path: &str) -> Result<(), ArborError> {
        let model = self.json_dump()?;
        match fs::write(path, model) {
            Err(e) => Err(ArborError::UnableToWrite(e.to_string())),
            Ok(_) => Ok(()),
        }
    }

    /// Dump the model as a json object.
    pub fn json_dump(&self) -> Result<String, ArborError> {
        match serde_json::to_string(self) {
            Ok(s) => Ok(s),
            Err(e) => Err(ArborError::UnableToWrite(e.to_string())),
        }
    }

    /// Load a model from a json string.
    pub fn from_json(json_str: &str) -> Result<Self, ArborError> {
        match serde_json::from_str::<Id3Tree>(json_str) {
            Ok(m) => Ok(m),
            Err(e) => Err(ArborError::UnableToRead(e.to_string())),
        }
    }

    /// Load a model from a path to a json model object.
    ///
    /// * `path` - Path to load the model from.
    pub fn load_model(path: &str) -> Result<Self, ArborError> {
        let json_str = match fs::read_to_string(path) {
            Ok(s) => Ok(s),
            Err(e) => Err(ArborError::UnableToRead(e.to_string())),
        }?;
        Self::from_json(&json_str)
    }
}

/// Shannon entropy of the table's target distribution. Zero exactly
/// when a single target value remains; larger the more uniformly the
/// rows spread over more distinct values. Only comparisons between
/// tables matter, not the magnitude itself.
pub fn dataset_entropy(table: &Table) -> f64 {
    let n = table.len() as f64;
    let mut entropy = 0.0;
    for target in table.targets() {
        let fraction = table.count_target(target) as f64 / n;
        entropy += -fraction * fraction.log2();
    }
    entropy
}

/// Weighted conditional entropy of the target given one column: the
/// per-value target entropy, weighted by each value's share of the
/// rows. Every (value, label) pair contributes a term, smoothed by
/// `EPS` so absent labels neither divide by zero nor reach `log2(0)`.
/// The accumulated sum is negative by construction; the non-negative
/// total is returned.
pub fn column_entropy(table: &Table, name: &str) -> Result<f64, ArborError> {
    let column_index = table.column_index(name)?;
    let target = table.target_name().ok_or(ArborError::MissingTarget)?;
    let target_index = table.column_index(target)?;

    let values = table.values(name)?;
    let targets = table.targets();
    let n = table.len() as f64;

    let mut total_entropy = 0.0;
    for value in &values {
        let rows_with_value = table.rows().iter().filter(|row| row[column_index] == **value);
        let total: usize = rows_with_value.clone().count();
        let mut feature_entropy = 0.0;
        for target in &targets {
            let count = rows_with_value
                .clone()
                .filter(|row| row[target_index] == **target)
                .count();
            let fraction = count as f64 / (total as f64 + EPS);
            feature_entropy += -fraction * (fraction + EPS).log2();
        }
        let weight = total as f64 / n;
        total_entropy += -weight * feature_entropy;
    }
    Ok(total_entropy.abs())
}

/// The non-target column with the greatest information gain, in
/// declared column order with ties keeping the first found. `None`
/// when the table has no non-target columns.
pub fn find_winner<'a>(table: &'a Table) -> Result<Option<&'a str>, ArborError> {
    let entropy = dataset_entropy(table);
    let mut winner: Option<(&str, f64)> = None;
    for name in table.columns() {
        let gain = entropy - column_entropy(table, name)?;
        match winner {
            Some((_, best)) if gain <= best => {}
            _ => winner = Some((name, gain)),
        }
    }
    Ok(winner.map(|(name, _)| name))
}

fn build(table: &Table) -> Result<BranchNode, ArborError> {
    let targets = table.targets();
    if targets.len() == 1 {
        return Ok(BranchNode::Leaf {
            labels: vec![targets[0].to_string()],
        });
    }
    let winner = match find_winner(table)? {
        Some(winner) => winner.to_string(),
        None => return Ok(degenerate(&targets)),
    };
    let values: Vec<Value> = table.values(&winner)?.into_iter().cloned().collect();
    if values.len() < 2 {
        // A single remaining value cannot partition the rows further.
        return Ok(degenerate(&targets));
    }

    let mut children = Vec::with_capacity(values.len());
    for value in values {
        let subset = table.extract(&winner, &value)?;
        let subset_targets = subset.targets();
        let child = if subset_targets.len() == 1 {
            BranchNode::Leaf {
                labels: vec![subset_targets[0].to_string()],
            }
        } else {
            build(&subset)?
        };
        children.push((value, child));
    }
    Ok(BranchNode::Branch {
        attribute: winner,
        children,
    })
}

// The unsplittable outcome: every remaining label is kept on the leaf.
fn degenerate(targets: &[&Value]) -> BranchNode {
    warn!(
        "No discriminating attribute remains; emitting a leaf with {} labels.",
        targets.len()
    );
    BranchNode::Leaf {
        labels: targets.iter().map(|v| v.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ages() -> Table {
        Table::from_text(
            "@age integer\n@outcome target\n20,no\n30,no\n40,yes\n50,yes\n",
        )
        .unwrap()
    }

    fn colors() -> Table {
        Table::from_text(
            "@color symbol\n@outcome target\nred,yes\nred,no\nblue,yes\nblue,no\n",
        )
        .unwrap()
    }

    fn weather() -> Table {
        Table::from_text(
            "@sky symbol\n@wind symbol\n@play target\n\
             clear,low,yes\nclear,high,yes\ncloudy,low,yes\ncloudy,high,no\nrain,low,no\n",
        )
        .unwrap()
    }

    #[test]
    fn test_dataset_entropy_zero_iff_pure() {
        let pure = Table::from_text("@a integer\n@t target\n1,x\n2,x\n").unwrap();
        assert_eq!(dataset_entropy(&pure), 0.0);
        // An even two-label distribution carries one full bit.
        let even = Table::from_text("@a integer\n@t target\n1,x\n2,y\n").unwrap();
        assert!((dataset_entropy(&even) - 1.0).abs() < 1e-12);
        // More distinct values spread uniformly mean more entropy.
        let wider = Table::from_text("@a integer\n@t target\n1,w\n2,x\n3,y\n4,z\n").unwrap();
        assert!((dataset_entropy(&wider) - 2.0).abs() < 1e-12);
        assert!(dataset_entropy(&wider) > dataset_entropy(&even));
    }

    #[test]
    fn test_column_entropy_of_perfect_predictor_is_tiny() {
        let table = ages();
        let entropy = column_entropy(&table, "age").unwrap();
        // Each age value maps to one label, so only smoothing noise remains.
        assert!(entropy < 1e-12);
        assert!(entropy >= 0.0);
    }

    #[test]
    fn test_find_winner_prefers_informative_column() {
        let table = weather();
        let entropy = dataset_entropy(&table);
        let sky_gain = entropy - column_entropy(&table, "sky").unwrap();
        let wind_gain = entropy - column_entropy(&table, "wind").unwrap();
        assert!(sky_gain > wind_gain);
        assert_eq!(find_winner(&table).unwrap(), Some("sky"));
    }

    #[test]
    fn test_find_winner_tie_keeps_first_column() {
        let table = Table::from_text(
            "@a symbol\n@b symbol\n@t target\nx,x,yes\ny,y,no\n",
        )
        .unwrap();
        assert_eq!(find_winner(&table).unwrap(), Some("a"));
    }

    #[test]
    fn test_multiway_split_one_leaf_per_value() {
        let model = Id3Tree::fit(&ages()).unwrap();
        match model.root() {
            BranchNode::Branch { attribute, children } => {
                assert_eq!(attribute, "age");
                assert_eq!(children.len(), 4);
                let expected = [
                    (Value::Int(20), "no"),
                    (Value::Int(30), "no"),
                    (Value::Int(40), "yes"),
                    (Value::Int(50), "yes"),
                ];
                for ((value, child), (expected_value, label)) in children.iter().zip(expected.iter()) {
                    assert_eq!(value, expected_value);
                    assert_eq!(
                        *child,
                        BranchNode::Leaf {
                            labels: vec![label.to_string()]
                        }
                    );
                }
            }
            other => panic!("expected a branch root, got {:?}", other),
        }
        assert_eq!(model.used_columns(), &["age".to_string()]);
    }

    #[test]
    fn test_pure_table_is_a_leaf_immediately() {
        let table = Table::from_text("@age integer\n@outcome target\n20,no\n30,no\n").unwrap();
        let model = Id3Tree::fit(&table).unwrap();
        assert_eq!(
            *model.root(),
            BranchNode::Leaf {
                labels: vec!["no".to_string()]
            }
        );
        assert!(model.used_columns().is_empty());
    }

    #[test]
    fn test_inseparable_labels_end_in_degenerate_leaves() {
        let model = Id3Tree::fit(&colors()).unwrap();
        match model.root() {
            BranchNode::Branch { attribute, children } => {
                assert_eq!(attribute, "color");
                let both = BranchNode::Leaf {
                    labels: vec!["yes".to_string(), "no".to_string()],
                };
                assert_eq!(children.len(), 2);
                assert_eq!(children[0], (Value::Str("red".to_string()), both.clone()));
                assert_eq!(children[1], (Value::Str("blue".to_string()), both));
            }
            other => panic!("expected a branch root, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_recursion() {
        let model = Id3Tree::fit(&weather()).unwrap();
        // sky=clear and sky=rain resolve immediately; sky=cloudy still
        // needs wind.
        match model.root() {
            BranchNode::Branch { attribute, children } => {
                assert_eq!(attribute, "sky");
                assert_eq!(children.len(), 3);
                assert_eq!(
                    children[0],
                    (
                        Value::Str("clear".to_string()),
                        BranchNode::Leaf {
                            labels: vec!["yes".to_string()]
                        }
                    )
                );
                match &children[1].1 {
                    BranchNode::Branch { attribute, children } => {
                        assert_eq!(attribute, "wind");
                        assert_eq!(children.len(), 2);
                    }
                    other => panic!("expected a nested branch, got {:?}", other),
                }
                assert_eq!(
                    children[2],
                    (
                        Value::Str("rain".to_string()),
                        BranchNode::Leaf {
                            labels: vec!["no".to_string()]
                        }
                    )
                );
            }
            other => panic!("expected a branch root, got {:?}", other),
        }
        assert_eq!(model.used_columns(), &["sky".to_string(), "wind".to_string()]);
        assert_eq!(model.evaluate(&weather()), 100.0);
    }

    #[test]
    fn test_empty_table_rejected() {
        let table = Table::from_text("@age integer\n@outcome target\n").unwrap();
        assert!(matches!(Id3Tree::fit(&table), Err(ArborError::EmptyTable)));
    }

    #[test]
    fn test_report_text() {
        let model = Id3Tree::fit(&colors()).unwrap();
        let report = model.report("classify");
        let lines: Vec<&str> = report.lines().collect();
        assert!(lines[0].starts_with("# Created: "));
        assert_eq!(lines[1], "# Rows: 4");
        assert_eq!(lines[2], "# Columns: color");
        assert_eq!(lines[3], "# Classifier: ID3");
        assert!(lines[4].starts_with("# Elapsed: "));
        assert_eq!(lines[5], "#");
        let body: Vec<&str> = lines[6..].to_vec();
        assert_eq!(
            body,
            vec![
                "def classify(data)",
                "  if data['color'] == 'red' then",
                "    return 'yes, no'",
                "  elsif data['color'] == 'blue' then",
                "    return 'yes, no'",
                "  end",
                "end",
            ]
        );
    }

    #[test]
    fn test_predict_unseen_value_is_none() {
        let table = colors();
        let model = Id3Tree::fit(&table).unwrap();
        let green = Value::Str("green".to_string());
        let mut row = HashMap::new();
        row.insert("color", &green);
        assert_eq!(model.predict(&row), None);
    }

    #[test]
    fn test_json_round_trip() {
        let model = Id3Tree::fit(&weather()).unwrap();
        let json = model.json_dump().unwrap();
        let loaded = Id3Tree::from_json(&json).unwrap();
        assert_eq!(loaded.root(), model.root());
        assert_eq!(loaded.used_columns(), model.used_columns());
        assert_eq!(loaded.evaluate(&weather()), 100.0);
    }

    #[test]
    fn test_save_and_load_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id3.json");
        let path = path.to_str().unwrap();
        let model = Id3Tree::fit(&weather()).unwrap();
        model.save_model(path).unwrap();
        let loaded = Id3Tree::load_model(path).unwrap();
        assert_eq!(loaded.root(), model.root());
    }
}
