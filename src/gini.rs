//! Binary decision trees grown by weighted Gini impurity.
use crate::data::{Table, Value};
use crate::errors::ArborError;
use crate::metric;
use crate::node::{SplitNode, TestKind};
use crate::report;
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::time::{Duration, Instant};

/// The winning candidate of one split search, carrying the two sides
/// it produced so the recursion never re-partitions the table.
struct BestSplit {
    name: String,
    value: Value,
    score: f64,
    left: Table,
    right: Table,
}

/// A binary classification tree built by recursive Gini splitting.
///
/// Every internal node tests one column, either against a numeric
/// threshold (`<`) or a symbol value (`==`). Leaves carry the target
/// labels remaining in their partition, a single label unless no
/// separating split existed.
#[derive(Debug, Serialize, Deserialize)]
pub struct GiniTree {
    root: SplitNode,
    n_rows: usize,
    columns: Vec<String>,
    elapsed: Duration,
}

impl GiniTree {
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
        let root = walk(table)?;
        let elapsed = start.elapsed();
        let columns: Vec<String> = table.columns().iter().map(|c| c.to_string()).collect();
        info!(
            "Finished inducing a Gini tree of depth {} with {} leaves over {} rows in {:.6} seconds.",
            root.depth(),
            root.n_leaves(),
            table.len(),
            elapsed.as_secs_f64()
        );
        Ok(GiniTree {
            root,
            n_rows: table.len(),
            columns,
            elapsed,
        })
    }

    /// Root node of the built tree.
    pub fn root(&self) -> &SplitNode {
        &self.root
    }

    /// Wall-clock duration of the build.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Render the tree as a named decision procedure with a metadata
    /// header.
    ///
    /// * `name` - Name given to the emitted procedure.
    pub fn report(&self, name: &str) -> String {
        let mut out = report::header("Gini", self.n_rows, &self.columns, self.elapsed);
        out.push('\n');
        out.push_str(&report::split_procedure(name, &self.root));
        out
    }

    /// Classify one attribute-keyed row by walking the tree. Returns
    /// exactly what the generated procedure would return, including the
    /// joined label list of a degenerate leaf. `None` when the row is
    /// missing a tested attribute.
    pub fn predict(&self, data: &HashMap<&str, &Value>) -> Option<String> {
        let mut node = &self.root;
        loop {
            match node {
                SplitNode::Leaf { labels } => return Some(labels.join(", ")),
                SplitNode::Internal {
                    attribute,
                    test,
                    value,
                    left,
                    right,
                } => {
                    let row_value = data.get(attribute.as_str())?;
                    let goes_left = match test {
                        TestKind::Less => row_value.as_f64() < value.as_f64(),
                        TestKind::Equal => **row_value == *value,
                    };
                    node = if goes_left { left } else { right };
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
        match serde_json::from_str::<GiniTree>(json_str) {
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

fn walk(table: &Table) -> Result<SplitNode, ArborError> {
    let targets = table.targets();
    if targets.len() == 1 {
        return Ok(SplitNode::Leaf {
            labels: vec![targets[0].to_string()],
        });
    }
    let best = match best_split(table)? {
        Some(best) => best,
        None => {
            // No column separates the remaining rows; this outcome is
            // reported as a multi-label leaf, never as an error.
            let labels: Vec<String> = targets.iter().map(|v| v.to_string()).collect();
            warn!("No separating split remains; emitting a leaf with {} labels.", labels.len());
            return Ok(SplitNode::Leaf { labels });
        }
    };
    let test = if table.column_type(&best.name)?.is_numeric() {
        TestKind::Less
    } else {
        TestKind::Equal
    };
    let left = child(&best.left)?;
    let right = child(&best.right)?;
    Ok(SplitNode::Internal {
        attribute: best.name,
        test,
        value: best.value,
        left: Box::new(left),
        right: Box::new(right),
    })
}

// A side that is already pure becomes a leaf directly, skipping the
// split search a recursive call would start with.
fn child(side: &Table) -> Result<SplitNode, ArborError> {
    let targets = side.targets();
    if targets.len() == 1 {
        return Ok(SplitNode::Leaf {
            labels: vec![targets[0].to_string()],
        });
    }
    walk(side)
}

/// Search all non-target columns and their candidate split points for
/// the split with the strictly greatest score. Columns are scored on
/// the rayon pool; the sequential reduction keeps the first-found
/// winner in column-then-candidate enumeration order, so the result is
/// identical to a sequential search.
fn best_split(table: &Table) -> Result<Option<BestSplit>, ArborError> {
    let columns = table.columns();
    let per_column: Vec<Option<BestSplit>> = columns
        .par_iter()
        .map(|&name| column_best(table, name))
        .collect::<Result<Vec<_>, ArborError>>()?;

    let mut best: Option<BestSplit> = None;
    for candidate in per_column.into_iter().flatten() {
        match &best {
            Some(current) if candidate.score <= current.score => {}
            _ => best = Some(candidate),
        }
    }
    Ok(best)
}

fn column_best(table: &Table, name: &str) -> Result<Option<BestSplit>, ArborError> {
    let targets = table.targets();
    let mut best: Option<BestSplit> = None;
    for value in table.split_candidates(name)? {
        let (left, right) = table.split(name, &value)?;
        // A candidate leaving a side empty cannot shrink the problem.
        if left.is_empty() || right.is_empty() {
            continue;
        }
        let score = 1.0 - gini_index(&left, &right, &targets);
        if best.as_ref().map_or(true, |current| score > current.score) {
            best = Some(BestSplit {
                name: name.to_string(),
                value,
                score,
                left,
                right,
            });
        }
    }
    Ok(best)
}

/// Weighted Gini impurity of a binary split, in `[0, 1]`; 0 when both
/// sides are pure.
fn gini_index(left: &Table, right: &Table, labels: &[&Value]) -> f64 {
    let total = (left.len() + right.len()) as f64;
    let mut gini = 0.0;
    for side in [left, right] {
        let size = side.len();
        if size == 0 {
            continue;
        }
        let mut score = 0.0;
        for label in labels {
            let fraction = side.count_target(label) as f64 / size as f64;
            score += fraction * fraction;
        }
        gini += (1.0 - score) * (size as f64 / total);
    }
    gini
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

    #[test]
    fn test_perfect_numeric_split() {
        let model = GiniTree::fit(&ages()).unwrap();
        match model.root() {
            SplitNode::Internal {
                attribute,
                test,
                value,
                left,
                right,
            } => {
                assert_eq!(attribute, "age");
                assert_eq!(*test, TestKind::Less);
                assert_eq!(*value, Value::Float(35.0));
                assert_eq!(
                    **left,
                    SplitNode::Leaf {
                        labels: vec!["no".to_string()]
                    }
                );
                assert_eq!(
                    **right,
                    SplitNode::Leaf {
                        labels: vec!["yes".to_string()]
                    }
                );
            }
            other => panic!("expected an internal root, got {:?}", other),
        }
    }

    #[test]
    fn test_gini_index_bounds() {
        let table = ages();
        let targets = table.targets();
        let (left, right) = table.split("age", &Value::Float(35.0)).unwrap();
        // Both sides pure: impurity 0, split score 1.
        assert_eq!(gini_index(&left, &right, &targets), 0.0);
        let (left, right) = table.split("age", &Value::Float(25.0)).unwrap();
        let gini = gini_index(&left, &right, &targets);
        assert!(gini > 0.0 && gini < 1.0);
    }

    #[test]
    fn test_pure_table_is_a_leaf_immediately() {
        let table = Table::from_text("@age integer\n@outcome target\n20,no\n30,no\n").unwrap();
        let model = GiniTree::fit(&table).unwrap();
        assert_eq!(
            *model.root(),
            SplitNode::Leaf {
                labels: vec!["no".to_string()]
            }
        );
    }

    #[test]
    fn test_inseparable_labels_end_in_degenerate_leaves() {
        let model = GiniTree::fit(&colors()).unwrap();
        // The exact-match split on red/blue is accepted, but neither
        // side can be separated further: every path ends in a leaf
        // listing both remaining labels.
        match model.root() {
            SplitNode::Internal { attribute, left, right, .. } => {
                assert_eq!(attribute, "color");
                let both = vec!["yes".to_string(), "no".to_string()];
                assert_eq!(**left, SplitNode::Leaf { labels: both.clone() });
                assert_eq!(**right, SplitNode::Leaf { labels: both });
            }
            other => panic!("expected an internal root, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_table_rejected() {
        let table = Table::from_text("@age integer\n@outcome target\n").unwrap();
        assert!(matches!(GiniTree::fit(&table), Err(ArborError::EmptyTable)));
    }

    #[test]
    fn test_report_text() {
        let model = GiniTree::fit(&ages()).unwrap();
        let report = model.report("classify");
        let lines: Vec<&str> = report.lines().collect();
        assert!(lines[0].starts_with("# Created: "));
        assert_eq!(lines[1], "# Rows: 4");
        assert_eq!(lines[2], "# Columns: age");
        assert_eq!(lines[3], "# Classifier: Gini");
        assert!(lines[4].starts_with("# Elapsed: "));
        assert_eq!(lines[5], "#");
        let body: Vec<&str> = lines[6..].to_vec();
        assert_eq!(
            body,
            vec![
                "def classify(data)",
                "  if data['age'] < 35.0 then",
                "    return 'no'",
                "  else",
                "    return 'yes'",
                "  end",
                "end",
            ]
        );
    }

    #[test]
    fn test_predict_and_evaluate() {
        let table = ages();
        let model = GiniTree::fit(&table).unwrap();
        assert_eq!(model.predict(&table.row_map(0)), Some("no".to_string()));
        assert_eq!(model.predict(&table.row_map(3)), Some("yes".to_string()));
        assert_eq!(model.evaluate(&table), 100.0);
    }

    #[test]
    fn test_predict_missing_attribute() {
        let model = GiniTree::fit(&ages()).unwrap();
        let empty = HashMap::new();
        assert_eq!(model.predict(&empty), None);
    }

    #[test]
    fn test_json_round_trip() {
        let model = GiniTree::fit(&ages()).unwrap();
        let json = model.json_dump().unwrap();
        let loaded = GiniTree::from_json(&json).unwrap();
        assert_eq!(loaded.root(), model.root());
        assert_eq!(loaded.evaluate(&ages()), 100.0);
    }

    #[test]
    fn test_save_and_load_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gini.json");
        let path = path.to_str().unwrap();
        let model = GiniTree::fit(&ages()).unwrap();
        model.save_model(path).unwrap();
        let loaded = GiniTree::load_model(path).unwrap();
        assert_eq!(loaded.root(), model.root());
    }

    #[test]
    fn test_mixed_columns_prefer_separating_split() {
        let table = Table::from_text(
            "@age integer\n@sky symbol\n@play target\n\
             20,clear,no\n30,clear,no\n40,cloudy,yes\n50,cloudy,yes\n",
        )
        .unwrap();
        let model = GiniTree::fit(&table).unwrap();
        // Both columns separate perfectly with score 1; the first
        // declared column wins the tie.
        match model.root() {
            SplitNode::Internal { attribute, .. } => assert_eq!(attribute, "age"),
            other => panic!("expected an internal root, got {:?}", other),
        }
        assert_eq!(model.evaluate(&table), 100.0);
    }
}
