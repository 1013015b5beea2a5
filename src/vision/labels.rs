//! Label table and classifier output decoding
//!
//! The table order is a hard contract with the classifier: index `i` of the
//! output vector is the score for `labels[i]`. Reordering the table silently
//! corrupts every prediction.

use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Built-in label table, in classifier output order (lexicographic directory names
/// of the training set)
pub const DEFAULT_LABELS: [&str; 46] = [
    "character_10_yna",
    "character_11_taamatar",
    "character_12_thaa",
    "character_13_daa",
    "character_14_dhaa",
    "character_15_adna",
    "character_16_tabala",
    "character_17_tha",
    "character_18_da",
    "character_19_dha",
    "character_1_ka",
    "character_20_na",
    "character_21_pa",
    "character_22_pha",
    "character_23_ba",
    "character_24_bha",
    "character_25_ma",
    "character_26_yaw",
    "character_27_ra",
    "character_28_la",
    "character_29_waw",
    "character_2_kha",
    "character_30_motosaw",
    "character_31_petchiryakha",
    "character_32_patalosaw",
    "character_33_ha",
    "character_34_chhya",
    "character_35_tra",
    "character_36_gya",
    "character_3_ga",
    "character_4_gha",
    "character_5_kna",
    "character_6_cha",
    "character_7_chha",
    "character_8_ja",
    "character_9_jha",
    "digit_0",
    "digit_1",
    "digit_2",
    "digit_3",
    "digit_4",
    "digit_5",
    "digit_6",
    "digit_7",
    "digit_8",
    "digit_9",
];

/// Errors raised while loading a label table
#[derive(Error, Debug)]
pub enum LabelError {
    #[error("label table is empty")]
    Empty,

    #[error("failed to read label table: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse label table: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors raised while decoding classifier output
///
/// All of these mean the classifier and label table disagree; none is
/// recoverable by retrying the same request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("classifier produced {actual} scores but the label table has {expected} entries")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("classifier produced no scores")]
    EmptyScores,

    #[error("classifier score at index {index} is not finite")]
    NonFiniteScore { index: usize },
}

/// A decoded prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Index into the classifier output
    pub index: usize,
    /// Raw label identifier, e.g. `character_1_ka`
    pub label: String,
    /// Human-readable label, e.g. `1 ka`
    pub display_label: String,
    /// Top score times 100; in [0, 100] when the classifier emits probabilities
    pub confidence: f32,
}

impl Prediction {
    /// Confidence formatted to two decimal places
    pub fn confidence_text(&self) -> String {
        format!("{:.2}", self.confidence)
    }
}

/// Ordered, immutable mapping from output index to label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl Default for LabelTable {
    fn default() -> Self {
        Self {
            labels: DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl LabelTable {
    /// Build a table from labels in classifier output order
    pub fn new(labels: Vec<String>) -> Result<Self, LabelError> {
        if labels.is_empty() {
            return Err(LabelError::Empty);
        }
        Ok(Self { labels })
    }

    /// Load a table from a JSON array of strings, or one label per line
    pub fn load(path: &Path) -> Result<Self, LabelError> {
        let content = std::fs::read_to_string(path)?;
        let table = Self::parse(&content)?;
        info!("Loaded {} labels from {:?}", table.len(), path);
        Ok(table)
    }

    /// Parse table contents; input starting with `[` is read as JSON
    pub fn parse(content: &str) -> Result<Self, LabelError> {
        let labels: Vec<String> = if content.trim_start().starts_with('[') {
            serde_json::from_str(content)?
        } else {
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()
        };

        Self::new(labels)
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the table is empty (never true for a constructed table)
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Raw label at `index`
    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Iterate labels in output order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    /// Map classifier scores to the best label
    ///
    /// Ties go to the lowest index. The score vector must be exactly as long
    /// as the table; it is never truncated or padded. Confidence is the top
    /// score scaled by 100 and is only a percentage for scores in [0, 1];
    /// raw logits decode to the right label with an unbounded confidence.
    pub fn decode(&self, scores: &[f32]) -> Result<Prediction, DecodeError> {
        if scores.is_empty() {
            return Err(DecodeError::EmptyScores);
        }
        if scores.len() != self.labels.len() {
            return Err(DecodeError::LengthMismatch {
                expected: self.labels.len(),
                actual: scores.len(),
            });
        }
        if let Some(index) = scores.iter().position(|s| !s.is_finite()) {
            return Err(DecodeError::NonFiniteScore { index });
        }

        let (index, score) = scores
            .iter()
            .copied()
            .enumerate()
            .fold((0, scores[0]), |best, (i, s)| if s > best.1 { (i, s) } else { best });

        let label = self.labels[index].clone();
        Ok(Prediction {
            index,
            display_label: display_label(&label),
            label,
            confidence: score * 100.0,
        })
    }
}

/// Strip the structural prefix and turn underscores into spaces
///
/// `character_1_ka` becomes `1 ka`, `digit_7` becomes `7`.
pub fn display_label(label: &str) -> String {
    let stripped = label
        .strip_prefix("character_")
        .or_else(|| label.strip_prefix("digit_"))
        .unwrap_or(label);
    stripped.replace('_', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn abc() -> LabelTable {
        LabelTable::new(vec!["a".into(), "b".into(), "c".into()]).unwrap()
    }

    #[test]
    fn test_default_table_layout() {
        let table = LabelTable::default();
        assert_eq!(table.len(), 46);
        assert_eq!(table.iter().filter(|l| l.starts_with("character_")).count(), 36);
        assert_eq!(table.iter().filter(|l| l.starts_with("digit_")).count(), 10);
        assert_eq!(table.get(10), Some("character_1_ka"));
        assert_eq!(table.get(36), Some("digit_0"));
        assert_eq!(table.get(45), Some("digit_9"));
        assert_eq!(table.get(46), None);
    }

    #[test]
    fn test_decode_picks_max() {
        let prediction = abc().decode(&[0.1, 0.9, 0.0]).unwrap();
        assert_eq!(prediction.index, 1);
        assert_eq!(prediction.label, "b");
        assert_eq!(prediction.confidence_text(), "90.00");
    }

    #[test]
    fn test_decode_tie_goes_to_first() {
        let prediction = abc().decode(&[0.5, 0.5, 0.0]).unwrap();
        assert_eq!(prediction.index, 0);
        assert_eq!(prediction.label, "a");
    }

    #[test]
    fn test_decode_picks_max_of_logits() {
        let prediction = abc().decode(&[-3.0, -1.5, -2.0]).unwrap();
        assert_eq!(prediction.index, 1);
        assert_eq!(prediction.label, "b");
    }

    #[test]
    fn test_confidence_of_softmax_scores_is_a_percentage() {
        let prediction = abc().decode(&[0.0, 0.25, 0.75]).unwrap();
        assert_eq!(prediction.confidence, 75.0);

        let certain = abc().decode(&[0.0, 1.0, 0.0]).unwrap();
        assert_eq!(certain.confidence_text(), "100.00");
    }

    #[test]
    fn test_decode_length_mismatch() {
        assert_eq!(
            abc().decode(&[0.1, 0.9]),
            Err(DecodeError::LengthMismatch { expected: 3, actual: 2 })
        );
        assert_eq!(
            abc().decode(&[0.1, 0.2, 0.3, 0.4]),
            Err(DecodeError::LengthMismatch { expected: 3, actual: 4 })
        );
        assert_eq!(abc().decode(&[]), Err(DecodeError::EmptyScores));
    }

    #[test]
    fn test_decode_rejects_nan() {
        assert_eq!(
            abc().decode(&[0.1, f32::NAN, 0.3]),
            Err(DecodeError::NonFiniteScore { index: 1 })
        );
    }

    #[test]
    fn test_decode_default_table() {
        let mut scores = vec![0.0f32; 46];
        scores[10] = 0.9712;
        let prediction = LabelTable::default().decode(&scores).unwrap();

        assert_eq!(prediction.label, "character_1_ka");
        assert_eq!(prediction.display_label, "1 ka");
        assert_eq!(prediction.confidence_text(), "97.12");
    }

    #[test]
    fn test_display_label() {
        assert_eq!(display_label("character_10_yna"), "10 yna");
        assert_eq!(display_label("character_31_petchiryakha"), "31 petchiryakha");
        assert_eq!(display_label("digit_7"), "7");
        assert_eq!(display_label("plain_label"), "plain label");
    }

    #[test]
    fn test_parse_json_and_lines() {
        let json = LabelTable::parse(r#"["x", "y"]"#).unwrap();
        assert_eq!(json.iter().collect::<Vec<_>>(), vec!["x", "y"]);

        let lines = LabelTable::parse("x\n\n  y  \n").unwrap();
        assert_eq!(lines, json);

        assert!(matches!(LabelTable::parse("\n \n"), Err(LabelError::Empty)));
        assert!(matches!(LabelTable::parse("[1, 2"), Err(LabelError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        for label in DEFAULT_LABELS {
            writeln!(file, "{}", label).unwrap();
        }

        let table = LabelTable::load(file.path()).unwrap();
        assert_eq!(table, LabelTable::default());
    }
}
