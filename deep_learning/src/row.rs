use serde::{Deserialize, Serialize};

/// Width of the encoded input: one-hot categorical levels first, numeric columns after them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataShape {
    /// Total number of one-hot categorical levels.
    pub cat_width: usize,
    /// Number of numeric columns.
    pub nums: usize,
}

impl DataShape {
    pub fn numeric(nums: usize) -> Self {
        Self { cat_width: 0, nums }
    }

    /// Width of the fully expanded input, before any categorical cap.
    pub fn full_width(&self) -> usize {
        self.cat_width + self.nums
    }

    /// Position of the first numeric column in the expanded input.
    pub fn num_start(&self) -> usize {
        self.cat_width
    }
}

/// Numeric features of a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Features {
    /// One value per numeric column, `NaN` for missing values.
    Dense(Vec<f32>),
    /// Non zero `(numeric column, value)` pairs sorted by column.
    Sparse(Vec<(usize, f32)>),
}

impl Default for Features {
    fn default() -> Self {
        Features::Dense(Vec::new())
    }
}

/// A training or scoring row as produced by the row source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Row {
    /// Expanded indices of the hot categorical levels.
    pub cats: Vec<usize>,
    pub nums: Features,
    /// Class index for classification, value for regression, `NaN` when missing.
    pub response: f32,
    pub weight: f32,
    pub offset: f32,
}

impl Default for Row {
    fn default() -> Self {
        Self {
            cats: Vec::new(),
            nums: Features::default(),
            response: f32::NAN,
            weight: 1.,
            offset: 0.,
        }
    }
}

impl Row {
    /// A dense numeric row with unit weight and no offset.
    pub fn dense(nums: Vec<f32>, response: f32) -> Self {
        Self {
            nums: Features::Dense(nums),
            response,
            ..Default::default()
        }
    }

    /// A sparse numeric row with unit weight and no offset.
    pub fn sparse(nums: Vec<(usize, f32)>, response: f32) -> Self {
        Self {
            nums: Features::Sparse(nums),
            response,
            ..Default::default()
        }
    }
}
