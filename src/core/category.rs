//! Question categories.
//!
//! Every board tile carries exactly one category, and a player wins by
//! succeeding at least once in each of the five. The ordering of the
//! variants is stable: `Advance` success arrays are indexed by
//! `Category::index`.

use serde::{Deserialize, Serialize};

/// Number of question categories. Success arrays always have this length.
pub const CATEGORY_COUNT: usize = 5;

/// One of the five question topics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Arithmetic,
    Geometry,
    Fractions,
    Measures,
    Logic,
}

impl Category {
    /// All categories in index order.
    pub const ALL: [Category; CATEGORY_COUNT] = [
        Category::Arithmetic,
        Category::Geometry,
        Category::Fractions,
        Category::Measures,
        Category::Logic,
    ];

    /// Stable index of this category, 0-based.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Category::Arithmetic => "arithmetic",
            Category::Geometry => "geometry",
            Category::Fractions => "fractions",
            Category::Measures => "measures",
            Category::Logic => "logic",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_stable_and_dense() {
        for (i, cat) in Category::ALL.iter().enumerate() {
            assert_eq!(cat.index(), i);
        }
        assert_eq!(Category::ALL.len(), CATEGORY_COUNT);
    }

    #[test]
    fn serde_names_are_camel_case() {
        let json = serde_json::to_string(&Category::Arithmetic).unwrap();
        assert_eq!(json, "\"arithmetic\"");
        let back: Category = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Category::Arithmetic);
    }
}
