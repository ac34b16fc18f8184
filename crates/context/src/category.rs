//! The three knowledge categories and their ranking parameters.
//!
//! Every per-category constant (weight, keyword boost, bucket cap and minimum)
//! lives in one table keyed by [`Category`], so dispatch never goes through
//! string comparison.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// A knowledge category. The persisted tag is the short name (`db`, `resume`,
/// `github`) so stored rows stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    /// Structured records (experience, projects, honors, ...).
    #[serde(rename = "db")]
    Records,
    /// The resume document.
    #[serde(rename = "resume")]
    Resume,
    /// Repository metadata and readmes.
    #[serde(rename = "github")]
    Repositories,
}

/// Fixed ranking parameters for one category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryProfile {
    /// Multiplier applied to raw cosine similarity.
    pub weight: f64,
    /// Additive boost applied to the whole bucket when the query names the category.
    pub keyword_boost: f64,
    /// Maximum number of chunks the bucket may contribute.
    pub max_chunks: usize,
    /// Chunks taken from the top of a non-empty bucket before proportional allocation.
    pub min_chunks: usize,
}

const RECORDS_PROFILE: CategoryProfile = CategoryProfile {
    weight: 0.7,
    keyword_boost: 0.1,
    max_chunks: 6,
    min_chunks: 1,
};

const RESUME_PROFILE: CategoryProfile = CategoryProfile {
    weight: 0.3,
    keyword_boost: 0.1,
    max_chunks: 3,
    min_chunks: 1,
};

const REPOSITORIES_PROFILE: CategoryProfile = CategoryProfile {
    weight: 0.1,
    keyword_boost: 0.1,
    max_chunks: 3,
    min_chunks: 0,
};

impl Category {
    /// All categories in bucket order. Selection walks buckets in this order.
    pub const ALL: [Category; 3] = [Category::Records, Category::Resume, Category::Repositories];

    pub const fn profile(self) -> CategoryProfile {
        match self {
            Self::Records => RECORDS_PROFILE,
            Self::Resume => RESUME_PROFILE,
            Self::Repositories => REPOSITORIES_PROFILE,
        }
    }

    /// Short tag used in storage and citations.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Records => "db",
            Self::Resume => "resume",
            Self::Repositories => "github",
        }
    }

    /// Position in [`Category::ALL`], used to index fixed-size per-category arrays.
    pub const fn index(self) -> usize {
        match self {
            Self::Records => 0,
            Self::Resume => 1,
            Self::Repositories => 2,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown category tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "db" | "records" => Ok(Self::Records),
            "resume" => Ok(Self::Resume),
            "github" | "repositories" | "repos" => Ok(Self::Repositories),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn profiles_match_ranking_table() {
        assert_eq!(Category::Records.profile().weight, 0.7);
        assert_eq!(Category::Resume.profile().weight, 0.3);
        assert_eq!(Category::Repositories.profile().weight, 0.1);

        let caps: Vec<usize> = Category::ALL.iter().map(|c| c.profile().max_chunks).collect();
        assert_eq!(caps, vec![6, 3, 3]);
        let mins: Vec<usize> = Category::ALL.iter().map(|c| c.profile().min_chunks).collect();
        assert_eq!(mins, vec![1, 1, 0]);
    }

    #[test]
    fn tags_round_trip_through_from_str() {
        for cat in Category::ALL {
            assert_eq!(cat.as_str().parse::<Category>().unwrap(), cat);
        }
        assert_eq!("Repositories".parse::<Category>().unwrap(), Category::Repositories);
        assert!("photos".parse::<Category>().is_err());
    }

    #[test]
    fn serde_uses_short_tags() {
        let json = serde_json::to_string(&Category::Repositories).unwrap();
        assert_eq!(json, "\"github\"");
        let back: Category = serde_json::from_str("\"db\"").unwrap();
        assert_eq!(back, Category::Records);
    }

    #[test]
    fn index_matches_all_order() {
        for (i, cat) in Category::ALL.iter().enumerate() {
            assert_eq!(cat.index(), i);
        }
    }
}
