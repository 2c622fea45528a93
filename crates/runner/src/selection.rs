//! Test selection
//!
//! A selection of literal titles becomes one anchored pattern, so a title
//! only matches itself and regex metacharacters in titles are inert. A test
//! is selected by its full title (suite title plus test title) or by its
//! bare title.

use loginlab_common::TestSelection;
use regex::Regex;

use crate::error::RunnerResult;
use crate::suites::TestSuite;

#[derive(Debug, Clone)]
pub enum TestFilter {
    /// Every test runs
    All,
    /// Only exact title matches run
    Pattern(Regex),
    /// An explicitly empty selection; nothing runs
    Nothing,
}

impl TestFilter {
    pub fn new(selection: &TestSelection) -> RunnerResult<Self> {
        match selection {
            TestSelection::All => Ok(TestFilter::All),
            TestSelection::Titles(titles) if titles.is_empty() => Ok(TestFilter::Nothing),
            TestSelection::Titles(titles) => {
                let alternatives: Vec<String> = titles.iter().map(|t| regex::escape(t)).collect();
                let pattern = format!("^(?:{})$", alternatives.join("|"));
                Ok(TestFilter::Pattern(Regex::new(&pattern)?))
            }
        }
    }

    pub fn matches(&self, title: &str) -> bool {
        match self {
            TestFilter::All => true,
            TestFilter::Pattern(re) => re.is_match(title),
            TestFilter::Nothing => false,
        }
    }

    /// Match a test by its full title, falling back to its bare title
    pub fn matches_test(&self, suite: &TestSuite, title: &str) -> bool {
        self.matches(&suite.full_title(title)) || self.matches(title)
    }
}
