//! Page-walk bounds, dedup and stagnation tracking.
//!
//! Every adapter walk is bounded by [`PageWalker`] regardless of what the
//! backend claims about its own size.

use std::collections::HashSet;

/// Absolute bound on one adapter invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchBudget {
    /// Maximum pages (or scroll iterations) requested
    pub max_pages: u32,
}

impl FetchBudget {
    /// Budget of `max_pages`, at least one.
    #[must_use]
    pub fn new(max_pages: u32) -> Self {
        Self {
            max_pages: max_pages.max(1),
        }
    }
}

/// Counts pages against a [`FetchBudget`].
#[derive(Debug, Clone)]
pub struct PageWalker {
    max_pages: u32,
    pages: u32,
    truncated: bool,
}

impl PageWalker {
    /// Start a walk.
    #[must_use]
    pub fn new(budget: FetchBudget) -> Self {
        Self {
            max_pages: budget.max_pages,
            pages: 0,
            truncated: false,
        }
    }

    /// Claim the next page. Returns `false`, and marks the walk truncated,
    /// once the bound is reached.
    pub fn advance(&mut self) -> bool {
        if self.pages >= self.max_pages {
            self.truncated = true;
            return false;
        }
        self.pages += 1;
        true
    }

    /// Pages claimed so far.
    #[must_use]
    pub fn pages(&self) -> u32 {
        self.pages
    }

    /// Whether the bound stopped a walk that still had pages to fetch.
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Mark the walk truncated by a bound other than the page budget.
    pub fn mark_truncated(&mut self) {
        self.truncated = true;
    }
}

/// Provider item ids seen during one adapter invocation.
#[derive(Debug, Clone, Default)]
pub struct SeenIds {
    ids: HashSet<String>,
}

impl SeenIds {
    /// Record an id. Returns `true` if it had not been seen.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        self.ids.insert(id.to_string())
    }

    /// Whether an id has been seen.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Number of distinct ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no id has been seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Consecutive steps without new ids.
#[derive(Debug, Clone)]
pub struct Stagnation {
    limit: u32,
    streak: u32,
}

impl Stagnation {
    /// Stagnant after `limit` consecutive steps without growth.
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            streak: 0,
        }
    }

    /// Record how many new ids a step produced. Returns `true` once stagnant.
    pub fn observe(&mut self, new_ids: usize) -> bool {
        if new_ids == 0 {
            self.streak += 1;
        } else {
            self.streak = 0;
        }
        self.streak >= self.limit
    }

    /// Reset the streak, e.g. when switching category.
    pub fn reset(&mut self) {
        self.streak = 0;
    }
}

/// Signals reported by one page of a paginated walk.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageReport {
    /// 1-based position of the page within its walk
    pub position: u32,
    /// Raw items on the page
    pub items: usize,
    /// Items added to the seen set by this page
    pub new_ids: usize,
    /// Raw items received so far in this walk
    pub cumulative: usize,
    /// Page size requested
    pub page_size: usize,
    /// Server-declared item total
    pub declared_total: Option<u64>,
    /// Server-declared page count
    pub declared_pages: Option<u64>,
}

impl PageReport {
    /// Whether the walk is finished after this page.
    ///
    /// Uses whichever signal the backend provides: an empty or short page,
    /// a page with no new ids, the declared total, or the declared page count.
    #[must_use]
    pub fn is_last(&self) -> bool {
        if self.items == 0 || self.new_ids == 0 {
            return true;
        }
        if self.page_size > 0 && self.items < self.page_size {
            return true;
        }
        if let Some(total) = self.declared_total {
            if self.cumulative as u64 >= total {
                return true;
            }
        }
        if let Some(pages) = self.declared_pages {
            if u64::from(self.position) >= pages {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walker_bound() {
        let mut walker = PageWalker::new(FetchBudget::new(3));
        assert!(walker.advance());
        assert!(walker.advance());
        assert!(walker.advance());
        assert!(!walker.truncated());
        assert!(!walker.advance());
        assert!(walker.truncated());
        assert_eq!(walker.pages(), 3);
    }

    #[test]
    fn test_zero_budget_still_allows_one_page() {
        let mut walker = PageWalker::new(FetchBudget::new(0));
        assert!(walker.advance());
        assert!(!walker.advance());
    }

    #[test]
    fn test_seen_ids() {
        let mut seen = SeenIds::default();
        assert!(seen.insert("a"));
        assert!(!seen.insert("a"));
        assert!(seen.insert("b"));
        assert_eq!(seen.len(), 2);
        assert!(seen.contains("a"));
    }

    #[test]
    fn test_stagnation() {
        let mut stagnation = Stagnation::new(2);
        assert!(!stagnation.observe(0));
        assert!(!stagnation.observe(3));
        assert!(!stagnation.observe(0));
        assert!(stagnation.observe(0));
        stagnation.reset();
        assert!(!stagnation.observe(0));
    }

    #[test]
    fn test_page_report_signals() {
        let full = PageReport {
            position: 1,
            items: 100,
            new_ids: 100,
            cumulative: 100,
            page_size: 100,
            declared_total: None,
            declared_pages: None,
        };
        assert!(!full.is_last());

        assert!(PageReport { items: 0, ..full }.is_last());
        assert!(PageReport { new_ids: 0, ..full }.is_last());
        assert!(PageReport { items: 40, new_ids: 40, ..full }.is_last());
        assert!(PageReport { declared_total: Some(100), ..full }.is_last());
        assert!(!PageReport { declared_total: Some(250), ..full }.is_last());
        assert!(PageReport { declared_pages: Some(1), ..full }.is_last());
    }
}
