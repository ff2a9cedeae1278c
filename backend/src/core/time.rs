//! Time management for the simulation
//!
//! The simulation operates in discrete monthly steps. Twelve months form a
//! year; all annual rates are converted with [`MONTHS_IN_YEAR`].

use serde::{Deserialize, Serialize};

/// Number of monthly steps in one year
pub const MONTHS_IN_YEAR: u32 = 12;

/// Manages simulation time in discrete months
///
/// # Example
/// ```
/// use housing_credit_core_rs::TimeManager;
///
/// let mut time = TimeManager::new();
/// assert_eq!(time.current_month(), 0);
/// assert_eq!(time.current_year(), 0);
///
/// time.advance_month();
/// assert_eq!(time.current_month(), 1);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeManager {
    /// Total months elapsed since simulation start
    current_month: u32,
}

impl TimeManager {
    /// Create a clock positioned at month 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance time by one month
    pub fn advance_month(&mut self) {
        self.current_month += 1;
    }

    /// Get the current month (total months since start)
    pub fn current_month(&self) -> u32 {
        self.current_month
    }

    /// Get the current year (0-indexed)
    ///
    /// # Example
    /// ```
    /// use housing_credit_core_rs::TimeManager;
    ///
    /// let mut time = TimeManager::new();
    /// for _ in 0..12 {
    ///     time.advance_month();
    /// }
    /// assert_eq!(time.current_year(), 1);
    /// ```
    pub fn current_year(&self) -> u32 {
        self.current_month / MONTHS_IN_YEAR
    }

    /// Get the month within the current year (0-indexed)
    pub fn month_of_year(&self) -> u32 {
        self.current_month % MONTHS_IN_YEAR
    }

    /// Check if the current month closes a year
    pub fn is_year_end(&self) -> bool {
        self.month_of_year() == MONTHS_IN_YEAR - 1
    }
}
