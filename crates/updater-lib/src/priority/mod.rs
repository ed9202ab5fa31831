//! Update priority ranking
//!
//! Instances whose resource requests drift from the recommendation are
//! scored by summed relative difference and ranked most-urgent first.

mod calculator;


pub use calculator::{urgency, PriorityRecord, UpdatePriorityCalculator};
