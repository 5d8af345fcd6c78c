//! Weighted progress of a synchronizer run
//!
//! Item work (new files, missing files, refreshed entries) fills the first
//! 70 percent, person sync the remaining 30. Each phase is proportional to
//! its processed/total counts.

const ITEM_WEIGHT: f64 = 70.0;
const PEOPLE_WEIGHT: f64 = 30.0;

#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    items_total: u64,
    items_done: u64,
    items_finished: bool,
    people_total: u64,
    people_done: u64,
    people_finished: bool,
    reported: f64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_items_total(&mut self, total: u64) {
        self.items_total = total;
    }

    pub fn item_done(&mut self) {
        self.items_done = (self.items_done + 1).min(self.items_total);
    }

    pub fn finish_items(&mut self) {
        self.items_finished = true;
    }

    pub fn set_people_total(&mut self, total: u64) {
        self.people_total = total;
    }

    pub fn person_done(&mut self) {
        self.people_done = (self.people_done + 1).min(self.people_total);
    }

    pub fn finish_people(&mut self) {
        self.people_finished = true;
    }

    /// Current percentage, clamped to `0..=100` and never lower than a
    /// previously returned value.
    pub fn percent(&mut self) -> f64 {
        let items = phase_fraction(self.items_done, self.items_total, self.items_finished);
        let people = phase_fraction(self.people_done, self.people_total, self.people_finished);
        let percent = (items * ITEM_WEIGHT + people * PEOPLE_WEIGHT).clamp(0.0, 100.0);
        self.reported = self.reported.max(percent);
        self.reported
    }
}

fn phase_fraction(done: u64, total: u64, finished: bool) -> f64 {
    if finished {
        1.0
    } else if total == 0 {
        0.0
    } else {
        done as f64 / total as f64
    }
}
