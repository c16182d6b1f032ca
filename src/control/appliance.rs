//! Stochastic dishwasher activation scheduler.
//!
//! Activation is a Bernoulli trial per eligible tick, calibrated so the
//! expected number of cycles per day tracks the configured daily budget
//! without a centralized countdown: the per-tick probability is the budget
//! divided by the day's occupied-tick count.

use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, warn};

use crate::config::ApplianceConfig;
use crate::occupancy::OccupancySample;

/// Per-building dishwasher state machine.
///
/// Owned exclusively by one session. The daily activation probability is
/// recomputed at each day boundary from the shared per-day occupied-tick
/// counts; a day with zero occupied ticks yields probability zero rather
/// than a division by zero.
#[derive(Debug, Clone)]
pub struct ApplianceScheduler {
    params: ApplianceConfig,
    ticks_per_hour: usize,
    ticks_per_day: usize,
    /// Ticks of the in-progress cycle, bounded by `params.run_time`.
    queue: Vec<usize>,
    activations_today: usize,
    day_index: usize,
    probability: f64,
    rng: StdRng,
}

impl ApplianceScheduler {
    /// Creates a scheduler positioned at day 0.
    ///
    /// # Arguments
    ///
    /// * `params` - Scheduler tunables
    /// * `ticks_per_hour` - Timesteps per hour
    /// * `occupied_counts` - Per-day occupied-tick counts for the run
    /// * `seed` - Random seed for reproducible activation draws
    pub fn new(
        params: ApplianceConfig,
        ticks_per_hour: usize,
        occupied_counts: &[usize],
        seed: u64,
    ) -> Self {
        let mut scheduler = Self {
            params,
            ticks_per_hour,
            ticks_per_day: ticks_per_hour * 24,
            queue: Vec::with_capacity(params.run_time),
            activations_today: 0,
            day_index: 0,
            probability: 0.0,
            rng: StdRng::seed_from_u64(seed),
        };
        scheduler.probability = scheduler.daily_probability(occupied_counts);
        scheduler
    }

    /// Completed activations since the last day boundary.
    pub fn activations_today(&self) -> usize {
        self.activations_today
    }

    /// Re-derives day bookkeeping after an occupancy-cursor reset.
    ///
    /// Called by the coordinator when the timeline wraps. An in-progress
    /// cycle is never interrupted; only the day counters are re-anchored.
    pub fn resync(&mut self, cursor: usize, occupied_counts: &[usize]) {
        self.day_index = cursor / self.ticks_per_day;
        self.activations_today = 0;
        self.probability = self.daily_probability(occupied_counts);
        debug!(day = self.day_index, "appliance scheduler resynced");
    }

    fn daily_probability(&self, occupied_counts: &[usize]) -> f64 {
        match occupied_counts.get(self.day_index) {
            Some(&count) if count > 0 => self.params.daily_budget / count as f64,
            Some(_) => {
                warn!(
                    day = self.day_index,
                    "no occupied ticks this day, appliance stays off"
                );
                0.0
            }
            None => {
                warn!(
                    day = self.day_index,
                    "no occupied-tick count for this day, appliance stays off"
                );
                0.0
            }
        }
    }

    /// Decides the dishwasher command (0/1) for one tick.
    ///
    /// `cursor` is the occupancy-timeline cursor, which also drives the day
    /// boundary: the boundary fires on the last tick of each day.
    pub fn command(
        &mut self,
        cursor: usize,
        sample: &OccupancySample,
        occupied_counts: &[usize],
    ) -> u8 {
        if (cursor + 1) % self.ticks_per_day == 0 {
            self.activations_today = 0;
            self.day_index = (cursor + 1) / self.ticks_per_day;
            self.probability = self.daily_probability(occupied_counts);
            debug!(
                day = self.day_index,
                probability = self.probability,
                "appliance day boundary"
            );
        }

        // An in-progress cycle takes precedence over everything else.
        if !self.queue.is_empty() && self.queue.len() < self.params.run_time {
            self.queue.push(cursor);
            return 1;
        }
        if self.queue.len() == self.params.run_time {
            self.activations_today += 1;
            self.queue.clear();
            return 0;
        }

        // The wake/sleep window advances by one day at each boundary.
        let day_start = self.day_index * self.ticks_per_day;
        let wake = day_start + self.params.wake_hour * self.ticks_per_hour;
        let sleep = day_start + self.params.sleep_hour * self.ticks_per_hour;
        let eligible = sample.status == 1
            && cursor > wake
            && cursor < sleep
            && self.activations_today < self.params.daily_limit;
        if !eligible {
            return 0;
        }

        let draw: f64 = self.rng.random();
        if draw < self.probability {
            debug!(cursor, draw, "dishwasher activated");
            self.queue.push(cursor);
            1
        } else {
            0
        }
    }
}
