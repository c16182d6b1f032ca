//! Occupancy timeline: fixed-interval occupancy samples with a wrapping
//! cursor lookup and per-day occupied-tick counts.

use std::path::Path;

use tracing::warn;

/// One fixed-interval occupancy sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OccupancySample {
    /// Occupancy status: 1 = occupied with certainty, 0 = not confirmed.
    pub status: u8,
    /// Probability of occupancy in `[0, 1]`.
    pub probability: f64,
    /// Precomputed comfort-band expansion column carried by the data file.
    pub comfort_expansion: f64,
}

/// Result of a timeline lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lookup {
    pub sample: OccupancySample,
    /// True when the requested index was past the end of the series and the
    /// cursor wrapped back to 0. The coordinator must re-derive its
    /// day-boundary bookkeeping from the reset point when this is set.
    pub wrapped: bool,
}

/// Ordered, read-only occupancy series at a fixed sub-hourly interval.
#[derive(Debug, Clone)]
pub struct OccupancyTimeline {
    samples: Vec<OccupancySample>,
}

impl OccupancyTimeline {
    pub fn new(samples: Vec<OccupancySample>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the sample at `index`, wrapping to index 0 when the series is
    /// exhausted.
    ///
    /// Running past the end of the loaded horizon is an explicit recoverable
    /// condition, not a fault: the cursor resets to 0 and the wrap is
    /// reported to the caller. `sample_at(len)` equals `sample_at(0)`.
    ///
    /// # Panics
    ///
    /// Panics on an empty timeline; there is no sample to wrap back to.
    pub fn sample_at(&self, index: usize) -> Lookup {
        if let Some(&sample) = self.samples.get(index) {
            Lookup {
                sample,
                wrapped: false,
            }
        } else {
            warn!(
                index,
                len = self.samples.len(),
                "occupancy data exhausted, cursor reset to 0"
            );
            Lookup {
                sample: self.samples[0],
                wrapped: true,
            }
        }
    }

    /// Count of `status == 1` samples in each calendar day of the series.
    ///
    /// Used as the denominator of the daily appliance activation
    /// probability. A trailing partial day is not counted.
    pub fn daily_occupied_counts(&self, ticks_per_day: usize) -> Vec<usize> {
        let mut counts = Vec::with_capacity(self.samples.len() / ticks_per_day);
        let mut occupied = 0usize;
        for (k, sample) in self.samples.iter().enumerate() {
            if sample.status == 1 {
                occupied += 1;
            }
            if (k + 1) % ticks_per_day == 0 {
                counts.push(occupied);
                occupied = 0;
            }
        }
        counts
    }

    /// Loads a timeline from the occupancy CSV file.
    ///
    /// The file carries a header row, then one row per tick with the
    /// probability in column 1, the status in column 3, and the comfort
    /// expansion in column 4. Rows with fewer than five fields are skipped
    /// with a warning. At most `(days + 1) * ticks_per_day + 1` rows are
    /// read, leaving one day of margin past the configured horizon.
    pub fn from_csv_file(
        path: &Path,
        days: usize,
        ticks_per_day: usize,
    ) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let needed = (days + 1) * ticks_per_day + 1;
        let mut samples = Vec::with_capacity(needed);

        for record in reader.records() {
            if samples.len() >= needed {
                break;
            }
            let record = record?;
            if record.len() < 5 {
                warn!(fields = record.len(), "skipping short occupancy row");
                continue;
            }
            let probability = parse_field(&record, 1, "probability");
            let status = parse_field(&record, 3, "status");
            let comfort_expansion = parse_field(&record, 4, "comfort_expansion");
            samples.push(OccupancySample {
                status: status as u8,
                probability,
                comfort_expansion,
            });
        }

        Ok(Self::new(samples))
    }
}

fn parse_field(record: &csv::StringRecord, index: usize, name: &str) -> f64 {
    match record.get(index).map(str::trim).map(str::parse::<f64>) {
        Some(Ok(v)) => v,
        _ => {
            warn!(column = name, "unparseable occupancy field, using 0");
            0.0
        }
    }
}
