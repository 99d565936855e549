use super::context::JobContext;
use rand::Rng;
use std::time::{Duration, Instant};

/// Schedule for when a job should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSchedule {
    /// Re-armed after every run with a delay drawn uniformly from `[min, max)`.
    Jittered { min: Duration, max: Duration },
    /// Runs every `period`, measured from the previous planned fire time.
    /// The first run happens one period after start.
    FixedRate(Duration),
}

impl JobSchedule {
    /// Draws the next delay. Only jittered schedules use `rng`.
    pub fn delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Duration, JobError> {
        match self {
            JobSchedule::Jittered { min, max } => {
                let min_ms = min.as_millis() as u64;
                let max_ms = max.as_millis() as u64;
                if min_ms >= max_ms {
                    return Err(JobError::InvalidSchedule(format!(
                        "empty jitter range [{}ms, {}ms)",
                        min_ms, max_ms
                    )));
                }
                Ok(Duration::from_millis(rng.random_range(min_ms..max_ms)))
            }
            JobSchedule::FixedRate(period) => {
                if period.is_zero() {
                    return Err(JobError::InvalidSchedule(
                        "fixed rate period must not be zero".to_string(),
                    ));
                }
                Ok(*period)
            }
        }
    }

    /// When the first run happens for a job started at `now`.
    pub fn initial_fire<R: Rng + ?Sized>(
        &self,
        now: Instant,
        rng: &mut R,
    ) -> Result<Instant, JobError> {
        Ok(now + self.delay(rng)?)
    }

    /// When the run after the one planned for `fired_at` and finished at
    /// `finished_at` happens.
    pub fn next_fire<R: Rng + ?Sized>(
        &self,
        fired_at: Instant,
        finished_at: Instant,
        rng: &mut R,
    ) -> Result<Instant, JobError> {
        let delay = self.delay(rng)?;
        Ok(match self {
            JobSchedule::Jittered { .. } => finished_at + delay,
            JobSchedule::FixedRate(_) => fired_at + delay,
        })
    }
}

impl std::fmt::Display for JobSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobSchedule::Jittered { min, max } => {
                write!(f, "jittered {}-{}ms", min.as_millis(), max.as_millis())
            }
            JobSchedule::FixedRate(period) => write!(f, "every {}s", period.as_secs_f64()),
        }
    }
}

/// Errors that can occur during job execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    ExecutionFailed(String),
    Cancelled,
    /// The next run could not be computed; the job stops for good.
    InvalidSchedule(String),
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::ExecutionFailed(msg) => write!(f, "Execution failed: {}", msg),
            JobError::Cancelled => write!(f, "Job was cancelled"),
            JobError::InvalidSchedule(msg) => write!(f, "Invalid schedule: {}", msg),
        }
    }
}

impl std::error::Error for JobError {}

/// Trait for background jobs.
///
/// Jobs are executed synchronously in a blocking context.
pub trait BackgroundJob: Send + Sync {
    /// Unique identifier for this job.
    fn id(&self) -> &'static str;

    /// Human-readable name for this job.
    fn name(&self) -> &'static str;

    /// Description of what this job does.
    fn description(&self) -> &'static str;

    /// When this job should be scheduled to run.
    fn schedule(&self) -> JobSchedule;

    /// Execute the job.
    ///
    /// This method is called from a blocking context using `spawn_blocking`.
    /// A run that has started is allowed to finish even if cancellation is
    /// requested meanwhile; `ctx.is_cancelled()` is only meant to skip work
    /// that has not started yet.
    fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn jittered(min_ms: u64, max_ms: u64) -> JobSchedule {
        JobSchedule::Jittered {
            min: Duration::from_millis(min_ms),
            max: Duration::from_millis(max_ms),
        }
    }

    #[test]
    fn jittered_delay_stays_in_range() {
        let schedule = jittered(100, 200);
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..10_000 {
            let delay = schedule.delay(&mut rng).unwrap();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay < Duration::from_millis(200));
        }
    }

    #[test]
    fn jittered_delay_is_uniform() {
        const DRAWS: usize = 20_000;
        const BUCKETS: usize = 10;

        let schedule = jittered(100, 200);
        let mut rng = StdRng::seed_from_u64(2024);
        let mut counts = [0usize; BUCKETS];
        for _ in 0..DRAWS {
            let ms = schedule.delay(&mut rng).unwrap().as_millis() as usize;
            counts[(ms - 100) / 10] += 1;
        }

        // Chi-square with 9 degrees of freedom; 27.88 is the 0.001 critical value
        let expected = DRAWS as f64 / BUCKETS as f64;
        let chi_square: f64 = counts
            .iter()
            .map(|&c| {
                let diff = c as f64 - expected;
                diff * diff / expected
            })
            .sum();
        assert!(chi_square < 27.88, "chi-square {} counts {:?}", chi_square, counts);
    }

    #[test]
    fn empty_jitter_range_is_invalid() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            jittered(200, 200).delay(&mut rng),
            Err(JobError::InvalidSchedule(_))
        ));
        assert!(matches!(
            jittered(300, 200).delay(&mut rng),
            Err(JobError::InvalidSchedule(_))
        ));
        assert!(matches!(
            JobSchedule::FixedRate(Duration::ZERO).delay(&mut rng),
            Err(JobError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn fixed_rate_counts_from_planned_fire() {
        let schedule = JobSchedule::FixedRate(Duration::from_secs(10));
        let mut rng = StdRng::seed_from_u64(1);
        let start = Instant::now();

        let first = schedule.initial_fire(start, &mut rng).unwrap();
        assert_eq!(first, start + Duration::from_secs(10));

        // A run finishing late does not shift the cadence
        let next = schedule
            .next_fire(first, first + Duration::from_secs(3), &mut rng)
            .unwrap();
        assert_eq!(next, start + Duration::from_secs(20));
    }

    #[test]
    fn jittered_counts_from_finish() {
        let schedule = jittered(100, 200);
        let mut rng = StdRng::seed_from_u64(5);
        let fired = Instant::now();
        let finished = fired + Duration::from_millis(50);

        let next = schedule.next_fire(fired, finished, &mut rng).unwrap();

        assert!(next >= finished + Duration::from_millis(100));
        assert!(next < finished + Duration::from_millis(200));
    }

    #[test]
    fn display() {
        assert_eq!(jittered(500, 5000).to_string(), "jittered 500-5000ms");
        assert_eq!(
            JobSchedule::FixedRate(Duration::from_secs(60)).to_string(),
            "every 60s"
        );
    }
}
