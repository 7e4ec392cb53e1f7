//! Pluggable work model for simulated processing and preview rendering.
//!
//! The streaming contract only cares about pacing and step count, so the
//! actual "work" is behind a trait. The default implementation sleeps a
//! fixed delay per step; a real pipeline can replace it without touching
//! the streaming code.

use std::time::Duration;

use async_trait::async_trait;

/// One processing job's shape: how many steps it takes and what happens
/// per step.
///
/// A job with `steps() == n` yields `n + 1` progress points, from 0% up to
/// and including 100%.
#[async_trait]
pub trait WorkModel: Send + Sync {
    /// Number of work steps the job is divided into. Must be >= 1.
    fn steps(&self) -> u32;

    /// Perform the work preceding one progress report. Called once before
    /// each report, in order, for `step` in `0..=steps()`.
    async fn run_step(&self, step: u32);
}

/// Progress percentage after `step` of `steps` units of work.
pub fn percent_at(step: u32, steps: u32) -> i32 {
    (step * 100 / steps.max(1)) as i32
}

/// Default work model: a fixed sleep per step, mimicking a long-running
/// filter pipeline.
#[derive(Debug, Clone)]
pub struct SimulatedWork {
    steps: u32,
    step_delay: Duration,
}

impl SimulatedWork {
    /// A job of `steps` units with `step_delay` of simulated work each.
    pub fn new(steps: u32, step_delay: Duration) -> Self {
        Self {
            steps: steps.max(1),
            step_delay,
        }
    }
}

impl Default for SimulatedWork {
    fn default() -> Self {
        // 10 steps of 200ms, matching the reference pipeline's pacing.
        Self::new(10, Duration::from_millis(200))
    }
}

#[async_trait]
impl WorkModel for SimulatedWork {
    fn steps(&self) -> u32 {
        self.steps
    }

    async fn run_step(&self, _step: u32) {
        tokio::time::sleep(self.step_delay).await;
    }
}

/// Render the deterministic preview payload for one tuning update.
///
/// The value is echoed verbatim with two decimal places; any float is legal.
pub fn render_preview(image_id: &str, parameter: &str, value: f64) -> Vec<u8> {
    format!("Preview for {image_id}: {parameter}={value:.2}").into_bytes()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_sequence_is_monotonic_and_complete() {
        let steps = 10;
        let percents: Vec<_> = (0..=steps).map(|s| percent_at(s, steps)).collect();
        assert_eq!(percents.first(), Some(&0));
        assert_eq!(percents.last(), Some(&100));
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percents.len(), 11);
    }

    #[test]
    fn test_percent_handles_uneven_steps() {
        assert_eq!(percent_at(1, 3), 33);
        assert_eq!(percent_at(2, 3), 66);
        assert_eq!(percent_at(3, 3), 100);
    }

    #[test]
    fn test_preview_encodes_request_fields() {
        let preview = render_preview("img-7", "brightness", 1.2);
        assert_eq!(
            String::from_utf8(preview).unwrap(),
            "Preview for img-7: brightness=1.20"
        );
    }

    #[test]
    fn test_preview_accepts_any_float() {
        let preview = render_preview("img-7", "contrast", -0.005);
        assert_eq!(
            String::from_utf8(preview).unwrap(),
            "Preview for img-7: contrast=-0.01"
        );
    }

    #[tokio::test]
    async fn test_simulated_work_step_count() {
        let work = SimulatedWork::new(3, Duration::ZERO);
        assert_eq!(work.steps(), 3);
        // Zero-delay steps complete immediately.
        work.run_step(0).await;
    }

    #[test]
    fn test_zero_steps_clamped() {
        let work = SimulatedWork::new(0, Duration::ZERO);
        assert_eq!(work.steps(), 1);
        assert_eq!(percent_at(0, 0), 0);
    }
}
