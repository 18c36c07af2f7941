//! Wall-clock timing of pipeline stages.

use std::time::{Duration, Instant};

/// Reports how long a stage ran once it goes out of scope
pub struct StageTimer {
    stage: &'static str,
    started: Instant,
}

impl StageTimer {
    pub fn start(stage: &'static str) -> Self {
        Self {
            stage,
            started: Instant::now(),
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        log::info!(
            "{} finished in {:.3} ms",
            self.stage,
            self.elapsed().as_secs_f64() * 1e3
        );
    }
}

/// Time the rest of the enclosing block as one stage.
#[macro_export]
macro_rules! profile_scope {
    ($stage:expr) => {
        let _stage_timer = $crate::profiling::StageTimer::start($stage);
    };
}
