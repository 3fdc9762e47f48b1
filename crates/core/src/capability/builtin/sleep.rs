use std::time::Duration;

use super::Capability;
use crate::capability::{f64_param, ActionContext, Params};

pub struct SleepSeconds;

#[async_trait::async_trait]
impl Capability for SleepSeconds {
    fn name(&self) -> &'static str {
        "sleep-seconds"
    }

    fn description(&self) -> &'static str {
        "Pause before the next action, e.g. to give a background task time to progress."
    }

    fn parameters(&self) -> &'static [(&'static str, &'static str)] {
        &[("seconds", "How long to sleep; fractions allowed")]
    }

    async fn execute(&self, params: &Params, ctx: &ActionContext) -> Result<String, String> {
        let requested = f64_param(params, "seconds")?;
        if !requested.is_finite() || requested < 0.0 {
            return Err(format!("parameter 'seconds' must be a non-negative number, got {requested}"));
        }
        let max = ctx.cfg.max_sleep_secs as f64;
        let seconds = requested.min(max);

        tokio::select! {
            _ = ctx.shutdown.cancelled() => Err("sleep interrupted: agent is shutting down".to_owned()),
            _ = tokio::time::sleep(Duration::from_secs_f64(seconds)) => {
                if seconds < requested {
                    Ok(format!("Slept for {seconds} seconds (capped from {requested})."))
                } else {
                    Ok(format!("Slept for {seconds} seconds."))
                }
            }
        }
    }
}
