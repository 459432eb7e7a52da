use errors::PipelineStage;
use kz_core::TriggerOrigin;
use metrics::{counter, gauge, histogram};

pub struct Telemetry;

impl Telemetry {
    pub fn record_fused(clamped: bool) {
        counter!("kinetizk_readings_fused_total").increment(1);
        if clamped {
            counter!("kinetizk_readings_clamped_total").increment(1);
        }
    }

    pub fn record_forwarded(count: u64) {
        counter!("kinetizk_readings_forwarded_total").increment(count);
    }

    pub fn record_pre_roll(replayed: usize) {
        histogram!("kinetizk_pre_roll_readings").record(replayed as f64);
    }

    pub fn record_sink_error() {
        counter!("kinetizk_sink_errors_total").increment(1);
    }

    pub fn record_session_started(origin: TriggerOrigin) {
        counter!("kinetizk_sessions_started_total", "origin" => origin.as_str()).increment(1);
        gauge!("kinetizk_collecting").set(1.0);
    }

    pub fn record_session_ignored(origin: TriggerOrigin) {
        counter!("kinetizk_sessions_ignored_total", "origin" => origin.as_str()).increment(1);
    }

    pub fn record_session_closed() {
        gauge!("kinetizk_collecting").set(0.0);
    }

    pub fn record_stage_failure(stage: PipelineStage) {
        counter!("kinetizk_pipeline_failures_total", "stage" => stage.as_str()).increment(1);
    }

    pub fn record_outcome(verified: bool, duration_ms: f64) {
        let verified = if verified { "true" } else { "false" };
        counter!("kinetizk_outcomes_total", "verified" => verified).increment(1);
        histogram!("kinetizk_pipeline_duration_ms").record(duration_ms);
    }

    pub fn record_bot_tick(accepted: bool) {
        let result = if accepted { "accepted" } else { "dropped" };
        counter!("kinetizk_bot_ticks_total", "result" => result).increment(1);
    }
}
