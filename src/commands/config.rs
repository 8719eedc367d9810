//! `warden config`: print the settings a run would use

use colored::Colorize;

use crate::liveness::{
    RunSettings, ENV_CHECK_TIMEOUT_SECS, ENV_HARD_CAP_MS, ENV_HEARTBEAT_MS, ENV_KILL_GRACE_MS,
    ENV_LEVEL, ENV_MIN_EVENTS, ENV_STALL_LOG_MS, ENV_STALL_MS, ENV_TRACE,
};

/// Knob name, resolved value, and its env vars in precedence order
pub type SettingRow = (String, String, &'static [&'static str]);

fn row(name: &str, value: String, env: &'static [&'static str]) -> SettingRow {
    (name.to_string(), value, env)
}

/// One row per knob; the hard cap honours the per-check seconds override
/// ahead of the generic knob
pub fn render(settings: &RunSettings) -> Vec<SettingRow> {
    let live = &settings.liveness;
    let sup = &settings.supervisor;
    let ms = |d: std::time::Duration| format!("{}ms", d.as_millis());
    vec![
        row("level", live.level().to_string(), &[ENV_LEVEL]),
        row("stall window", ms(live.stall_window()), &[ENV_STALL_MS]),
        row(
            "min progress events",
            live.min_progress_events().to_string(),
            &[ENV_MIN_EVENTS],
        ),
        row(
            "hard cap",
            ms(live.hard_cap()),
            &[ENV_CHECK_TIMEOUT_SECS, ENV_HARD_CAP_MS],
        ),
        row("kill grace", ms(live.kill_grace()), &[ENV_KILL_GRACE_MS]),
        row("heartbeat", ms(sup.heartbeat), &[ENV_HEARTBEAT_MS]),
        row("stall log interval", ms(sup.stall_log_interval), &[ENV_STALL_LOG_MS]),
        row("verbose", sup.verbose.to_string(), &[ENV_TRACE]),
    ]
}

pub fn show(settings: &RunSettings) {
    println!("{}", "Liveness settings:".bold());
    for (name, value, env) in render(settings) {
        println!(
            "  {name:<20} {} {}",
            format!("{value:<24}").cyan(),
            env.join(" > ").dimmed()
        );
    }
}
