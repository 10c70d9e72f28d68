//! This file contains all of the code for keeping stats for the current demo
//! session and printing periodic reports

use std::time::Instant;

use chrono::Local;

use crate::config::Config;
use crate::injector::{Counts, TallySnapshot};

// Helper function to format a group of stats
fn format_group(title: &str, stats: &[(String, String)]) -> String {
    let stats_str = stats
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join(" | ");
    format!("\x1b[1;32m{}:\x1b[0m {}", title, stats_str)
}

// Share of `part` in `whole` as a percentage
fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64) * 100.0
    }
}

fn direction_group(counts: &Counts) -> [(String, String); 4] {
    let total = counts.total();
    [
        ("frames".to_string(), total.to_string()),
        (
            "passed".to_string(),
            format!("{} ({:.1}%)", counts.passed, percent(counts.passed, total)),
        ),
        (
            "dropped".to_string(),
            format!("{} ({:.1}%)", counts.dropped, percent(counts.dropped, total)),
        ),
        (
            "corrupted".to_string(),
            format!("{} ({:.1}%)", counts.corrupted, percent(counts.corrupted, total)),
        ),
    ]
}

#[derive(Clone, Default)]
pub struct Stats {
    pub start_str: String,          // String repr of date start
    session_start: Option<Instant>, // Start time
    pub frames: usize,              // Frames handed to the transport
    pub delivered: usize,           // Frames that reached a message listener
    pub liveness: Option<String>,   // Last liveness value we saw
    report: usize,                  // Current report number
    pub stat_interval: usize,       // How often we report, in frames
    tally: TallySnapshot,           // Latest tally from the handle
}

impl Stats {
    pub fn new(config: &Config) -> Self {
        Stats {
            stat_interval: config.stat_interval,
            ..Default::default()
        }
    }

    // Start the timers
    #[inline]
    pub fn start_session(&mut self) {
        self.start_str = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        self.session_start = Some(Instant::now());
    }

    // Update 1 frame
    #[inline]
    pub fn update(&mut self, tally: TallySnapshot) {
        self.frames += 1;
        self.tally = tally;
    }

    pub fn set_tally(&mut self, tally: TallySnapshot) {
        self.tally = tally;
    }

    pub fn report_ready(&self) -> bool {
        self.stat_interval != 0 && self.frames != 0 && self.frames % self.stat_interval == 0
    }

    fn uptime(&self) -> String {
        let Some(start) = self.session_start else {
            return "0s".to_string();
        };

        let elapsed = start.elapsed();
        format!("{}.{:03}s", elapsed.as_secs(), elapsed.subsec_millis())
    }

    pub fn print_stats(&mut self) {
        self.report += 1;

        println!(
            "\n\x1b[1;35m[wirefault stats #{} (start time: {})]\x1b[0m",
            self.report, self.start_str
        );

        let globals = [
            ("uptime".to_string(), self.uptime()),
            ("sent".to_string(), self.frames.to_string()),
            ("delivered".to_string(), self.delivered.to_string()),
            (
                "liveness".to_string(),
                self.liveness.clone().unwrap_or_else(|| "-".to_string()),
            ),
        ];
        println!("{}", format_group("globals", &globals));
        println!("{}", format_group("outbound", &direction_group(&self.tally.outbound)));
        println!("{}", format_group("inbound", &direction_group(&self.tally.inbound)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_render_percentages() {
        let counts = Counts {
            passed: 5,
            dropped: 2,
            corrupted: 3,
        };
        let group = format_group("outbound", &direction_group(&counts));
        assert!(group.contains("frames: 10"));
        assert!(group.contains("dropped: 2 (20.0%)"));
        assert!(group.contains("corrupted: 3 (30.0%)"));
    }

    #[test]
    fn empty_direction_has_no_nan() {
        assert_eq!(percent(0, 0), 0.0);
    }

    #[test]
    fn reports_on_interval() {
        let mut stats = Stats {
            stat_interval: 3,
            ..Default::default()
        };
        assert!(!stats.report_ready());
        for _ in 0..3 {
            stats.update(TallySnapshot::default());
        }
        assert!(stats.report_ready());
    }
}
