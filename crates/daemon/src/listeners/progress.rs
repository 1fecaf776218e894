//! Progress observer: percent / FPS / ETA reporting.

use std::time::Instant;
use tracing::info;

use super::WorkerObserver;
use crate::media::InputMedia;
use crate::worker::Progress;

/// Reports a line every 5% of input duration covered.
///
/// The encoder speed is the current FPS over the input framerate (the
/// rational average frame rate of the first video stream, defaulting
/// to 1).
pub struct ProgressListener {
    framerate: f64,
    last_reported: i64,
    started: Option<Instant>,
}

impl ProgressListener {
    pub fn new(input: &InputMedia) -> Self {
        let framerate = input
            .first_video_stream()
            .and_then(|s| s.avg_frame_rate())
            .unwrap_or(1.0);
        Self {
            framerate,
            last_reported: 0,
            started: None,
        }
    }

    /// Report when the percent exceeds the last reported one and sits on a
    /// 5% boundary.
    fn should_report(&self, percent: i64) -> bool {
        percent > self.last_reported && percent % 5 == 0
    }
}

/// Format a duration in seconds as `HH:mm:ss`, with a day count prefix for
/// long runs. Non-finite or negative inputs print `--:--:--`.
pub fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "--:--:--".to_string();
    }
    let total = seconds as u64;
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let secs = total % 60;
    if days > 0 {
        format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    }
}

impl WorkerObserver for ProgressListener {
    fn on_start(&mut self, _command_line: &str) {
        self.started = Some(Instant::now());
    }

    fn on_progress(&mut self, progress: &Progress) {
        let percent = progress.percent.floor() as i64;
        if !self.should_report(percent) {
            return;
        }
        self.last_reported = percent;

        let elapsed = self
            .started
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let fraction = percent as f64 / 100.0;
        let eta = elapsed * (1.0 - fraction) / fraction;
        let speed = progress.current_fps / self.framerate;

        info!(
            "{:>3}% frame={} time={} fps={:.1} elapsed={} eta={} speed={:.2}x",
            percent,
            progress.frames,
            progress.timemark,
            progress.current_fps,
            format_duration(elapsed),
            format_duration(eta),
            speed,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaPath;
    use crate::probe::ProbeData;
    use serde_json::json;

    fn input_with_framerate(rate: Option<&str>) -> InputMedia {
        let mut stream = json!({"index": 0, "codec_type": "video"});
        if let Some(rate) = rate {
            stream["avg_frame_rate"] = json!(rate);
        }
        InputMedia::from_probe(
            0,
            MediaPath::new("", "film", "mp4"),
            vec![],
            ProbeData {
                streams: vec![stream],
                format: Default::default(),
                chapters: vec![],
            },
        )
    }

    #[test]
    fn test_framerate_from_first_video_stream() {
        let listener = ProgressListener::new(&input_with_framerate(Some("24000/1001")));
        assert!((listener.framerate - 23.976).abs() < 0.001);
    }

    #[test]
    fn test_framerate_defaults_to_one() {
        let listener = ProgressListener::new(&input_with_framerate(None));
        assert_eq!(listener.framerate, 1.0);

        let no_video = InputMedia::from_probe(
            0,
            MediaPath::new("", "song", "flac"),
            vec![],
            ProbeData {
                streams: vec![json!({"index": 0, "codec_type": "audio"})],
                format: Default::default(),
                chapters: vec![],
            },
        );
        assert_eq!(ProgressListener::new(&no_video).framerate, 1.0);
    }

    #[test]
    fn test_reporting_gate() {
        let mut listener = ProgressListener::new(&input_with_framerate(None));
        // 0% is never "greater than the last reported".
        assert!(!listener.should_report(0));
        assert!(!listener.should_report(3));
        assert!(listener.should_report(5));
        assert!(listener.should_report(10));

        listener.last_reported = 10;
        assert!(!listener.should_report(10));
        assert!(!listener.should_report(12));
        assert!(listener.should_report(15));
        // Jumps past several boundaries still report.
        assert!(listener.should_report(40));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "00:00:00");
        assert_eq!(format_duration(62.9), "00:01:02");
        assert_eq!(format_duration(7200.0), "02:00:00");
        assert_eq!(format_duration(90_061.0), "1d 01:01:01");
    }

    #[test]
    fn test_format_duration_invalid_is_dashes() {
        assert_eq!(format_duration(f64::NAN), "--:--:--");
        assert_eq!(format_duration(f64::INFINITY), "--:--:--");
        assert_eq!(format_duration(-5.0), "--:--:--");
    }
}
