use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

pub const DEFAULT_TRIM_WINDOW: f64 = 30.0;
pub const THUMBNAIL_COUNT: u32 = 10;

/// Seconds to `HH:MM:SS`, truncating fractions.
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 { seconds.floor() as u64 } else { 0 };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

pub fn parse_time(value: &str) -> Result<f64> {
    let parts: Vec<&str> = value.trim().split(':').collect();
    if parts.len() != 3 {
        return Err(ConvertError::InvalidTimestamp(value.to_string()));
    }

    let mut total = 0u64;
    for (i, part) in parts.iter().enumerate() {
        let n: u64 = part.parse().map_err(|_| ConvertError::InvalidTimestamp(value.to_string()))?;
        if i > 0 && n >= 60 {
            return Err(ConvertError::InvalidTimestamp(value.to_string()));
        }
        total = total * 60 + n;
    }

    Ok(total as f64)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimRange {
    pub start: f64,
    pub end: f64,
}

impl TrimRange {
    pub fn new(start: f64, end: f64, duration: f64) -> Result<Self> {
        let valid = start.is_finite()
            && end.is_finite()
            && start >= 0.0
            && start <= end
            && end <= duration;
        if !valid {
            return Err(ConvertError::InvalidTrimRange { start, end, duration });
        }
        Ok(TrimRange { start, end })
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    pub fn start_time(&self) -> String {
        format_time(self.start)
    }

    pub fn duration_time(&self) -> String {
        format_time(self.length())
    }

    /// True when nothing would be cut from a source of `duration` seconds.
    pub fn covers(&self, duration: f64) -> bool {
        self.start <= 0.0 && self.end >= duration
    }

    /// `-ss`/`-t` pair, or nothing when the range spans the whole source.
    pub fn args(&self, duration: f64) -> Vec<String> {
        if self.covers(duration) {
            return vec![];
        }
        let mut args: Vec<String> = Vec::with_capacity(4);
        args.push("-ss".to_string());
        args.push(self.start_time());
        args.push("-t".to_string());
        args.push(self.duration_time());
        args
    }
}

impl Default for TrimRange {
    fn default() -> Self {
        TrimRange { start: 0.0, end: DEFAULT_TRIM_WINDOW }
    }
}

pub fn default_trim_range(duration: f64, window: f64) -> TrimRange {
    TrimRange {
        start: 0.0,
        end: duration.max(0.0).min(window),
    }
}

/// `{ i * D / n }` for `i` in `0..n`.
pub fn thumbnail_timestamps(duration: f64, count: u32) -> Vec<f64> {
    if count == 0 {
        return vec![];
    }
    let interval = duration / count as f64;
    (0..count).map(|i| i as f64 * interval).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StripLayout {
    pub width: u32,
    pub height: u32,
    pub count: u32,
}

impl Default for StripLayout {
    fn default() -> Self {
        StripLayout { width: 600, height: 64, count: THUMBNAIL_COUNT }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StripSlot {
    pub index: u32,
    pub x: f64,
    pub width: f64,
    pub height: u32,
    pub timestamp: f64,
}

impl StripLayout {
    pub fn slots(&self, duration: f64) -> Vec<StripSlot> {
        let slot_width = self.width as f64 / self.count.max(1) as f64;
        thumbnail_timestamps(duration, self.count)
            .into_iter()
            .enumerate()
            .map(|(i, timestamp)| StripSlot {
                index: i as u32,
                x: i as f64 * slot_width,
                width: slot_width,
                height: self.height,
                timestamp,
            })
            .collect()
    }
}

/// Something that can be positioned in time and asked for the frame there.
#[async_trait]
pub trait FrameSource: Send {
    /// Resolves once the seek has completed.
    async fn seek(&mut self, timestamp: f64) -> Result<()>;

    /// Encoded image of the current frame, sized for `slot`.
    async fn capture(&mut self, slot: &StripSlot) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub slot: StripSlot,
    pub image: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailStrip {
    pub layout: StripLayout,
    pub thumbnails: Vec<Thumbnail>,
}

/// Seeks and captures one slot at a time; slot `i + 1` never starts before
/// slot `i` has been drawn.
pub async fn generate_thumbnails<S: FrameSource + ?Sized>(
    source: &mut S,
    duration: f64,
    layout: StripLayout,
) -> Result<ThumbnailStrip> {
    let mut thumbnails = Vec::with_capacity(layout.count as usize);

    for slot in layout.slots(duration) {
        source.seek(slot.timestamp).await?;
        let image = match source.capture(&slot).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("thumbnail {} at {:.3}s failed: {}", slot.index, slot.timestamp, e);
                None
            }
        };
        thumbnails.push(Thumbnail { slot, image });
    }

    debug!("generated {} thumbnails for {:.3}s", thumbnails.len(), duration);
    Ok(ThumbnailStrip { layout, thumbnails })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_hours_minutes_seconds() {
        assert_eq!(format_time(0.0), "00:00:00");
        assert_eq!(format_time(59.9), "00:00:59");
        assert_eq!(format_time(3725.0), "01:02:05");
        assert_eq!(format_time(-3.0), "00:00:00");
    }

    #[test]
    fn trim_strings_round_trip_to_the_second() {
        for (s, e) in [(0.0, 0.0), (12.0, 45.0), (59.0, 3601.0), (7.4, 90.9)] {
            let range = TrimRange::new(s, e, 4000.0).unwrap();
            assert_eq!(parse_time(&range.start_time()).unwrap(), f64::floor(s));
            assert_eq!(parse_time(&range.duration_time()).unwrap(), f64::floor(e - s));
        }
    }

    #[test]
    fn rejects_bad_ranges() {
        assert!(TrimRange::new(-1.0, 5.0, 10.0).is_err());
        assert!(TrimRange::new(6.0, 5.0, 10.0).is_err());
        assert!(TrimRange::new(0.0, 11.0, 10.0).is_err());
        assert!(parse_time("1:2").is_err());
        assert!(parse_time("00:61:00").is_err());
    }

    #[test]
    fn default_range_caps_at_thirty_seconds() {
        assert_eq!(
            default_trim_range(45.0, DEFAULT_TRIM_WINDOW),
            TrimRange { start: 0.0, end: 30.0 }
        );
        assert_eq!(
            default_trim_range(12.0, DEFAULT_TRIM_WINDOW),
            TrimRange { start: 0.0, end: 12.0 }
        );
    }

    #[test]
    fn trim_args_only_when_cutting() {
        let full = TrimRange { start: 0.0, end: 20.0 };
        assert!(full.args(20.0).is_empty());
        let cut = TrimRange { start: 5.0, end: 20.0 };
        assert_eq!(cut.args(20.0), vec!["-ss", "00:00:05", "-t", "00:00:15"]);
        let head = TrimRange { start: 0.0, end: 30.0 };
        assert_eq!(head.args(45.0), vec!["-ss", "00:00:00", "-t", "00:00:30"]);
    }

    #[test]
    fn ten_increasing_timestamps() {
        let ts = thumbnail_timestamps(50.0, THUMBNAIL_COUNT);
        assert_eq!(ts.len(), 10);
        assert_eq!(ts[0], 0.0);
        assert_eq!(ts[9], 45.0);
        assert!(ts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn slots_partition_the_strip() {
        let slots = StripLayout::default().slots(100.0);
        assert_eq!(slots.len(), 10);
        assert_eq!(slots[3].x, 180.0);
        assert_eq!(slots[3].width, 60.0);
        assert_eq!(slots[3].timestamp, 30.0);
    }

    #[derive(Default)]
    struct ScriptedSource {
        position: f64,
        events: Vec<String>,
        fail_at: Option<u32>,
    }

    #[async_trait]
    impl FrameSource for ScriptedSource {
        async fn seek(&mut self, timestamp: f64) -> Result<()> {
            tokio::task::yield_now().await;
            self.position = timestamp;
            self.events.push(format!("seek {}", timestamp));
            Ok(())
        }

        async fn capture(&mut self, slot: &StripSlot) -> Result<Vec<u8>> {
            self.events.push(format!("draw {} @ {}", slot.index, self.position));
            if self.fail_at == Some(slot.index) {
                return Err(ConvertError::Probe(String::from("decode failed")));
            }
            Ok(vec![slot.index as u8])
        }
    }

    #[tokio::test]
    async fn captures_strictly_in_order() {
        let mut source = ScriptedSource { fail_at: Some(4), ..Default::default() };
        let strip = generate_thumbnails(&mut source, 20.0, StripLayout::default()).await.unwrap();

        assert_eq!(strip.thumbnails.len(), 10);
        assert!(strip.thumbnails[4].image.is_none());
        assert_eq!(strip.thumbnails[5].image, Some(vec![5]));
        assert_eq!(source.events.len(), 20);
        for i in 0..10usize {
            assert_eq!(source.events[2 * i], format!("seek {}", i as f64 * 2.0));
            assert_eq!(source.events[2 * i + 1], format!("draw {} @ {}", i, i as f64 * 2.0));
        }
    }
}
