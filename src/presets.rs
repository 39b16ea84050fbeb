use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConvertError;
use crate::formats::VideoFormat;

/// Fixed output constraints for a sharing target. Picking one overrides the
/// quality slider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Twitter,
    WhatsApp,
}

impl Preset {
    pub const ALL: [Preset; 2] = [Preset::Twitter, Preset::WhatsApp];

    pub fn name(&self) -> &'static str {
        match self {
            Preset::Twitter => "twitter",
            Preset::WhatsApp => "whatsapp",
        }
    }

    pub fn max_bitrate(&self) -> &'static str {
        match self {
            Preset::Twitter => "5M",
            Preset::WhatsApp => "3M",
        }
    }

    /// Seconds. Shown to the user, not enforced.
    pub fn max_duration(&self) -> u32 {
        match self {
            Preset::Twitter => 140,
            Preset::WhatsApp => 30,
        }
    }

    pub fn format(&self) -> VideoFormat {
        VideoFormat::Mp4
    }

    pub fn resolution(&self) -> (u32, u32) {
        match self {
            Preset::Twitter => (1280, 720),
            Preset::WhatsApp => (848, 480),
        }
    }

    pub fn scale_filter(&self) -> String {
        let (w, h) = self.resolution();
        format!("scale={}:{}", w, h)
    }

    pub fn args(&self) -> Vec<String> {
        let bitrate = self.max_bitrate().to_string();
        let mut args: Vec<String> = Vec::with_capacity(8);
        args.push("-b:v".to_string());
        args.push(bitrate.clone());
        args.push("-vf".to_string());
        args.push(self.scale_filter());
        args.push("-maxrate".to_string());
        args.push(bitrate.clone());
        args.push("-bufsize".to_string());
        args.push(bitrate);
        args
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Preset {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name() == lower)
            .ok_or_else(|| ConvertError::UnsupportedFormat(format!("unknown preset {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twitter_args() {
        assert_eq!(
            Preset::Twitter.args(),
            vec!["-b:v", "5M", "-vf", "scale=1280:720", "-maxrate", "5M", "-bufsize", "5M"]
        );
    }

    #[test]
    fn whatsapp_constraints() {
        let p: Preset = "WhatsApp".parse().unwrap();
        assert_eq!(p, Preset::WhatsApp);
        assert_eq!(p.max_duration(), 30);
        assert_eq!(p.format(), VideoFormat::Mp4);
        assert_eq!(p.scale_filter(), "scale=848:480");
    }
}
