//! PNG capture configuration for the headless driver.

use std::path::PathBuf;

/// Capture mode configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Output directory for captured maps
    pub output_dir: PathBuf,

    /// Capture every Nth frame (the last frame is always captured)
    pub every_n_frames: usize,
}

impl CaptureConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            every_n_frames: 0,
        }
    }

    /// Whether `frame_num` of `total_frames` should be written to disk
    pub fn should_capture(&self, frame_num: usize, total_frames: usize) -> bool {
        let is_last = frame_num + 1 == total_frames;
        let on_interval = self.every_n_frames > 0 && frame_num % self.every_n_frames == 0;
        is_last || on_interval
    }

    /// Height map path for a frame
    pub fn height_path(&self, frame_num: usize) -> PathBuf {
        self.output_dir.join(format!("height_{:05}.png", frame_num))
    }

    /// Normal map path for a frame
    pub fn normal_path(&self, frame_num: usize) -> PathBuf {
        self.output_dir.join(format!("normal_{:05}.png", frame_num))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_schedule() {
        let mut config = CaptureConfig::new("out");
        assert!(!config.should_capture(0, 10));
        assert!(config.should_capture(9, 10));

        config.every_n_frames = 4;
        assert!(config.should_capture(0, 10));
        assert!(config.should_capture(4, 10));
        assert!(!config.should_capture(5, 10));
    }
}
