use regex::Regex;

/// Screen metrics are computed at most once per channel. The two states are
/// explicit; there are no negative sentinel values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenMetrics {
    Uncomputed,
    Computed(ScreenSize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    /// Reported when the window dump could not be parsed. Advisory data only;
    /// a run continues with unknown metrics.
    pub const UNKNOWN: ScreenSize = ScreenSize {
        width: 0,
        height: 0,
    };
}

/// Extracts {width, height} from `dumpsys window` output.
///
/// Matches the display frame line, e.g. `init=1080x1920 420dpi`, falling back
/// to the unrestricted-screen rect on older dumps.
pub fn parse_screen_size(output: &str) -> Option<ScreenSize> {
    let init_re = Regex::new(r"init=(\d+)x(\d+)").ok()?;
    let unrestricted_re = Regex::new(r"mUnrestrictedScreen=\(\d+,\d+\)\s+(\d+)x(\d+)").ok()?;

    for line in output.lines() {
        let captures = init_re
            .captures(line)
            .or_else(|| unrestricted_re.captures(line));
        if let Some(captures) = captures {
            let width = captures[1].parse().ok()?;
            let height = captures[2].parse().ok()?;
            return Some(ScreenSize { width, height });
        }
    }
    None
}

/// Converts physical pixels to density-independent pixels.
pub fn px_to_dp(px: u32, density: i32) -> i64 {
    if density <= 0 {
        return px as i64;
    }
    (px as f64 / (density as f64 / 160.0)).round() as i64
}
