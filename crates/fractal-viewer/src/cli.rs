use std::path::PathBuf;

use clap::Parser;
use fractal_engine::frame::FrameConfig;

#[derive(Parser, Debug)]
#[command(
    name = "fractal-viewer",
    version,
    about = "Interactive GPU Mandelbrot explorer"
)]
pub struct Cli {
    /// Load WGSL shaders from this directory instead of the bundled copies.
    #[arg(long, value_name = "DIR")]
    pub shader_dir: Option<PathBuf>,

    /// Recompute the field every frame (lazy mode off at startup).
    #[arg(long)]
    pub eager: bool,

    /// Width of the field texture in texels.
    #[arg(long, value_name = "PX", default_value_t = 2048)]
    pub texture_width: u32,

    /// Initial iteration budget.
    #[arg(long, value_name = "N", default_value_t = 256)]
    pub iterations: u32,

    /// Window size in logical pixels (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", default_value = "1280x720", value_parser = parse_size)]
    pub size: (u32, u32),

    /// Log filter in env_logger syntax; overrides RUST_LOG.
    #[arg(long, value_name = "FILTER", env = "FRACTAL_LOG")]
    pub log: Option<String>,

    /// Run this many frames against the headless backend and exit.
    #[arg(long, value_name = "N")]
    pub headless_frames: Option<u64>,
}

impl Cli {
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            texture_width: self.texture_width,
            lazy_mode: !self.eager,
            initial_iterations: self.iterations,
            ..FrameConfig::default()
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{value}`"))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("invalid dimension `{s}` in `{value}`"))
    };
    Ok((parse(w)?, parse(h)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_accepts_both_separators() {
        assert_eq!(parse_size("1280x720"), Ok((1280, 720)));
        assert_eq!(parse_size(" 800X600 "), Ok((800, 600)));
    }

    #[test]
    fn size_rejects_zero_and_garbage() {
        assert!(parse_size("0x720").is_err());
        assert!(parse_size("1280").is_err());
        assert!(parse_size("axb").is_err());
    }

    #[test]
    fn eager_turns_lazy_mode_off() {
        let cli = Cli::parse_from(["fractal-viewer", "--eager", "--iterations", "512"]);
        let config = cli.frame_config();
        assert!(!config.lazy_mode);
        assert_eq!(config.initial_iterations, 512);
        assert_eq!(cli.size, (1280, 720));
    }
}
