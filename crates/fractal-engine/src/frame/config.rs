use crate::navigation::{NavigationLimits, NavigationState};

/// The red-black ramp the explorer starts with.
pub const DEFAULT_COLORMAP: [[u8; 3]; 6] = [
    [0, 0, 0],
    [120, 0, 0],
    [220, 0, 0],
    [220, 230, 0],
    [180, 0, 0],
    [0, 0, 0],
];

/// Where the frame controller finds its shaders, relative to the source provider.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ShaderPaths {
    pub compute: String,
    pub vertex: String,
    pub fragment: String,
}

impl Default for ShaderPaths {
    fn default() -> Self {
        Self {
            compute: "mandelbrot.wgsl".to_string(),
            vertex: "quad_vs.wgsl".to_string(),
            fragment: "quad_fs.wgsl".to_string(),
        }
    }
}

/// Static setup of the compute-then-render frame.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Width of the field texture in texels. Its height follows the
    /// framebuffer aspect at startup.
    pub texture_width: u32,
    /// Compute workgroup edge; dispatches cover the texture in
    /// `local_size × local_size` tiles.
    pub local_size: u32,
    pub lazy_mode: bool,
    pub clear_color: [f32; 4],
    pub colormap: Vec<[u8; 3]>,
    pub shaders: ShaderPaths,

    /// Sampled slot of the field texture.
    pub field_slot: u32,
    pub colormap_slot: u32,
    /// Image unit the kernel writes through.
    pub field_image_unit: u32,

    pub initial_iterations: u32,
    pub limits: NavigationLimits,
}

impl FrameConfig {
    pub fn initial_state(&self) -> NavigationState {
        NavigationState::new(
            NavigationState::DEFAULT_CENTER,
            NavigationState::DEFAULT_HALF_RANGE,
            self.initial_iterations,
            &self.limits,
        )
    }

    /// Field texture extent for a framebuffer of `width × height`.
    pub fn texture_extent(&self, width: u32, height: u32) -> (u32, u32) {
        let tex_w = self.texture_width.max(1);
        if width == 0 || height == 0 {
            return (tex_w, tex_w);
        }
        let tex_h = (u64::from(tex_w) * u64::from(height) / u64::from(width)).max(1);
        (tex_w, tex_h as u32)
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            texture_width: 2048,
            local_size: 16,
            lazy_mode: true,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            colormap: DEFAULT_COLORMAP.to_vec(),
            shaders: ShaderPaths::default(),
            field_slot: 0,
            colormap_slot: 1,
            field_image_unit: 2,
            initial_iterations: NavigationState::DEFAULT_ITERATIONS,
            limits: NavigationLimits::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_follows_framebuffer_aspect() {
        let config = FrameConfig::default();
        assert_eq!(config.texture_extent(1280, 720), (2048, 1152));
        assert_eq!(config.texture_extent(0, 720), (2048, 2048));
    }
}
