use fractal_engine::gpu::EmbeddedShaderSource;

/// The bundled WGSL, keyed by the paths `FrameConfig` uses by default.
pub fn embedded() -> EmbeddedShaderSource {
    EmbeddedShaderSource::new()
        .with("mandelbrot.wgsl", include_str!("../shaders/mandelbrot.wgsl"))
        .with("quad_vs.wgsl", include_str!("../shaders/quad_vs.wgsl"))
        .with("quad_fs.wgsl", include_str!("../shaders/quad_fs.wgsl"))
}
