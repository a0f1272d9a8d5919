use super::backend::{BindTarget, RawHandle, ResourceKind, TextureExtent};
use super::context::GraphicsContext;
use super::error::ResourceAllocationError;
use super::resource::GpuResource;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureDimension {
    D1,
    D2,
}

/// Logical pixel formats a [`Texture`] can be created with.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
    Rgba32F,
    R8,
    R32F,
    R8Ui,
}

/// Channel layout of the data passed to an upload.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ExternalFormat {
    Red,
    RedInteger,
    Rgb,
    Rgba,
}

/// Storage format of the texture on the device.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum InternalFormat {
    R8,
    R32F,
    R8Ui,
    Rgb8,
    Rgba8,
    Rgba32F,
}

/// Component type of uploaded data.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PixelType {
    UnsignedByte,
    Float,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct FormatTriple {
    pub external: ExternalFormat,
    pub internal: InternalFormat,
    pub pixel_type: PixelType,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 6] = [
        PixelFormat::Rgb8,
        PixelFormat::Rgba8,
        PixelFormat::Rgba32F,
        PixelFormat::R8,
        PixelFormat::R32F,
        PixelFormat::R8Ui,
    ];

    /// Fixed mapping from logical format to upload/storage formats.
    pub const fn derive(self) -> FormatTriple {
        use ExternalFormat as E;
        use InternalFormat as I;
        use PixelType as T;

        let (external, internal, pixel_type) = match self {
            PixelFormat::R8 => (E::Red, I::R8, T::UnsignedByte),
            PixelFormat::R32F => (E::Red, I::R32F, T::Float),
            PixelFormat::R8Ui => (E::RedInteger, I::R8Ui, T::UnsignedByte),
            PixelFormat::Rgb8 => (E::Rgb, I::Rgb8, T::UnsignedByte),
            PixelFormat::Rgba8 => (E::Rgba, I::Rgba8, T::UnsignedByte),
            PixelFormat::Rgba32F => (E::Rgba, I::Rgba32F, T::Float),
        };
        FormatTriple {
            external,
            internal,
            pixel_type,
        }
    }
}

impl ExternalFormat {
    #[inline]
    pub const fn channels(self) -> u32 {
        match self {
            ExternalFormat::Red | ExternalFormat::RedInteger => 1,
            ExternalFormat::Rgb => 3,
            ExternalFormat::Rgba => 4,
        }
    }
}

impl PixelType {
    #[inline]
    pub const fn size(self) -> u32 {
        match self {
            PixelType::UnsignedByte => 1,
            PixelType::Float => 4,
        }
    }
}

impl FormatTriple {
    /// Bytes per texel of upload data.
    #[inline]
    pub const fn bytes_per_pixel(self) -> u32 {
        self.external.channels() * self.pixel_type.size()
    }
}

impl InternalFormat {
    /// Whether the format may be bound to a writable image unit.
    #[inline]
    pub const fn is_image_unit_capable(self) -> bool {
        !matches!(self, InternalFormat::Rgb8 | InternalFormat::Rgba8)
    }
}

/// Sampling behaviour outside `[0, 1]`, applied to every axis of the texture.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum WrapPolicy {
    #[default]
    ClampToBorder,
    ClampToEdge,
    Repeat,
}

/// Sampler/storage configuration handed to the backend at construction.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TextureParams {
    pub dimension: TextureDimension,
    pub format: FormatTriple,
    /// Wrap along S (every texture).
    pub wrap_s: WrapPolicy,
    /// Wrap along T (2D textures only).
    pub wrap_t: Option<WrapPolicy>,
}

impl TextureParams {
    pub fn new(dimension: TextureDimension, format: FormatTriple, wrap: WrapPolicy) -> Self {
        Self {
            dimension,
            format,
            wrap_s: wrap,
            wrap_t: match dimension {
                TextureDimension::D1 => None,
                TextureDimension::D2 => Some(wrap),
            },
        }
    }
}

/// A 1D or 2D texture with linear filtering.
#[derive(Debug)]
pub struct Texture {
    resource: GpuResource,
    params: TextureParams,
    pixel_format: PixelFormat,
    extent: Option<TextureExtent>,
}

impl Texture {
    pub fn new(
        ctx: &GraphicsContext,
        dimension: TextureDimension,
        pixel_format: PixelFormat,
        wrap: WrapPolicy,
    ) -> Result<Self, ResourceAllocationError> {
        let resource = GpuResource::new(ctx, ResourceKind::Texture)?;
        let params = TextureParams::new(dimension, pixel_format.derive(), wrap);
        ctx.backend().configure_texture(resource.handle(), &params);

        Ok(Self {
            resource,
            params,
            pixel_format,
            extent: None,
        })
    }

    /// (Re)allocates 2D storage and optionally uploads `data`.
    ///
    /// Calling this on a 1D texture is a caller error; it is logged, not rejected.
    pub fn update_pixel_data_2d(&mut self, width: u32, height: u32, data: Option<&[u8]>) {
        self.upload(TextureDimension::D2, TextureExtent::new(width, height), data);
    }

    /// (Re)allocates 1D storage and optionally uploads `data`.
    pub fn update_pixel_data_1d(&mut self, width: u32, data: Option<&[u8]>) {
        self.upload(TextureDimension::D1, TextureExtent::new(width, 1), data);
    }

    fn upload(&mut self, called_as: TextureDimension, extent: TextureExtent, data: Option<&[u8]>) {
        if called_as != self.params.dimension {
            log::debug!(
                "{:?} upload on a {:?} texture {}",
                called_as,
                self.params.dimension,
                self.resource.handle()
            );
        }

        if let Some(bytes) = data {
            let needed = extent.texels() * self.params.format.bytes_per_pixel() as u64;
            if (bytes.len() as u64) < needed {
                log::error!(
                    "texture {} upload of {}x{} needs {needed} bytes, got {}; ignored",
                    self.resource.handle(),
                    extent.width,
                    extent.height,
                    bytes.len()
                );
                return;
            }
        }

        self.resource
            .context()
            .backend()
            .upload_texture(self.resource.handle(), extent, data);
        self.extent = Some(extent);
    }

    /// Selects this texture on sampled slot `slot`.
    pub fn bind(&self, slot: u32) {
        self.resource.bind(BindTarget::TextureSlot(slot));
    }

    pub fn unbind(&self, slot: u32) {
        self.resource.unbind(BindTarget::TextureSlot(slot));
    }

    /// Exposes the texture to compute shaders as a writable image on `unit`.
    ///
    /// Returns `false` (and does nothing) for formats that cannot be written
    /// through an image unit, or before storage has been allocated.
    pub fn bind_to_image_unit(&self, unit: u32) -> bool {
        let internal = self.params.format.internal;
        if !internal.is_image_unit_capable() {
            log::error!(
                "{:?} texture {} cannot be bound to image unit {unit}",
                self.pixel_format,
                self.resource.handle()
            );
            return false;
        }
        if self.extent.is_none() {
            log::warn!(
                "texture {} has no storage yet; image unit {unit} left unbound",
                self.resource.handle()
            );
            return false;
        }
        self.resource
            .context()
            .backend()
            .bind_image_unit(unit, self.resource.handle(), internal);
        true
    }

    /// Whether storage has been allocated.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.extent.is_some()
    }

    #[inline]
    pub fn extent(&self) -> Option<TextureExtent> {
        self.extent
    }

    #[inline]
    pub fn dimension(&self) -> TextureDimension {
        self.params.dimension
    }

    #[inline]
    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    #[inline]
    pub fn params(&self) -> &TextureParams {
        &self.params
    }

    #[inline]
    pub fn handle(&self) -> RawHandle {
        self.resource.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_triples_match_table() {
        let expected = [
            (PixelFormat::R8, ExternalFormat::Red, InternalFormat::R8, PixelType::UnsignedByte),
            (PixelFormat::R32F, ExternalFormat::Red, InternalFormat::R32F, PixelType::Float),
            (
                PixelFormat::R8Ui,
                ExternalFormat::RedInteger,
                InternalFormat::R8Ui,
                PixelType::UnsignedByte,
            ),
            (PixelFormat::Rgb8, ExternalFormat::Rgb, InternalFormat::Rgb8, PixelType::UnsignedByte),
            (
                PixelFormat::Rgba8,
                ExternalFormat::Rgba,
                InternalFormat::Rgba8,
                PixelType::UnsignedByte,
            ),
            (
                PixelFormat::Rgba32F,
                ExternalFormat::Rgba,
                InternalFormat::Rgba32F,
                PixelType::Float,
            ),
        ];

        for (format, external, internal, pixel_type) in expected {
            assert_eq!(
                format.derive(),
                FormatTriple {
                    external,
                    internal,
                    pixel_type
                },
                "{format:?}"
            );
        }
    }

    #[test]
    fn bytes_per_pixel() {
        assert_eq!(PixelFormat::R8.derive().bytes_per_pixel(), 1);
        assert_eq!(PixelFormat::R32F.derive().bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::Rgb8.derive().bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::Rgba32F.derive().bytes_per_pixel(), 16);
    }

    #[test]
    fn image_unit_capability() {
        let capable: Vec<PixelFormat> = PixelFormat::ALL
            .into_iter()
            .filter(|f| f.derive().internal.is_image_unit_capable())
            .collect();
        assert_eq!(
            capable,
            vec![PixelFormat::Rgba32F, PixelFormat::R8, PixelFormat::R32F, PixelFormat::R8Ui]
        );
    }

    #[test]
    fn wrap_applies_to_t_only_for_2d() {
        let one = TextureParams::new(TextureDimension::D1, PixelFormat::Rgb8.derive(), WrapPolicy::Repeat);
        let two = TextureParams::new(TextureDimension::D2, PixelFormat::R32F.derive(), WrapPolicy::Repeat);
        assert_eq!(one.wrap_t, None);
        assert_eq!(two.wrap_t, Some(WrapPolicy::Repeat));
    }
}
