use crate::entity::EntityId;
use crate::error::RenderError;

/// Format of the entity-id attachment. One unfiltered integer per pixel;
/// `0` means "no entity here".
pub(crate) const ID_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Uint;

pub(crate) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

const COPY_ROW_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// Offscreen render targets for one scene: the multisampled color image with
/// its single-sample resolve, and a single-sample integer attachment holding
/// the entity id of the topmost primitive at each pixel.
///
/// Integer formats cannot be multisampled or resolved, so entity ids are
/// drawn in their own single-sample pass; with per-pixel ids the result is
/// identical to resolving with nearest filtering. The resolved color image is
/// what callers display; the id image is only ever read back.
pub struct PickingTarget {
    width: u32,
    height: u32,
    sample_count: u32,
    format: wgpu::TextureFormat,

    msaa_color: Option<wgpu::TextureView>,
    resolved_color: wgpu::Texture,
    resolved_color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,

    id_texture: wgpu::Texture,
    id_view: wgpu::TextureView,
    id_depth_view: wgpu::TextureView,

    /// Reused 4-byte staging buffer for single-pixel id reads.
    pick_buffer: wgpu::Buffer,
}

impl PickingTarget {
    pub fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        sample_count: u32,
    ) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidViewport(width, height));
        }
        let sample_count = validate_sample_count(sample_count);

        let msaa_color = (sample_count > 1).then(|| {
            create_texture(
                device,
                "msaa color",
                format,
                width,
                height,
                sample_count,
                wgpu::TextureUsages::RENDER_ATTACHMENT,
            )
            .create_view(&wgpu::TextureViewDescriptor::default())
        });
        let resolved_color = create_texture(
            device,
            "resolved color",
            format,
            width,
            height,
            1,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        );
        let resolved_color_view =
            resolved_color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = create_texture(
            device,
            "depth",
            DEPTH_FORMAT,
            width,
            height,
            sample_count,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        )
        .create_view(&wgpu::TextureViewDescriptor::default());

        let id_texture = create_texture(
            device,
            "entity id",
            ID_FORMAT,
            width,
            height,
            1,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        );
        let id_view = id_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id_depth_view = create_texture(
            device,
            "entity id depth",
            DEPTH_FORMAT,
            width,
            height,
            1,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        )
        .create_view(&wgpu::TextureViewDescriptor::default());

        let pick_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("entity id pick"),
            size: std::mem::size_of::<u32>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            width,
            height,
            sample_count,
            format,
            msaa_color,
            resolved_color,
            resolved_color_view,
            depth_view,
            id_texture,
            id_view,
            id_depth_view,
            pick_buffer,
        })
    }

    /// Recreates every attachment at the new size. Contents are discarded;
    /// the caller re-renders before the next read.
    pub fn resize(
        &mut self,
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> Result<(), RenderError> {
        *self = Self::new(device, self.format, width, height, self.sample_count)?;
        Ok(())
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// The single-sample color image holding the finished frame.
    pub fn display_texture(&self) -> &wgpu::Texture {
        &self.resolved_color
    }

    pub fn display_view(&self) -> &wgpu::TextureView {
        &self.resolved_color_view
    }

    /// Color attachment for the display pass. Multisampled rendering resolves
    /// into the display image as part of the pass.
    pub(crate) fn color_attachment(
        &self,
        load: wgpu::LoadOp<wgpu::Color>,
    ) -> wgpu::RenderPassColorAttachment<'_> {
        match &self.msaa_color {
            Some(msaa_view) => wgpu::RenderPassColorAttachment {
                view: msaa_view,
                resolve_target: Some(&self.resolved_color_view),
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            },
            None => wgpu::RenderPassColorAttachment {
                view: &self.resolved_color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            },
        }
    }

    pub(crate) fn id_attachment(&self) -> wgpu::RenderPassColorAttachment<'_> {
        wgpu::RenderPassColorAttachment {
            view: &self.id_view,
            resolve_target: None,
            ops: wgpu::Operations {
                // Clearing to zero makes empty pixels read back as "nothing".
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store,
            },
        }
    }

    pub(crate) fn depth_attachment(
        &self,
        for_id_pass: bool,
    ) -> wgpu::RenderPassDepthStencilAttachment<'_> {
        wgpu::RenderPassDepthStencilAttachment {
            view: if for_id_pass {
                &self.id_depth_view
            } else {
                &self.depth_view
            },
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(0),
                store: wgpu::StoreOp::Discard,
            }),
        }
    }

    pub(crate) fn id_texture_view(&self) -> &wgpu::TextureView {
        &self.id_view
    }

    /// Reads the entity id under the given pixel from the last rendered
    /// frame. Out-of-bounds pixels, empty pixels and a failed readback all
    /// yield [`EntityId::INVALID`].
    ///
    /// Blocks until the copy completes; the read is a single texel, so the
    /// stall is the queue flush, not the transfer.
    pub fn read_entity_id(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        x: u32,
        y: u32,
    ) -> EntityId {
        if x >= self.width || y >= self.height {
            log::warn!(
                "pick at ({x}, {y}) is outside the {}x{} target",
                self.width,
                self.height
            );
            return EntityId::INVALID;
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("entity id readback"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.id_texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.pick_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: None,
                    rows_per_image: None,
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(Some(encoder.finish()));

        let raw = {
            let slice = self.pick_buffer.slice(..);
            if let Err(error) = block_on_map(device, &slice) {
                log::error!("entity id readback failed: {error}");
                return EntityId::INVALID;
            }
            let data = slice.get_mapped_range();
            u32::from_le_bytes([data[0], data[1], data[2], data[3]])
        };
        self.pick_buffer.unmap();

        if raw == 0 {
            EntityId::INVALID
        } else {
            EntityId(raw)
        }
    }

    /// Copies the finished frame out of the display image as tightly packed
    /// RGBA8 rows. Intended for tests and screenshots, not per-frame use.
    pub fn read_display_rgba(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<Vec<u8>, RenderError> {
        let unpadded_bytes_per_row = self.width * 4;
        let padded_bytes_per_row = align_to(unpadded_bytes_per_row, COPY_ROW_ALIGNMENT);

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("display readback"),
            size: (padded_bytes_per_row * self.height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("display readback"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.resolved_color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: None,
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        block_on_map(device, &slice)?;
        let data = slice.get_mapped_range();

        let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * self.height) as usize);
        for row in data.chunks(padded_bytes_per_row as usize) {
            pixels.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
        }
        drop(data);
        staging.unmap();
        Ok(pixels)
    }
}

/// Clamps a requested MSAA sample count to what every backend supports.
/// `1` disables multisampling; anything from 2 to 4 rounds to 4; higher
/// requests are not portable and fall back to 4 with a warning.
pub(crate) fn validate_sample_count(requested: u32) -> u32 {
    match requested {
        0 | 1 => 1,
        2..=4 => 4,
        other => {
            log::warn!("sample count {other} is not supported everywhere, using 4");
            4
        }
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

fn create_texture(
    device: &wgpu::Device,
    label: &str,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    sample_count: u32,
    usage: wgpu::TextureUsages,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    })
}

/// Maps a buffer slice for reading and blocks until the GPU is done with it.
/// Fails when the device is lost or the map request is invalid; the buffer is
/// not mapped in that case and must not be read.
fn block_on_map(device: &wgpu::Device, slice: &wgpu::BufferSlice<'_>) -> Result<(), RenderError> {
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    let _ = device.poll(wgpu::MaintainBase::Wait);
    match receiver.recv() {
        Ok(result) => Ok(result?),
        // The callback is dropped unresolved when the device goes away.
        Err(_) => Err(wgpu::BufferAsyncError.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_count_is_clamped_to_supported_values() {
        assert_eq!(validate_sample_count(0), 1);
        assert_eq!(validate_sample_count(1), 1);
        assert_eq!(validate_sample_count(2), 4);
        assert_eq!(validate_sample_count(3), 4);
        assert_eq!(validate_sample_count(4), 4);
        assert_eq!(validate_sample_count(8), 4);
        assert_eq!(validate_sample_count(16), 4);
    }

    #[test]
    fn mapping_failure_surfaces_as_a_render_error() {
        let error = RenderError::from(wgpu::BufferAsyncError);
        assert!(matches!(error, RenderError::ReadbackMap(_)));
    }

    #[test]
    fn row_padding_rounds_up_to_copy_alignment() {
        assert_eq!(align_to(256, COPY_ROW_ALIGNMENT), 256);
        assert_eq!(align_to(257, COPY_ROW_ALIGNMENT), 512);
        // A 100-pixel-wide RGBA row is 400 bytes, padded to 512.
        assert_eq!(align_to(100 * 4, COPY_ROW_ALIGNMENT), 512);
    }
}
