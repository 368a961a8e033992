use super::*;

use crate::arena::GeometryArena;

impl SceneRenderer {
    /// Renders one frame of the bound scene into its display image.
    ///
    /// Pass order: a multisampled display pass (background and grid, then
    /// batched geometry, resolved on store), a single-sample pass writing
    /// entity ids for picking, and an outline pass that reads the id image
    /// to trace silhouettes onto the resolved frame. The id attachment is
    /// cleared every frame even when the geometry pass is disabled, so a
    /// pick never reports geometry the presented frame does not show; the
    /// outline pass is skipped along with geometry, since it traces the id
    /// image.
    pub fn render_frame(&mut self) -> Result<(), RenderError> {
        let id = self.binding.current().ok_or(RenderError::NoSceneBound)?;
        self.scenes
            .get_mut(&id)
            .ok_or(RenderError::SceneNotFound(id))?
            .sync(&self.device, &self.queue);

        let scene = &self.scenes[&id];
        let passes = scene.passes();
        let sample_count = scene.target().sample_count();
        let display = self.pipelines.display_set(&self.device, sample_count);
        let scene = &self.scenes[&id];
        let (lines, triangles, textured, circles) = scene.arenas();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("scene frame"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("display"),
                color_attachments: &[Some(
                    scene
                        .target()
                        .color_attachment(wgpu::LoadOp::Clear(scene.clear_color())),
                )],
                depth_stencil_attachment: Some(scene.target().depth_attachment(false)),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_bind_group(0, scene.bind_group(), &[]);

            if passes.grid {
                pass.set_pipeline(&display.grid);
                pass.draw(0..3, 0..1);
            }
            if passes.geometry {
                draw_arena(&mut pass, &display.triangles, triangles);
                if !textured.is_empty() {
                    pass.set_bind_group(1, scene.texture_bind_group(), &[]);
                    draw_arena(&mut pass, &display.textured, textured);
                }
                draw_arena(&mut pass, &display.circles, circles);
                draw_arena(&mut pass, &display.lines, lines);
            }
        }

        {
            // Begun unconditionally: the clear keeps picking in step with
            // the displayed frame when geometry is toggled off.
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("entity ids"),
                color_attachments: &[Some(scene.target().id_attachment())],
                depth_stencil_attachment: Some(scene.target().depth_attachment(true)),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if passes.geometry {
                pass.set_bind_group(0, scene.bind_group(), &[]);
                draw_arena(&mut pass, &self.pipelines.id_set.triangles, triangles);
                if !textured.is_empty() {
                    pass.set_bind_group(1, scene.texture_bind_group(), &[]);
                    draw_arena(&mut pass, &self.pipelines.id_set.textured, textured);
                }
                draw_arena(&mut pass, &self.pipelines.id_set.circles, circles);
                draw_arena(&mut pass, &self.pipelines.id_set.lines, lines);
            }
        }

        if passes.outline && passes.geometry {
            let id_input = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("outline input"),
                layout: &self.outline_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(scene.target().id_texture_view()),
                }],
            });
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("outline"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: scene.target().display_view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipelines.outline);
            pass.set_bind_group(0, scene.bind_group(), &[]);
            pass.set_bind_group(1, &id_input, &[]);
            pass.draw(0..3, 0..1);
        }

        self.queue.submit(Some(encoder.finish()));

        if let Some(scene) = self.scenes.get_mut(&id) {
            scene.mark_rendered();
        }
        Ok(())
    }
}

fn draw_arena<V: bytemuck::Pod>(
    pass: &mut wgpu::RenderPass<'_>,
    pipeline: &wgpu::RenderPipeline,
    arena: &GeometryArena<V>,
) {
    let Some((vertex_buffer, index_buffer)) = arena.buffers() else {
        return;
    };
    pass.set_pipeline(pipeline);
    pass.set_vertex_buffer(0, vertex_buffer.slice(..));
    pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
    pass.draw_indexed(0..arena.index_count(), 0, 0..1);
}
