//! OpenXR session lifecycle and per-frame presentation.
//!
//! Owns the runtime instance, session, reference space and the arrayed
//! stereo swapchain (one slice per eye), and drives the frame protocol:
//! event drain, wait/begin, acquire/composite/release, locate views, end.

use glam::Quat;
use openxr as xr;
use tracing::{debug, info};

use vrject_core::{
    composite_mode, plan_frame, CompositeMode, Error, FrameAction, Result, SessionEvent,
    SessionTracker, StereoParams, Transition,
};

use windows::core::Interface;
use windows::Win32::Graphics::Direct3D11::{
    ID3D11Device, ID3D11DeviceContext, ID3D11RenderTargetView, ID3D11Texture2D,
    D3D11_RENDER_TARGET_VIEW_DESC, D3D11_RENDER_TARGET_VIEW_DESC_0, D3D11_RTV_DIMENSION_TEXTURE2DARRAY,
    D3D11_TEX2D_ARRAY_RTV,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT, DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_FORMAT_B8G8R8A8_UNORM_SRGB,
    DXGI_FORMAT_R8G8B8A8_UNORM, DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
};

use crate::compositor::StereoCompositor;

const VIEW_COUNT: u32 = 2;
const VIEW_TYPE: xr::ViewConfigurationType = xr::ViewConfigurationType::PRIMARY_STEREO;

fn choose_color_format(formats: &[u32]) -> u32 {
    let preferred = [
        DXGI_FORMAT_R8G8B8A8_UNORM_SRGB.0 as u32,
        DXGI_FORMAT_B8G8R8A8_UNORM_SRGB.0 as u32,
        DXGI_FORMAT_R8G8B8A8_UNORM.0 as u32,
        DXGI_FORMAT_B8G8R8A8_UNORM.0 as u32,
    ];
    preferred
        .iter()
        .copied()
        .find(|fmt| formats.contains(fmt))
        .or_else(|| formats.first().copied())
        .unwrap_or(DXGI_FORMAT_R8G8B8A8_UNORM_SRGB.0 as u32)
}

/// Head-mounted session manager bound to the host's D3D11 device.
pub struct XrPresenter {
    instance: xr::Instance,
    session: xr::Session<xr::D3D11>,
    frame_waiter: xr::FrameWaiter,
    frame_stream: xr::FrameStream<xr::D3D11>,
    reference_space: xr::Space,
    swapchain: xr::Swapchain<xr::D3D11>,
    images: Vec<ID3D11Texture2D>,
    extent: xr::Extent2Di,
    swapchain_format: DXGI_FORMAT,
    event_buffer: xr::EventDataBuffer,
    tracker: SessionTracker,
    shut_down: bool,
    head_pose: Quat,
    compositor: StereoCompositor,
    device: ID3D11Device,
    context: ID3D11DeviceContext,
}

impl XrPresenter {
    /// One-shot, strictly ordered acquisition: loader, instance, system,
    /// session bound to the host device, view configuration, stereo image
    /// pool, reference space. Any failure aborts; the openxr handles drop
    /// in reverse acquisition order.
    pub fn new(device: &ID3D11Device, context: &ID3D11DeviceContext) -> Result<Self> {
        let entry = unsafe { xr::Entry::load() }
            .map_err(|e| Error::runtime(format!("OpenXR loader: {e:?}")))?;
        let available = entry
            .enumerate_extensions()
            .map_err(|e| Error::runtime(format!("OpenXR ext enumerate: {e:?}")))?;
        if !available.khr_d3d11_enable {
            return Err(Error::unsupported("OpenXR KHR_d3d11_enable not available"));
        }
        let mut exts = xr::ExtensionSet::default();
        exts.khr_d3d11_enable = true;

        let app_info = xr::ApplicationInfo {
            application_name: "vrject",
            application_version: 1,
            engine_name: "vrject",
            engine_version: 1,
            api_version: xr::Version::new(1, 0, 0),
        };
        let instance = entry
            .create_instance(&app_info, &exts, &[])
            .map_err(|e| Error::runtime(format!("OpenXR create_instance: {e:?}")))?;
        let system = instance
            .system(xr::FormFactor::HEAD_MOUNTED_DISPLAY)
            .map_err(|e| Error::runtime(format!("OpenXR system: {e:?}")))?;

        let mut tracker = SessionTracker::new();
        tracker.instance_created();

        // Required by the runtime before session creation.
        let _requirements = instance
            .graphics_requirements::<xr::D3D11>(system)
            .map_err(|e| Error::runtime(format!("OpenXR graphics requirements: {e:?}")))?;

        let (session, frame_waiter, frame_stream) = unsafe {
            instance
                .create_session::<xr::D3D11>(
                    system,
                    &xr::d3d::SessionCreateInfoD3D11 {
                        device: device.as_raw() as *mut _,
                    },
                )
                .map_err(|e| Error::runtime(format!("OpenXR create_session: {e:?}")))?
        };
        tracker.session_created();

        let views = instance
            .enumerate_view_configuration_views(system, VIEW_TYPE)
            .map_err(|e| Error::runtime(format!("OpenXR view configuration: {e:?}")))?;
        if views.len() < VIEW_COUNT as usize {
            return Err(Error::runtime("stereo view configuration unavailable"));
        }
        let width = views[0].recommended_image_rect_width;
        let height = views[0].recommended_image_rect_height;

        let formats = session
            .enumerate_swapchain_formats()
            .map_err(|e| Error::runtime(format!("OpenXR swapchain formats: {e:?}")))?;
        let format = choose_color_format(&formats);

        let swapchain = session
            .create_swapchain(&xr::SwapchainCreateInfo {
                create_flags: xr::SwapchainCreateFlags::EMPTY,
                usage_flags: xr::SwapchainUsageFlags::COLOR_ATTACHMENT
                    | xr::SwapchainUsageFlags::SAMPLED,
                format,
                sample_count: 1,
                width,
                height,
                face_count: 1,
                array_size: VIEW_COUNT,
                mip_count: 1,
            })
            .map_err(|e| Error::runtime(format!("OpenXR swapchain: {e:?}")))?;

        let images: Vec<ID3D11Texture2D> = swapchain
            .enumerate_images()
            .map_err(|e| Error::runtime(format!("OpenXR swapchain images: {e:?}")))?
            .iter()
            .map(|&ptr| unsafe {
                // The runtime owns these images; borrow the pointer and
                // take our own reference.
                let borrowed =
                    std::mem::ManuallyDrop::new(ID3D11Texture2D::from_raw(ptr as *mut _));
                (*borrowed).clone()
            })
            .collect();

        let reference_space = session
            .create_reference_space(xr::ReferenceSpaceType::LOCAL, xr::Posef::IDENTITY)
            .map_err(|e| Error::runtime(format!("OpenXR reference space: {e:?}")))?;

        info!(
            width,
            height,
            format,
            "OpenXR session created ({} swapchain images)",
            images.len()
        );

        Ok(Self {
            instance,
            session,
            frame_waiter,
            frame_stream,
            reference_space,
            swapchain,
            images,
            extent: xr::Extent2Di {
                width: width as i32,
                height: height as i32,
            },
            swapchain_format: DXGI_FORMAT(format as i32),
            event_buffer: xr::EventDataBuffer::new(),
            tracker,
            shut_down: false,
            head_pose: Quat::IDENTITY,
            compositor: StereoCompositor::new(),
            device: device.clone(),
            context: context.clone(),
        })
    }

    /// Orientation of the reference eye from the most recent rendered
    /// frame; identity until the first frame completes.
    pub fn head_pose(&self) -> Quat {
        self.head_pose
    }

    /// Drive one frame of the session protocol with the captured targets.
    ///
    /// Outside the running state this drains events and returns; an empty
    /// layer submission (should_render false) is a valid frame, not an
    /// error.
    pub fn render_frame(
        &mut self,
        color: &ID3D11Texture2D,
        depth: Option<&ID3D11Texture2D>,
        params: &StereoParams,
    ) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }

        while let Some(event) = self
            .instance
            .poll_event(&mut self.event_buffer)
            .map_err(|e| Error::runtime(format!("OpenXR poll_event: {e:?}")))?
        {
            if let xr::Event::SessionStateChanged(changed) = event {
                debug!("session state changed: {:?}", changed.state());
                let event = match changed.state() {
                    xr::SessionState::READY => Some(SessionEvent::Ready),
                    xr::SessionState::STOPPING => Some(SessionEvent::Stopping),
                    xr::SessionState::EXITING | xr::SessionState::LOSS_PENDING => {
                        Some(SessionEvent::Exiting)
                    }
                    _ => None,
                };
                let Some(event) = event else { continue };
                match self.tracker.handle(event) {
                    Transition::BeginSession => {
                        self.session
                            .begin(VIEW_TYPE)
                            .map_err(|e| Error::runtime(format!("OpenXR session begin: {e:?}")))?;
                        info!("session running");
                    }
                    Transition::EndSession => {
                        self.session
                            .end()
                            .map_err(|e| Error::runtime(format!("OpenXR session end: {e:?}")))?;
                        info!("session stopped");
                    }
                    Transition::Shutdown => {
                        self.shut_down = true;
                        return Ok(());
                    }
                    Transition::None => {}
                }
            }
        }

        // Should-render is not known until the frame has begun; a stopped
        // session is decided before waiting.
        if !self.tracker.can_submit() {
            return Ok(());
        }

        let frame_state = self
            .frame_waiter
            .wait()
            .map_err(|e| Error::runtime(format!("OpenXR wait: {e:?}")))?;
        self.frame_stream
            .begin()
            .map_err(|e| Error::runtime(format!("OpenXR begin: {e:?}")))?;

        // A begun frame must always be ended; anything short of a full
        // render completes the protocol with an empty layer list.
        let action = plan_frame(self.tracker.can_submit(), frame_state.should_render);
        if action != FrameAction::Render {
            return self
                .frame_stream
                .end(
                    frame_state.predicted_display_time,
                    xr::EnvironmentBlendMode::OPAQUE,
                    &[],
                )
                .map_err(|e| Error::runtime(format!("OpenXR end: {e:?}")));
        }

        let image_index = self
            .swapchain
            .acquire_image()
            .map_err(|e| Error::runtime(format!("OpenXR acquire: {e:?}")))?;
        self.swapchain
            .wait_image(xr::Duration::INFINITE)
            .map_err(|e| Error::runtime(format!("OpenXR wait_image: {e:?}")))?;

        let target = self.images[image_index as usize].clone();
        self.composite(&target, color, depth, params);

        self.swapchain
            .release_image()
            .map_err(|e| Error::runtime(format!("OpenXR release: {e:?}")))?;

        let (_view_state, views) = self
            .session
            .locate_views(
                VIEW_TYPE,
                frame_state.predicted_display_time,
                &self.reference_space,
            )
            .map_err(|e| Error::runtime(format!("OpenXR locate_views: {e:?}")))?;

        if views.len() < VIEW_COUNT as usize {
            return self
                .frame_stream
                .end(
                    frame_state.predicted_display_time,
                    xr::EnvironmentBlendMode::OPAQUE,
                    &[],
                )
                .map_err(|e| Error::runtime(format!("OpenXR end: {e:?}")));
        }

        // View 0's orientation stands in for the head this frame.
        let orientation = views[0].pose.orientation;
        self.head_pose = Quat::from_xyzw(orientation.x, orientation.y, orientation.z, orientation.w);

        let rect = xr::Rect2Di {
            offset: xr::Offset2Di { x: 0, y: 0 },
            extent: self.extent,
        };
        self.frame_stream
            .end(
                frame_state.predicted_display_time,
                xr::EnvironmentBlendMode::OPAQUE,
                &[&xr::CompositionLayerProjection::new()
                    .space(&self.reference_space)
                    .views(&[
                        xr::CompositionLayerProjectionView::new()
                            .pose(views[0].pose)
                            .fov(views[0].fov)
                            .sub_image(
                                xr::SwapchainSubImage::new()
                                    .swapchain(&self.swapchain)
                                    .image_array_index(0)
                                    .image_rect(rect),
                            ),
                        xr::CompositionLayerProjectionView::new()
                            .pose(views[1].pose)
                            .fov(views[1].fov)
                            .sub_image(
                                xr::SwapchainSubImage::new()
                                    .swapchain(&self.swapchain)
                                    .image_array_index(1)
                                    .image_rect(rect),
                            ),
                    ])],
            )
            .map_err(|e| Error::runtime(format!("OpenXR end: {e:?}")))
    }

    /// Fill both eye slices, preferring the depth-shift pass and falling
    /// back to a flat duplicate of the mono source.
    fn composite(
        &mut self,
        target: &ID3D11Texture2D,
        color: &ID3D11Texture2D,
        depth: Option<&ID3D11Texture2D>,
        params: &StereoParams,
    ) {
        let mode = composite_mode(depth.is_some(), self.compositor.available());
        if let (CompositeMode::Stereo, Some(depth)) = (mode, depth) {
            match self.render_stereo(target, color, depth, params) {
                Ok(()) => return,
                Err(err) => debug!("stereo pass unavailable, copying mono: {err}"),
            }
        }
        unsafe {
            self.context
                .CopySubresourceRegion(target, 0, 0, 0, 0, color, 0, None);
            self.context
                .CopySubresourceRegion(target, 1, 0, 0, 0, color, 0, None);
        }
    }

    fn render_stereo(
        &mut self,
        target: &ID3D11Texture2D,
        color: &ID3D11Texture2D,
        depth: &ID3D11Texture2D,
        params: &StereoParams,
    ) -> Result<()> {
        for eye in 0..VIEW_COUNT {
            let eye_target = self.eye_target(target, eye)?;
            self.compositor.render_eye(
                &self.device,
                &self.context,
                color,
                depth,
                &eye_target,
                eye,
                params,
            )?;
        }
        Ok(())
    }

    fn eye_target(&self, target: &ID3D11Texture2D, slice: u32) -> Result<ID3D11RenderTargetView> {
        let desc = D3D11_RENDER_TARGET_VIEW_DESC {
            Format: self.swapchain_format,
            ViewDimension: D3D11_RTV_DIMENSION_TEXTURE2DARRAY,
            Anonymous: D3D11_RENDER_TARGET_VIEW_DESC_0 {
                Texture2DArray: D3D11_TEX2D_ARRAY_RTV {
                    MipSlice: 0,
                    FirstArraySlice: slice,
                    ArraySize: 1,
                },
            },
        };
        let mut view = None;
        unsafe {
            self.device
                .CreateRenderTargetView(target, Some(&desc), Some(&mut view))
        }
        .map_err(|e| Error::graphics(format!("eye render target view: {e:?}")))?;
        view.ok_or_else(|| Error::graphics("eye render target view missing"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_chooser_prefers_srgb() {
        let formats = [
            DXGI_FORMAT_B8G8R8A8_UNORM.0 as u32,
            DXGI_FORMAT_R8G8B8A8_UNORM_SRGB.0 as u32,
        ];
        assert_eq!(
            choose_color_format(&formats),
            DXGI_FORMAT_R8G8B8A8_UNORM_SRGB.0 as u32
        );
    }

    #[test]
    fn test_format_chooser_falls_back_to_first_offered() {
        let formats = [42u32, 43u32];
        assert_eq!(choose_color_format(&formats), 42);
    }
}
