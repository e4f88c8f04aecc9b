//! Vulkan window surface using ash
//!
//! Owns everything outside the renderer: instance, logical device, swapchain,
//! render pass, framebuffers, per-image command buffers and frame
//! synchronization. The host calls [`FrameHost::begin_frame`], lets the
//! renderer record into the open render pass, then calls
//! [`FrameHost::end_frame`] to submit and present.

mod instance;
mod swapchain;

use ash::khr::{surface, swapchain as khr_swapchain};
use ash::prelude::VkResult;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use self::instance::InstanceContext;
use self::swapchain::DepthTarget;
use crate::backend::VulkanDevice;
use crate::error::{DeviceError, SurfaceStateError};
use crate::surface::{DeviceProvider, FrameHost};

const FRAMES_IN_FLIGHT: usize = 2;

/// Surface creation options.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceDesc {
    /// Enable the Khronos validation layer if it is installed.
    pub validation: bool,
    pub vsync: bool,
}

impl Default for SurfaceDesc {
    fn default() -> Self {
        Self {
            validation: false,
            vsync: true,
        }
    }
}

fn init_error(what: &'static str) -> impl FnOnce(vk::Result) -> DeviceError {
    move |e| DeviceError::Initialization(format!("{}: {:?}", what, e))
}

/// Window-backed [`DeviceProvider`].
///
/// Must outlive every renderer created on it, and must be dropped before the
/// window it was created from.
pub struct VulkanSurface {
    _entry: ash::Entry,
    instance: InstanceContext,
    surface_fn: surface::Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
    device_name: String,
    device: VulkanDevice,
    graphics_queue: vk::Queue,
    swapchain_fn: khr_swapchain::Device,
    surface_format: vk::SurfaceFormatKHR,
    vsync: bool,
    render_pass: vk::RenderPass,

    // Swapchain generation
    swapchain: vk::SwapchainKHR,
    swapchain_images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    depth: Option<DepthTarget>,
    framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,

    // Commands and synchronization
    command_pool: vk::CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,
    render_finished: Vec<vk::Semaphore>,
    images_in_flight: Vec<vk::Fence>,
    image_available: Vec<vk::Semaphore>,
    in_flight: Vec<vk::Fence>,
    frame: usize,

    current_image: Option<u32>,
    requested_extent: vk::Extent2D,
    needs_recreate: bool,
}

impl VulkanSurface {
    pub fn new(window: &winit::window::Window, desc: &SurfaceDesc) -> Result<Self, DeviceError> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| DeviceError::Initialization(e.to_string()))?;

        let display_handle = window
            .display_handle()
            .map_err(|e| DeviceError::Initialization(e.to_string()))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| DeviceError::Initialization(e.to_string()))?;

        let surface_extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
            .map_err(init_error("Failed to query surface extensions"))?;
        let instance = instance::create_instance(&entry, surface_extensions, desc.validation)?;

        let surface_fn = surface::Instance::new(&entry, &instance.instance);
        let surface = match unsafe {
            ash_window::create_surface(
                &entry,
                &instance.instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
        } {
            Ok(surface) => surface,
            Err(e) => {
                unsafe { instance.destroy() };
                return Err(init_error("Failed to create surface")(e));
            }
        };

        let (physical_device, queue_family, raw_device) =
            match Self::create_device(&instance.instance, &surface_fn, surface) {
                Ok(created) => created,
                Err(e) => {
                    unsafe {
                        surface_fn.destroy_surface(surface, None);
                        instance.destroy();
                    }
                    return Err(e);
                }
            };

        let properties = unsafe {
            instance
                .instance
                .get_physical_device_properties(physical_device)
        };
        let device_name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| String::from("<unknown>"));

        let graphics_queue = unsafe { raw_device.get_device_queue(queue_family, 0) };
        let swapchain_fn = khr_swapchain::Device::new(&instance.instance, &raw_device);
        let device = VulkanDevice::new(&instance.instance, physical_device, raw_device);

        let size = window.inner_size();
        let requested_extent = vk::Extent2D {
            width: size.width,
            height: size.height,
        };

        // From here on Drop releases whatever was created; null handles are
        // ignored by the destroy calls.
        let mut this = Self {
            _entry: entry,
            instance,
            surface_fn,
            surface,
            physical_device,
            device_name,
            device,
            graphics_queue,
            swapchain_fn,
            surface_format: vk::SurfaceFormatKHR::default(),
            vsync: desc.vsync,
            render_pass: vk::RenderPass::null(),
            swapchain: vk::SwapchainKHR::null(),
            swapchain_images: Vec::new(),
            image_views: Vec::new(),
            depth: None,
            framebuffers: Vec::new(),
            extent: vk::Extent2D::default(),
            command_pool: vk::CommandPool::null(),
            command_buffers: Vec::new(),
            render_finished: Vec::new(),
            images_in_flight: Vec::new(),
            image_available: Vec::new(),
            in_flight: Vec::new(),
            frame: 0,
            current_image: None,
            requested_extent,
            needs_recreate: false,
        };

        let formats = unsafe {
            this.surface_fn
                .get_physical_device_surface_formats(physical_device, surface)
        }
        .map_err(init_error("Failed to query surface formats"))?;
        this.surface_format = swapchain::choose_surface_format(&formats).ok_or_else(|| {
            DeviceError::Initialization("Surface reports no formats".to_string())
        })?;

        let raw = this.device.raw().clone();
        this.render_pass = swapchain::create_render_pass(&raw, this.surface_format.format)
            .map_err(init_error("Failed to create render pass"))?;

        let pool_info = vk::CommandPoolCreateInfo {
            queue_family_index: queue_family,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };
        this.command_pool = unsafe { raw.create_command_pool(&pool_info, None) }
            .map_err(init_error("Failed to create command pool"))?;

        let fence_info = vk::FenceCreateInfo {
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        for _ in 0..FRAMES_IN_FLIGHT {
            let semaphore = unsafe { raw.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
                .map_err(init_error("Failed to create semaphore"))?;
            this.image_available.push(semaphore);
            let fence = unsafe { raw.create_fence(&fence_info, None) }
                .map_err(init_error("Failed to create fence"))?;
            this.in_flight.push(fence);
        }

        this.create_swapchain()?;

        log::info!(
            "Vulkan surface ready on '{}': {}x{} {:?}, {} swapchain images",
            this.device_name,
            this.extent.width,
            this.extent.height,
            this.surface_format.format,
            this.swapchain_images.len()
        );

        Ok(this)
    }

    fn find_queue_family(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        surface_fn: &surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Option<u32> {
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        queue_families
            .iter()
            .enumerate()
            .find(|(index, family)| {
                let supports_surface = unsafe {
                    surface_fn
                        .get_physical_device_surface_support(physical_device, *index as u32, surface)
                        .unwrap_or(false)
                };
                family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && supports_surface
            })
            .map(|(index, _)| index as u32)
    }

    /// Pick a device that can draw and present, discrete GPUs first, and
    /// create the logical device with the swapchain extension.
    fn create_device(
        instance: &ash::Instance,
        surface_fn: &surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, u32, ash::Device), DeviceError> {
        let physical_devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(init_error("Failed to enumerate physical devices"))?;

        let mut candidates: Vec<(vk::PhysicalDevice, u32, bool)> = physical_devices
            .into_iter()
            .filter_map(|pd| {
                let family = Self::find_queue_family(instance, pd, surface_fn, surface)?;
                let properties = unsafe { instance.get_physical_device_properties(pd) };
                let discrete = properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU;
                Some((pd, family, discrete))
            })
            .collect();
        candidates.sort_by_key(|&(_, _, discrete)| !discrete);

        let (physical_device, queue_family, _) = candidates.first().copied().ok_or_else(|| {
            DeviceError::Initialization("No suitable physical device".to_string())
        })?;

        let queue_priorities = [1.0f32];
        let queue_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities);
        let queue_infos = [queue_info];

        let device_extensions = [khr_swapchain::NAME.as_ptr()];
        let device_features = vk::PhysicalDeviceFeatures::default();

        let device_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&device_extensions)
            .enabled_features(&device_features);

        let device = unsafe { instance.create_device(physical_device, &device_info, None) }
            .map_err(init_error("Failed to create logical device"))?;

        Ok((physical_device, queue_family, device))
    }

    /// Build a new swapchain generation at `requested_extent`, retiring the
    /// old one.
    fn create_swapchain(&mut self) -> Result<(), DeviceError> {
        let raw = self.device.raw().clone();
        unsafe {
            raw.device_wait_idle()
                .map_err(init_error("Failed to wait for device idle"))?;
        }
        self.destroy_swapchain_targets();

        let capabilities = unsafe {
            self.surface_fn
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)
        }
        .map_err(init_error("Failed to query surface capabilities"))?;
        let present_modes = unsafe {
            self.surface_fn
                .get_physical_device_surface_present_modes(self.physical_device, self.surface)
        }
        .map_err(init_error("Failed to query present modes"))?;

        let extent = swapchain::choose_extent(
            &capabilities,
            self.requested_extent.width,
            self.requested_extent.height,
        );
        let old_swapchain = self.swapchain;

        let swapchain_info = vk::SwapchainCreateInfoKHR {
            surface: self.surface,
            min_image_count: swapchain::choose_image_count(&capabilities),
            image_format: self.surface_format.format,
            image_color_space: self.surface_format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform: capabilities.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: swapchain::choose_present_mode(&present_modes, self.vsync),
            clipped: vk::TRUE,
            old_swapchain,
            ..Default::default()
        };

        let created = unsafe { self.swapchain_fn.create_swapchain(&swapchain_info, None) };
        unsafe { self.swapchain_fn.destroy_swapchain(old_swapchain, None) };
        self.swapchain = match created {
            Ok(swapchain) => swapchain,
            Err(e) => {
                self.swapchain = vk::SwapchainKHR::null();
                return Err(init_error("Failed to create swapchain")(e));
            }
        };
        self.extent = extent;

        self.swapchain_images = unsafe { self.swapchain_fn.get_swapchain_images(self.swapchain) }
            .map_err(init_error("Failed to get swapchain images"))?;

        for &image in &self.swapchain_images {
            let view = swapchain::create_color_view(&raw, image, self.surface_format.format)
                .map_err(init_error("Failed to create swapchain image view"))?;
            self.image_views.push(view);
        }

        let depth = DepthTarget::new(&self.device, extent)
            .map_err(init_error("Failed to create depth target"))?;
        let depth_view = depth.view;
        self.depth = Some(depth);

        for &view in &self.image_views {
            let framebuffer =
                swapchain::create_framebuffer(&raw, self.render_pass, view, depth_view, extent)
                    .map_err(init_error("Failed to create framebuffer"))?;
            self.framebuffers.push(framebuffer);
        }

        self.create_per_image_resources()?;
        self.needs_recreate = false;

        log::debug!(
            "Swapchain created: {}x{}, {} images",
            extent.width,
            extent.height,
            self.swapchain_images.len()
        );
        Ok(())
    }

    /// Command buffers, present semaphores and fence slots, one per image.
    fn create_per_image_resources(&mut self) -> Result<(), DeviceError> {
        let raw = self.device.raw();
        let image_count = self.swapchain_images.len();

        if self.command_buffers.len() != image_count {
            unsafe {
                if !self.command_buffers.is_empty() {
                    raw.free_command_buffers(self.command_pool, &self.command_buffers);
                }
                self.command_buffers.clear();

                let alloc_info = vk::CommandBufferAllocateInfo {
                    command_pool: self.command_pool,
                    level: vk::CommandBufferLevel::PRIMARY,
                    command_buffer_count: image_count as u32,
                    ..Default::default()
                };
                self.command_buffers = raw
                    .allocate_command_buffers(&alloc_info)
                    .map_err(init_error("Failed to allocate command buffers"))?;
            }
        }

        while self.render_finished.len() < image_count {
            let semaphore = unsafe { raw.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
                .map_err(init_error("Failed to create semaphore"))?;
            self.render_finished.push(semaphore);
        }
        for semaphore in self.render_finished.drain(image_count..) {
            unsafe { raw.destroy_semaphore(semaphore, None) };
        }

        self.images_in_flight = vec![vk::Fence::null(); image_count];
        Ok(())
    }

    fn destroy_swapchain_targets(&mut self) {
        let raw = self.device.raw();
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                raw.destroy_framebuffer(framebuffer, None);
            }
            if let Some(depth) = self.depth.take() {
                depth.destroy(raw);
            }
            for view in self.image_views.drain(..) {
                raw.destroy_image_view(view, None);
            }
        }
        self.swapchain_images.clear();
    }

    /// Record the new window size. The swapchain is rebuilt at the start of
    /// the next frame with a non-zero extent.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.requested_extent = vk::Extent2D { width, height };
        self.needs_recreate = true;
    }

    /// End the render pass and submit image `slot`'s command buffer,
    /// signalling the current frame's fence.
    fn submit(&self, slot: usize) -> VkResult<()> {
        let raw = self.device.raw();
        let cmd = self.command_buffers[slot];

        let wait_semaphores = [self.image_available[self.frame]];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.render_finished[slot]];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            raw.cmd_end_render_pass(cmd);
            raw.end_command_buffer(cmd)?;
            raw.reset_fences(&[self.in_flight[self.frame]])?;
            raw.queue_submit(self.graphics_queue, &[submit_info], self.in_flight[self.frame])
        }
    }

    /// Replace the current frame's fence and acquire semaphore after a
    /// failed submit: the fence may be unsignaled with nothing pending and
    /// the semaphore signaled with no waiter.
    fn reset_frame_sync(&mut self) {
        let raw = self.device.raw().clone();
        let frame = self.frame;
        unsafe {
            let _ = raw.device_wait_idle();

            let old_fence = self.in_flight[frame];
            for fence in &mut self.images_in_flight {
                if *fence == old_fence {
                    *fence = vk::Fence::null();
                }
            }
            raw.destroy_fence(old_fence, None);
            raw.destroy_semaphore(self.image_available[frame], None);

            let fence_info = vk::FenceCreateInfo {
                flags: vk::FenceCreateFlags::SIGNALED,
                ..Default::default()
            };
            self.in_flight[frame] = raw.create_fence(&fence_info, None).unwrap_or_else(|e| {
                log::error!("Failed to recreate frame fence: {:?}", e);
                vk::Fence::null()
            });
            self.image_available[frame] = raw
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                .unwrap_or_else(|e| {
                    log::error!("Failed to recreate acquire semaphore: {:?}", e);
                    vk::Semaphore::null()
                });
        }
        self.frame = (frame + 1) % FRAMES_IN_FLIGHT;
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance.instance
    }
}

impl DeviceProvider for VulkanSurface {
    type Device = VulkanDevice;

    fn device(&self) -> &VulkanDevice {
        &self.device
    }

    fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    fn swapchain_image_count(&self) -> u32 {
        self.swapchain_images.len() as u32
    }

    fn swapchain_current_image(&self) -> Result<u32, SurfaceStateError> {
        self.current_image.ok_or(SurfaceStateError::NoCurrentImage)
    }

    fn command_buffer(&self, image_index: u32) -> Result<vk::CommandBuffer, SurfaceStateError> {
        let count = self.command_buffers.len() as u32;
        if image_index >= count {
            return Err(SurfaceStateError::ImageOutOfRange {
                index: image_index,
                count,
            });
        }
        if self.current_image != Some(image_index) {
            return Err(SurfaceStateError::NoCommandBuffer(image_index));
        }
        Ok(self.command_buffers[image_index as usize])
    }

    fn client_width(&self) -> u32 {
        if self.requested_extent.width == 0 {
            return 0;
        }
        self.extent.width
    }

    fn client_height(&self) -> u32 {
        if self.requested_extent.height == 0 {
            return 0;
        }
        self.extent.height
    }
}

impl FrameHost for VulkanSurface {
    /// Fails with a transient error while the window is minimized or the
    /// swapchain is being rebuilt.
    fn begin_frame(
        &mut self,
        clear_color: [f32; 4],
        clear_depth: f32,
    ) -> Result<u32, SurfaceStateError> {
        if let Some(image_index) = self.current_image {
            return Ok(image_index);
        }
        if self.requested_extent.width == 0 || self.requested_extent.height == 0 {
            return Err(SurfaceStateError::ZeroExtent);
        }
        if self.needs_recreate {
            if let Err(e) = self.create_swapchain() {
                log::error!("Swapchain recreation failed: {}", e);
                self.needs_recreate = true;
                return Err(SurfaceStateError::Recreating);
            }
        }

        let raw = self.device.raw();
        let frame_fence = self.in_flight[self.frame];
        unsafe {
            raw.wait_for_fences(&[frame_fence], true, u64::MAX)
                .map_err(SurfaceStateError::Query)?;
        }

        let acquired = unsafe {
            self.swapchain_fn.acquire_next_image(
                self.swapchain,
                u64::MAX,
                self.image_available[self.frame],
                vk::Fence::null(),
            )
        };
        let image_index = match acquired {
            Ok((index, suboptimal)) => {
                self.needs_recreate |= suboptimal;
                index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.needs_recreate = true;
                return Err(SurfaceStateError::Recreating);
            }
            Err(e) => return Err(SurfaceStateError::Query(e)),
        };
        let slot = image_index as usize;

        let image_fence = self.images_in_flight[slot];
        if image_fence != vk::Fence::null() && image_fence != frame_fence {
            unsafe {
                raw.wait_for_fences(&[image_fence], true, u64::MAX)
                    .map_err(SurfaceStateError::Query)?;
            }
        }
        self.images_in_flight[slot] = frame_fence;

        let cmd = self.command_buffers[slot];
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: clear_depth,
                    stencil: 0,
                },
            },
        ];
        let render_pass_begin = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(self.framebuffers[slot])
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.extent,
            })
            .clear_values(&clear_values);

        let begun = unsafe {
            raw.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .and_then(|()| raw.begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::default()))
        };
        if let Err(e) = begun {
            self.reset_frame_sync();
            return Err(SurfaceStateError::Query(e));
        }
        unsafe {
            self.device
                .raw()
                .cmd_begin_render_pass(cmd, &render_pass_begin, vk::SubpassContents::INLINE);
        }

        self.current_image = Some(image_index);
        Ok(image_index)
    }

    fn end_frame(&mut self) -> Result<(), DeviceError> {
        let Some(image_index) = self.current_image.take() else {
            return Ok(());
        };
        let slot = image_index as usize;

        if let Err(e) = self.submit(slot) {
            log::error!("Frame submission failed: {:?}", e);
            self.reset_frame_sync();
            return Err(DeviceError::Submit(e));
        }

        let signal_semaphores = [self.render_finished[slot]];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        self.frame = (self.frame + 1) % FRAMES_IN_FLIGHT;

        match unsafe { self.swapchain_fn.queue_present(self.graphics_queue, &present_info) } {
            Ok(suboptimal) => {
                self.needs_recreate |= suboptimal;
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.needs_recreate = true;
                Ok(())
            }
            Err(e) => Err(DeviceError::Present(e)),
        }
    }
}

impl Drop for VulkanSurface {
    fn drop(&mut self) {
        let raw = self.device.raw().clone();
        unsafe {
            let _ = raw.device_wait_idle();

            for &semaphore in self.image_available.iter().chain(&self.render_finished) {
                raw.destroy_semaphore(semaphore, None);
            }
            for &fence in &self.in_flight {
                raw.destroy_fence(fence, None);
            }
            raw.destroy_command_pool(self.command_pool, None);

            self.destroy_swapchain_targets();
            self.swapchain_fn.destroy_swapchain(self.swapchain, None);
            raw.destroy_render_pass(self.render_pass, None);

            raw.destroy_device(None);
            self.surface_fn.destroy_surface(self.surface, None);
            self.instance.destroy();
        }
    }
}
