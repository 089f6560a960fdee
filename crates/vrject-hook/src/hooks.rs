//! Swap-chain interception.
//!
//! Discovery creates a throwaway device and swap chain purely to read the
//! shared `IDXGISwapChain` vtable, then patches the Present and
//! ResizeBuffers slots. The replacement Present captures the host's color
//! and depth buffers, drives the VR frame, and always forwards to the
//! original so the flat window keeps rendering.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{LazyLock, Mutex};

use tracing::{debug, error, info, warn};

use vrject_core::{Config, Error, Result, StereoParams, YawTracker};

use windows::core::{HRESULT, Interface};
use windows::Win32::Foundation::HMODULE;
use windows::Win32::Graphics::Direct3D::{
    D3D_DRIVER_TYPE_HARDWARE, D3D_FEATURE_LEVEL, D3D_FEATURE_LEVEL_10_1, D3D_FEATURE_LEVEL_11_0,
};
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDeviceAndSwapChain, ID3D11DepthStencilView, ID3D11Device, ID3D11DeviceContext,
    ID3D11Resource, ID3D11Texture2D, D3D11_CREATE_DEVICE_FLAG, D3D11_SDK_VERSION,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT, DXGI_FORMAT_R8G8B8A8_UNORM, DXGI_MODE_DESC, DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::{
    IDXGISwapChain, DXGI_SWAP_CHAIN_DESC, DXGI_SWAP_EFFECT_DISCARD, DXGI_USAGE_RENDER_TARGET_OUTPUT,
};
use windows::Win32::UI::WindowsAndMessaging::{GetDesktopWindow, GetForegroundWindow};

use crate::input::{send_mouse_motion, Hotkeys};
use crate::vtable::{install_pair, SlotHook};
use crate::xr::XrPresenter;

/// Present's ordinal in the IDXGISwapChain vtable.
const PRESENT_SLOT: usize = 8;
/// ResizeBuffers' ordinal in the IDXGISwapChain vtable.
const RESIZE_BUFFERS_SLOT: usize = 13;

type PresentFn = unsafe extern "system" fn(IDXGISwapChain, u32, u32) -> HRESULT;
type ResizeBuffersFn =
    unsafe extern "system" fn(IDXGISwapChain, u32, u32, u32, DXGI_FORMAT, u32) -> HRESULT;

// Originals live in atomics so the replacement functions can forward without
// taking a lock; they are written before the table slot is patched.
static ORIGINAL_PRESENT: AtomicUsize = AtomicUsize::new(0);
static ORIGINAL_RESIZE: AtomicUsize = AtomicUsize::new(0);

static INSTALLED: Mutex<Option<(SlotHook, SlotHook)>> = Mutex::new(None);

static FRAME: LazyLock<Mutex<FrameState>> = LazyLock::new(|| Mutex::new(FrameState::new()));

/// Everything the replacement Present touches between frames.
struct FrameState {
    device: Option<ID3D11Device>,
    context: Option<ID3D11DeviceContext>,
    presenter: Option<XrPresenter>,
    vr_failed: bool,
    hotkeys: Hotkeys,
    params: StereoParams,
    yaw: YawTracker,
}

// Present is called from the host's render thread only; the mutex is the
// actual guard, this just satisfies the static's bound for the COM handles.
unsafe impl Send for FrameState {}

impl FrameState {
    fn new() -> Self {
        Self {
            device: None,
            context: None,
            presenter: None,
            vr_failed: false,
            hotkeys: Hotkeys::new(),
            params: StereoParams::default(),
            yaw: YawTracker::new(),
        }
    }
}

/// Seed runtime parameters from the loaded configuration. Call before
/// [`install`].
pub fn configure(config: &Config) {
    if let Ok(mut frame) = FRAME.lock() {
        frame.params = StereoParams::new(config.separation);
    }
}

/// Patch the swap-chain vtable. Idempotent; a second call is a no-op.
pub fn install() -> Result<()> {
    let mut guard = INSTALLED
        .lock()
        .map_err(|_| Error::hook("hook registry poisoned"))?;
    if guard.is_some() {
        return Ok(());
    }

    let table = discover_swapchain_vtable()?;
    let present_entry = unsafe { *table.add(PRESENT_SLOT) };
    let resize_entry = unsafe { *table.add(RESIZE_BUFFERS_SLOT) };
    ORIGINAL_PRESENT.store(present_entry, Ordering::SeqCst);
    ORIGINAL_RESIZE.store(resize_entry, Ordering::SeqCst);

    let hooks = unsafe {
        install_pair(
            table,
            (PRESENT_SLOT, hooked_present as usize),
            (RESIZE_BUFFERS_SLOT, hooked_resize_buffers as usize),
        )
    }?;

    info!(
        "swap-chain hooks installed (present {present_entry:#x}, resize {resize_entry:#x})"
    );
    *guard = Some(hooks);
    Ok(())
}

/// Restore both patched slots. Idempotent.
pub fn uninstall() {
    let Ok(mut guard) = INSTALLED.lock() else {
        return;
    };
    if let Some((mut present, mut resize)) = guard.take() {
        unsafe {
            if let Err(err) = present.restore() {
                warn!("restoring Present slot: {err}");
            }
            if let Err(err) = resize.restore() {
                warn!("restoring ResizeBuffers slot: {err}");
            }
        }
        info!("swap-chain hooks removed");
    }
}

/// Create a throwaway device and swap chain to locate the interface's
/// shared vtable. The objects are released on return; the table they
/// expose belongs to the DXGI module and stays valid.
fn discover_swapchain_vtable() -> Result<*mut usize> {
    let mut window = unsafe { GetForegroundWindow() };
    if window.is_invalid() {
        window = unsafe { GetDesktopWindow() };
    }

    let desc = DXGI_SWAP_CHAIN_DESC {
        BufferDesc: DXGI_MODE_DESC {
            Width: 2,
            Height: 2,
            Format: DXGI_FORMAT_R8G8B8A8_UNORM,
            ..Default::default()
        },
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
        BufferCount: 1,
        OutputWindow: window,
        Windowed: true.into(),
        SwapEffect: DXGI_SWAP_EFFECT_DISCARD,
        ..Default::default()
    };

    let feature_levels = [D3D_FEATURE_LEVEL_11_0, D3D_FEATURE_LEVEL_10_1];
    let mut swapchain: Option<IDXGISwapChain> = None;
    let mut device: Option<ID3D11Device> = None;
    let mut feature_level = D3D_FEATURE_LEVEL::default();
    unsafe {
        D3D11CreateDeviceAndSwapChain(
            None,
            D3D_DRIVER_TYPE_HARDWARE,
            HMODULE::default(),
            D3D11_CREATE_DEVICE_FLAG(0),
            Some(&feature_levels),
            D3D11_SDK_VERSION,
            Some(&desc),
            Some(&mut swapchain),
            Some(&mut device),
            Some(&mut feature_level),
            None,
        )
    }
    .map_err(|e| Error::graphics(format!("throwaway device creation: {e:?}")))?;

    let swapchain = swapchain.ok_or_else(|| Error::graphics("throwaway swap chain missing"))?;
    debug!(?feature_level, "throwaway device created");

    // First pointer-sized field of a COM object is its vtable.
    Ok(unsafe { *(swapchain.as_raw() as *const *mut usize) })
}

unsafe extern "system" fn hooked_present(
    swapchain: IDXGISwapChain,
    sync_interval: u32,
    flags: u32,
) -> HRESULT {
    // VR work must never take the host's frame down with it.
    let outcome = catch_unwind(AssertUnwindSafe(|| on_present(&swapchain)));
    if let Err(_panic) = outcome {
        error!("panic in frame interception; disabling VR for this process");
        if let Ok(mut frame) = FRAME.lock() {
            frame.vr_failed = true;
        }
    }

    let original = ORIGINAL_PRESENT.load(Ordering::SeqCst);
    let original: PresentFn = std::mem::transmute(original);
    original(swapchain, sync_interval, flags)
}

unsafe extern "system" fn hooked_resize_buffers(
    swapchain: IDXGISwapChain,
    buffer_count: u32,
    width: u32,
    height: u32,
    format: DXGI_FORMAT,
    flags: u32,
) -> HRESULT {
    // TODO: recreate the captured-buffer views after a resize instead of
    // relying on lazy re-binding in the next Present.
    debug!(width, height, "host resized swap-chain buffers");
    let original = ORIGINAL_RESIZE.load(Ordering::SeqCst);
    let original: ResizeBuffersFn = std::mem::transmute(original);
    original(swapchain, buffer_count, width, height, format, flags)
}

fn on_present(swapchain: &IDXGISwapChain) {
    let Ok(mut frame) = FRAME.lock() else {
        return;
    };
    if frame.vr_failed {
        return;
    }
    if let Err(err) = drive_frame(&mut frame, swapchain) {
        error!("VR frame failed, disabling: {err}");
        frame.vr_failed = true;
        frame.presenter = None;
    }
}

fn drive_frame(frame: &mut FrameState, swapchain: &IDXGISwapChain) -> Result<()> {
    if frame.device.is_none() {
        let device: ID3D11Device = unsafe { swapchain.GetDevice() }
            .map_err(|e| Error::graphics(format!("host device: {e:?}")))?;
        let mut context = None;
        unsafe { device.GetImmediateContext(&mut context) };
        let context =
            context.ok_or_else(|| Error::graphics("host immediate context missing"))?;
        frame.device = Some(device);
        frame.context = Some(context);
    }
    let device = frame
        .device
        .clone()
        .ok_or_else(|| Error::graphics("host device missing"))?;
    let context = frame
        .context
        .clone()
        .ok_or_else(|| Error::graphics("host immediate context missing"))?;

    if frame.presenter.is_none() {
        let presenter = XrPresenter::new(&device, &context)?;
        frame.presenter = Some(presenter);
    }

    let (increase, decrease) = frame.hotkeys.poll();
    if increase || decrease {
        frame.params.nudge(increase, decrease);
        info!(separation = frame.params.separation(), "separation adjusted");
    }

    let presenter = frame
        .presenter
        .as_mut()
        .ok_or_else(|| Error::runtime("presenter missing"))?;

    // Pose cached by the previous frame's render; one frame of latency is
    // inherent to reading it before this frame's locate.
    if let Some(dx) = frame.yaw.update(presenter.head_pose()) {
        send_mouse_motion(dx);
    }

    let color: ID3D11Texture2D = unsafe { swapchain.GetBuffer(0) }
        .map_err(|e| Error::graphics(format!("back buffer: {e:?}")))?;
    let depth = capture_depth(&context);

    presenter.render_frame(&color, depth.as_ref(), &frame.params)?;
    Ok(())
}

/// The depth buffer currently bound on the host's output-merger stage, if
/// any. Hosts that present without a depth attachment bound get the mono
/// fallback.
fn capture_depth(context: &ID3D11DeviceContext) -> Option<ID3D11Texture2D> {
    let mut dsv: Option<ID3D11DepthStencilView> = None;
    unsafe { context.OMGetRenderTargets(None, Some(&mut dsv)) };
    let dsv = dsv?;
    let mut resource: Option<ID3D11Resource> = None;
    unsafe { dsv.GetResource(&mut resource) };
    resource?.cast::<ID3D11Texture2D>().ok()
}
