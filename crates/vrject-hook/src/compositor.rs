//! Depth-shift stereo compositor.
//!
//! Renders a left/right pair from one color+depth input by shifting each
//! sample's horizontal coordinate by `separation * (1 - depth) * eye_sign`.
//! A cheap parallax approximation: the host renders its scene once, and an
//! external interceptor cannot ask it to render twice.

use std::ffi::c_void;

use tracing::debug;
use vrject_core::{Error, Result, StereoParams};

use windows::core::PCSTR;
use windows::Win32::Graphics::Direct3D::Fxc::D3DCompile;
use windows::Win32::Graphics::Direct3D::ID3DBlob;
use windows::Win32::Graphics::Direct3D11::{
    ID3D11Buffer, ID3D11Device, ID3D11DeviceContext, ID3D11PixelShader, ID3D11RenderTargetView,
    ID3D11SamplerState, ID3D11Texture2D, ID3D11VertexShader, D3D11_BIND_CONSTANT_BUFFER,
    D3D11_BUFFER_DESC, D3D11_COMPARISON_NEVER, D3D11_FILTER_MIN_MAG_MIP_LINEAR,
    D3D11_PRIMITIVE_TOPOLOGY_TRIANGLELIST, D3D11_SAMPLER_DESC, D3D11_TEXTURE2D_DESC,
    D3D11_TEXTURE_ADDRESS_CLAMP, D3D11_USAGE_DEFAULT, D3D11_VIEWPORT,
};

// Fullscreen triangle from the vertex index; no vertex buffer bound.
const FULLSCREEN_VS: &str = r#"
struct VS_INPUT { uint VertexID : SV_VertexID; };
struct PS_INPUT { float4 Pos : SV_POSITION; float2 Tex : TEXCOORD0; };
PS_INPUT vs_main(VS_INPUT input) {
    PS_INPUT output;
    float2 grid = float2((input.VertexID << 1) & 2, input.VertexID & 2);
    output.Pos = float4(grid * float2(2, -2) + float2(-1, 1), 0, 1);
    output.Tex = grid;
    return output;
}
"#;

// Horizontal reprojection by inverse depth; out-of-range samples go black.
const STEREO_SHIFT_PS: &str = r#"
Texture2D g_Color : register(t0);
Texture2D<float> g_Depth : register(t1);
SamplerState g_Sampler : register(s0);
cbuffer Params : register(b0) {
    float g_Separation;
    float g_Convergence;
    float g_EyeSign;
    float g_Padding;
};
struct PS_INPUT { float4 Pos : SV_POSITION; float2 Tex : TEXCOORD0; };
float4 ps_main(PS_INPUT input) : SV_Target {
    float z = g_Depth.SampleLevel(g_Sampler, input.Tex, 0);
    float shift = g_Separation * (1.0 - z) * g_EyeSign;
    float2 uv = input.Tex + float2(shift, 0);
    if (uv.x < 0 || uv.x > 1) return float4(0, 0, 0, 1);
    return g_Color.Sample(g_Sampler, uv);
}
"#;

/// Per-draw parameter block; layout must match the cbuffer above.
#[repr(C)]
struct EyeParams {
    separation: f32,
    convergence: f32,
    eye_sign: f32,
    _pad: f32,
}

/// GPU resources for the stereo pass, created once on first use.
///
/// A failed build is latched: initialization is one-shot, and the frame
/// path degrades to a mono copy for the rest of the process lifetime.
pub struct StereoCompositor {
    ready: bool,
    failed: bool,
    vertex_shader: Option<ID3D11VertexShader>,
    pixel_shader: Option<ID3D11PixelShader>,
    sampler: Option<ID3D11SamplerState>,
    param_buffer: Option<ID3D11Buffer>,
}

impl StereoCompositor {
    pub fn new() -> Self {
        Self {
            ready: false,
            failed: false,
            vertex_shader: None,
            pixel_shader: None,
            sampler: None,
            param_buffer: None,
        }
    }

    /// False once a resource build has failed; the stereo path is off for
    /// the rest of the process lifetime.
    pub fn available(&self) -> bool {
        !self.failed
    }

    fn ensure_resources(&mut self, device: &ID3D11Device) -> Result<()> {
        if self.ready {
            return Ok(());
        }
        if self.failed {
            return Err(Error::graphics("stereo resources unavailable"));
        }
        match self.build_resources(device) {
            Ok(()) => {
                debug!("stereo compositor resources created");
                self.ready = true;
                Ok(())
            }
            Err(err) => {
                self.failed = true;
                Err(err)
            }
        }
    }

    fn build_resources(&mut self, device: &ID3D11Device) -> Result<()> {
        let vs_bytes = compile_shader(FULLSCREEN_VS, c"vs_main", c"vs_4_0")?;
        let ps_bytes = compile_shader(STEREO_SHIFT_PS, c"ps_main", c"ps_4_0")?;

        let mut vertex_shader = None;
        unsafe { device.CreateVertexShader(&vs_bytes, None, Some(&mut vertex_shader)) }
            .map_err(|e| Error::graphics(format!("create vertex shader: {e:?}")))?;

        let mut pixel_shader = None;
        unsafe { device.CreatePixelShader(&ps_bytes, None, Some(&mut pixel_shader)) }
            .map_err(|e| Error::graphics(format!("create pixel shader: {e:?}")))?;

        let buffer_desc = D3D11_BUFFER_DESC {
            ByteWidth: std::mem::size_of::<EyeParams>() as u32,
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: D3D11_BIND_CONSTANT_BUFFER.0 as u32,
            ..Default::default()
        };
        let mut param_buffer = None;
        unsafe { device.CreateBuffer(&buffer_desc, None, Some(&mut param_buffer)) }
            .map_err(|e| Error::graphics(format!("create parameter buffer: {e:?}")))?;

        let sampler_desc = D3D11_SAMPLER_DESC {
            Filter: D3D11_FILTER_MIN_MAG_MIP_LINEAR,
            AddressU: D3D11_TEXTURE_ADDRESS_CLAMP,
            AddressV: D3D11_TEXTURE_ADDRESS_CLAMP,
            AddressW: D3D11_TEXTURE_ADDRESS_CLAMP,
            ComparisonFunc: D3D11_COMPARISON_NEVER,
            MaxLOD: f32::MAX,
            ..Default::default()
        };
        let mut sampler = None;
        unsafe { device.CreateSamplerState(&sampler_desc, Some(&mut sampler)) }
            .map_err(|e| Error::graphics(format!("create sampler: {e:?}")))?;

        self.vertex_shader = vertex_shader;
        self.pixel_shader = pixel_shader;
        self.param_buffer = param_buffer;
        self.sampler = sampler;
        Ok(())
    }

    /// Render one eye's depth-shifted view of `color` into `target`.
    ///
    /// Shader-resource views over the captured textures are transient; the
    /// depth view in particular can fail for typeless formats, in which
    /// case the caller falls back to a mono copy.
    pub fn render_eye(
        &mut self,
        device: &ID3D11Device,
        context: &ID3D11DeviceContext,
        color: &ID3D11Texture2D,
        depth: &ID3D11Texture2D,
        target: &ID3D11RenderTargetView,
        eye: u32,
        params: &StereoParams,
    ) -> Result<()> {
        self.ensure_resources(device)?;
        let vertex_shader = self
            .vertex_shader
            .as_ref()
            .ok_or_else(|| Error::graphics("vertex shader missing"))?;
        let pixel_shader = self
            .pixel_shader
            .as_ref()
            .ok_or_else(|| Error::graphics("pixel shader missing"))?;
        let param_buffer = self
            .param_buffer
            .as_ref()
            .ok_or_else(|| Error::graphics("parameter buffer missing"))?;

        let mut color_view = None;
        unsafe { device.CreateShaderResourceView(color, None, Some(&mut color_view)) }
            .map_err(|e| Error::graphics(format!("color source view: {e:?}")))?;
        let mut depth_view = None;
        unsafe { device.CreateShaderResourceView(depth, None, Some(&mut depth_view)) }
            .map_err(|e| Error::graphics(format!("depth source view: {e:?}")))?;

        let mut source_desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { color.GetDesc(&mut source_desc) };
        let viewport = D3D11_VIEWPORT {
            TopLeftX: 0.0,
            TopLeftY: 0.0,
            Width: source_desc.Width as f32,
            Height: source_desc.Height as f32,
            MinDepth: 0.0,
            MaxDepth: 1.0,
        };

        let block = EyeParams {
            separation: params.separation(),
            convergence: params.convergence,
            eye_sign: if eye == 0 { -1.0 } else { 1.0 },
            _pad: 0.0,
        };

        unsafe {
            context.UpdateSubresource(
                param_buffer,
                0,
                None,
                &block as *const EyeParams as *const c_void,
                0,
                0,
            );
            context.OMSetRenderTargets(Some(&[Some(target.clone())]), None);
            context.RSSetViewports(Some(&[viewport]));
            context.IASetPrimitiveTopology(D3D11_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
            context.VSSetShader(vertex_shader, None);
            context.PSSetShader(pixel_shader, None);
            context.PSSetShaderResources(0, Some(&[color_view, depth_view]));
            context.PSSetSamplers(0, Some(&[self.sampler.clone()]));
            context.PSSetConstantBuffers(0, Some(&[self.param_buffer.clone()]));
            context.Draw(3, 0);
            context.PSSetShaderResources(0, Some(&[None, None]));
        }
        Ok(())
    }
}

fn compile_shader(source: &str, entry: &std::ffi::CStr, target: &std::ffi::CStr) -> Result<Vec<u8>> {
    let mut blob: Option<ID3DBlob> = None;
    let mut error_blob: Option<ID3DBlob> = None;
    let result = unsafe {
        D3DCompile(
            source.as_ptr() as *const c_void,
            source.len(),
            None,
            None,
            None,
            PCSTR(entry.as_ptr() as *const u8),
            PCSTR(target.as_ptr() as *const u8),
            0,
            0,
            &mut blob,
            Some(&mut error_blob),
        )
    };

    if let Err(err) = result {
        let detail = error_blob
            .map(|blob| unsafe {
                let bytes = std::slice::from_raw_parts(
                    blob.GetBufferPointer() as *const u8,
                    blob.GetBufferSize(),
                );
                String::from_utf8_lossy(bytes).into_owned()
            })
            .unwrap_or_default();
        return Err(Error::graphics(format!(
            "shader compile failed: {err:?} {detail}"
        )));
    }

    let blob = blob.ok_or_else(|| Error::graphics("shader blob missing"))?;
    let bytes = unsafe {
        std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize())
    };
    Ok(bytes.to_vec())
}
