//! Host implementations of the per-texel compute kernels.
//!
//! [`CpuBackend`](crate::backend::CpuBackend) runs these over every texel;
//! they mirror the WGSL entry points in `src/shaders/`. Complex numbers are
//! carried as `Vec2` (re, im).

use std::f32::consts::{PI, TAU};

use glam::{Vec2, Vec3};

use crate::backend::{FftParams, InitialSpectrumParams, NormalMapParams, PhaseParams, SpectrumParams};
use crate::ocean::waves::{dispersion, initial_amplitude, wave_vector};

/// Read-only view over a square texture stored as packed f32 channels
#[derive(Clone, Copy)]
pub struct TexelView<'a> {
    data: &'a [f32],
    size: u32,
    channels: usize,
}

impl<'a> TexelView<'a> {
    pub fn new(data: &'a [f32], size: u32, channels: usize) -> Self {
        debug_assert_eq!(data.len(), size as usize * size as usize * channels);
        Self {
            data,
            size,
            channels,
        }
    }

    pub fn get(&self, x: u32, y: u32) -> &'a [f32] {
        let start = (y as usize * self.size as usize + x as usize) * self.channels;
        &self.data[start..start + self.channels]
    }

    /// Fetch with periodic addressing
    pub fn get_wrapped(&self, x: i64, y: i64) -> &'a [f32] {
        let n = self.size as i64;
        self.get(x.rem_euclid(n) as u32, y.rem_euclid(n) as u32)
    }
}

fn mul_complex(a: Vec2, b: Vec2) -> Vec2 {
    Vec2::new(a.x * b.x - a.y * b.y, a.x * b.y + a.y * b.x)
}

/// Multiply by the imaginary unit
fn mul_i(a: Vec2) -> Vec2 {
    Vec2::new(-a.y, a.x)
}

/// Spectrum amplitude at `k` (r) and at `-k` (g)
pub fn initial_spectrum(x: u32, y: u32, p: &InitialSpectrumParams) -> [f32; 2] {
    let domain = p.grid_size as f32;
    let k = wave_vector(x, y, p.tex_size, domain);
    let wind = Vec2::from_array(p.wind);
    [
        initial_amplitude(k, wind, p.gravity, p.amplitude, domain),
        initial_amplitude(-k, wind, p.gravity, p.amplitude, domain),
    ]
}

/// Advance one phase value by ω(k)·dt, wrapped to [0, 2π)
pub fn advance_phase(x: u32, y: u32, current: f32, p: &PhaseParams) -> f32 {
    let k = wave_vector(x, y, p.tex_size, p.grid_size as f32);
    let omega = dispersion(k.length(), p.gravity);
    (current + omega * p.dt).rem_euclid(TAU)
}

/// Time-evolved spectrum: (height.re, height.im, (Dx + i·Dz).re, (Dx + i·Dz).im)
pub fn synthesize_spectrum(x: u32, y: u32, initial: [f32; 2], phase: f32, p: &SpectrumParams) -> [f32; 4] {
    let k = wave_vector(x, y, p.tex_size, p.grid_size as f32);
    let k_len = k.length();
    if k_len <= f32::EPSILON {
        return [0.0; 4];
    }

    let rotation = Vec2::new(phase.cos(), phase.sin());
    let rotation_conj = Vec2::new(rotation.x, -rotation.y);
    let h = Vec2::new(initial[0], 0.0);
    let h_minus_conj = Vec2::new(initial[1], 0.0);
    let height = mul_complex(h, rotation) + mul_complex(h_minus_conj, rotation_conj);

    // D = -i·k̂·h·λ per horizontal axis
    let k_hat = k / k_len;
    let minus_i_h = -mul_i(height);
    let dx = minus_i_h * (k_hat.x * p.choppiness);
    let dz = minus_i_h * (k_hat.y * p.choppiness);
    let packed = dx + mul_i(dz);

    [height.x, height.y, packed.x, packed.y]
}

/// One radix-2 Stockham butterfly stage along a row or column
///
/// Both complex pairs of the texel are transformed together.
pub fn butterfly(input: TexelView<'_>, x: u32, y: u32, horizontal: bool, p: &FftParams) -> [f32; 4] {
    let index = if horizontal { x } else { y };
    let s = p.subseq_count;
    let even = (index / (2 * s)) * s + index % s;
    let odd = even + p.total_count / 2;

    let (e, o) = if horizontal {
        (input.get(even, y), input.get(odd, y))
    } else {
        (input.get(x, even), input.get(x, odd))
    };

    let angle = PI * (index % (2 * s)) as f32 / s as f32;
    let twiddle = Vec2::new(angle.cos(), angle.sin());
    let a = Vec2::new(e[0], e[1]) + mul_complex(twiddle, Vec2::new(o[0], o[1]));
    let b = Vec2::new(e[2], e[3]) + mul_complex(twiddle, Vec2::new(o[2], o[3]));
    [a.x, a.y, b.x, b.y]
}

/// Displaced surface position of a texel (height in r, Dx in b, Dz in a)
fn displaced_position(texel: &[f32], x: i64, y: i64, texel_size: f32) -> Vec3 {
    Vec3::new(
        x as f32 * texel_size + texel[2],
        texel[0],
        y as f32 * texel_size + texel[3],
    )
}

/// Surface normal from periodic central differences of the displacement map
pub fn surface_normal(displacement: TexelView<'_>, x: u32, y: u32, p: &NormalMapParams) -> [f32; 4] {
    let texel_size = p.grid_size as f32 / p.tex_size as f32;
    let (x, y) = (x as i64, y as i64);
    let at = |dx: i64, dy: i64| {
        displaced_position(displacement.get_wrapped(x + dx, y + dy), x + dx, y + dy, texel_size)
    };

    let tangent = at(1, 0) - at(-1, 0);
    let bitangent = at(0, 1) - at(0, -1);
    let normal = bitangent.cross(tangent).try_normalize().unwrap_or(Vec3::Y);
    [normal.x, normal.y, normal.z, 1.0]
}
