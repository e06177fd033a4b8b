//! Wave-vector geometry, deep-water dispersion and the Phillips spectrum.
//!
//! These are the scalar building blocks of the per-texel kernels. The WGSL
//! shaders in `src/shaders/` implement the same formulas on the GPU.

use std::f32::consts::TAU;

use glam::Vec2;

/// Fraction of the largest wave length below which ripples are suppressed
const SMALL_WAVE_FRACTION: f32 = 0.001;

/// Signed frequency index of texel coordinate `i` in FFT ordering
pub fn frequency_index(i: u32, tex_size: u32) -> i32 {
    if i < tex_size / 2 {
        i as i32
    } else {
        i as i32 - tex_size as i32
    }
}

/// Wave-vector (rad/m) of texel `(x, y)` for a patch of `domain_m` meters
pub fn wave_vector(x: u32, y: u32, tex_size: u32, domain_m: f32) -> Vec2 {
    let n = frequency_index(x, tex_size) as f32;
    let m = frequency_index(y, tex_size) as f32;
    Vec2::new(n, m) * (TAU / domain_m)
}

/// Deep-water dispersion relation ω(k) = sqrt(g·|k|)
pub fn dispersion(k: f32, gravity: f32) -> f32 {
    (gravity * k).sqrt()
}

/// Phillips spectrum P(k) for the given wind (m/s)
///
/// Zero for the DC term and for calm wind.
pub fn phillips(k: Vec2, wind: Vec2, gravity: f32, amplitude: f32) -> f32 {
    let k_len = k.length();
    let wind_speed = wind.length();
    if k_len <= f32::EPSILON || wind_speed <= f32::EPSILON {
        return 0.0;
    }

    let largest_wave = wind_speed * wind_speed / gravity;
    let small_wave = largest_wave * SMALL_WAVE_FRACTION;
    let k_dot_w = (k / k_len).dot(wind / wind_speed);
    let kl = k_len * largest_wave;

    amplitude * (-1.0 / (kl * kl)).exp() / k_len.powi(4)
        * k_dot_w
        * k_dot_w
        * (-(k_len * small_wave).powi(2)).exp()
}

/// Initial spectrum amplitude sqrt(P/2)·dk for wave-vector `k`
pub fn initial_amplitude(k: Vec2, wind: Vec2, gravity: f32, amplitude: f32, domain_m: f32) -> f32 {
    let dk = TAU / domain_m;
    (phillips(k, wind, gravity, amplitude) * 0.5).sqrt() * dk
}
