//! SPH smoothing kernels
//!
//! Every kernel takes the true distance `r` between two particles (world units)
//! and the support radius `h`. All of them vanish for `r >= h`. The 2D
//! normalisation coefficients live in [`KernelCoefficients`] and must be
//! rederived whenever `h` changes.

use glam::{Vec2, Vec3};

use crate::constants::physics::PI;

/// Poly6 shape `(h² - r²)³`
#[inline]
pub fn poly6(r: f32, h: f32) -> f32 {
    if r >= h {
        return 0.0;
    }
    let diff = h * h - r * r;
    diff * diff * diff
}

/// Radial derivative of the poly6 shape, `-6 r (h² - r²)²`
#[inline]
pub fn poly6_derivative(r: f32, h: f32) -> f32 {
    if r >= h {
        return 0.0;
    }
    let diff = h * h - r * r;
    -6.0 * r * diff * diff
}

/// Poly6 gradient factor `K'(r) / r = -6 (h² - r²)²`, finite at `r = 0`
#[inline]
pub fn poly6_gradient_factor(r: f32, h: f32) -> f32 {
    if r >= h {
        return 0.0;
    }
    let diff = h * h - r * r;
    -6.0 * diff * diff
}

/// Poly6 Laplacian shape `(h² - r²)(2r² - h²)`
#[inline]
pub fn poly6_laplacian(r: f32, h: f32) -> f32 {
    if r >= h {
        return 0.0;
    }
    (h * h - r * r) * (2.0 * r * r - h * h)
}

/// Viscosity shape `r²(-4r + 9h) + h³(-5 + 6(ln h - ln r))`
///
/// Singular at `r = 0`; returns 0 there.
#[inline]
pub fn viscosity(r: f32, h: f32) -> f32 {
    if r >= h || r <= 0.0 {
        return 0.0;
    }
    let h3 = h * h * h;
    r * r * (-4.0 * r + 9.0 * h) + h3 * (-5.0 + 6.0 * (h.ln() - r.ln()))
}

/// Radial derivative of the viscosity shape, `-12r² + 18hr - 6h³/r`
#[inline]
pub fn viscosity_derivative(r: f32, h: f32) -> f32 {
    if r >= h || r <= 0.0 {
        return 0.0;
    }
    -12.0 * r * r + 18.0 * h * r - 6.0 * h * h * h / r
}

/// 2D Laplacian of the viscosity shape divided by 36, `h - r`
#[inline]
pub fn viscosity_laplacian(r: f32, h: f32) -> f32 {
    if r >= h {
        return 0.0;
    }
    h - r
}

/// Normalisation coefficients for a given support radius
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelCoefficients {
    pub h: f32,
    pub alpha_poly6: f32,
    pub alpha_poly6_laplacian: f32,
    pub alpha_viscosity: f32,
    pub alpha_viscosity_laplacian: f32,
}

impl KernelCoefficients {
    pub fn new(h: f32) -> Self {
        let h2 = h * h;
        let h5 = h2 * h2 * h;
        let h8 = h5 * h2 * h;
        Self {
            h,
            alpha_poly6: 4.0 / (PI * h8),
            alpha_poly6_laplacian: 24.0 / (PI * h8),
            alpha_viscosity: 10.0 / (9.0 * PI * h5),
            alpha_viscosity_laplacian: 40.0 / (PI * h5),
        }
    }
}

/// Kernel evaluated on particle positions, in the horizontal (xz) plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphKernel {
    coefficients: KernelCoefficients,
}

impl SphKernel {
    pub fn new(h: f32) -> Self {
        Self {
            coefficients: KernelCoefficients::new(h),
        }
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        self.coefficients.h
    }

    #[inline]
    pub fn coefficients(&self) -> &KernelCoefficients {
        &self.coefficients
    }

    /// Horizontal offset between two positions
    #[inline]
    pub fn offset(p1: Vec3, p2: Vec3) -> Vec2 {
        Vec2::new(p1.x - p2.x, p1.z - p2.z)
    }

    /// Normalised poly6 value at distance `r`
    #[inline]
    pub fn w_r(&self, r: f32) -> f32 {
        self.coefficients.alpha_poly6 * poly6(r, self.coefficients.h)
    }

    /// Self contribution `W(0)`
    #[inline]
    pub fn w_zero(&self) -> f32 {
        self.w_r(0.0)
    }

    /// `W(p1, p2)`
    #[inline]
    pub fn w(&self, p1: Vec3, p2: Vec3) -> f32 {
        self.w_r(Self::offset(p1, p2).length())
    }

    /// `∇W(p1, p2)` with respect to `p1`, returned as (x, 0, z)
    #[inline]
    pub fn grad_w(&self, p1: Vec3, p2: Vec3) -> Vec3 {
        let d = Self::offset(p1, p2);
        let factor =
            self.coefficients.alpha_poly6 * poly6_gradient_factor(d.length(), self.coefficients.h);
        Vec3::new(factor * d.x, 0.0, factor * d.y)
    }

    /// Normalised poly6 Laplacian
    #[inline]
    pub fn laplacian_w(&self, p1: Vec3, p2: Vec3) -> f32 {
        let r = Self::offset(p1, p2).length();
        self.coefficients.alpha_poly6_laplacian * poly6_laplacian(r, self.coefficients.h)
    }

    /// Normalised viscosity value, 0 for coincident particles
    #[inline]
    pub fn viscosity_w(&self, p1: Vec3, p2: Vec3) -> f32 {
        let r = Self::offset(p1, p2).length();
        self.coefficients.alpha_viscosity * viscosity(r, self.coefficients.h)
    }

    /// Normalised viscosity Laplacian, used for heat exchange
    #[inline]
    pub fn viscosity_laplacian_w(&self, p1: Vec3, p2: Vec3) -> f32 {
        let r = Self::offset(p1, p2).length();
        self.coefficients.alpha_viscosity_laplacian * viscosity_laplacian(r, self.coefficients.h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: f32 = 2.0;

    #[test]
    fn test_support_boundary() {
        assert_eq!(poly6(H, H), 0.0);
        assert_eq!(poly6(H + 0.5, H), 0.0);
        assert_eq!(poly6_derivative(H, H), 0.0);
        assert_eq!(poly6_laplacian(3.0 * H, H), 0.0);
        assert_eq!(viscosity(H, H), 0.0);
        assert_eq!(viscosity_derivative(H * 1.01, H), 0.0);
        assert_eq!(viscosity_laplacian(H, H), 0.0);

        let kernel = SphKernel::new(H);
        let a = Vec3::ZERO;
        let b = Vec3::new(H, 0.0, 0.0);
        assert_eq!(kernel.w(a, b), 0.0);
        assert_eq!(kernel.grad_w(a, b), Vec3::ZERO);
    }

    #[test]
    fn test_viscosity_shape_is_continuous_at_support() {
        // The shape and its slope both reach zero at r = h
        let near = viscosity(H * 0.999, H);
        assert!(near.abs() < 1e-3, "viscosity near h = {}", near);
        let slope = viscosity_derivative(H * 0.999, H);
        assert!(slope.abs() < 1e-2, "slope near h = {}", slope);
    }

    #[test]
    fn test_viscosity_guard_at_origin() {
        assert_eq!(viscosity(0.0, H), 0.0);
        assert_eq!(viscosity_derivative(0.0, H), 0.0);
        let kernel = SphKernel::new(H);
        assert_eq!(kernel.viscosity_w(Vec3::ONE, Vec3::ONE), 0.0);
    }

    #[test]
    fn test_symmetry() {
        let kernel = SphKernel::new(H);
        let pairs = [
            (Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.3, 5.0, -0.7)),
            (Vec3::new(1.5, 0.0, 2.0), Vec3::new(0.2, 0.0, 1.1)),
            (Vec3::new(-4.0, 1.0, 3.0), Vec3::new(-3.0, 2.0, 3.5)),
        ];
        for (a, b) in pairs {
            assert_eq!(kernel.w(a, b), kernel.w(b, a));
            assert_eq!(kernel.grad_w(a, b), -kernel.grad_w(b, a));
            assert_eq!(kernel.viscosity_laplacian_w(a, b), kernel.viscosity_laplacian_w(b, a));
        }
    }

    #[test]
    fn test_height_is_ignored() {
        // Only the horizontal distance matters
        let kernel = SphKernel::new(H);
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(0.5, 0.0, 0.0);
        let c = Vec3::new(0.5, 100.0, 0.0);
        assert_eq!(kernel.w(a, b), kernel.w(a, c));
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let kernel = SphKernel::new(H);
        let a = Vec3::new(0.4, 0.0, 0.3);
        let b = Vec3::ZERO;
        let eps = 1e-3;
        let dx = (kernel.w(a + Vec3::X * eps, b) - kernel.w(a - Vec3::X * eps, b)) / (2.0 * eps);
        let dz = (kernel.w(a + Vec3::Z * eps, b) - kernel.w(a - Vec3::Z * eps, b)) / (2.0 * eps);
        let grad = kernel.grad_w(a, b);
        assert!((grad.x - dx).abs() < 1e-3 * grad.x.abs().max(1e-3) + 1e-5, "{} vs {}", grad.x, dx);
        assert!((grad.z - dz).abs() < 1e-3 * grad.z.abs().max(1e-3) + 1e-5, "{} vs {}", grad.z, dz);
        assert_eq!(grad.y, 0.0);
    }

    #[test]
    fn test_poly6_normalisation_on_lattice() {
        // Σ V_j W(r_ij) over a uniform lattice tends to 1 as spacing shrinks
        let kernel = SphKernel::new(H);
        let center = Vec3::ZERO;
        let mut previous_error = f32::MAX;
        for spacing in [0.5_f32, 0.25, 0.1] {
            let area = spacing * spacing;
            let n = (H / spacing).ceil() as i32 + 1;
            let mut sum = 0.0;
            for i in -n..=n {
                for j in -n..=n {
                    let p = Vec3::new(i as f32 * spacing, 0.0, j as f32 * spacing);
                    sum += area * kernel.w(center, p);
                }
            }
            let error = (sum - 1.0).abs();
            assert!(error < 0.05, "spacing {}: sum {}", spacing, sum);
            assert!(error <= previous_error + 1e-4);
            previous_error = error;
        }
    }

    #[test]
    fn test_half_radius_pair() {
        let kernel = SphKernel::new(H);
        let a = Vec3::ZERO;
        let b = Vec3::new(H / 2.0, 0.0, 0.0);
        let grad_ab = kernel.grad_w(a, b);
        let grad_ba = kernel.grad_w(b, a);
        assert!(kernel.w(a, b) > 0.0);
        assert!(grad_ab.length() > 0.0);
        assert_eq!(grad_ab, -grad_ba);
    }

    #[test]
    fn test_coefficients_follow_radius() {
        let small = KernelCoefficients::new(1.0);
        let large = KernelCoefficients::new(2.0);
        assert!((small.alpha_poly6 - 4.0 / PI).abs() < 1e-6);
        assert!((small.alpha_poly6 / large.alpha_poly6 - 256.0).abs() < 1e-2);
        assert!((small.alpha_viscosity_laplacian / small.alpha_viscosity - 36.0).abs() < 1e-4);
    }
}
