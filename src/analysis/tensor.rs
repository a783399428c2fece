//! Stress tensor primitives.
//!
//! The tensor is symmetric 3x3, stored as the six components in the order
//! the solid element records carry them: xx, yy, zz, xy, yz, zx.

use vek::Vec3 as VekVec3;

pub type Vec3 = VekVec3<f64>;

/// Below this J2 the deviator is treated as zero and the principal stresses
/// collapse to the mean stress.
const HYDROSTATIC_EPS: f64 = 1e-20;

pub fn clamp_cosine(c: f64) -> f64 {
    c.clamp(-1.0, 1.0)
}

/// Angle between two vectors in degrees, safe against round-off pushing the
/// cosine outside [-1, 1]. Zero-length input yields zero.
pub fn angle_between_degrees(a: Vec3, b: Vec3) -> f64 {
    let mags = a.magnitude() * b.magnitude();
    if mags < 1e-30 {
        return 0.0;
    }
    clamp_cosine(a.dot(b) / mags).acos().to_degrees()
}

pub fn normalized_or_zero(v: Vec3) -> Vec3 {
    let mag = v.magnitude();
    if mag < 1e-30 {
        Vec3::zero()
    }
    else {
        v / mag
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct StressTensor {
    pub xx: f64,
    pub yy: f64,
    pub zz: f64,
    pub xy: f64,
    pub yz: f64,
    pub zx: f64,
}

impl StressTensor {
    pub fn new(xx: f64, yy: f64, zz: f64, xy: f64, yz: f64, zx: f64) -> StressTensor {
        StressTensor { xx, yy, zz, xy, yz, zx }
    }

    /// Build from the first six words of a solid element record.
    pub fn from_words(words: &[f64]) -> StressTensor {
        StressTensor::new(words[0], words[1], words[2], words[3], words[4], words[5])
    }

    pub fn von_mises(&self) -> f64 {
        let d1 = self.xx - self.yy;
        let d2 = self.yy - self.zz;
        let d3 = self.zz - self.xx;
        let shear = self.xy * self.xy + self.yz * self.yz + self.zx * self.zx;
        (0.5 * (d1 * d1 + d2 * d2 + d3 * d3) + 3.0 * shear).sqrt()
    }

    pub fn mean_stress(&self) -> f64 {
        (self.xx + self.yy + self.zz) / 3.0
    }

    pub fn pressure(&self) -> f64 {
        -self.mean_stress()
    }

    pub fn i1(&self) -> f64 {
        self.xx + self.yy + self.zz
    }

    pub fn i2(&self) -> f64 {
        self.xx * self.yy + self.yy * self.zz + self.zz * self.xx
            - self.xy * self.xy
            - self.yz * self.yz
            - self.zx * self.zx
    }

    pub fn i3(&self) -> f64 {
        self.xx * (self.yy * self.zz - self.yz * self.yz)
            - self.xy * (self.xy * self.zz - self.yz * self.zx)
            + self.zx * (self.xy * self.yz - self.yy * self.zx)
    }

    pub fn is_zero(&self, eps: f64) -> bool {
        self.xx.abs() < eps
            && self.yy.abs() < eps
            && self.zz.abs() < eps
            && self.xy.abs() < eps
            && self.yz.abs() < eps
            && self.zx.abs() < eps
    }

    /// Principal stresses in descending order, by the Lode-angle closed form
    /// on the deviatoric tensor.
    pub fn principal_stresses(&self) -> [f64; 3] {
        if self.is_zero(1e-20) {
            return [0.0; 3];
        }

        let mean = self.mean_stress();
        let s_xx = self.xx - mean;
        let s_yy = self.yy - mean;
        let s_zz = self.zz - mean;

        let j2 = 0.5
            * (s_xx * s_xx
                + s_yy * s_yy
                + s_zz * s_zz
                + 2.0 * (self.xy * self.xy + self.yz * self.yz + self.zx * self.zx));
        if j2 < HYDROSTATIC_EPS {
            return [mean; 3];
        }

        let j3 = s_xx * (s_yy * s_zz - self.yz * self.yz)
            - self.xy * (self.xy * s_zz - self.yz * self.zx)
            + self.zx * (self.xy * self.yz - s_yy * self.zx);

        let r = (j2 / 3.0).sqrt();
        let cos3t = clamp_cosine(j3 / (2.0 * r * r * r));
        let theta = cos3t.acos() / 3.0;

        let two_r = 2.0 * r;
        let mut p = [
            mean + two_r * theta.cos(),
            mean + two_r * (theta - 2.0 * std::f64::consts::FRAC_PI_3).cos(),
            mean + two_r * (theta + 2.0 * std::f64::consts::FRAC_PI_3).cos(),
        ];
        p.sort_by(|a, b| b.total_cmp(a));
        p
    }

    /// Maximum shear stress, (s1 - s3) / 2.
    pub fn max_shear(&self) -> f64 {
        let p = self.principal_stresses();
        (p[0] - p[2]) / 2.0
    }

    /// Traction vector on the plane with the given unit normal.
    pub fn traction(&self, normal: Vec3) -> Vec3 {
        Vec3::new(
            self.xx * normal.x + self.xy * normal.y + self.zx * normal.z,
            self.xy * normal.x + self.yy * normal.y + self.yz * normal.z,
            self.zx * normal.x + self.yz * normal.y + self.zz * normal.z,
        )
    }

    /// Signed normal stress on the plane; tension positive.
    pub fn normal_stress(&self, normal: Vec3) -> f64 {
        self.traction(normal).dot(normal)
    }

    /// Shear stress magnitude on the plane. The radicand is clamped at zero
    /// against round-off.
    pub fn shear_stress(&self, normal: Vec3) -> f64 {
        let t = self.traction(normal);
        let sigma_n = t.dot(normal);
        (t.magnitude_squared() - sigma_n * sigma_n).max(0.0).sqrt()
    }

    /// Shear component of the traction, tangent to the plane.
    pub fn shear_vector(&self, normal: Vec3) -> Vec3 {
        let t = self.traction(normal);
        t - normal * t.dot(normal)
    }
}
