//! Spin decomposition.
//!
//! Launch monitors usually report spin as a magnitude (`total_spin`) plus a
//! tilt (`spin_axis`).  Simulators that expect the Open Connect shot format
//! want the two orthogonal components instead:
//!
//! ```text
//! back_spin = round(total_spin × cos(spin_axis))
//! side_spin = round(total_spin × sin(spin_axis))
//! ```
//!
//! A positive axis tilts the ball right, producing positive side spin.

/// Back-spin / side-spin pair in rpm, rounded to whole rpm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpinComponents {
    pub back_spin: f64,
    pub side_spin: f64,
}

/// Splits `total_spin` (rpm) tilted by `spin_axis_deg` (degrees) into its
/// back-spin and side-spin components.
///
/// # Examples
///
/// ```rust
/// use shot_core::decompose_spin;
///
/// let parts = decompose_spin(950.0, 30.0);
/// assert_eq!(parts.back_spin, 823.0);
/// assert_eq!(parts.side_spin, 475.0);
/// ```
pub fn decompose_spin(total_spin: f64, spin_axis_deg: f64) -> SpinComponents {
    let axis = spin_axis_deg.to_radians();
    SpinComponents {
        back_spin: (total_spin * axis.cos()).round(),
        side_spin: (total_spin * axis.sin()).round(),
    }
}
