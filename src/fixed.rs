//! 16.16 fixed-point scalars and binary angles.
//!
//! Everything here is integer-only so every replica computes the same bits.
//! Trigonometry uses a CORDIC kernel over a precomputed arctangent table
//! instead of lookup tables or `f64`.

/// 16.16 fixed-point world unit.
pub type Fixed = i32;

/// Binary angle: the full turn is `2^32`.
pub type Angle = u32;

pub const FRACBITS: u32 = 16;
pub const FRACUNIT: Fixed = 1 << FRACBITS;

pub const ANGLE_22H: Angle = 0x1000_0000;
pub const ANGLE_45: Angle = 0x2000_0000;
pub const ANGLE_90: Angle = 0x4000_0000;
pub const ANGLE_180: Angle = 0x8000_0000;
pub const ANGLE_270: Angle = 0xC000_0000;

/// Whole units to fixed point.
#[inline]
pub const fn units(n: i32) -> Fixed {
    n << FRACBITS
}

#[inline]
pub fn fixed_mul(a: Fixed, b: Fixed) -> Fixed {
    ((a as i64 * b as i64) >> FRACBITS) as Fixed
}

/// Fixed-point division. Saturates instead of overflowing when the quotient
/// does not fit.
#[inline]
pub fn fixed_div(a: Fixed, b: Fixed) -> Fixed {
    if (a.unsigned_abs() >> 14) >= b.unsigned_abs() {
        if (a ^ b) < 0 { i32::MIN } else { i32::MAX }
    } else {
        (((a as i64) << FRACBITS) / b as i64) as Fixed
    }
}

/// Octagonal distance estimate; cheap and deterministic.
#[inline]
pub fn approx_distance(dx: Fixed, dy: Fixed) -> Fixed {
    let dx = dx.saturating_abs();
    let dy = dy.saturating_abs();
    if dx < dy {
        dx.saturating_add(dy) - (dx >> 1)
    } else {
        dx.saturating_add(dy) - (dy >> 1)
    }
}

/// Square root of a non-negative fixed value. Negative input yields 0.
#[inline]
pub fn fixed_sqrt(v: Fixed) -> Fixed {
    if v <= 0 {
        return 0;
    }
    (((v as u64) << FRACBITS).isqrt()).min(i32::MAX as u64) as Fixed
}

/// Exact euclidean length of `(dx, dy)`, clamped to `i32::MAX`.
#[inline]
pub fn point_to_dist(dx: Fixed, dy: Fixed) -> Fixed {
    let sq = (dx as i64 * dx as i64 + dy as i64 * dy as i64) as u64;
    sq.isqrt().min(i32::MAX as u64) as Fixed
}

// atan(2^-i) expressed in binary angle units.
const ATAN_TABLE: [i64; 30] = [
    0x2000_0000, 0x12E4_051E, 0x09FB_385B, 0x0511_11D4, 0x028B_0D43, 0x0145_D7E1,
    0x00A2_F61E, 0x0051_7C55, 0x0028_BE53, 0x0014_5F2F, 0x000A_2F98, 0x0005_17CC,
    0x0002_8BE6, 0x0001_45F3, 0x0000_A2FA, 0x0000_517D, 0x0000_28BE, 0x0000_145F,
    0x0000_0A30, 0x0000_0518, 0x0000_028C, 0x0000_0146, 0x0000_00A3, 0x0000_0051,
    0x0000_0029, 0x0000_0014, 0x0000_000A, 0x0000_0005, 0x0000_0003, 0x0000_0001,
];

// Inverse CORDIC gain in Q30.
const CORDIC_GAIN_Q30: i64 = 652_032_874;
const ROTATE_STEPS: usize = 24;

fn cordic_rotate(angle: Angle) -> (Fixed, Fixed) {
    let mut z = angle as i32 as i64;
    let mut negate = false;
    if z > ANGLE_90 as i64 {
        z -= ANGLE_180 as i64;
        negate = true;
    } else if z < -(ANGLE_90 as i64) {
        z += ANGLE_180 as i64;
        negate = true;
    }

    let mut x = CORDIC_GAIN_Q30;
    let mut y = 0i64;
    for (i, &step) in ATAN_TABLE.iter().take(ROTATE_STEPS).enumerate() {
        let dx = y >> i;
        let dy = x >> i;
        if z >= 0 {
            x -= dx;
            y += dy;
            z -= step;
        } else {
            x += dx;
            y -= dy;
            z += step;
        }
    }

    let c = ((x + (1 << 13)) >> 14) as Fixed;
    let s = ((y + (1 << 13)) >> 14) as Fixed;
    if negate { (-c, -s) } else { (c, s) }
}

#[inline]
pub fn fine_cos(angle: Angle) -> Fixed {
    cordic_rotate(angle).0
}

#[inline]
pub fn fine_sin(angle: Angle) -> Fixed {
    cordic_rotate(angle).1
}

/// Angle of the vector `(dx, dy)`; `(0, 0)` maps to angle 0.
pub fn point_to_angle(dx: Fixed, dy: Fixed) -> Angle {
    match (dx, dy) {
        (0, 0) => return 0,
        (_, 0) => return if dx > 0 { 0 } else { ANGLE_180 },
        (0, _) => return if dy > 0 { ANGLE_90 } else { ANGLE_270 },
        _ => {}
    }

    let (mut x, mut y, mut z) = (dx as i64, dy as i64, 0i64);
    if x < 0 {
        x = -x;
        y = -y;
        z = ANGLE_180 as i64;
    }
    x <<= 24;
    y <<= 24;

    for (i, &step) in ATAN_TABLE.iter().enumerate() {
        let xo = x;
        if y > 0 {
            x += y >> i;
            y -= xo >> i;
            z += step;
        } else if y < 0 {
            x -= y >> i;
            y += xo >> i;
            z -= step;
        } else {
            break;
        }
    }
    z as u32
}

/// Smallest unsigned difference between two angles, in `[0, ANGLE_180]`.
#[inline]
pub fn angle_delta(a: Angle, b: Angle) -> Angle {
    let d = a.wrapping_sub(b);
    if d > ANGLE_180 { d.wrapping_neg() } else { d }
}
