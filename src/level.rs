//! XP to level conversion.
//!
//! `level(xp) = floor(sqrt(xp / 100)) + 1`. This is the only place the
//! formula is written down; both store backends derive a player's level by
//! calling [`level_for_xp`] whenever they materialize a record.

/// XP per "unit" of the level curve.
pub const XP_PER_LEVEL_UNIT: u64 = 100;

/// Level reached with `xp` total experience.
///
/// Integer arithmetic only: `floor(sqrt(xp / 100))` equals
/// `isqrt(floor(xp / 100))` for every non-negative `xp`.
pub fn level_for_xp(xp: u64) -> u32 {
    let root = isqrt(xp / XP_PER_LEVEL_UNIT);
    u32::try_from(root).unwrap_or(u32::MAX - 1).saturating_add(1)
}

/// Minimum total XP needed to be at `level`.
pub fn xp_for_level(level: u32) -> u64 {
    let steps = u64::from(level.saturating_sub(1));
    steps.saturating_mul(steps).saturating_mul(XP_PER_LEVEL_UNIT)
}

/// Floor of the square root.
fn isqrt(n: u64) -> u64 {
    if n < 2 {
        return n;
    }
    // Newton's method from an upper bound; converges monotonically downward.
    let mut x = n;
    let mut y = x / 2 + (x & 1);
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}
