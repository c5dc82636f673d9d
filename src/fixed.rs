// src/fixed.rs
//
// Fixed-point arithmetic for learned values and rewards.
//
// Q values are signed 16-bit integers. Every intermediate is computed in
// wrapping i16 arithmetic followed by an arithmetic right shift, so the
// same inputs produce the same bits on every platform. Overflow wraps; it
// is never saturated or widened.

/// Learned value / reward word.
pub type QValue = i16;

/// Reward for healthy throughput with no stall.
pub const REWARD_GOOD: QValue = 100;
/// Reward for healthy throughput while a stall is asserted.
pub const REWARD_GOOD_STALLED: QValue = 0;
/// Reward for poor throughput with no stall.
pub const REWARD_POOR: QValue = -50;
/// Reward for poor throughput while a stall is asserted.
pub const REWARD_POOR_STALLED: QValue = -100;

/// Default learning-rate numerator.
pub const LEARNING_RATE: QValue = 2;
/// Default learning-rate shift (alpha = LEARNING_RATE / 2^LR_SHIFT).
pub const LR_SHIFT: u32 = 4;

/// Reward table for the two health signals.
pub fn reward_for(throughput_good: bool, core_stall: bool) -> QValue {
    match (throughput_good, core_stall) {
        (true, false) => REWARD_GOOD,
        (true, true) => REWARD_GOOD_STALLED,
        (false, false) => REWARD_POOR,
        (false, true) => REWARD_POOR_STALLED,
    }
}

/// `((reward - old_q) * rate) >> shift`, wrapping, arithmetic shift.
pub fn q_delta(reward: QValue, old_q: QValue, rate: QValue, shift: u32) -> QValue {
    reward.wrapping_sub(old_q).wrapping_mul(rate) >> shift.min(15)
}

/// `old_q + q_delta(..)`, wrapping.
pub fn q_update(reward: QValue, old_q: QValue, rate: QValue, shift: u32) -> QValue {
    old_q.wrapping_add(q_delta(reward, old_q, rate, shift))
}

/// Running total of rewards. Wraps at 32 bits.
pub fn accumulate(total: i32, reward: QValue) -> i32 {
    total.wrapping_add(i32::from(reward))
}

/// Truncating average; zero before the first counted episode.
pub fn average(total: i32, episodes: u32) -> i32 {
    if episodes == 0 {
        return 0;
    }
    // Episode counts past i32::MAX are out of reach at any realistic interval.
    let n = i32::try_from(episodes).unwrap_or(i32::MAX);
    total.wrapping_div(n)
}
