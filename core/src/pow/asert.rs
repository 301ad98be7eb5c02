// Copyright 2025 The Ember Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! ASERT difficulty retarget (aserti3-2d). The target rises or falls
//! exponentially with how far the chain has drifted from its ideal
//! schedule relative to a fixed anchor block; for every `half_life`
//! seconds ahead of or behind schedule the target halves or doubles.

use crate::core::arith::{ArithUint256, ArithUint512};

/// Computes the next target from the anchor's reference target and the
/// drift accumulated since the anchor.
///
/// `time_diff` is the seconds elapsed from the anchor block to the new
/// block's parent, `height_diff` the blocks between them. All degenerate
/// inputs (zero or over-limit reference target, negative height diff,
/// non-positive half life) clamp to `pow_limit`.
pub fn calculate_asert(
	ref_target: &ArithUint256,
	target_spacing: i64,
	time_diff: i64,
	height_diff: i64,
	pow_limit: &ArithUint256,
	half_life: i64,
) -> ArithUint256 {
	if ref_target.is_zero() || *ref_target > *pow_limit {
		return *pow_limit;
	}
	if height_diff < 0 {
		return *pow_limit;
	}
	if half_life <= 0 {
		return *pow_limit;
	}

	// exponent = (time_diff - ideal_time) / half_life, in 16.16 fixed
	// point. The multiply runs in 128 bits so extreme timestamps cannot
	// overflow before the division.
	let exponent_base = time_diff - target_spacing * (height_diff + 1);
	let divres = (exponent_base as i128 * 65536) / half_life as i128;
	let exponent = if divres > i64::max_value() as i128 {
		i64::max_value()
	} else if divres < i64::min_value() as i128 {
		i64::min_value()
	} else {
		divres as i64
	};

	// integer part via arithmetic (floored) shift, fractional part in
	// [0, 65535]
	let mut shifts = exponent >> 16;
	let frac = (exponent as u16) as u128;

	// Cubic approximation of 2^x for 0 <= x < 1, error below 0.013%:
	//   2^x ~ 1 + 0.695502049*x + 0.2262698*x^2 + 0.0782318*x^3
	let factor: u64 = (65536u128
		+ ((195_766_423_245_049u128 * frac
			+ 971_821_376u128 * frac * frac
			+ 5_127u128 * frac * frac * frac
			+ (1u128 << 47))
			>> 48)) as u64;

	let mut next_target = ArithUint512::from_uint256(ref_target) * factor;
	let pow_limit_512 = ArithUint512::from_uint256(pow_limit);

	// The factor carries 16 fractional bits, so the integer shift is
	// applied net of them. A negative net shift divides.
	shifts -= 16;
	if shifts <= 0 {
		let down = -(shifts as i128);
		next_target = if down >= 512 {
			ArithUint512::zero()
		} else {
			next_target >> down as usize
		};
	} else {
		let up = shifts as u64;
		if up >= 512 {
			next_target = pow_limit_512;
		} else {
			let shifted = next_target << up as usize;
			if (shifted >> up as usize) != next_target {
				// left shift overflowed the 512-bit width
				next_target = pow_limit_512;
			} else {
				next_target = shifted;
			}
		}
	}

	if next_target > pow_limit_512 {
		next_target = pow_limit_512;
	}

	let next_target = next_target.to_uint256();
	if next_target.is_zero() {
		ArithUint256::one()
	} else if next_target > *pow_limit {
		*pow_limit
	} else {
		next_target
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn pow_limit() -> ArithUint256 {
		ArithUint256::set_compact(0x1d00ffff).0
	}

	fn ref_target() -> ArithUint256 {
		// half the limit so the schedule has room to move both ways
		pow_limit() >> 1
	}

	const SPACING: i64 = 600;
	const HALF_LIFE: i64 = 2 * 24 * 3600;

	#[test]
	fn on_schedule_holds_target() {
		// exactly on schedule for 1000 blocks
		let height_diff = 1000;
		let time_diff = SPACING * (height_diff + 1);
		let next = calculate_asert(
			&ref_target(),
			SPACING,
			time_diff,
			height_diff,
			&pow_limit(),
			HALF_LIFE,
		);
		let lower = ref_target() * 90 / 100;
		let upper = ref_target() * 110 / 100;
		assert!(next > lower);
		assert!(next < upper);
	}

	#[test]
	fn ahead_of_schedule_raises_difficulty() {
		// blocks coming in twice as fast as the schedule
		let height_diff = 1000;
		let time_diff = (SPACING / 2) * (height_diff + 1);
		let next = calculate_asert(
			&ref_target(),
			SPACING,
			time_diff,
			height_diff,
			&pow_limit(),
			HALF_LIFE,
		);
		assert!(next < ref_target());
	}

	#[test]
	fn behind_schedule_lowers_difficulty() {
		let height_diff = 1000;
		let time_diff = SPACING * 2 * (height_diff + 1);
		let next = calculate_asert(
			&ref_target(),
			SPACING,
			time_diff,
			height_diff,
			&pow_limit(),
			HALF_LIFE,
		);
		assert!(next > ref_target());
	}

	#[test]
	fn one_half_life_behind_doubles_target() {
		let height_diff = 100;
		let time_diff = SPACING * (height_diff + 1) + HALF_LIFE;
		let next = calculate_asert(
			&ref_target(),
			SPACING,
			time_diff,
			height_diff,
			&pow_limit(),
			HALF_LIFE,
		);
		let doubled = ref_target() * 2;
		// cubic approximation error stays below 0.013%
		let lower = doubled * 9_990 / 10_000;
		let upper = doubled * 10_010 / 10_000;
		assert!(next > lower);
		assert!(next < upper);
	}

	#[test]
	fn extreme_future_timestamp_clamps_to_limit() {
		// one year of drift behind schedule
		let next = calculate_asert(
			&ref_target(),
			SPACING,
			365 * 24 * 3600,
			10,
			&pow_limit(),
			HALF_LIFE,
		);
		assert_eq!(next, pow_limit());
	}

	#[test]
	fn extreme_past_timestamp_stays_positive() {
		// negative time diff drives the target toward zero, floored at 1
		let next = calculate_asert(
			&ref_target(),
			SPACING,
			-(365 * 24 * 3600),
			10,
			&pow_limit(),
			HALF_LIFE,
		);
		assert!(!next.is_zero());
		assert!(next < ref_target());
	}

	#[test]
	fn on_schedule_run_is_stable() {
		// an on-schedule chain re-derives essentially the same target at
		// every height
		for height_diff in &[1i64, 10, 144, 2016, 100_000] {
			let time_diff = SPACING * (height_diff + 1);
			let next = calculate_asert(
				&ref_target(),
				SPACING,
				time_diff,
				*height_diff,
				&pow_limit(),
				HALF_LIFE,
			);
			assert_eq!(next, ref_target());
		}
	}

	#[test]
	fn single_slow_block_barely_moves_the_target() {
		// one block arriving one spacing late shifts the exponent by
		// spacing/half_life, well under one percent here
		let height_diff = 1000;
		let time_diff = SPACING * (height_diff + 1) + SPACING;
		let next = calculate_asert(
			&ref_target(),
			SPACING,
			time_diff,
			height_diff,
			&pow_limit(),
			HALF_LIFE,
		);
		assert!(next > ref_target());
		assert!(next < ref_target() * 101 / 100);
	}

	#[test]
	fn degenerate_inputs_clamp_to_limit() {
		let limit = pow_limit();
		assert_eq!(
			calculate_asert(&ArithUint256::zero(), SPACING, 0, 0, &limit, HALF_LIFE),
			limit
		);
		assert_eq!(
			calculate_asert(&(limit + ArithUint256::one()), SPACING, 0, 0, &limit, HALF_LIFE),
			limit
		);
		assert_eq!(
			calculate_asert(&ref_target(), SPACING, 600, -1, &limit, HALF_LIFE),
			limit
		);
		assert_eq!(
			calculate_asert(&ref_target(), SPACING, 600, 1, &limit, 0),
			limit
		);
	}
}
