// Numeric Coercion
//
// Cross-type conversion rules between the four numeric datatypes. Rounding
// conversions return null when the result does not fit. The ceiling variants
// clamp to the lower bound and give null above the upper bound; the floor
// variants do the opposite. Range-scan bound construction relies on this.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::common::types::DbTypeCode;
use crate::query::expression::Value;

/// 2^63 as a double, the first value above `i64::MAX`
const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
/// 2^64 as a double, the first value above `u64::MAX`
const TWO_POW_64: f64 = 18_446_744_073_709_551_616.0;

/// Conversion rules shared by every numeric datatype
pub trait Numeric: Copy + PartialOrd {
    const TYPE_CODE: DbTypeCode;

    fn to_integer(self) -> Option<i64>;
    fn to_integer_ceiling(self) -> Option<i64>;
    fn to_integer_floor(self) -> Option<i64>;
    fn to_uinteger(self) -> Option<u64>;
    fn to_uinteger_ceiling(self) -> Option<u64>;
    fn to_uinteger_floor(self) -> Option<u64>;
    fn to_decimal(self) -> Option<Decimal>;
    fn to_double(self) -> Option<f64>;
    fn into_value(self) -> Value;
}

impl Numeric for i64 {
    const TYPE_CODE: DbTypeCode = DbTypeCode::Integer;

    fn to_integer(self) -> Option<i64> {
        Some(self)
    }

    fn to_integer_ceiling(self) -> Option<i64> {
        Some(self)
    }

    fn to_integer_floor(self) -> Option<i64> {
        Some(self)
    }

    fn to_uinteger(self) -> Option<u64> {
        u64::try_from(self).ok()
    }

    fn to_uinteger_ceiling(self) -> Option<u64> {
        Some(u64::try_from(self).unwrap_or(0))
    }

    fn to_uinteger_floor(self) -> Option<u64> {
        u64::try_from(self).ok()
    }

    fn to_decimal(self) -> Option<Decimal> {
        Some(Decimal::from(self))
    }

    fn to_double(self) -> Option<f64> {
        Some(self as f64)
    }

    fn into_value(self) -> Value {
        Value::Integer(self)
    }
}

impl Numeric for u64 {
    const TYPE_CODE: DbTypeCode = DbTypeCode::UInteger;

    fn to_integer(self) -> Option<i64> {
        i64::try_from(self).ok()
    }

    fn to_integer_ceiling(self) -> Option<i64> {
        i64::try_from(self).ok()
    }

    fn to_integer_floor(self) -> Option<i64> {
        Some(i64::try_from(self).unwrap_or(i64::MAX))
    }

    fn to_uinteger(self) -> Option<u64> {
        Some(self)
    }

    fn to_uinteger_ceiling(self) -> Option<u64> {
        Some(self)
    }

    fn to_uinteger_floor(self) -> Option<u64> {
        Some(self)
    }

    fn to_decimal(self) -> Option<Decimal> {
        Some(Decimal::from(self))
    }

    fn to_double(self) -> Option<f64> {
        Some(self as f64)
    }

    fn into_value(self) -> Value {
        Value::UInteger(self)
    }
}

impl Numeric for f64 {
    const TYPE_CODE: DbTypeCode = DbTypeCode::Double;

    fn to_integer(self) -> Option<i64> {
        let rounded = self.round_ties_even();
        if rounded.is_nan() || rounded < -TWO_POW_63 || rounded >= TWO_POW_63 {
            return None;
        }
        Some(rounded as i64)
    }

    fn to_integer_ceiling(self) -> Option<i64> {
        if self.is_nan() {
            return None;
        }
        if self < -TWO_POW_63 {
            return Some(i64::MIN);
        }
        let ceiling = self.ceil();
        if ceiling >= TWO_POW_63 {
            return None;
        }
        Some(ceiling as i64)
    }

    fn to_integer_floor(self) -> Option<i64> {
        if self.is_nan() {
            return None;
        }
        if self >= TWO_POW_63 {
            return Some(i64::MAX);
        }
        let floor = self.floor();
        if floor < -TWO_POW_63 {
            return None;
        }
        Some(floor as i64)
    }

    fn to_uinteger(self) -> Option<u64> {
        let rounded = self.round_ties_even();
        if rounded.is_nan() || rounded < 0.0 || rounded >= TWO_POW_64 {
            return None;
        }
        Some(rounded as u64)
    }

    fn to_uinteger_ceiling(self) -> Option<u64> {
        if self.is_nan() {
            return None;
        }
        if self < 0.0 {
            return Some(0);
        }
        let ceiling = self.ceil();
        if ceiling >= TWO_POW_64 {
            return None;
        }
        Some(ceiling as u64)
    }

    fn to_uinteger_floor(self) -> Option<u64> {
        if self.is_nan() {
            return None;
        }
        if self >= TWO_POW_64 {
            return Some(u64::MAX);
        }
        let floor = self.floor();
        if floor < 0.0 {
            return None;
        }
        Some(floor as u64)
    }

    fn to_decimal(self) -> Option<Decimal> {
        Decimal::from_f64(self)
    }

    fn to_double(self) -> Option<f64> {
        Some(self)
    }

    fn into_value(self) -> Value {
        Value::Double(self)
    }
}

impl Numeric for Decimal {
    const TYPE_CODE: DbTypeCode = DbTypeCode::Decimal;

    fn to_integer(self) -> Option<i64> {
        self.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
            .to_i64()
    }

    fn to_integer_ceiling(self) -> Option<i64> {
        if self < Decimal::from(i64::MIN) {
            return Some(i64::MIN);
        }
        if self > Decimal::from(i64::MAX) {
            return None;
        }
        self.ceil().to_i64()
    }

    fn to_integer_floor(self) -> Option<i64> {
        if self < Decimal::from(i64::MIN) {
            return None;
        }
        if self > Decimal::from(i64::MAX) {
            return Some(i64::MAX);
        }
        self.floor().to_i64()
    }

    fn to_uinteger(self) -> Option<u64> {
        self.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
            .to_u64()
    }

    fn to_uinteger_ceiling(self) -> Option<u64> {
        if self < Decimal::ZERO {
            return Some(0);
        }
        if self > Decimal::from(u64::MAX) {
            return None;
        }
        self.ceil().to_u64()
    }

    fn to_uinteger_floor(self) -> Option<u64> {
        if self < Decimal::ZERO {
            return None;
        }
        if self > Decimal::from(u64::MAX) {
            return Some(u64::MAX);
        }
        self.floor().to_u64()
    }

    fn to_decimal(self) -> Option<Decimal> {
        Some(self)
    }

    fn to_double(self) -> Option<f64> {
        self.to_f64()
    }

    fn into_value(self) -> Value {
        Value::Decimal(self)
    }
}
